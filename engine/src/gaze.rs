//! Screen-space gaze coordinates.

/// A point in screen pixels.
///
/// Raw estimator output and the filter's smoothed cursor share this shape;
/// the aliases below only document which one a signature expects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
}

/// One raw estimate from the external estimator.
pub type GazeSample = GazePoint;

/// The Signal Filter's current output.
pub type SmoothedGazePoint = GazePoint;

impl GazePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(&self, other: GazePoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for GazePoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}
