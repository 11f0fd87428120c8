//! Trackable regions and the registry the host keeps them in.
//!
//! Regions belong to the host UI. The engine only asks for their current
//! geometry when it needs it, since layout can change between samples.

use crate::gaze::GazePoint;

/// Inclusion padding applied around every region unless overridden.
pub const DEFAULT_PADDING_PX: f64 = 20.0;

/// Axis-aligned rectangle in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> GazePoint {
        GazePoint::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Inclusive containment test with `padding` added on every side.
    pub fn contains_padded(&self, point: GazePoint, padding: f64) -> bool {
        point.x >= self.left - padding
            && point.x <= self.right + padding
            && point.y >= self.top - padding
            && point.y <= self.bottom + padding
    }
}

/// A UI element that can receive gaze focus and dwell activation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackableRegion {
    /// Stable, application-assigned id.
    pub id: String,
    pub rect: Rect,
    pub padding: f64,
    /// Stacking order; only consulted by the `Topmost` tie-break.
    pub z_index: i32,
}

impl TrackableRegion {
    pub fn new(id: impl Into<String>, rect: Rect) -> Self {
        Self {
            id: id.into(),
            rect,
            padding: DEFAULT_PADDING_PX,
            z_index: 0,
        }
    }

    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn contains(&self, point: GazePoint) -> bool {
        self.rect.contains_padded(point, self.padding)
    }

    pub fn center(&self) -> GazePoint {
        self.rect.center()
    }
}

/// Source of live region geometry.
pub trait RegionRegistry {
    /// All currently registered regions, in traversal order.
    fn regions(&self) -> Vec<TrackableRegion>;

    /// Current geometry of one region.
    fn region(&self, id: &str) -> Option<TrackableRegion> {
        self.regions().into_iter().find(|r| r.id == id)
    }
}

/// Ordered in-memory registry.
///
/// Insertion order is traversal order. Re-registering an id updates it in
/// place and keeps its position.
#[derive(Debug, Clone)]
pub struct RegionMap {
    default_padding: f64,
    regions: Vec<TrackableRegion>,
}

impl RegionMap {
    pub fn new() -> Self {
        Self::with_default_padding(DEFAULT_PADDING_PX)
    }

    pub fn with_default_padding(padding: f64) -> Self {
        Self {
            default_padding: padding,
            regions: Vec::new(),
        }
    }

    /// Register `id` at `rect` with the map's default padding.
    pub fn register(&mut self, id: impl Into<String>, rect: Rect) {
        let region = TrackableRegion::new(id, rect).with_padding(self.default_padding);
        self.insert(region);
    }

    /// Register a fully specified region.
    pub fn insert(&mut self, region: TrackableRegion) {
        match self.regions.iter_mut().find(|r| r.id == region.id) {
            Some(existing) => *existing = region,
            None => self.regions.push(region),
        }
    }

    /// Update geometry after a layout change. Returns false if `id` is unknown.
    pub fn update_rect(&mut self, id: &str, rect: Rect) -> bool {
        match self.regions.iter_mut().find(|r| r.id == id) {
            Some(region) => {
                region.rect = rect;
                true
            }
            None => false,
        }
    }

    pub fn unregister(&mut self, id: &str) -> Option<TrackableRegion> {
        let index = self.regions.iter().position(|r| r.id == id)?;
        Some(self.regions.remove(index))
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.id.as_str())
    }
}

impl Default for RegionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionRegistry for RegionMap {
    fn regions(&self) -> Vec<TrackableRegion> {
        self.regions.clone()
    }

    fn region(&self, id: &str) -> Option<TrackableRegion> {
        self.regions.iter().find(|r| r.id == id).cloned()
    }
}
