//! Signal filter: outlier rejection and smoothing of raw gaze samples.
//!
//! Two smoothing modes are supported:
//! - exponential moving average over the last accepted output,
//! - arithmetic mean over a sliding window of raw samples.
//!
//! In both modes a sample that lands further than `max_jump_px` from the
//! reference point is dropped outright. Blinks and single-frame
//! misdetections would otherwise teleport the cursor and start or cancel
//! dwell timers.

use std::collections::VecDeque;

use serde::Deserialize;
use tracing::trace;

use crate::gaze::{GazePoint, GazeSample, SmoothedGazePoint};

// ── Config ─────────────────────────────────────────────────

/// Smoothing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SmoothingMode {
    /// `alpha * current + (1 - alpha) * previous`. Higher alpha is more
    /// responsive and more jittery.
    Ema { alpha: f64 },
    /// Mean of the last `size` accepted raw samples.
    Window { size: usize },
}

impl SmoothingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ema { .. } => "ema",
            Self::Window { .. } => "window",
        }
    }
}

/// Configuration for the signal filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub mode: SmoothingMode,
    /// Largest jump (pixels) between consecutive points that is still accepted.
    pub max_jump_px: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: SmoothingMode::Ema { alpha: 0.7 },
            max_jump_px: 300.0,
        }
    }
}

// ── History ────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum History {
    Ema {
        alpha: f64,
        last: Option<GazePoint>,
    },
    Window {
        capacity: usize,
        samples: VecDeque<GazePoint>,
    },
}

impl History {
    fn new(mode: SmoothingMode) -> Self {
        match mode {
            SmoothingMode::Ema { alpha } => Self::Ema {
                alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
                last: None,
            },
            SmoothingMode::Window { size } => {
                let capacity = size.max(1);
                Self::Window {
                    capacity,
                    samples: VecDeque::with_capacity(capacity),
                }
            }
        }
    }

    /// Point the jump test measures against.
    fn reference(&self) -> Option<GazePoint> {
        match self {
            Self::Ema { last, .. } => *last,
            Self::Window { samples, .. } => samples.back().copied(),
        }
    }

    fn accept(&mut self, sample: GazePoint) -> GazePoint {
        match self {
            Self::Ema { alpha, last } => {
                let smoothed = match *last {
                    Some(prev) => GazePoint::new(
                        *alpha * sample.x + (1.0 - *alpha) * prev.x,
                        *alpha * sample.y + (1.0 - *alpha) * prev.y,
                    ),
                    None => sample,
                };
                *last = Some(smoothed);
                smoothed
            }
            Self::Window { capacity, samples } => {
                if samples.len() >= *capacity {
                    samples.pop_front();
                }
                samples.push_back(sample);
                let n = samples.len() as f64;
                let (sx, sy) = samples
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
                GazePoint::new(sx / n, sy / n)
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Ema { last, .. } => *last = None,
            Self::Window { samples, .. } => samples.clear(),
        }
    }
}

// ── Filter ─────────────────────────────────────────────────

/// Turns raw estimator samples into a stable cursor position.
#[derive(Debug, Clone)]
pub struct GazeFilter {
    config: FilterConfig,
    history: History,
    current: Option<SmoothedGazePoint>,
    accepted: u64,
    rejected: u64,
}

impl GazeFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            history: History::new(config.mode),
            config,
            current: None,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Feed one raw sample.
    ///
    /// Returns the new smoothed point, or `None` if the sample was rejected.
    /// A rejected sample leaves the history untouched.
    pub fn filter(&mut self, sample: GazeSample) -> Option<SmoothedGazePoint> {
        if !sample.is_finite() {
            self.rejected += 1;
            trace!("gaze sample rejected: non-finite ({}, {})", sample.x, sample.y);
            return None;
        }

        if let Some(reference) = self.history.reference() {
            let jump = reference.distance_to(sample);
            if jump > self.config.max_jump_px {
                self.rejected += 1;
                trace!(
                    "gaze sample rejected: jump {:.0}px > {:.0}px",
                    jump,
                    self.config.max_jump_px
                );
                return None;
            }
        }

        let smoothed = self.history.accept(sample);
        self.current = Some(smoothed);
        self.accepted += 1;
        Some(smoothed)
    }

    /// Last emitted point, if any.
    pub fn current(&self) -> Option<SmoothedGazePoint> {
        self.current
    }

    /// Forget all history; the next sample re-seeds the filter.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current = None;
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

// ── Tests ──────────────────────────────────────────────────
