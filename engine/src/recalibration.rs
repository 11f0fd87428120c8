//! Implicit recalibration from successful activations.
//!
//! A completed dwell is strong evidence the user was looking at the
//! activated region, so its center is fed back to the estimator as one more
//! training sample.

use serde::Deserialize;
use tracing::debug;

use crate::estimator::GazeEstimator;
use crate::gaze::GazePoint;
use crate::regions::RegionRegistry;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecalibrationConfig {
    pub enabled: bool,
}

impl Default for RecalibrationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Feeds activated region centers back into the estimator.
#[derive(Debug, Clone)]
pub struct RecalibrationFeedback {
    config: RecalibrationConfig,
    submitted: u64,
    skipped: u64,
}

impl RecalibrationFeedback {
    pub fn new(config: RecalibrationConfig) -> Self {
        Self {
            config,
            submitted: 0,
            skipped: 0,
        }
    }

    /// Submit the current center of `region_id`.
    ///
    /// Geometry is looked up now, since the region may have moved during the
    /// dwell. Returns the submitted point.
    pub fn on_activation<R, E>(
        &mut self,
        region_id: &str,
        regions: &R,
        estimator: &mut E,
    ) -> Option<GazePoint>
    where
        R: RegionRegistry + ?Sized,
        E: GazeEstimator + ?Sized,
    {
        if !self.config.enabled {
            return None;
        }
        let Some(region) = regions.region(region_id) else {
            self.skipped += 1;
            debug!("Recalibration skipped: {} no longer registered", region_id);
            return None;
        };
        let center = region.center();
        estimator.submit_training_sample(center.x, center.y);
        self.submitted += 1;
        debug!(
            "Recalibration sample ({:.0}, {:.0}) from {}",
            center.x, center.y, region_id
        );
        Some(center)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
