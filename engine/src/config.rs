//! Engine configuration.
//!
//! Every section is optional in the TOML file; missing fields take the
//! defaults below. Example:
//!
//! ```toml
//! [filter]
//! max_jump_px = 250.0
//! mode = { kind = "window", size = 12 }
//!
//! [dwell]
//! dwell_ms = 800
//!
//! [hit_test]
//! tie_break = "topmost"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::calibration::CalibrationConfig;
use crate::dwell::DwellConfig;
use crate::error::ConfigError;
use crate::filter::{FilterConfig, SmoothingMode};
use crate::hit_test::HitTestConfig;
use crate::recalibration::RecalibrationConfig;

/// Event loop settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Timer resolution of the event loop (ms).
    pub tick_ms: u64,
    /// Stop the loop after this many seconds.
    pub exit_after_s: Option<u64>,
    /// Stop cleanly on SIGINT/SIGTERM.
    pub handle_signals: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            exit_after_s: None,
            handle_signals: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub filter: FilterConfig,
    pub hit_test: HitTestConfig,
    pub dwell: DwellConfig,
    pub calibration: CalibrationConfig,
    pub recalibration: RecalibrationConfig,
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave.
    ///
    /// Reports the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.filter.mode {
            SmoothingMode::Ema { alpha } if !(alpha > 0.0 && alpha <= 1.0) => {
                return Err(ConfigError::invalid(
                    "filter.mode.alpha",
                    format!("{} is outside (0, 1]", alpha),
                ));
            }
            SmoothingMode::Window { size: 0 } => {
                return Err(ConfigError::invalid("filter.mode.size", "must be > 0"));
            }
            _ => {}
        }
        if !(self.filter.max_jump_px > 0.0) {
            return Err(ConfigError::invalid("filter.max_jump_px", "must be > 0"));
        }
        if !(self.hit_test.padding_px >= 0.0) {
            return Err(ConfigError::invalid("hit_test.padding_px", "must be >= 0"));
        }
        if self.dwell.dwell_ms == 0 {
            return Err(ConfigError::invalid("dwell.dwell_ms", "must be > 0"));
        }
        if self.dwell.progress_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "dwell.progress_interval_ms",
                "must be > 0",
            ));
        }

        let cal = &self.calibration;
        if !(cal.viewport_width > 0.0 && cal.viewport_height > 0.0) {
            return Err(ConfigError::invalid(
                "calibration.viewport",
                format!("{}x{} is empty", cal.viewport_width, cal.viewport_height),
            ));
        }
        if !(cal.margin_px >= 0.0)
            || cal.margin_px * 2.0 > cal.viewport_width.min(cal.viewport_height)
        {
            return Err(ConfigError::invalid(
                "calibration.margin_px",
                "must be >= 0 and leave room inside the viewport",
            ));
        }
        if cal.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "calibration.poll_interval_ms",
                "must be > 0",
            ));
        }
        if cal.samples_needed == 0 {
            return Err(ConfigError::invalid(
                "calibration.samples_needed",
                "must be > 0",
            ));
        }
        if cal.samples_needed < cal.min_samples {
            return Err(ConfigError::invalid(
                "calibration.samples_needed",
                format!(
                    "{} is below min_samples ({}), no target could ever pass",
                    cal.samples_needed, cal.min_samples
                ),
            ));
        }
        if !(cal.stability_threshold_px > 0.0) {
            return Err(ConfigError::invalid(
                "calibration.stability_threshold_px",
                "must be > 0",
            ));
        }
        if self.runtime.tick_ms == 0 {
            return Err(ConfigError::invalid("runtime.tick_ms", "must be > 0"));
        }
        Ok(())
    }

    pub fn to_sexp(&self) -> String {
        let smoothing = match self.filter.mode {
            SmoothingMode::Ema { alpha } => format!(":smoothing :ema :alpha {:.2}", alpha),
            SmoothingMode::Window { size } => format!(":smoothing :window :size {}", size),
        };
        format!(
            "(:config {} :max-jump {:.0} :padding {:.0} :tie-break :{} :dwell-ms {} :progress-ms {} :viewport ({:.0} {:.0}) :samples-needed {} :stability {:.0} :max-attempts {} :recalibration {} :tick-ms {})",
            smoothing,
            self.filter.max_jump_px,
            self.hit_test.padding_px,
            self.hit_test.tie_break.as_str(),
            self.dwell.dwell_ms,
            self.dwell.progress_interval_ms,
            self.calibration.viewport_width,
            self.calibration.viewport_height,
            self.calibration.samples_needed,
            self.calibration.stability_threshold_px,
            self.calibration.max_attempts_per_target,
            if self.recalibration.enabled { "t" } else { "nil" },
            self.runtime.tick_ms,
        )
    }
}
