//! Calibration: trains the estimator on a 3×3 grid of fixation targets.
//!
//! For every target the user is given time to look at it, then the raw
//! estimator output is polled and each prediction is submitted as a
//! training sample at the target's true position. Once enough predictions
//! are in, their spread decides whether the target is accepted or has to be
//! collected again.
//!
//! Calibration judges the raw estimator, so it reads `current_prediction`
//! directly and never goes through the signal filter.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{GazeError, Result};
use crate::estimator::GazeEstimator;
use crate::gaze::GazeSample;
use crate::timers::TimerSet;

// ── Config ─────────────────────────────────────────────────

/// Calibration timing, grid layout and acceptance thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub viewport_width: f64,
    pub viewport_height: f64,
    /// Distance of the outer targets from the viewport edges.
    pub margin_px: f64,
    /// Time to look at a new target before collection starts (ms).
    pub orient_ms: u64,
    /// Estimator polling interval while collecting (ms).
    pub poll_interval_ms: u64,
    /// Predictions collected per attempt.
    pub samples_needed: usize,
    /// Fewer samples than this can never be judged stable.
    pub min_samples: usize,
    /// Both standard deviations must be below this (px).
    pub stability_threshold_px: f64,
    /// Pause after an accepted target (ms).
    pub success_pause_ms: u64,
    /// Pause after a rejected attempt before collecting again (ms).
    pub error_pause_ms: u64,
    /// Rejected attempts allowed per target before giving up; 0 retries forever.
    pub max_attempts_per_target: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1920.0,
            viewport_height: 1080.0,
            margin_px: 100.0,
            orient_ms: 500,
            poll_interval_ms: 30,
            samples_needed: 20,
            min_samples: 10,
            stability_threshold_px: 50.0,
            success_pause_ms: 500,
            error_pause_ms: 1500,
            max_attempts_per_target: 8,
        }
    }
}

// ── Targets ────────────────────────────────────────────────

/// A fixation point shown to the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTarget {
    pub x: f64,
    pub y: f64,
    pub id: usize,
}

/// 3×3 grid inset by `margin`, ids in row-major order.
pub fn grid_targets(width: f64, height: f64, margin: f64) -> Vec<CalibrationTarget> {
    let step_x = (width - 2.0 * margin) / 2.0;
    let step_y = (height - 2.0 * margin) / 2.0;
    (0..3)
        .flat_map(|row| (0..3).map(move |col| (row, col)))
        .enumerate()
        .map(|(id, (row, col))| CalibrationTarget {
            x: margin + step_x * col as f64,
            y: margin + step_y * row as f64,
            id,
        })
        .collect()
}

// ── Stability ──────────────────────────────────────────────

/// Population standard deviation. Zero for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Judgment on one attempt's samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StabilityVerdict {
    Stable { sd_x: f64, sd_y: f64 },
    Unstable { sd_x: f64, sd_y: f64 },
    InsufficientSamples { count: usize },
}

impl StabilityVerdict {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable { .. })
    }

    pub fn to_sexp(&self) -> String {
        match self {
            Self::Stable { sd_x, sd_y } => {
                format!("(:verdict :stable :sd-x {:.1} :sd-y {:.1})", sd_x, sd_y)
            }
            Self::Unstable { sd_x, sd_y } => {
                format!("(:verdict :unstable :sd-x {:.1} :sd-y {:.1})", sd_x, sd_y)
            }
            Self::InsufficientSamples { count } => {
                format!("(:verdict :insufficient :count {})", count)
            }
        }
    }
}

/// Stable iff at least `min_samples` samples and both deviations are below
/// `threshold`.
pub fn stability_verdict(
    samples: &[GazeSample],
    threshold: f64,
    min_samples: usize,
) -> StabilityVerdict {
    if samples.len() < min_samples {
        return StabilityVerdict::InsufficientSamples {
            count: samples.len(),
        };
    }
    let xs: Vec<f64> = samples.iter().map(|s| s.x).collect();
    let ys: Vec<f64> = samples.iter().map(|s| s.y).collect();
    let sd_x = population_std_dev(&xs);
    let sd_y = population_std_dev(&ys);
    if sd_x < threshold && sd_y < threshold {
        StabilityVerdict::Stable { sd_x, sd_y }
    } else {
        StabilityVerdict::Unstable { sd_x, sd_y }
    }
}

// ── Phases and events ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Idle,
    /// Target shown, user orienting.
    Waiting,
    Collecting,
    /// Target accepted, pausing before the next one.
    Success,
    /// Attempt rejected, pausing before a retry.
    Error,
    Finished,
    Cancelled,
    Failed,
}

impl CalibrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Collecting => "collecting",
            Self::Success => "success",
            Self::Error => "error",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// True while targets are still being worked through.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::Collecting | Self::Success | Self::Error
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalibrationTimer {
    Orient,
    Poll,
    Advance,
    Retry,
}

/// Everything a calibration UI needs to render the procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    TargetPresented {
        target: CalibrationTarget,
        index: usize,
        total: usize,
    },
    CollectionStarted {
        target_id: usize,
        attempt: u32,
    },
    Progress {
        target_id: usize,
        percent: f64,
    },
    TargetAccepted {
        target_id: usize,
        verdict: StabilityVerdict,
    },
    TargetRejected {
        target_id: usize,
        verdict: StabilityVerdict,
        attempt: u32,
    },
    Completed {
        targets: usize,
    },
    Cancelled {
        target_id: Option<usize>,
    },
    Failed {
        target_id: usize,
        attempts: u32,
    },
}

impl CalibrationEvent {
    pub fn to_sexp(&self) -> String {
        match self {
            Self::TargetPresented {
                target,
                index,
                total,
            } => format!(
                "(:type :event :event :calibration-target :id {} :x {:.1} :y {:.1} :index {} :total {})",
                target.id, target.x, target.y, index, total
            ),
            Self::CollectionStarted { target_id, attempt } => format!(
                "(:type :event :event :calibration-collecting :id {} :attempt {})",
                target_id, attempt
            ),
            Self::Progress { target_id, percent } => format!(
                "(:type :event :event :calibration-progress :id {} :percent {:.0})",
                target_id, percent
            ),
            Self::TargetAccepted { target_id, verdict } => format!(
                "(:type :event :event :calibration-accepted :id {} :result {})",
                target_id,
                verdict.to_sexp()
            ),
            Self::TargetRejected {
                target_id,
                verdict,
                attempt,
            } => format!(
                "(:type :event :event :calibration-rejected :id {} :attempt {} :result {})",
                target_id,
                attempt,
                verdict.to_sexp()
            ),
            Self::Completed { targets } => format!(
                "(:type :event :event :calibration-completed :targets {})",
                targets
            ),
            Self::Cancelled { target_id } => format!(
                "(:type :event :event :calibration-cancelled :id {})",
                target_id.map_or("nil".to_string(), |id| id.to_string())
            ),
            Self::Failed {
                target_id,
                attempts,
            } => format!(
                "(:type :event :event :calibration-failed :id {} :attempts {})",
                target_id, attempts
            ),
        }
    }
}

/// How a calibration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Completed,
    Cancelled,
    Failed { target_id: usize, attempts: u32 },
}

impl CalibrationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Completed => Ok(()),
            Self::Cancelled => Err(GazeError::CalibrationCancelled),
            Self::Failed {
                target_id,
                attempts,
            } => Err(GazeError::CalibrationFailed {
                target_id,
                attempts,
            }),
        }
    }
}

// ── Session ────────────────────────────────────────────────

/// One run through the target grid.
#[derive(Debug)]
pub struct CalibrationSession {
    config: CalibrationConfig,
    targets: Vec<CalibrationTarget>,
    index: usize,
    phase: CalibrationPhase,
    samples: Vec<GazeSample>,
    attempt: u32,
    timers: TimerSet<CalibrationTimer>,
    outcome: Option<CalibrationOutcome>,
    submitted: u64,
}

impl CalibrationSession {
    /// Wipe the estimator's training data and present the first target.
    pub fn start<E>(
        config: CalibrationConfig,
        estimator: &mut E,
        now: Instant,
    ) -> (Self, Vec<CalibrationEvent>)
    where
        E: GazeEstimator + ?Sized,
    {
        estimator.clear_training_data();
        let targets = grid_targets(
            config.viewport_width,
            config.viewport_height,
            config.margin_px,
        );
        info!(
            "Calibration started ({} targets, {}x{} viewport)",
            targets.len(),
            config.viewport_width,
            config.viewport_height
        );

        let mut session = Self {
            config,
            targets,
            index: 0,
            phase: CalibrationPhase::Idle,
            samples: Vec::new(),
            attempt: 0,
            timers: TimerSet::new(),
            outcome: None,
            submitted: 0,
        };
        let mut events = Vec::new();
        session.present(now, &mut events);
        (session, events)
    }

    /// Fire every timer due at or before `now`.
    ///
    /// Each timer acts as if it fired exactly at its own deadline, so a
    /// coarse tick replays the same schedule a fine one would.
    pub fn tick<E>(&mut self, now: Instant, estimator: &mut E) -> Vec<CalibrationEvent>
    where
        E: GazeEstimator + ?Sized,
    {
        let mut events = Vec::new();
        while let Some((timer, at)) = self.timers.pop_expired(now) {
            match timer {
                CalibrationTimer::Orient | CalibrationTimer::Retry => {
                    self.begin_collecting(at, &mut events);
                }
                CalibrationTimer::Poll => self.poll(at, estimator, &mut events),
                CalibrationTimer::Advance => {
                    self.index += 1;
                    if self.index < self.targets.len() {
                        self.present(at, &mut events);
                    } else {
                        self.finish(&mut events);
                    }
                }
            }
        }
        events
    }

    /// Abort the run. No further training samples are submitted.
    ///
    /// Returns the cancellation event, or `None` if the run had already ended.
    pub fn cancel(&mut self) -> Option<CalibrationEvent> {
        if !self.phase.is_active() {
            return None;
        }
        let target_id = self.current_target().map(|t| t.id);
        self.timers.cancel_all();
        self.samples.clear();
        self.phase = CalibrationPhase::Cancelled;
        self.outcome = Some(CalibrationOutcome::Cancelled);
        info!("Calibration cancelled at target {:?}", target_id);
        Some(CalibrationEvent::Cancelled { target_id })
    }

    fn present(&mut self, at: Instant, events: &mut Vec<CalibrationEvent>) {
        let Some(target) = self.targets.get(self.index).copied() else {
            return;
        };
        self.phase = CalibrationPhase::Waiting;
        self.attempt = 0;
        self.samples.clear();
        debug!(
            "Calibration target {} at ({:.0}, {:.0})",
            target.id, target.x, target.y
        );
        self.timers.schedule_after(
            CalibrationTimer::Orient,
            at,
            Duration::from_millis(self.config.orient_ms),
        );
        events.push(CalibrationEvent::TargetPresented {
            target,
            index: self.index,
            total: self.targets.len(),
        });
    }

    fn begin_collecting(&mut self, at: Instant, events: &mut Vec<CalibrationEvent>) {
        let Some(target) = self.current_target() else {
            return;
        };
        self.phase = CalibrationPhase::Collecting;
        self.samples.clear();
        self.attempt += 1;
        self.timers.schedule_after(CalibrationTimer::Poll, at, self.poll_interval());
        events.push(CalibrationEvent::CollectionStarted {
            target_id: target.id,
            attempt: self.attempt,
        });
    }

    fn poll<E>(&mut self, at: Instant, estimator: &mut E, events: &mut Vec<CalibrationEvent>)
    where
        E: GazeEstimator + ?Sized,
    {
        let Some(target) = self.current_target() else {
            return;
        };
        if self.phase != CalibrationPhase::Collecting {
            return;
        }

        if let Some(prediction) = estimator.current_prediction().filter(|p| p.is_finite()) {
            self.samples.push(prediction);
            estimator.submit_training_sample(target.x, target.y);
            self.submitted += 1;
            events.push(CalibrationEvent::Progress {
                target_id: target.id,
                percent: self.progress(),
            });
        }

        if self.samples.len() < self.config.samples_needed {
            self.timers.schedule_after(CalibrationTimer::Poll, at, self.poll_interval());
            return;
        }

        let verdict = stability_verdict(
            &self.samples,
            self.config.stability_threshold_px,
            self.config.min_samples,
        );
        if verdict.is_stable() {
            debug!("Calibration target {} accepted", target.id);
            self.phase = CalibrationPhase::Success;
            self.timers.schedule_after(
                CalibrationTimer::Advance,
                at,
                Duration::from_millis(self.config.success_pause_ms),
            );
            events.push(CalibrationEvent::TargetAccepted {
                target_id: target.id,
                verdict,
            });
            return;
        }

        self.phase = CalibrationPhase::Error;
        events.push(CalibrationEvent::TargetRejected {
            target_id: target.id,
            verdict,
            attempt: self.attempt,
        });

        let cap = self.config.max_attempts_per_target;
        if cap > 0 && self.attempt >= cap {
            warn!(
                "Calibration target {} unstable after {} attempts, giving up",
                target.id, self.attempt
            );
            self.timers.cancel_all();
            self.phase = CalibrationPhase::Failed;
            self.outcome = Some(CalibrationOutcome::Failed {
                target_id: target.id,
                attempts: self.attempt,
            });
            events.push(CalibrationEvent::Failed {
                target_id: target.id,
                attempts: self.attempt,
            });
        } else {
            debug!(
                "Calibration target {} unstable (attempt {}): {}",
                target.id,
                self.attempt,
                verdict.to_sexp()
            );
            self.timers.schedule_after(
                CalibrationTimer::Retry,
                at,
                Duration::from_millis(self.config.error_pause_ms),
            );
        }
    }

    fn finish(&mut self, events: &mut Vec<CalibrationEvent>) {
        self.timers.cancel_all();
        self.phase = CalibrationPhase::Finished;
        self.outcome = Some(CalibrationOutcome::Completed);
        info!(
            "Calibration completed ({} training samples submitted)",
            self.submitted
        );
        events.push(CalibrationEvent::Completed {
            targets: self.targets.len(),
        });
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Target currently shown, if the run has not ended.
    pub fn current_target(&self) -> Option<CalibrationTarget> {
        if self.phase.is_active() {
            self.targets.get(self.index).copied()
        } else {
            None
        }
    }

    /// Collection progress for the current attempt, 0-100.
    pub fn progress(&self) -> f64 {
        let needed = self.config.samples_needed.max(1) as f64;
        (self.samples.len() as f64 / needed).min(1.0) * 100.0
    }

    pub fn samples_collected(&self) -> usize {
        self.samples.len()
    }

    pub fn targets(&self) -> &[CalibrationTarget] {
        &self.targets
    }

    /// Attempt number for the current target, starting at 1 once collecting.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Set once the run has ended.
    pub fn outcome(&self) -> Option<CalibrationOutcome> {
        self.outcome
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:phase :{} :target {} :index {} :total {} :attempt {} :progress {:.0})",
            self.phase.as_str(),
            self.current_target()
                .map_or("nil".to_string(), |t| t.id.to_string()),
            self.index,
            self.targets.len(),
            self.attempt,
            self.progress(),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
