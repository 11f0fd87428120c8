//! Dwell-to-click: turns a stream of focused-region ids into activations.
//!
//! One dwell runs at a time. A new focus always cancels the previous dwell
//! before its own timer starts, so the timer table never holds more than a
//! single completion deadline.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::gaze::GazePoint;
use crate::timers::TimerSet;

// ── Config ─────────────────────────────────────────────────

/// Dwell timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// Fixation time needed to activate a region (ms).
    pub dwell_ms: u64,
    /// Interval between progress reports while dwelling (ms).
    pub progress_interval_ms: u64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 1000,
            progress_interval_ms: 50,
        }
    }
}

impl DwellConfig {
    pub fn dwell_time(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

// ── State ──────────────────────────────────────────────────

/// Where the coordinator is in the dwell cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DwellState {
    /// No region focused.
    Idle,
    /// Timer running for `region_id`.
    Dwelling {
        region_id: String,
        started_at: Instant,
    },
    /// `region_id` just fired. Behaves like `Idle` except that the same id
    /// must be left before it can start another dwell.
    Activated { region_id: String },
}

impl DwellState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dwelling { .. } => "dwelling",
            Self::Activated { .. } => "activated",
        }
    }

    /// Id the coordinator currently considers "the same region".
    fn tracked(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Dwelling { region_id, .. } | Self::Activated { region_id } => Some(region_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DwellTimer {
    Complete,
    Progress,
}

/// Output of `observe` and `tick`.
#[derive(Debug, Clone, PartialEq)]
pub enum DwellEvent {
    /// Focus moved to another region or to none. Progress is back at 0.
    FocusChanged { region_id: Option<String> },
    /// Dwell progress in percent, 0-100.
    Progress { region_id: String, percent: f64 },
    /// The dwell timer elapsed.
    Completed { region_id: String, dwell_ms: u64 },
}

/// A completed dwell as delivered to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationEvent {
    pub region_id: String,
    /// Measured fixation time.
    pub dwell_ms: u64,
    /// Region center submitted to the estimator as implicit training data.
    pub feedback_point: Option<GazePoint>,
}

impl ActivationEvent {
    pub fn to_sexp(&self) -> String {
        let feedback = match self.feedback_point {
            Some(p) => format!("({:.1} {:.1})", p.x, p.y),
            None => "nil".to_string(),
        };
        format!(
            "(:type :event :event :gaze-activated :region \"{}\" :dwell-ms {} :feedback {})",
            self.region_id, self.dwell_ms, feedback,
        )
    }
}

// ── Coordinator ────────────────────────────────────────────

/// Per-session dwell state machine.
#[derive(Debug)]
pub struct DwellCoordinator {
    config: DwellConfig,
    state: DwellState,
    timers: TimerSet<DwellTimer>,
    progress: f64,
    activations: u64,
}

impl DwellCoordinator {
    pub fn new(config: DwellConfig) -> Self {
        Self {
            config,
            state: DwellState::Idle,
            timers: TimerSet::new(),
            progress: 0.0,
            activations: 0,
        }
    }

    /// Report the hit-tester's result for the latest smoothed point.
    pub fn observe(&mut self, focus: Option<&str>, now: Instant) -> Vec<DwellEvent> {
        if focus == self.state.tracked() {
            return Vec::new();
        }

        self.timers.cancel_all();
        self.progress = 0.0;

        match focus {
            Some(id) => {
                debug!("Dwell started on {}", id);
                self.state = DwellState::Dwelling {
                    region_id: id.to_string(),
                    started_at: now,
                };
                self.timers
                    .schedule_after(DwellTimer::Complete, now, self.config.dwell_time());
                self.timers.schedule_after(
                    DwellTimer::Progress,
                    now,
                    self.config.progress_interval(),
                );
            }
            None => {
                if let DwellState::Dwelling { region_id, .. } = &self.state {
                    debug!("Dwell on {} cancelled: focus lost", region_id);
                }
                self.state = DwellState::Idle;
            }
        }

        vec![DwellEvent::FocusChanged {
            region_id: focus.map(str::to_string),
        }]
    }

    /// Fire every timer due at or before `now`, in deadline order.
    pub fn tick(&mut self, now: Instant) -> Vec<DwellEvent> {
        let mut events = Vec::new();

        while let Some((timer, deadline)) = self.timers.pop_expired(now) {
            let DwellState::Dwelling {
                region_id,
                started_at,
            } = &self.state
            else {
                continue;
            };
            let (region_id, started_at) = (region_id.clone(), *started_at);

            match timer {
                DwellTimer::Progress => {
                    let elapsed = deadline.saturating_duration_since(started_at);
                    self.progress = percent(elapsed, self.config.dwell_time());
                    events.push(DwellEvent::Progress {
                        region_id,
                        percent: self.progress,
                    });
                    let interval = self.config.progress_interval();
                    self.timers.schedule(DwellTimer::Progress, deadline + interval);
                }
                DwellTimer::Complete => {
                    self.timers.cancel(DwellTimer::Progress);
                    let dwell_ms = now.saturating_duration_since(started_at).as_millis() as u64;
                    debug!("Dwell completed on {} after {}ms", region_id, dwell_ms);
                    self.progress = 0.0;
                    self.activations += 1;
                    self.state = DwellState::Activated {
                        region_id: region_id.clone(),
                    };
                    events.push(DwellEvent::Completed {
                        region_id,
                        dwell_ms,
                    });
                }
            }
        }

        events
    }

    /// Cancel any running dwell and forget the last activation.
    ///
    /// Returns true if a dwell was running.
    pub fn teardown(&mut self) -> bool {
        let was_running = self.is_running();
        self.timers.cancel_all();
        self.state = DwellState::Idle;
        self.progress = 0.0;
        was_running
    }

    pub fn state(&self) -> &DwellState {
        &self.state
    }

    /// Region currently being dwelt on.
    pub fn focused_region(&self) -> Option<&str> {
        match &self.state {
            DwellState::Dwelling { region_id, .. } => Some(region_id),
            _ => None,
        }
    }

    /// Latest progress, 0-100.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DwellState::Dwelling { .. })
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }

    pub fn config(&self) -> &DwellConfig {
        &self.config
    }
}

fn percent(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 100.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0) * 100.0
}

// ── Tests ──────────────────────────────────────────────────
