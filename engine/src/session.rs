//! The gaze session: one explicitly owned object per tracking session.
//!
//! The session owns the filter, the dwell coordinator, the recalibration
//! feedback and (while one runs) the calibration session. The host drives
//! it with `on_sample` for every estimator frame and `tick` on a timer, and
//! reads results either from the returned events or through subscriptions.

use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::calibration::{CalibrationEvent, CalibrationOutcome, CalibrationSession};
use crate::config::EngineConfig;
use crate::dwell::{ActivationEvent, DwellCoordinator, DwellEvent, DwellState};
use crate::error::{GazeError, Result};
use crate::estimator::{GazeEstimator, SampleSink};
use crate::filter::GazeFilter;
use crate::gaze::{GazeSample, SmoothedGazePoint};
use crate::hit_test::locate;
use crate::observers::{ObserverRegistry, SubscriptionId};
use crate::recalibration::RecalibrationFeedback;
use crate::regions::RegionRegistry;

// ── Events ─────────────────────────────────────────────────

/// Everything the session reports to the host.
///
/// Only `Activated` should change application state; the rest drive
/// cursors, progress rings and the calibration screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The smoothed cursor moved.
    GazeMoved { point: SmoothedGazePoint },
    /// Focus moved to a region or to none. Progress restarts at 0.
    FocusChanged {
        region_id: Option<String>,
        progress: f64,
    },
    DwellProgress { region_id: String, percent: f64 },
    Activated(ActivationEvent),
    Calibration(CalibrationEvent),
}

impl SessionEvent {
    pub fn to_sexp(&self) -> String {
        match self {
            Self::GazeMoved { point } => format!(
                "(:type :event :event :gaze-moved :x {:.1} :y {:.1})",
                point.x, point.y
            ),
            Self::FocusChanged {
                region_id,
                progress,
            } => format!(
                "(:type :event :event :gaze-focus :region {} :progress {:.0})",
                region_id
                    .as_ref()
                    .map_or("nil".to_string(), |id| format!("\"{}\"", id)),
                progress
            ),
            Self::DwellProgress { region_id, percent } => format!(
                "(:type :event :event :gaze-dwell-progress :region \"{}\" :percent {:.0})",
                region_id, percent
            ),
            Self::Activated(activation) => activation.to_sexp(),
            Self::Calibration(event) => event.to_sexp(),
        }
    }
}

// ── Session ────────────────────────────────────────────────

/// A tracking session over estimator `E` and region registry `R`.
pub struct GazeSession<E, R> {
    config: EngineConfig,
    estimator: E,
    regions: R,
    filter: GazeFilter,
    dwell: DwellCoordinator,
    feedback: RecalibrationFeedback,
    calibration: Option<CalibrationSession>,
    last_calibration: Option<CalibrationOutcome>,
    observers: ObserverRegistry<SessionEvent>,
    started: bool,
    paused: bool,
    calibrated: bool,
    empty_frames: u64,
}

impl<E: GazeEstimator, R: RegionRegistry> GazeSession<E, R> {
    pub fn new(config: EngineConfig, estimator: E, regions: R) -> Self {
        info!(
            "Gaze session created (estimator: {}, dwell {}ms)",
            estimator.name(),
            config.dwell.dwell_ms
        );
        Self {
            filter: GazeFilter::new(config.filter.clone()),
            dwell: DwellCoordinator::new(config.dwell.clone()),
            feedback: RecalibrationFeedback::new(config.recalibration.clone()),
            calibration: None,
            last_calibration: None,
            observers: ObserverRegistry::new(),
            started: false,
            paused: false,
            calibrated: false,
            empty_frames: 0,
            config,
            estimator,
            regions,
        }
    }

    /// Begin estimation; frames will arrive through `sink`.
    pub fn start(&mut self, sink: SampleSink) -> Result<()> {
        if self.started {
            return Err(GazeError::AlreadyStarted);
        }
        if let Err(err) = self.estimator.begin(sink) {
            warn!("Estimator {} failed to start: {}", self.estimator.name(), err);
            return Err(err.into());
        }
        self.started = true;
        info!("Gaze session started");
        Ok(())
    }

    /// Process one estimator frame, in arrival order.
    ///
    /// Timers that came due before `now` fire first, so a focus change in
    /// this frame never races a completion from an earlier one.
    pub fn on_sample(&mut self, sample: Option<GazeSample>, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.fire_timers(now, &mut events);

        if !self.started {
            trace!("gaze frame ignored: session not started");
            return self.publish(events);
        }
        let Some(sample) = sample else {
            self.empty_frames += 1;
            return self.publish(events);
        };
        let Some(point) = self.filter.filter(sample) else {
            return self.publish(events);
        };
        events.push(SessionEvent::GazeMoved { point });

        if self.is_calibrating() || self.paused {
            return self.publish(events);
        }

        let regions = self.regions.regions();
        let focus = locate(point, &regions, self.config.hit_test.tie_break);
        let dwell_events = self.dwell.observe(focus, now);
        self.absorb_dwell(dwell_events, &mut events);
        self.publish(events)
    }

    /// Fire every dwell and calibration timer due at or before `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.fire_timers(now, &mut events);
        self.publish(events)
    }

    fn fire_timers(&mut self, now: Instant, events: &mut Vec<SessionEvent>) {
        if let Some(calibration) = self.calibration.as_mut() {
            for event in calibration.tick(now, &mut self.estimator) {
                if let CalibrationEvent::Completed { .. } = event {
                    self.calibrated = true;
                    self.filter.reset();
                }
                events.push(SessionEvent::Calibration(event));
            }
            self.retire_calibration();
        }

        // A region unmounted mid-dwell takes its dwell with it
        if let Some(id) = self.dwell.focused_region() {
            if self.regions.region(id).is_none() {
                debug!("Dwell on {} dropped: region unregistered", id);
                self.dwell.teardown();
                events.push(SessionEvent::FocusChanged {
                    region_id: None,
                    progress: 0.0,
                });
            }
        }

        let dwell_events = self.dwell.tick(now);
        self.absorb_dwell(dwell_events, events);
    }

    fn absorb_dwell(&mut self, dwell_events: Vec<DwellEvent>, events: &mut Vec<SessionEvent>) {
        for event in dwell_events {
            let event = match event {
                DwellEvent::FocusChanged { region_id } => SessionEvent::FocusChanged {
                    region_id,
                    progress: 0.0,
                },
                DwellEvent::Progress { region_id, percent } => {
                    SessionEvent::DwellProgress { region_id, percent }
                }
                DwellEvent::Completed {
                    region_id,
                    dwell_ms,
                } => {
                    let feedback_point =
                        self.feedback
                            .on_activation(&region_id, &self.regions, &mut self.estimator);
                    info!("Activated {} after {}ms", region_id, dwell_ms);
                    SessionEvent::Activated(ActivationEvent {
                        region_id,
                        dwell_ms,
                        feedback_point,
                    })
                }
            };
            events.push(event);
        }
    }

    /// Move a finished calibration's outcome into `last_calibration`.
    fn retire_calibration(&mut self) {
        let finished = self
            .calibration
            .as_ref()
            .and_then(|c| if c.is_active() { None } else { c.outcome() });
        if let Some(outcome) = finished {
            self.last_calibration = Some(outcome);
            self.calibration = None;
        }
    }

    fn publish(&mut self, events: Vec<SessionEvent>) -> Vec<SessionEvent> {
        for event in &events {
            self.observers.emit(event);
        }
        events
    }

    // ── Calibration ────────────────────────────────────────

    /// Start a calibration run. Dwell is suspended until it ends.
    pub fn begin_calibration(&mut self, now: Instant) -> Result<Vec<SessionEvent>> {
        if !self.started {
            return Err(GazeError::NotStarted);
        }
        if self.is_calibrating() {
            return Err(GazeError::CalibrationInProgress);
        }

        let mut events = Vec::new();
        if self.dwell.teardown() {
            events.push(SessionEvent::FocusChanged {
                region_id: None,
                progress: 0.0,
            });
        }
        self.calibrated = false;
        let (calibration, calibration_events) =
            CalibrationSession::start(self.config.calibration.clone(), &mut self.estimator, now);
        self.calibration = Some(calibration);
        events.extend(calibration_events.into_iter().map(SessionEvent::Calibration));
        Ok(self.publish(events))
    }

    /// The user opted out of calibration. A no-op if none is running.
    pub fn complete_or_cancel_calibration(&mut self) -> Vec<SessionEvent> {
        let event = self.calibration.as_mut().and_then(|c| c.cancel());
        self.retire_calibration();
        let events = event
            .map(SessionEvent::Calibration)
            .into_iter()
            .collect();
        self.publish(events)
    }

    // ── Lifecycle ──────────────────────────────────────────

    /// Suspend estimation and dwell. Frames keep moving the cursor but
    /// nothing is hit-tested.
    pub fn pause(&mut self) -> Vec<SessionEvent> {
        if !self.started || self.paused {
            return Vec::new();
        }
        self.estimator.pause();
        self.paused = true;
        self.filter.reset();
        let mut events = Vec::new();
        if self.dwell.teardown() {
            events.push(SessionEvent::FocusChanged {
                region_id: None,
                progress: 0.0,
            });
        }
        info!("Gaze session paused");
        self.publish(events)
    }

    pub fn resume(&mut self) {
        if !self.started || !self.paused {
            return;
        }
        self.estimator.resume();
        self.paused = false;
        self.filter.reset();
        info!("Gaze session resumed");
    }

    /// End the session: cancel everything, release the estimator and drop
    /// every subscription. Observers see the final events first.
    pub fn stop(&mut self) -> Vec<SessionEvent> {
        if !self.started {
            return Vec::new();
        }
        let mut events = Vec::new();
        if let Some(event) = self.calibration.as_mut().and_then(|c| c.cancel()) {
            events.push(SessionEvent::Calibration(event));
        }
        self.retire_calibration();
        if self.dwell.teardown() {
            events.push(SessionEvent::FocusChanged {
                region_id: None,
                progress: 0.0,
            });
        }
        self.estimator.end();
        self.filter.reset();
        self.started = false;
        self.paused = false;
        self.calibrated = false;

        let events = self.publish(events);
        self.observers.clear();
        info!("Gaze session stopped");
        events
    }

    // ── Observers ──────────────────────────────────────────

    pub fn subscribe<F>(&mut self, owner: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + 'static,
    {
        self.observers.subscribe(owner, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn unsubscribe_owner(&mut self, owner: &str) -> usize {
        self.observers.unsubscribe_owner(owner)
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn regions(&self) -> &R {
        &self.regions
    }

    /// Live geometry; the host updates it between samples.
    pub fn regions_mut(&mut self) -> &mut R {
        &mut self.regions
    }

    /// Current smoothed cursor.
    pub fn cursor(&self) -> Option<SmoothedGazePoint> {
        self.filter.current()
    }

    pub fn dwell_state(&self) -> &DwellState {
        self.dwell.state()
    }

    pub fn focused_region(&self) -> Option<&str> {
        self.dwell.focused_region()
    }

    pub fn dwell_progress(&self) -> f64 {
        self.dwell.progress()
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        self.calibration.as_ref()
    }

    pub fn last_calibration(&self) -> Option<CalibrationOutcome> {
        self.last_calibration
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.as_ref().is_some_and(|c| c.is_active())
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Earliest pending timer, for hosts that sleep between ticks.
    pub fn next_deadline(&self) -> Option<Instant> {
        let calibration = self.calibration.as_ref().and_then(|c| c.next_deadline());
        match (self.dwell.next_deadline(), calibration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn status_sexp(&self) -> String {
        let cursor = self
            .cursor()
            .map_or("nil".to_string(), |p| format!("({:.1} {:.1})", p.x, p.y));
        let focus = self
            .focused_region()
            .map_or("nil".to_string(), |id| format!("\"{}\"", id));
        format!(
            "(:started {} :paused {} :calibrated {} :calibrating {} :cursor {} :dwell :{} :focus {} :progress {:.0} :accepted {} :rejected {} :empty-frames {} :activations {} :recalibration-samples {} :observers {})",
            if self.started { "t" } else { "nil" },
            if self.paused { "t" } else { "nil" },
            if self.calibrated { "t" } else { "nil" },
            if self.is_calibrating() { "t" } else { "nil" },
            cursor,
            self.dwell.state().as_str(),
            focus,
            self.dwell.progress(),
            self.filter.accepted(),
            self.filter.rejected(),
            self.empty_frames,
            self.dwell.activations(),
            self.feedback.submitted(),
            self.observers.len(),
        )
    }

    pub fn config_sexp(&self) -> String {
        self.config.to_sexp()
    }
}

// ── Tests ──────────────────────────────────────────────────
