//! Scripted gaze traces for integration testing.
//!
//! Provides `InputEvent` and the `InputProvider` trait so tests can drive a
//! session through a fixed sequence of frames and pauses, and `replay` to
//! push such a script through a session on a manual clock. The real runtime
//! does not use this; frames come from the estimator's sink.

use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::{Clock, ManualClock};
use crate::estimator::GazeEstimator;
use crate::gaze::GazePoint;
use crate::regions::RegionRegistry;
use crate::session::{GazeSession, SessionEvent};

/// One step of a scripted gaze trace.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// An estimator frame with a raw estimate.
    Gaze { x: f64, y: f64 },
    /// An estimator frame with no estimate (blink, face lost).
    NoEstimate,
    /// Let time pass without frames.
    Wait { duration: Duration },
}

impl InputEvent {
    /// `frames` identical gaze frames at `(x, y)`.
    pub fn fixation(x: f64, y: f64, frames: usize) -> Vec<InputEvent> {
        vec![InputEvent::Gaze { x, y }; frames]
    }

    /// Frames moving in a straight line from `from` to `to`, both included.
    pub fn sweep(from: GazePoint, to: GazePoint, frames: usize) -> Vec<InputEvent> {
        let steps = frames.max(2) - 1;
        (0..=steps)
            .map(|i| {
                let f = i as f64 / steps as f64;
                InputEvent::Gaze {
                    x: from.x + (to.x - from.x) * f,
                    y: from.y + (to.y - from.y) * f,
                }
            })
            .collect()
    }
}

/// Trait for providing scripted input.
pub trait InputProvider: Send {
    /// Get the next input event, if any.
    fn next_event(&mut self) -> Option<InputEvent>;
    /// Whether there are more events to deliver.
    fn has_events(&self) -> bool;
}

/// A scripted input provider that delivers events from a pre-defined queue.
pub struct ScriptedInputProvider {
    events: VecDeque<InputEvent>,
}

impl ScriptedInputProvider {
    /// Create from a vector of events.
    pub fn new(events: Vec<InputEvent>) -> Self {
        Self {
            events: VecDeque::from(events),
        }
    }

    /// Number of remaining events.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl InputProvider for ScriptedInputProvider {
    fn next_event(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

/// A recording wrapper that logs all events from an inner provider.
pub struct RecordingProvider<P: InputProvider> {
    inner: P,
    recorded: Vec<InputEvent>,
}

impl<P: InputProvider> RecordingProvider<P> {
    /// Wrap an existing provider with recording.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            recorded: Vec::new(),
        }
    }

    /// Get all recorded events.
    pub fn recorded(&self) -> &[InputEvent] {
        &self.recorded
    }

    /// Consume and return recorded events.
    pub fn into_recorded(self) -> Vec<InputEvent> {
        self.recorded
    }
}

impl<P: InputProvider> InputProvider for RecordingProvider<P> {
    fn next_event(&mut self) -> Option<InputEvent> {
        let event = self.inner.next_event()?;
        self.recorded.push(event.clone());
        Some(event)
    }

    fn has_events(&self) -> bool {
        self.inner.has_events()
    }
}

/// Play every event from `provider` into `session`.
///
/// Each frame is delivered at the clock's current time, after which the
/// clock moves on by `frame_interval`. `Wait` advances the clock in
/// `frame_interval` steps and ticks the session at each one. Returns every
/// event the session produced, in order.
pub fn replay<P, E, R>(
    provider: &mut P,
    session: &mut GazeSession<E, R>,
    clock: &ManualClock,
    frame_interval: Duration,
) -> Vec<SessionEvent>
where
    P: InputProvider + ?Sized,
    E: GazeEstimator,
    R: RegionRegistry,
{
    let mut events = Vec::new();
    while let Some(input) = provider.next_event() {
        match input {
            InputEvent::Gaze { x, y } => {
                events.extend(session.on_sample(Some(GazePoint::new(x, y)), clock.now()));
                clock.advance(frame_interval);
            }
            InputEvent::NoEstimate => {
                events.extend(session.on_sample(None, clock.now()));
                clock.advance(frame_interval);
            }
            InputEvent::Wait { duration } => {
                let end = clock.elapsed() + duration;
                while clock.elapsed() < end {
                    let step = frame_interval.min(end - clock.elapsed());
                    clock.advance(step);
                    events.extend(session.tick(clock.now()));
                }
            }
        }
    }
    events
}
