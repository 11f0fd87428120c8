//! Boundary to the external gaze estimator.
//!
//! The estimator turns camera frames into screen-coordinate guesses. The
//! engine never looks inside it: it subscribes to a stream of frames, polls
//! the current prediction during calibration, and feeds back training
//! samples.

use std::collections::VecDeque;
use std::fmt;

use crate::error::EstimatorError;
use crate::gaze::{GazePoint, GazeSample};

/// Where an estimator delivers its frames. `None` is a frame with no
/// estimate (blink, face lost).
///
/// The sink is `Send` so an estimator may push from its own capture thread.
pub struct SampleSink {
    deliver: Box<dyn Fn(Option<GazeSample>) -> bool + Send>,
}

impl SampleSink {
    /// Wrap a delivery function. It returns false once the receiver is gone.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(Option<GazeSample>) -> bool + Send + 'static,
    {
        Self {
            deliver: Box::new(deliver),
        }
    }

    /// Sink feeding a `calloop` channel.
    pub fn from_channel(sender: calloop::channel::Sender<Option<GazeSample>>) -> Self {
        Self::new(move |frame| sender.send(frame).is_ok())
    }

    /// Sink that drops everything.
    pub fn discard() -> Self {
        Self::new(|_| true)
    }

    /// Deliver one frame. Returns false if the receiving side has gone away.
    pub fn send(&self, frame: Option<GazeSample>) -> bool {
        (self.deliver)(frame)
    }
}

impl fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SampleSink")
    }
}

/// External predictor the session drives.
pub trait GazeEstimator {
    /// Start producing frames into `sink`. Failure is fatal for the session.
    fn begin(&mut self, sink: SampleSink) -> Result<(), EstimatorError>;

    /// Stop producing frames and release the sink.
    fn end(&mut self);

    /// Latest raw prediction, polled during calibration.
    fn current_prediction(&mut self) -> Option<GazeSample>;

    /// Teach the model that the user was looking at `(x, y)`.
    fn submit_training_sample(&mut self, x: f64, y: f64);

    /// Forget everything learned so far.
    fn clear_training_data(&mut self);

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    fn name(&self) -> &str {
        "estimator"
    }
}

// ── Recording estimator ────────────────────────────────────

/// In-process estimator that records what the engine asks of it.
///
/// Predictions come from a queue, then from a fixed fallback. Frames are
/// pushed by hand with `push_frame`. Used by tests and by hosts wiring a
/// session before the real estimator is available.
#[derive(Debug, Default)]
pub struct RecordingEstimator {
    fail_with: Option<String>,
    sink: Option<SampleSink>,
    queued: VecDeque<Option<GazeSample>>,
    fixed: Option<GazeSample>,
    training: Vec<GazePoint>,
    clears: u32,
    begun: bool,
    paused: bool,
}

impl RecordingEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimator whose `begin` fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Queue predictions returned by the next polls, in order.
    pub fn queue_predictions<I>(&mut self, predictions: I)
    where
        I: IntoIterator<Item = Option<GazeSample>>,
    {
        self.queued.extend(predictions);
    }

    /// Prediction returned once the queue is empty.
    pub fn set_fixed_prediction(&mut self, prediction: Option<GazeSample>) {
        self.fixed = prediction;
    }

    /// Push a frame through the sink given to `begin`.
    pub fn push_frame(&self, frame: Option<GazeSample>) -> bool {
        match &self.sink {
            Some(sink) => sink.send(frame),
            None => false,
        }
    }

    /// Training samples received since the last clear.
    pub fn training_samples(&self) -> &[GazePoint] {
        &self.training
    }

    pub fn clear_count(&self) -> u32 {
        self.clears
    }

    pub fn is_running(&self) -> bool {
        self.begun
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl GazeEstimator for RecordingEstimator {
    fn begin(&mut self, sink: SampleSink) -> Result<(), EstimatorError> {
        if let Some(message) = &self.fail_with {
            return Err(EstimatorError::new(message.clone()));
        }
        self.sink = Some(sink);
        self.begun = true;
        Ok(())
    }

    fn end(&mut self) {
        self.sink = None;
        self.begun = false;
    }

    fn current_prediction(&mut self) -> Option<GazeSample> {
        match self.queued.pop_front() {
            Some(prediction) => prediction,
            None => self.fixed,
        }
    }

    fn submit_training_sample(&mut self, x: f64, y: f64) {
        self.training.push(GazePoint::new(x, y));
    }

    fn clear_training_data(&mut self) {
        self.training.clear();
        self.clears += 1;
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn name(&self) -> &str {
        "recording"
    }
}
