//! Simulated gaze estimator for headless runs and tests.
//!
//! Produces frames from a virtual user whose point of regard can be steered
//! from outside. The output is deterministic: a fixed saccade speed toward
//! the steered target, a calibration bias that shrinks as training samples
//! arrive, and a small sinusoidal jitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::EstimatorError;
use crate::estimator::{GazeEstimator, SampleSink};
use crate::gaze::{GazePoint, GazeSample};

/// Largest distance the virtual eye travels per frame (px).
const SACCADE_STEP_PX: f64 = 120.0;
/// Peak jitter on each axis (px).
const JITTER_PX: f64 = 12.0;
/// Offset of an untrained estimator.
const INITIAL_BIAS: GazePoint = GazePoint::new(40.0, -30.0);
/// Training samples after which half the bias is gone.
const BIAS_HALF_LIFE_SAMPLES: f64 = 20.0;

#[derive(Debug)]
struct SimState {
    /// Where the eye currently points.
    eye: GazePoint,
    /// Where the user wants to look; `None` when looking away from the screen.
    target: Option<GazePoint>,
    blink_frames: u32,
    frame: u64,
    training_samples: u64,
    paused: bool,
}

impl SimState {
    fn new(start: GazePoint) -> Self {
        Self {
            eye: start,
            target: Some(start),
            blink_frames: 0,
            frame: 0,
            training_samples: 0,
            paused: false,
        }
    }

    /// Advance one frame and return its estimate.
    fn step(&mut self) -> Option<GazeSample> {
        self.frame += 1;
        let target = self.target?;

        let dist = self.eye.distance_to(target);
        if dist <= SACCADE_STEP_PX {
            self.eye = target;
        } else {
            let f = SACCADE_STEP_PX / dist;
            self.eye = GazePoint::new(
                self.eye.x + (target.x - self.eye.x) * f,
                self.eye.y + (target.y - self.eye.y) * f,
            );
        }

        if self.blink_frames > 0 {
            self.blink_frames -= 1;
            return None;
        }

        let t = self.frame as f64;
        let decay = 1.0 / (1.0 + self.training_samples as f64 / BIAS_HALF_LIFE_SAMPLES);
        Some(GazePoint::new(
            self.eye.x + INITIAL_BIAS.x * decay + JITTER_PX * (t * 0.9).sin(),
            self.eye.y + INITIAL_BIAS.y * decay + JITTER_PX * (t * 1.3).cos(),
        ))
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for steering the virtual user. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct GazeSteer {
    state: Arc<Mutex<SimState>>,
}

impl GazeSteer {
    /// Start moving the eye toward `(x, y)`.
    pub fn look_at(&self, x: f64, y: f64) {
        lock(&self.state).target = Some(GazePoint::new(x, y));
    }

    /// Turn away from the screen: frames carry no estimate until `look_at`.
    pub fn look_away(&self) {
        lock(&self.state).target = None;
    }

    /// Drop the next `frames` estimates.
    pub fn blink(&self, frames: u32) {
        lock(&self.state).blink_frames = frames;
    }

    /// Current eye position, without jitter or bias.
    pub fn eye(&self) -> GazePoint {
        lock(&self.state).eye
    }
}

/// Estimator backed by a virtual user and a frame thread.
#[derive(Debug)]
pub struct SimulatedEstimator {
    state: Arc<Mutex<SimState>>,
    /// `None` for a manually stepped estimator with no frame thread.
    frame_interval: Option<Duration>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedEstimator {
    /// Virtual user starting at `start`, emitting one frame per `frame_interval`.
    pub fn new(start: GazePoint, frame_interval: Duration) -> Self {
        Self::with_interval(start, Some(frame_interval))
    }

    /// Virtual user without a frame thread; frames come from `next_frame`.
    pub fn manual(start: GazePoint) -> Self {
        Self::with_interval(start, None)
    }

    fn with_interval(start: GazePoint, frame_interval: Option<Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(start))),
            frame_interval,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn steer(&self) -> GazeSteer {
        GazeSteer {
            state: self.state.clone(),
        }
    }

    /// Produce one frame synchronously. Used when no frame thread runs.
    pub fn next_frame(&self) -> Option<GazeSample> {
        lock(&self.state).step()
    }

    pub fn training_samples(&self) -> u64 {
        lock(&self.state).training_samples
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl GazeEstimator for SimulatedEstimator {
    fn begin(&mut self, sink: SampleSink) -> Result<(), EstimatorError> {
        if self.is_running() {
            return Err(EstimatorError::new("simulated estimator already running"));
        }
        self.running.store(true, Ordering::SeqCst);
        let Some(interval) = self.frame_interval else {
            info!("Simulated estimator started (manual frames)");
            return Ok(());
        };

        let state = self.state.clone();
        let running = self.running.clone();
        let worker = std::thread::Builder::new()
            .name("gaze-sim".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let frame = {
                        let mut state = lock(&state);
                        if state.paused {
                            None
                        } else {
                            Some(state.step())
                        }
                    };
                    if let Some(frame) = frame {
                        if !sink.send(frame) {
                            debug!("Simulated estimator: receiver gone, stopping");
                            break;
                        }
                    }
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                EstimatorError::new(format!("failed to spawn frame thread: {e}"))
            })?;

        self.worker = Some(worker);
        info!(
            "Simulated estimator started ({}ms frames)",
            interval.as_millis()
        );
        Ok(())
    }

    fn end(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Simulated estimator frame thread panicked");
            }
        }
        info!("Simulated estimator stopped");
    }

    fn current_prediction(&mut self) -> Option<GazeSample> {
        lock(&self.state).step()
    }

    fn submit_training_sample(&mut self, _x: f64, _y: f64) {
        lock(&self.state).training_samples += 1;
    }

    fn clear_training_data(&mut self) {
        lock(&self.state).training_samples = 0;
    }

    fn pause(&mut self) {
        lock(&self.state).paused = true;
    }

    fn resume(&mut self) {
        lock(&self.state).paused = false;
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl Drop for SimulatedEstimator {
    fn drop(&mut self) {
        self.end();
    }
}
