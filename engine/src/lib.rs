//! EYE-Flow gaze engine: hands-free pointing for public kiosks.
//!
//! A webcam estimator produces noisy gaze frames; the engine smooths them,
//! hit-tests the cursor against host-registered regions, turns sustained
//! fixation into activations and runs the calibration flow that trains the
//! estimator. The binary entry point in `main.rs` drives the kiosk demo on
//! a simulated user.

pub mod calibration;
pub mod clock;
pub mod config;
pub mod demo;
pub mod dwell;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod gaze;
pub mod input_source;
pub mod observers;
pub mod recalibration;
pub mod regions;
pub mod runtime;
pub mod session;
pub mod simulated;
pub mod timers;

pub use config::EngineConfig;
pub use error::{GazeError, Result};
pub use gaze::GazePoint;
pub use session::{GazeSession, SessionEvent};
