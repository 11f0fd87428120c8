//! Event loop tests with a real `calloop` loop and a threaded estimator.
//!
//! Signals are left alone so the test harness keeps its own handlers.

use eyeflow_engine::clock::{Clock, SystemClock};
use eyeflow_engine::config::{EngineConfig, RuntimeConfig};
use eyeflow_engine::gaze::GazePoint;
use eyeflow_engine::regions::{Rect, RegionMap};
use eyeflow_engine::runtime::{GazeRuntime, RuntimeState};
use eyeflow_engine::session::{GazeSession, SessionEvent};
use eyeflow_engine::simulated::SimulatedEstimator;

use calloop::timer::{TimeoutAction, Timer};

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

type SimRuntime = GazeRuntime<SimulatedEstimator, RegionMap>;

fn runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        tick_ms: 5,
        exit_after_s: None,
        handle_signals: false,
    }
}

/// A short dwell on one big button the simulated user is already looking at.
fn runtime() -> SimRuntime {
    let mut config = EngineConfig::default();
    config.dwell.dwell_ms = 200;
    config.runtime = runtime_config();

    let mut regions = RegionMap::new();
    regions.register("big-button", Rect::new(700.0, 300.0, 1200.0, 800.0));
    let estimator = SimulatedEstimator::new(GazePoint::new(960.0, 540.0), Duration::from_millis(5));
    let session = GazeSession::new(config.clone(), estimator, regions);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    GazeRuntime::new(session, clock, &config.runtime).unwrap()
}

// ── Loop lifecycle ──────────────────────────────────────────

#[test]
fn test_runtime_starts_session() {
    let runtime = runtime();
    assert!(runtime.state().session.is_started());
    assert!(runtime.state().session.estimator().is_running());
    assert!(runtime.state().running);
}

#[test]
fn test_exit_timer_stops_loop_and_session() {
    let mut runtime = runtime();
    runtime.exit_after(Duration::from_millis(300)).unwrap();

    let started = Instant::now();
    runtime.run().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(!runtime.state().running);
    assert!(runtime.state().frames > 0);
    assert!(runtime.state().ticks > 0);

    let session = runtime.into_session();
    assert!(!session.is_started());
    assert!(!session.estimator().is_running());
}

#[test]
fn test_shutdown_flag_stops_loop() {
    let mut runtime = runtime();
    let flag = runtime.shutdown_flag();
    let setter = flag.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        setter.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    runtime.run().unwrap();
    assert!(flag.load(Ordering::SeqCst));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!runtime.state().session.is_started());
}

#[test]
fn test_exit_after_from_config() {
    let mut config = EngineConfig::default();
    config.runtime = RuntimeConfig {
        exit_after_s: Some(1),
        ..runtime_config()
    };
    let estimator = SimulatedEstimator::new(GazePoint::new(10.0, 10.0), Duration::from_millis(10));
    let session = GazeSession::new(config.clone(), estimator, RegionMap::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut runtime = GazeRuntime::new(session, clock, &config.runtime).unwrap();

    let started = Instant::now();
    runtime.run().unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(10));
}

// ── Frames and timers through the loop ──────────────────────

#[test]
fn test_dwell_activates_through_loop() {
    let mut runtime = runtime();
    let activated = Rc::new(RefCell::new(Vec::new()));
    let sink = activated.clone();
    runtime.state_mut().session.subscribe("test", move |event| {
        if let SessionEvent::Activated(a) = event {
            sink.borrow_mut().push(a.region_id.clone());
        }
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while activated.borrow().is_empty() && Instant::now() < deadline {
        runtime.dispatch_once(Duration::from_millis(10)).unwrap();
    }

    assert_eq!(activated.borrow().as_slice(), ["big-button"]);
    // Held gaze does not fire again
    let until = Instant::now() + Duration::from_millis(400);
    while Instant::now() < until {
        runtime.dispatch_once(Duration::from_millis(10)).unwrap();
    }
    assert_eq!(activated.borrow().len(), 1);
    assert_eq!(runtime.state().session.focused_region(), None);
}

#[test]
fn test_extra_source_on_handle() {
    let mut runtime = runtime();
    let fired = Rc::new(RefCell::new(0u32));
    let counter = fired.clone();
    runtime
        .handle()
        .insert_source(
            Timer::from_duration(Duration::from_millis(20)),
            move |_, _, state: &mut RuntimeState<SimulatedEstimator, RegionMap>| {
                *counter.borrow_mut() += 1;
                if *counter.borrow() >= 3 {
                    state.running = false;
                    TimeoutAction::Drop
                } else {
                    TimeoutAction::ToDuration(Duration::from_millis(20))
                }
            },
        )
        .unwrap();

    runtime.run().unwrap();
    assert_eq!(*fired.borrow(), 3);
}
