//! Full-stack tests: calibration and the kiosk tour on a simulated user.
//!
//! The simulated estimator is stepped by hand and time comes from a
//! `ManualClock`, so every run takes the same path.

use eyeflow_engine::calibration::{CalibrationEvent, CalibrationOutcome};
use eyeflow_engine::clock::{Clock, ManualClock};
use eyeflow_engine::config::EngineConfig;
use eyeflow_engine::demo::{KioskDemo, DEFAULT_TOUR};
use eyeflow_engine::estimator::SampleSink;
use eyeflow_engine::gaze::GazePoint;
use eyeflow_engine::regions::RegionMap;
use eyeflow_engine::session::{GazeSession, SessionEvent};
use eyeflow_engine::simulated::SimulatedEstimator;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

type SimSession = GazeSession<SimulatedEstimator, RegionMap>;

const WIDTH: f64 = 1920.0;
const HEIGHT: f64 = 1080.0;
const STEP: Duration = Duration::from_millis(10);
/// One estimator frame every other step.
const FRAME_EVERY: u32 = 2;

fn setup() -> (SimSession, KioskDemo) {
    let config = EngineConfig::default();
    let estimator = SimulatedEstimator::manual(GazePoint::new(WIDTH / 2.0, HEIGHT / 2.0));
    let demo = KioskDemo::new(estimator.steer(), WIDTH, HEIGHT, config.hit_test.padding_px);
    let mut session = GazeSession::new(config, estimator, demo.initial_layout());
    demo.attach(&mut session);
    session.start(SampleSink::discard()).unwrap();
    (session, demo)
}

/// Step the world until the demo finishes or `limit` passes.
/// Returns every session event.
fn run(
    session: &mut SimSession,
    demo: &mut KioskDemo,
    clock: &ManualClock,
    limit: Duration,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let mut step = 0u32;
    while clock.elapsed() < limit {
        clock.advance(STEP);
        step += 1;
        let now = clock.now();
        if step % FRAME_EVERY == 0 {
            let frame = session.estimator().next_frame();
            events.extend(session.on_sample(frame, now));
        }
        events.extend(session.tick(now));
        if !demo.pump(session, now) {
            break;
        }
    }
    events
}

fn calibration_events(events: &[SessionEvent]) -> Vec<&CalibrationEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Calibration(c) => Some(c),
            _ => None,
        })
        .collect()
}

// ── Calibration ─────────────────────────────────────────────

#[test]
fn test_calibration_with_simulated_user() {
    let clock = ManualClock::new();
    let (mut session, demo) = setup();
    // Nothing to visit afterwards: the run ends with calibration
    let mut demo = demo.with_tour(Vec::<String>::new());

    let mut events = session.begin_calibration(clock.now()).unwrap();
    events.extend(run(&mut session, &mut demo, &clock, Duration::from_secs(60)));

    let calibration = calibration_events(&events);
    let presented = calibration
        .iter()
        .filter(|e| matches!(e, CalibrationEvent::TargetPresented { .. }))
        .count();
    let accepted = calibration
        .iter()
        .filter(|e| matches!(e, CalibrationEvent::TargetAccepted { .. }))
        .count();
    assert_eq!(presented, 9);
    assert_eq!(accepted, 9);
    assert!(matches!(
        calibration.last(),
        Some(CalibrationEvent::Completed { targets: 9 })
    ));

    assert!(session.is_calibrated());
    assert_eq!(session.last_calibration(), Some(CalibrationOutcome::Completed));
    // 20 training samples per target
    assert_eq!(session.estimator().training_samples(), 180);
    assert!(demo.is_finished());
}

#[test]
fn test_cancelled_calibration_leaves_session_uncalibrated() {
    let clock = ManualClock::new();
    let (mut session, _demo) = setup();

    session.begin_calibration(clock.now()).unwrap();
    clock.advance_ms(800);
    session.tick(clock.now());
    let events = session.complete_or_cancel_calibration();

    assert!(matches!(
        events.as_slice(),
        [SessionEvent::Calibration(CalibrationEvent::Cancelled { target_id: Some(0) })]
    ));
    assert!(!session.is_calibrating());
    assert!(!session.is_calibrated());
    assert_eq!(session.last_calibration(), Some(CalibrationOutcome::Cancelled));

    let submitted = session.estimator().training_samples();
    clock.advance_ms(2000);
    session.tick(clock.now());
    assert_eq!(session.estimator().training_samples(), submitted);
}

// ── Kiosk tour ──────────────────────────────────────────────

#[test]
fn test_full_tour_after_calibration() {
    let clock = ManualClock::new();
    let (mut session, mut demo) = setup();

    session.begin_calibration(clock.now()).unwrap();
    let events = run(&mut session, &mut demo, &clock, Duration::from_secs(120));

    assert!(demo.is_finished(), "tour stalled at {:?}", clock.elapsed());
    let expected: Vec<String> = DEFAULT_TOUR.iter().map(|s| s.to_string()).collect();
    assert_eq!(demo.activations(), expected.as_slice());
    assert_eq!(demo.route(), "/");
    assert!(demo.dark_mode());
    assert_eq!(demo.support_calls(), 1);

    // Startup calibration plus the one requested mid-tour
    let completed = calibration_events(&events)
        .iter()
        .filter(|e| matches!(e, CalibrationEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 2);
    assert!(session.is_calibrated());

    // Every activation fed its region center back to the estimator
    let feedback = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Activated(a) if a.feedback_point.is_some()))
        .count();
    assert_eq!(feedback, DEFAULT_TOUR.len());
}

#[test]
fn test_tour_without_calibration() {
    let clock = ManualClock::new();
    let (mut session, demo) = setup();
    let mut demo = demo.with_tour(["nav-banking", "back-button", "theme-toggle"]);

    demo.start_tour(&session);
    run(&mut session, &mut demo, &clock, Duration::from_secs(30));

    assert!(demo.is_finished());
    assert_eq!(demo.activations(), ["nav-banking", "back-button", "theme-toggle"]);
    assert_eq!(demo.route(), "/");
    assert!(demo.dark_mode());
    assert!(!session.is_calibrated());
}

#[test]
fn test_off_screen_tour_stop_is_skipped() {
    let clock = ManualClock::new();
    let (mut session, demo) = setup();
    // back-button only exists off the home screen
    let mut demo = demo.with_tour(["back-button", "support-button"]);

    demo.start_tour(&session);
    run(&mut session, &mut demo, &clock, Duration::from_secs(30));

    assert!(demo.is_finished());
    assert_eq!(demo.activations(), ["support-button"]);
}

#[test]
fn test_stop_drops_demo_subscription() {
    let (mut session, _demo) = setup();
    assert_eq!(session.observer_count(), 1);

    let seen = Rc::new(RefCell::new(0usize));
    let counter = seen.clone();
    session.subscribe("probe", move |_| *counter.borrow_mut() += 1);
    assert_eq!(session.observer_count(), 2);

    session.stop();
    assert_eq!(session.observer_count(), 0);
    assert!(!session.estimator().is_running());

    let clock = ManualClock::new();
    session.on_sample(Some(GazePoint::new(100.0, 70.0)), clock.now());
    let before = *seen.borrow();
    session.on_sample(Some(GazePoint::new(100.0, 70.0)), clock.now());
    assert_eq!(*seen.borrow(), before);
}
