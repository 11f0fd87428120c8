//! End-to-end tests of the gaze pipeline on a manual clock.
//!
//! Frames go through filter, hit-test and dwell exactly as they would in
//! the event loop, but time only moves when the test says so.

use eyeflow_engine::clock::{Clock, ManualClock};
use eyeflow_engine::config::EngineConfig;
use eyeflow_engine::estimator::{RecordingEstimator, SampleSink};
use eyeflow_engine::gaze::GazePoint;
use eyeflow_engine::hit_test::TieBreak;
use eyeflow_engine::input_source::{replay, InputEvent, RecordingProvider, ScriptedInputProvider};
use eyeflow_engine::regions::{Rect, RegionMap};
use eyeflow_engine::session::{GazeSession, SessionEvent};

use std::time::{Duration, Instant};

type TestSession = GazeSession<RecordingEstimator, RegionMap>;

const FRAME: Duration = Duration::from_millis(10);

/// Two buttons 30px apart, so their padded boxes overlap by 10px.
fn session_with(config: EngineConfig) -> TestSession {
    let mut regions = RegionMap::new();
    regions.register("button-a", Rect::new(100.0, 100.0, 300.0, 200.0));
    regions.register("button-b", Rect::new(330.0, 100.0, 530.0, 200.0));
    let mut session = GazeSession::new(config, RecordingEstimator::new(), regions);
    session.start(SampleSink::discard()).unwrap();
    session
}

fn session() -> TestSession {
    session_with(EngineConfig::default())
}

fn activations(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Activated(a) => Some(a.region_id.clone()),
            _ => None,
        })
        .collect()
}

fn focus_changes(events: &[SessionEvent]) -> Vec<Option<String>> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FocusChanged { region_id, .. } => Some(region_id.clone()),
            _ => None,
        })
        .collect()
}

// ── Dwell completion ────────────────────────────────────────

#[test]
fn test_activation_fires_once_within_one_tick() {
    let clock = ManualClock::new();
    let mut session = session();

    let t0 = clock.now();
    let events = session.on_sample(Some(GazePoint::new(200.0, 150.0)), t0);
    assert_eq!(focus_changes(&events), vec![Some("button-a".to_string())]);

    let mut fired: Vec<(String, Duration)> = Vec::new();
    for _ in 0..150 {
        clock.advance(FRAME);
        let now = clock.now();
        for id in activations(&session.tick(now)) {
            fired.push((id, now - t0));
        }
    }

    assert_eq!(fired.len(), 1);
    let (id, at) = &fired[0];
    assert_eq!(id, "button-a");
    assert!(*at >= Duration::from_millis(1000));
    assert!(*at < Duration::from_millis(1000) + FRAME);
}

#[test]
fn test_activation_submits_region_center() {
    let clock = ManualClock::new();
    let mut session = session();
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(210.0, 160.0, 120));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    let activated: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Activated(a) => Some(a.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(activated.len(), 1);
    assert_eq!(activated[0].feedback_point, Some(GazePoint::new(200.0, 150.0)));
    assert!(activated[0].dwell_ms >= 1000);
    assert_eq!(
        session.estimator().training_samples(),
        &[GazePoint::new(200.0, 150.0)]
    );
}

#[test]
fn test_feedback_disabled_submits_nothing() {
    let mut config = EngineConfig::default();
    config.recalibration.enabled = false;
    let clock = ManualClock::new();
    let mut session = session_with(config);
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(200.0, 150.0, 120));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert_eq!(activations(&events), vec!["button-a".to_string()]);
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Activated(a) if a.feedback_point.is_none()
    )));
    assert!(session.estimator().training_samples().is_empty());
}

#[test]
fn test_progress_is_monotonic_while_dwelling() {
    let clock = ManualClock::new();
    let mut session = session();
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(200.0, 150.0, 110));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::DwellProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(progress.len() >= 15);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
}

// ── Dwell cancellation ──────────────────────────────────────

#[test]
fn test_focus_change_cancels_dwell() {
    let clock = ManualClock::new();
    let mut session = session();

    let mut script = InputEvent::fixation(200.0, 150.0, 50);
    // Off every region, then back for less than the dwell time
    script.extend(InputEvent::fixation(200.0, 400.0, 10));
    script.extend(InputEvent::fixation(200.0, 150.0, 60));
    let mut provider = ScriptedInputProvider::new(script);

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert!(activations(&events).is_empty());
    assert!(focus_changes(&events).contains(&None));
    // Progress restarted from scratch when focus came back
    assert!(session.dwell_progress() < 70.0);
}

#[test]
fn test_leaving_resets_progress() {
    let clock = ManualClock::new();
    let mut session = session();
    let mut script = InputEvent::fixation(200.0, 150.0, 50);
    script.extend(InputEvent::fixation(200.0, 400.0, 5));
    let mut provider = ScriptedInputProvider::new(script);

    replay(&mut provider, &mut session, &clock, FRAME);

    assert_eq!(session.focused_region(), None);
    assert_eq!(session.dwell_progress(), 0.0);

    let events = replay(
        &mut ScriptedInputProvider::new(vec![InputEvent::Wait {
            duration: Duration::from_secs(2),
        }]),
        &mut session,
        &clock,
        FRAME,
    );
    assert!(activations(&events).is_empty());
}

// ── No double fire ──────────────────────────────────────────

#[test]
fn test_rapid_switch_fires_only_second_region() {
    let clock = ManualClock::new();
    let mut session = session();

    let mut script = vec![InputEvent::Gaze { x: 200.0, y: 150.0 }];
    script.extend(InputEvent::fixation(450.0, 150.0, 150));
    let mut provider = RecordingProvider::new(ScriptedInputProvider::new(script));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert_eq!(activations(&events), vec!["button-b".to_string()]);
    assert_eq!(
        focus_changes(&events),
        vec![Some("button-a".to_string()), Some("button-b".to_string())]
    );
    assert_eq!(provider.recorded().len(), 151);
}

#[test]
fn test_held_gaze_activates_once() {
    let clock = ManualClock::new();
    let mut session = session();
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(200.0, 150.0, 400));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert_eq!(activations(&events), vec!["button-a".to_string()]);
}

// ── Filter and hit-test in the pipeline ─────────────────────

#[test]
fn test_outlier_frame_is_ignored() {
    let clock = ManualClock::new();
    let mut session = session();

    let mut script = InputEvent::fixation(200.0, 150.0, 40);
    script.push(InputEvent::Gaze { x: 1500.0, y: 900.0 });
    script.push(InputEvent::NoEstimate);
    script.extend(InputEvent::fixation(200.0, 150.0, 70));
    let mut provider = ScriptedInputProvider::new(script);

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    // Neither the spike nor the empty frame broke the dwell
    assert_eq!(focus_changes(&events), vec![Some("button-a".to_string())]);
    assert_eq!(activations(&events), vec!["button-a".to_string()]);
}

#[test]
fn test_padding_extends_target() {
    let clock = ManualClock::new();
    let mut session = session();
    // 15px left of button-a's box, inside its 20px padding
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(85.0, 150.0, 110));

    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert_eq!(activations(&events), vec!["button-a".to_string()]);
}

#[test]
fn test_overlapping_padding_tie_break() {
    let mut config = EngineConfig::default();
    config.hit_test.tie_break = TieBreak::FirstInOrder;
    let clock = ManualClock::new();
    let mut session = session_with(config);
    // Gap between the buttons: inside both padded boxes
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(315.0, 150.0, 5));

    replay(&mut provider, &mut session, &clock, FRAME);
    assert_eq!(session.focused_region(), Some("button-a"));

    let clock = ManualClock::new();
    let mut session = crate::session();
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(315.0, 150.0, 5));
    replay(&mut provider, &mut session, &clock, FRAME);
    assert_eq!(session.focused_region(), Some("button-b"));
}

#[test]
fn test_region_moved_under_gaze() {
    let clock = ManualClock::new();
    let mut session = session();
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(200.0, 150.0, 30));
    replay(&mut provider, &mut session, &clock, FRAME);
    assert_eq!(session.focused_region(), Some("button-a"));

    session
        .regions_mut()
        .update_rect("button-a", Rect::new(700.0, 700.0, 800.0, 800.0));
    let mut provider = ScriptedInputProvider::new(InputEvent::fixation(200.0, 150.0, 150));
    let events = replay(&mut provider, &mut session, &clock, FRAME);

    assert!(activations(&events).is_empty());
    assert_eq!(session.focused_region(), None);
}

#[test]
fn test_independent_sessions() {
    let clock = ManualClock::new();
    let mut first = session();
    let mut second = session();

    let now: Instant = clock.now();
    first.on_sample(Some(GazePoint::new(200.0, 150.0)), now);
    second.on_sample(Some(GazePoint::new(450.0, 150.0)), now);

    assert_eq!(first.focused_region(), Some("button-a"));
    assert_eq!(second.focused_region(), Some("button-b"));
}
