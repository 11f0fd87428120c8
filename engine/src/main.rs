//! EYE-Flow engine - headless kiosk demo driven by a simulated user.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use clap::Parser;
use tracing::{info, warn};

use eyeflow_engine::clock::{Clock, SystemClock};
use eyeflow_engine::demo::KioskDemo;
use eyeflow_engine::runtime::{GazeRuntime, RuntimeState};
use eyeflow_engine::simulated::SimulatedEstimator;
use eyeflow_engine::{EngineConfig, GazePoint, GazeSession};

/// How often the demo reacts to session events.
const DEMO_PUMP_INTERVAL: Duration = Duration::from_millis(20);
/// Frame period of the simulated estimator (about 30 fps).
const SIM_FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Parser, Debug)]
#[command(name = "eyeflow-engine", about = "EYE-Flow gaze dwell engine (kiosk demo)")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Viewport resolution (WxH), overrides the config file
    #[arg(long)]
    viewport: Option<String>,

    /// Start the tour without calibrating first
    #[arg(long)]
    skip_calibration: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Event loop tick (ms), overrides the config file
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Parse a `WxH` string such as `1920x1080`.
fn parse_viewport(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("eyeflow-engine {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eyeflow_engine=info".into()),
        )
        .init();

    info!("eyeflow-engine v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(viewport) = &cli.viewport {
        match parse_viewport(viewport) {
            Some((w, h)) => {
                config.calibration.viewport_width = w as f64;
                config.calibration.viewport_height = h as f64;
            }
            None => warn!(
                "Invalid viewport '{}', keeping {}x{}",
                viewport, config.calibration.viewport_width, config.calibration.viewport_height
            ),
        }
    }
    if let Some(seconds) = cli.exit_after {
        config.runtime.exit_after_s = Some(seconds);
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.runtime.tick_ms = tick_ms;
    }
    config.validate()?;
    info!("{}", config.to_sexp());

    let width = config.calibration.viewport_width;
    let height = config.calibration.viewport_height;
    let estimator = SimulatedEstimator::new(GazePoint::new(width / 2.0, height / 2.0), SIM_FRAME_INTERVAL);
    let mut demo = KioskDemo::new(estimator.steer(), width, height, config.hit_test.padding_px);

    let runtime_config = config.runtime.clone();
    let mut session = GazeSession::new(config, estimator, demo.initial_layout());
    demo.attach(&mut session);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut runtime = GazeRuntime::new(session, clock, &runtime_config)?;

    {
        let state = runtime.state_mut();
        if cli.skip_calibration {
            demo.start_tour(&state.session);
        } else {
            let now = state.clock.now();
            state.session.begin_calibration(now)?;
        }
    }

    runtime
        .handle()
        .insert_source(
            Timer::from_duration(DEMO_PUMP_INTERVAL),
            move |_, _, state: &mut RuntimeState<_, _>| {
                let now = state.clock.now();
                if demo.pump(&mut state.session, now) {
                    TimeoutAction::ToDuration(DEMO_PUMP_INTERVAL)
                } else {
                    info!(
                        "Demo finished: route {}, dark mode {}, {} activation(s), {} support call(s)",
                        demo.route(),
                        demo.dark_mode(),
                        demo.activations().len(),
                        demo.support_calls()
                    );
                    state.running = false;
                    TimeoutAction::Drop
                }
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to register demo timer: {}", e.error))?;

    runtime.run()
}
