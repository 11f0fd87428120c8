//! Single-threaded event loop around a gaze session.
//!
//! Estimator frames arrive over a `calloop` channel (the estimator may push
//! them from its own thread), a repeating timer ticks dwell and calibration
//! deadlines, and SIGINT/SIGTERM stop the loop cleanly. Everything the
//! session does happens on the loop thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use calloop::channel::{self, Event as ChannelEvent};
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::estimator::{GazeEstimator, SampleSink};
use crate::gaze::GazeSample;
use crate::regions::RegionRegistry;
use crate::session::GazeSession;

/// Interval between status log lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Data shared by every event source callback.
pub struct RuntimeState<E, R> {
    pub session: GazeSession<E, R>,
    pub clock: Arc<dyn Clock>,
    pub running: bool,
    /// Frames received from the estimator, with or without an estimate.
    pub frames: u64,
    pub ticks: u64,
}

/// Event loop driving one session.
pub struct GazeRuntime<E: 'static, R: 'static> {
    event_loop: EventLoop<'static, RuntimeState<E, R>>,
    state: RuntimeState<E, R>,
    tick: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<E, R> GazeRuntime<E, R>
where
    E: GazeEstimator + 'static,
    R: RegionRegistry + 'static,
{
    /// Build the loop and start the session's estimator.
    pub fn new(
        mut session: GazeSession<E, R>,
        clock: Arc<dyn Clock>,
        config: &RuntimeConfig,
    ) -> anyhow::Result<Self> {
        let event_loop = EventLoop::<RuntimeState<E, R>>::try_new()?;
        let handle = event_loop.handle();
        let shutdown = Arc::new(AtomicBool::new(false));

        // Estimator frames
        let (sender, frames) = channel::channel::<Option<GazeSample>>();
        handle
            .insert_source(frames, |event, _, state: &mut RuntimeState<E, R>| match event {
                ChannelEvent::Msg(frame) => {
                    state.frames += 1;
                    let now = state.clock.now();
                    state.session.on_sample(frame, now);
                }
                ChannelEvent::Closed => debug!("Estimator channel closed"),
            })
            .map_err(|e| anyhow::anyhow!("failed to register frame channel: {}", e.error))?;

        // Timer tick for dwell and calibration deadlines
        let tick = Duration::from_millis(config.tick_ms.max(1));
        handle
            .insert_source(
                Timer::from_duration(tick),
                move |_, _, state: &mut RuntimeState<E, R>| {
                    state.ticks += 1;
                    let now = state.clock.now();
                    state.session.tick(now);
                    TimeoutAction::ToDuration(tick)
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register tick timer: {}", e.error))?;

        // Signal handling: SIGTERM and SIGINT for graceful shutdown
        if config.handle_signals {
            let signals = Signals::new(&[Signal::SIGTERM, Signal::SIGINT])
                .map_err(|e| anyhow::anyhow!("failed to create signal source: {}", e))?;
            let flag = shutdown.clone();
            handle
                .insert_source(signals, move |event, _, state: &mut RuntimeState<E, R>| {
                    info!("Received signal {:?}, shutting down", event.signal());
                    flag.store(true, Ordering::SeqCst);
                    state.running = false;
                })
                .map_err(|e| anyhow::anyhow!("failed to register signal handler: {}", e.error))?;
        }

        // Periodic status logging
        handle
            .insert_source(
                Timer::from_duration(STATUS_INTERVAL),
                |_, _, state: &mut RuntimeState<E, R>| {
                    info!(
                        "Gaze status: {} frame(s), {}",
                        state.frames,
                        state.session.status_sexp()
                    );
                    TimeoutAction::ToDuration(STATUS_INTERVAL)
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register status timer: {}", e.error))?;

        // Signals are masked on this thread by now, so an estimator thread
        // spawned here inherits the mask
        session.start(SampleSink::from_channel(sender))?;

        let runtime = Self {
            event_loop,
            state: RuntimeState {
                session,
                clock,
                running: true,
                frames: 0,
                ticks: 0,
            },
            tick,
            shutdown,
        };

        if let Some(seconds) = config.exit_after_s {
            info!("Will exit after {} seconds", seconds);
            runtime.exit_after(Duration::from_secs(seconds))?;
        }
        Ok(runtime)
    }

    /// Stop the loop once `duration` has passed.
    pub fn exit_after(&self, duration: Duration) -> anyhow::Result<()> {
        self.event_loop
            .handle()
            .insert_source(
                Timer::from_duration(duration),
                |_, _, state: &mut RuntimeState<E, R>| {
                    info!("Exit timer fired");
                    state.running = false;
                    TimeoutAction::Drop
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register exit timer: {}", e.error))?;
        Ok(())
    }

    /// Handle for inserting additional event sources.
    pub fn handle(&self) -> LoopHandle<'static, RuntimeState<E, R>> {
        self.event_loop.handle()
    }

    /// Flag that stops the loop when set, from any thread.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> &RuntimeState<E, R> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RuntimeState<E, R> {
        &mut self.state
    }

    /// Process whatever is ready, waiting at most `timeout`.
    pub fn dispatch_once(&mut self, timeout: Duration) -> anyhow::Result<()> {
        self.event_loop.dispatch(Some(timeout), &mut self.state)?;
        Ok(())
    }

    /// Run until the exit timer, a signal or the shutdown flag stops the loop,
    /// then stop the session.
    pub fn run(&mut self) -> anyhow::Result<()> {
        info!(
            "Gaze runtime initialized (tick: {}ms), entering event loop",
            self.tick.as_millis()
        );

        while self.state.running {
            if self.shutdown.load(Ordering::SeqCst) {
                self.state.running = false;
                break;
            }
            self.event_loop.dispatch(Some(self.tick), &mut self.state)?;
        }

        self.state.session.stop();
        info!(
            "Gaze runtime shutting down ({} frame(s), {} tick(s))",
            self.state.frames, self.state.ticks
        );
        Ok(())
    }

    /// Take the session back, e.g. to inspect it after `run`.
    pub fn into_session(self) -> GazeSession<E, R> {
        self.state.session
    }
}
