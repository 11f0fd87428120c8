//! Headless kiosk demo: the EYE-Flow screen layout driven by a simulated
//! user.
//!
//! The demo owns the host side of the contract: it lays out the regions for
//! the current route, reacts to activations (navigation, theme, support,
//! recalibration) and steers the virtual user through a scripted tour.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use tracing::{info, warn};

use crate::calibration::CalibrationEvent;
use crate::estimator::GazeEstimator;
use crate::observers::SubscriptionId;
use crate::regions::{Rect, RegionMap, RegionRegistry, TrackableRegion};
use crate::session::{GazeSession, SessionEvent};
use crate::simulated::GazeSteer;

/// Observer owner tag used by the demo.
pub const DEMO_OWNER: &str = "kiosk-demo";

/// Regions visited by the default tour, in order.
pub const DEFAULT_TOUR: &[&str] = &[
    "home-banking",
    "theme-toggle",
    "nav-hospital",
    "back-button",
    "nav-restaurant",
    "nav-settings",
    "recalibrate-button",
    "nav-home",
    "support-button",
];

/// What the kiosk does when a region fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskAction {
    Navigate(&'static str),
    Back,
    ToggleTheme,
    Recalibrate,
    CallSupport,
}

pub fn action_for(region_id: &str) -> Option<KioskAction> {
    let action = match region_id {
        "nav-home" => KioskAction::Navigate("/"),
        "nav-banking" | "home-banking" => KioskAction::Navigate("/banking"),
        "nav-restaurant" | "home-restaurant" => KioskAction::Navigate("/restaurant"),
        "nav-hospital" | "home-hospital" => KioskAction::Navigate("/hospital"),
        "nav-settings" => KioskAction::Navigate("/settings"),
        "back-button" => KioskAction::Back,
        "theme-toggle" => KioskAction::ToggleTheme,
        "recalibrate-button" => KioskAction::Recalibrate,
        "support-button" => KioskAction::CallSupport,
        _ => return None,
    };
    Some(action)
}

// ── Layout ─────────────────────────────────────────────────

/// Regions present on every screen: navigation bar, theme toggle and the
/// overlay buttons.
pub fn chrome_regions(width: f64, height: f64) -> Vec<TrackableRegion> {
    let mut regions = Vec::new();
    let nav = [
        "nav-home",
        "nav-banking",
        "nav-restaurant",
        "nav-hospital",
        "nav-settings",
    ];
    for (i, id) in nav.iter().enumerate() {
        let x = 40.0 + 260.0 * i as f64;
        regions.push(TrackableRegion::new(*id, Rect::from_xywh(x, 30.0, 220.0, 80.0)));
    }
    regions.push(TrackableRegion::new(
        "theme-toggle",
        Rect::from_xywh(width - 140.0, 30.0, 100.0, 80.0),
    ));
    regions.push(TrackableRegion::new(
        "support-button",
        Rect::from_xywh(40.0, height - 130.0, 260.0, 90.0),
    ));
    // Floating overlay sits above page content
    regions.push(
        TrackableRegion::new(
            "recalibrate-button",
            Rect::from_xywh(width - 300.0, height - 130.0, 260.0, 90.0),
        )
        .with_z_index(10),
    );
    regions
}

/// Regions specific to `route`.
pub fn page_regions(route: &str, width: f64, height: f64) -> Vec<TrackableRegion> {
    match route {
        "/" => {
            let card_w = 400.0;
            let gap = (width - 3.0 * card_w) / 4.0;
            ["home-banking", "home-restaurant", "home-hospital"]
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let x = gap + (card_w + gap) * i as f64;
                    TrackableRegion::new(*id, Rect::from_xywh(x, height / 2.0 - 150.0, card_w, 300.0))
                })
                .collect()
        }
        _ => vec![TrackableRegion::new(
            "back-button",
            Rect::from_xywh(width / 2.0 - 150.0, height / 2.0 - 60.0, 300.0, 120.0),
        )],
    }
}

/// Full layout for `route`. Every region gets `padding`.
pub fn kiosk_layout(route: &str, width: f64, height: f64, padding: f64) -> RegionMap {
    let mut map = RegionMap::with_default_padding(padding);
    for region in chrome_regions(width, height)
        .into_iter()
        .chain(page_regions(route, width, height))
    {
        map.insert(region.with_padding(padding));
    }
    map
}

// ── Demo driver ────────────────────────────────────────────

/// Host-side state of the kiosk demo.
pub struct KioskDemo {
    steer: GazeSteer,
    width: f64,
    height: f64,
    padding: f64,
    tour: VecDeque<String>,
    inbox: Rc<RefCell<Vec<SessionEvent>>>,
    route: &'static str,
    history: Vec<&'static str>,
    dark_mode: bool,
    activations: Vec<String>,
    support_calls: u32,
    finished: bool,
}

impl KioskDemo {
    pub fn new(steer: GazeSteer, width: f64, height: f64, padding: f64) -> Self {
        Self {
            steer,
            width,
            height,
            padding,
            tour: DEFAULT_TOUR.iter().map(|s| s.to_string()).collect(),
            inbox: Rc::new(RefCell::new(Vec::new())),
            route: "/",
            history: Vec::new(),
            dark_mode: false,
            activations: Vec::new(),
            support_calls: 0,
            finished: false,
        }
    }

    /// Replace the default tour.
    pub fn with_tour<I, S>(mut self, tour: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tour = tour.into_iter().map(Into::into).collect();
        self
    }

    /// Layout for the starting route.
    pub fn initial_layout(&self) -> RegionMap {
        kiosk_layout(self.route, self.width, self.height, self.padding)
    }

    /// Subscribe to the session's activation and calibration events.
    pub fn attach<E, R>(&self, session: &mut GazeSession<E, R>) -> SubscriptionId
    where
        E: GazeEstimator,
        R: RegionRegistry,
    {
        let inbox = self.inbox.clone();
        session.subscribe(DEMO_OWNER, move |event| {
            if matches!(
                event,
                SessionEvent::Activated(_) | SessionEvent::Calibration(_)
            ) {
                inbox.borrow_mut().push(event.clone());
            }
        })
    }

    /// Look at the first tour stop.
    pub fn start_tour<E: GazeEstimator>(&mut self, session: &GazeSession<E, RegionMap>) {
        info!("Kiosk tour starting ({} stops)", self.tour.len());
        self.look_at_next(session);
    }

    /// React to everything the session reported since the last call.
    ///
    /// Returns false once the tour is over.
    pub fn pump<E: GazeEstimator>(
        &mut self,
        session: &mut GazeSession<E, RegionMap>,
        now: Instant,
    ) -> bool {
        let events: Vec<SessionEvent> = self.inbox.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                SessionEvent::Calibration(CalibrationEvent::TargetPresented { target, .. }) => {
                    self.steer.look_at(target.x, target.y);
                }
                SessionEvent::Calibration(
                    CalibrationEvent::Completed { .. }
                    | CalibrationEvent::Cancelled { .. }
                    | CalibrationEvent::Failed { .. },
                ) => self.look_at_next(session),
                SessionEvent::Activated(activation) => {
                    self.activations.push(activation.region_id.clone());
                    let action = action_for(&activation.region_id);
                    if let Some(action) = action {
                        self.apply(action, session, now);
                    }
                    if action != Some(KioskAction::Recalibrate) {
                        self.look_at_next(session);
                    }
                }
                _ => {}
            }
        }
        !self.finished
    }

    fn apply<E: GazeEstimator>(
        &mut self,
        action: KioskAction,
        session: &mut GazeSession<E, RegionMap>,
        now: Instant,
    ) {
        match action {
            KioskAction::Navigate(route) => self.navigate(route, session),
            KioskAction::Back => {
                let route = self.history.pop().unwrap_or("/");
                self.show(route, session);
            }
            KioskAction::ToggleTheme => {
                self.dark_mode = !self.dark_mode;
                info!("Theme: {}", if self.dark_mode { "dark" } else { "light" });
            }
            KioskAction::CallSupport => {
                self.support_calls += 1;
                info!("Support has been called");
            }
            KioskAction::Recalibrate => {
                if let Err(err) = session.begin_calibration(now) {
                    warn!("Recalibration not started: {}", err);
                    self.look_at_next(session);
                }
            }
        }
    }

    fn navigate<E: GazeEstimator>(
        &mut self,
        route: &'static str,
        session: &mut GazeSession<E, RegionMap>,
    ) {
        if route == self.route {
            return;
        }
        self.history.push(self.route);
        self.show(route, session);
    }

    /// Swap the page regions for `route`'s.
    fn show<E: GazeEstimator>(&mut self, route: &'static str, session: &mut GazeSession<E, RegionMap>) {
        info!("Navigate {} -> {}", self.route, route);
        let regions = session.regions_mut();
        for old in page_regions(self.route, self.width, self.height) {
            regions.unregister(&old.id);
        }
        for new in page_regions(route, self.width, self.height) {
            regions.insert(new.with_padding(self.padding));
        }
        self.route = route;
    }

    fn look_at_next<E: GazeEstimator>(&mut self, session: &GazeSession<E, RegionMap>) {
        while let Some(id) = self.tour.pop_front() {
            if let Some(region) = session.regions().region(&id) {
                let center = region.center();
                self.steer.look_at(center.x, center.y);
                return;
            }
            warn!("Tour stop {} is not on screen at {}, skipping", id, self.route);
        }
        if !self.finished {
            info!(
                "Kiosk tour finished ({} activation(s))",
                self.activations.len()
            );
        }
        self.finished = true;
        self.steer.look_away();
    }

    pub fn route(&self) -> &'static str {
        self.route
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn activations(&self) -> &[String] {
        &self.activations
    }

    pub fn support_calls(&self) -> u32 {
        self.support_calls
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
