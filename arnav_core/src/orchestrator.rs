//! Orchestrator: one consolidated pass over the four units per tick.
//!
//! ```text
//! TickInput ──► Unit A (regime) ──┬─ INDOOR ──► Unit B (pose) ──┐
//!                                 │                              ▼
//!                                 └──────────────────────► Unit C (guidance)
//!                                                                │
//!                                            INDOOR + catalog ──► Unit D (POIs)
//! ```
//!
//! Every unit call is isolated: a failure or panic in one unit becomes that
//! unit's `Failed` outcome and never prevents the others from running.
//! The orchestrator owns the last accepted indoor pose and feeds it back to
//! Unit B on the next tick.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arnav_env::{EnvError, NavContext, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::IntelligenceConfig;
use crate::geometry::{haversine_distance, planar_distance};
use crate::guidance::{
    ActionGuidance, CurrentPose, GuidanceGenerator, GuidanceInput, Route, RoutePoint, StructuralHint,
    StructuralKind,
};
use crate::poi::{FloorPoint, Poi, PoiCategory, PoiInput, PoiRecognition, PoiRecognizer, UserGoal, ZoneRef};
use crate::pose::{IndoorMap, IndoorPose, Landmark, PoseEstimator, PoseInput, VpsFix};
use crate::regime::{Regime, RegimeClassifier, RegimeInput, RegimeResult};
use crate::types::{CameraFrame, Geofence, InertialSample, LocationFix, TimestampMs, UnitOutcome};

// ============================================================================
// TICK I/O
// ============================================================================

/// Everything the host supplies for one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickInput {
    pub fix: LocationFix,

    #[serde(default)]
    pub geofences: Vec<Geofence>,

    #[serde(default)]
    pub camera: Option<CameraFrame>,

    #[serde(default)]
    pub inertial: Option<InertialSample>,

    #[serde(default)]
    pub route: Option<Route>,

    /// POI catalog; Unit D is skipped without one
    #[serde(default)]
    pub pois: Option<Vec<Poi>>,

    #[serde(default)]
    pub indoor_map: Option<IndoorMap>,

    #[serde(default)]
    pub landmarks: Vec<Landmark>,

    #[serde(default)]
    pub vps: Option<VpsFix>,

    #[serde(default)]
    pub goal: Option<UserGoal>,

    #[serde(default)]
    pub top_k: Option<usize>,
}

impl TickInput {
    /// Input carrying only a location fix.
    pub fn new(fix: LocationFix) -> Self {
        Self {
            fix,
            geofences: Vec::new(),
            camera: None,
            inertial: None,
            route: None,
            pois: None,
            indoor_map: None,
            landmarks: Vec::new(),
            vps: None,
            goal: None,
            top_k: None,
        }
    }
}

/// Consolidated result of one tick.
///
/// `pose` and `poi` are `None` when the unit was not run this tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickOutput {
    pub session: SessionId,
    pub tick: u64,

    /// Wall-clock stamp, Unix milliseconds
    pub timestamp_ms: u64,

    /// Session monotonic clock, milliseconds
    pub monotonic_ms: TimestampMs,

    pub regime: UnitOutcome<RegimeResult>,
    pub pose: Option<UnitOutcome<IndoorPose>>,
    pub guidance: UnitOutcome<ActionGuidance>,
    pub poi: Option<UnitOutcome<PoiRecognition>>,
}

impl TickOutput {
    pub fn is_indoor(&self) -> bool {
        self.regime.value().map_or(false, |r| r.regime == Regime::Indoor)
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run a unit call, turning a panic into a failed outcome.
pub fn isolate<T>(unit: &'static str, call: impl FnOnce() -> UnitOutcome<T>) -> UnitOutcome<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(unit, %message, "Unit faulted; reporting failure");
            UnitOutcome::failed(format!("unexpected fault in {unit}: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Whether a fresh estimate may replace the last accepted pose.
pub fn should_accept_pose(last: Option<&IndoorPose>, candidate: &IndoorPose, min_confidence: f64) -> bool {
    candidate.confidence >= min_confidence && last.map_or(true, |l| candidate.timestamp_ms >= l.timestamp_ms)
}

fn structural_kind(category: PoiCategory) -> Option<StructuralKind> {
    match category {
        PoiCategory::Escalator => Some(StructuralKind::Escalator),
        PoiCategory::Elevator => Some(StructuralKind::Elevator),
        PoiCategory::Stairs => Some(StructuralKind::Stairs),
        PoiCategory::Exit => Some(StructuralKind::Exit),
        PoiCategory::Entrance => Some(StructuralKind::Entrance),
        _ => None,
    }
}

/// The four units plus the state carried between ticks.
///
/// Synchronous; the `Orchestrator` wraps it for sharing with the loop task.
pub struct Pipeline {
    config: IntelligenceConfig,
    regime: RegimeClassifier,
    pose: PoseEstimator,
    guidance: GuidanceGenerator,
    poi: PoiRecognizer,
    last_pose: Option<IndoorPose>,
    tick_count: u64,
}

impl Pipeline {
    pub fn new(config: IntelligenceConfig) -> Self {
        Self {
            regime: RegimeClassifier::new(config.regime.clone()),
            pose: PoseEstimator::new(config.pose.clone()),
            guidance: GuidanceGenerator::new(config.guidance.clone()),
            poi: PoiRecognizer::new(config.poi.clone()),
            last_pose: None,
            tick_count: 0,
            config,
        }
    }

    pub fn config(&self) -> &IntelligenceConfig {
        &self.config
    }

    pub fn last_pose(&self) -> Option<&IndoorPose> {
        self.last_pose.as_ref()
    }

    pub fn current_regime(&self) -> Regime {
        self.regime.current_regime()
    }

    pub fn initialize(&mut self) {
        self.regime.initialize();
        self.pose.initialize();
        self.guidance.initialize();
        self.last_pose = None;
        self.tick_count = 0;
    }

    pub fn cleanup(&mut self) {
        self.regime.cleanup();
        self.pose.cleanup();
        self.guidance.cleanup();
        self.last_pose = None;
    }

    /// One full pass over the units.
    pub fn run(&mut self, input: &TickInput, now_ms: TimestampMs, epoch_ms: u64, session: SessionId) -> TickOutput {
        let tick = self.tick_count;
        self.tick_count += 1;

        // Unit A
        let regime_input = RegimeInput {
            fix: &input.fix,
            geofences: &input.geofences,
            camera: input.camera.as_ref(),
            inertial: input.inertial.as_ref(),
        };
        let regime = isolate("regime", || self.regime.tick(&regime_input, now_ms));
        let is_indoor = regime.value().map_or(false, |r| r.regime == Regime::Indoor);

        // Unit B, indoors only
        let pose = if is_indoor {
            let pose_input = PoseInput {
                camera: input.camera.as_ref(),
                inertial: input.inertial.as_ref(),
                map: input.indoor_map.as_ref(),
                landmarks: &input.landmarks,
                vps: input.vps.as_ref(),
                last_pose: self.last_pose.as_ref(),
            };
            let outcome = isolate("pose", || self.pose.tick(&pose_input, now_ms));
            if let Some(p) = outcome.value() {
                if should_accept_pose(self.last_pose.as_ref(), p, self.config.pose.min_accept_confidence) {
                    self.last_pose = Some(p.clone());
                } else {
                    debug!(confidence = p.confidence, "Pose estimate not adopted");
                }
            }
            Some(outcome)
        } else {
            None
        };

        // Indoor guidance uses this tick's estimate, falling back to the last accepted one
        let indoor_pose = pose
            .as_ref()
            .and_then(|o| o.value())
            .or(if is_indoor { self.last_pose.as_ref() } else { None })
            .cloned();

        let current = match &indoor_pose {
            Some(p) => CurrentPose::Indoor {
                position: p.position,
                floor: p.floor,
                heading_deg: p.heading_deg,
            },
            None => CurrentPose::Outdoor {
                position: input.fix.position,
                heading_deg: input.fix.heading_deg,
            },
        };

        // Unit C, always
        let hints = self.structural_hints(input, regime.value(), indoor_pose.as_ref());
        let empty_route = Route::default();
        let guidance_input = GuidanceInput {
            route: input.route.as_ref().unwrap_or(&empty_route),
            pose: &current,
            is_indoor,
            hints: &hints,
        };
        let guidance = isolate("guidance", || self.guidance.tick(&guidance_input));

        // Unit D, indoors with a catalog
        let poi = match (&input.pois, is_indoor) {
            (Some(catalog), true) => {
                let zone = indoor_pose.as_ref().and_then(|p| {
                    p.zone_id.as_ref().map(|id| ZoneRef {
                        id: id.clone(),
                        floor: p.floor,
                    })
                });
                let poi_input = PoiInput {
                    camera: input.camera.as_ref(),
                    catalog,
                    goal: input.goal.as_ref(),
                    zone: zone.as_ref(),
                    pose: indoor_pose
                        .as_ref()
                        .map(|p| FloorPoint::new(p.position.x, p.position.y, p.floor)),
                    route: input.route.as_ref(),
                    route_step: guidance.value().map_or(0, |g| g.step_index),
                    top_k: input.top_k,
                };
                Some(isolate("poi", || self.poi.tick(&poi_input)))
            }
            _ => None,
        };

        let output = TickOutput {
            session,
            tick,
            timestamp_ms: epoch_ms,
            monotonic_ms: now_ms,
            regime,
            pose,
            guidance,
            poi,
        };

        debug!(
            tick,
            indoor = is_indoor,
            regime_ok = output.regime.is_ok(),
            guidance_ok = output.guidance.is_ok(),
            "Tick complete"
        );
        output
    }

    /// Structural features near the user, derived from the catalog
    /// (indoors) or Unit A's entry point (outdoors).
    fn structural_hints(
        &self,
        input: &TickInput,
        regime: Option<&RegimeResult>,
        indoor_pose: Option<&IndoorPose>,
    ) -> Vec<StructuralHint> {
        if let Some(pose) = indoor_pose {
            let Some(catalog) = &input.pois else {
                return Vec::new();
            };
            // Floor the user is heading for, when the goal names a POI
            let goal_floor = input
                .goal
                .as_ref()
                .and_then(|g| g.target_poi_id.as_deref())
                .and_then(|id| catalog.iter().find(|p| p.id == id))
                .map(|p| p.position.floor);
            let radius = self.config.tick_loop.structural_hint_radius_m;

            return catalog
                .iter()
                .filter(|poi| poi.position.floor == pose.floor)
                .filter_map(|poi| {
                    let kind = structural_kind(poi.category)?;
                    let floor_change = matches!(
                        kind,
                        StructuralKind::Escalator | StructuralKind::Elevator | StructuralKind::Stairs
                    );
                    // Floor changes need a goal on another floor
                    if floor_change && goal_floor.map_or(true, |f| f == pose.floor) {
                        return None;
                    }
                    let position = poi.position.planar();
                    let distance_m = planar_distance(pose.position, position);
                    (distance_m <= radius).then(|| StructuralHint {
                        kind,
                        position: RoutePoint::Planar(position),
                        floor: goal_floor,
                        distance_m,
                    })
                })
                .collect();
        }

        let Some(entry_id) = regime.and_then(|r| r.entry_point_id.as_deref()) else {
            return Vec::new();
        };
        input
            .geofences
            .iter()
            .flat_map(|g| g.entry_points.iter())
            .find(|e| e.id == entry_id)
            .map(|e| StructuralHint {
                kind: StructuralKind::Entrance,
                position: RoutePoint::Geo(e.position),
                floor: None,
                distance_m: haversine_distance(input.fix.position, e.position),
            })
            .into_iter()
            .collect()
    }
}

// ============================================================================
// INPUT SOURCE
// ============================================================================

/// Supplies tick inputs to the self-scheduling loop. `None` ends the loop.
pub trait InputSource: Send + 'static {
    fn next_input(&mut self) -> Option<TickInput>;
}

impl<F> InputSource for F
where
    F: FnMut() -> Option<TickInput> + Send + 'static,
{
    fn next_input(&mut self) -> Option<TickInput> {
        self()
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

struct LoopHandle {
    stop: watch::Sender<bool>,
    running: Arc<AtomicBool>,
}

/// Session-level façade over the pipeline.
pub struct Orchestrator<Ctx: NavContext> {
    session: SessionId,
    context: Arc<Ctx>,
    pipeline: Arc<Mutex<Pipeline>>,
    active_loop: Option<LoopHandle>,
}

impl<Ctx: NavContext> Orchestrator<Ctx> {
    pub fn new(context: Arc<Ctx>, config: IntelligenceConfig) -> Self {
        Self {
            session: SessionId::new(),
            context,
            pipeline: Arc::new(Mutex::new(Pipeline::new(config))),
            active_loop: None,
        }
    }

    pub fn with_defaults(context: Arc<Ctx>) -> Self {
        Self::new(context, IntelligenceConfig::default())
    }

    /// Use a caller-chosen session id, e.g. one derived from a replay seed.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset every unit to its initial state.
    pub fn initialize(&mut self) {
        self.lock().initialize();
        info!(session = %self.session, "Intelligence layer initialized");
    }

    /// Run one synchronous pass.
    pub fn tick(&self, input: &TickInput) -> TickOutput {
        let now_ms = self.context.now_ms();
        let epoch_ms = self.context.epoch_ms();
        self.lock().run(input, now_ms, epoch_ms, self.session)
    }

    pub fn last_pose(&self) -> Option<IndoorPose> {
        self.lock().last_pose().cloned()
    }

    pub fn current_regime(&self) -> Regime {
        self.lock().current_regime()
    }

    /// True while a loop task is alive.
    pub fn is_running(&self) -> bool {
        self.active_loop
            .as_ref()
            .map_or(false, |h| h.running.load(Ordering::SeqCst))
    }

    /// Start ticking in the background at no more than `max_rate_hz`.
    ///
    /// Each tick pulls one input from `source` and hands the output to
    /// `on_result`. Ticks never overlap; a slow tick pushes the next one
    /// back. Any loop already running is stopped first.
    pub fn start_loop<S, F>(&mut self, source: S, on_result: F, max_rate_hz: f64) -> Result<(), LoopError>
    where
        S: InputSource,
        F: FnMut(TickOutput) + Send + 'static,
    {
        if !(max_rate_hz.is_finite() && max_rate_hz > 0.0) {
            return Err(LoopError::InvalidRate(max_rate_hz));
        }
        tokio::runtime::Handle::try_current().map_err(|e| EnvError::runtime(e.to_string()))?;

        self.stop_loop();

        let ceiling = self.lock().config().tick_loop.max_rate_hz;
        let rate = max_rate_hz.min(ceiling);
        if rate < max_rate_hz {
            warn!(requested = max_rate_hz, rate, "Tick rate capped");
        }
        let period = Duration::from_secs_f64(1.0 / rate);

        let (stop_tx, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));

        let task = tick_loop(
            Arc::clone(&self.context),
            Arc::clone(&self.pipeline),
            self.session,
            period,
            source,
            on_result,
            stop_rx,
            Arc::clone(&running),
        );
        self.context.spawn("arnav-tick-loop", task);

        self.active_loop = Some(LoopHandle { stop: stop_tx, running });
        info!(session = %self.session, rate_hz = rate, "Tick loop started");
        Ok(())
    }

    /// Stop the loop if one is running. Safe in any state.
    pub fn stop_loop(&mut self) {
        if let Some(handle) = self.active_loop.take() {
            // A closed channel means the task already ended
            let _ = handle.stop.send(true);
            info!(session = %self.session, "Tick loop stopped");
        }
    }

    /// Stop the loop and release unit history. Idempotent.
    pub fn cleanup(&mut self) {
        self.stop_loop();
        self.lock().cleanup();
        debug!(session = %self.session, "Intelligence layer cleaned up");
    }
}

impl<Ctx: NavContext> Drop for Orchestrator<Ctx> {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

#[allow(clippy::too_many_arguments)]
async fn tick_loop<Ctx, S, F>(
    context: Arc<Ctx>,
    pipeline: Arc<Mutex<Pipeline>>,
    session: SessionId,
    period: Duration,
    mut source: S,
    mut on_result: F,
    mut stop: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
) where
    Ctx: NavContext,
    S: InputSource,
    F: FnMut(TickOutput) + Send + 'static,
{
    loop {
        if *stop.borrow() {
            break;
        }

        let started = context.now();
        let Some(input) = source.next_input() else {
            debug!("Input source exhausted");
            break;
        };

        let output = {
            let mut guard = pipeline.lock().unwrap_or_else(PoisonError::into_inner);
            guard.run(&input, context.now_ms(), context.epoch_ms(), session)
        };
        on_result(output);

        let wait = period.saturating_sub(context.now().saturating_sub(started));
        tokio::select! {
            _ = context.sleep(wait) => {}
            changed = stop.changed() => {
                // Sender dropped; the top of the loop handles an explicit stop
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    running.store(false, Ordering::SeqCst);
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("Tick rate must be a positive number of ticks per second, got {0}")]
    InvalidRate(f64),

    #[error(transparent)]
    Env(#[from] EnvError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::GuidanceAction;
    use crate::pose::IndoorZone;
    use crate::types::{EntryPoint, GeoPoint, GeofenceKind, PlanarPoint};
    use arnav_env::TokioContext;
    use std::sync::atomic::AtomicUsize;

    const DOOR: GeoPoint = GeoPoint { lat: 37.5009, lng: 127.0005 };

    fn sample_building() -> Geofence {
        Geofence {
            id: "mall".into(),
            name: "Central Mall".into(),
            kind: GeofenceKind::Building,
            polygon: vec![
                GeoPoint::new(37.5000, 127.0000),
                GeoPoint::new(37.5000, 127.0010),
                GeoPoint::new(37.5010, 127.0010),
                GeoPoint::new(37.5010, 127.0000),
            ],
            floor: None,
            entry_points: vec![EntryPoint {
                id: "north-door".into(),
                name: "North Door".into(),
                position: DOOR,
            }],
        }
    }

    fn street_input() -> TickInput {
        let mut input = TickInput::new(LocationFix {
            position: GeoPoint::new(37.5020, 127.0005),
            accuracy_m: 3.0,
            heading_deg: Some(180.0),
            speed_mps: Some(1.3),
            timestamp_ms: 0,
        });
        input.geofences = vec![sample_building()];
        input.route = Some(
            Route::from_waypoints(&[RoutePoint::Geo(GeoPoint::new(37.5020, 127.0005)), RoutePoint::Geo(DOOR)])
                .unwrap(),
        );
        input
    }

    fn doorway_input() -> TickInput {
        let mut input = TickInput::new(LocationFix {
            position: DOOR,
            accuracy_m: 8.0,
            heading_deg: Some(180.0),
            speed_mps: Some(0.1),
            timestamp_ms: 0,
        });
        input.geofences = vec![sample_building()];
        input.indoor_map = Some(IndoorMap {
            zones: vec![IndoorZone {
                id: "lobby".into(),
                name: "Lobby".into(),
                floor: 1,
                polygon: vec![
                    PlanarPoint::new(0.0, 0.0),
                    PlanarPoint::new(40.0, 0.0),
                    PlanarPoint::new(40.0, 40.0),
                    PlanarPoint::new(0.0, 40.0),
                ],
                landmarks: Vec::new(),
            }],
        });
        input.vps = Some(VpsFix {
            position: PlanarPoint::new(5.0, 5.0),
            floor: 1,
            heading_deg: 0.0,
            confidence: 0.9,
        });
        input.route = Some(
            Route::from_waypoints(&[
                RoutePoint::Planar(PlanarPoint::new(5.0, 5.0)),
                RoutePoint::Planar(PlanarPoint::new(30.0, 5.0)),
            ])
            .unwrap(),
        );
        input
    }

    fn store(id: &str, category: PoiCategory, x: f64, y: f64) -> Poi {
        Poi {
            id: id.into(),
            name: id.into(),
            category,
            position: FloorPoint::new(x, y, 1),
            priority: Some(0.5),
            features: None,
        }
    }

    fn orchestrator() -> Orchestrator<TokioContext> {
        let mut orch = Orchestrator::with_defaults(TokioContext::shared());
        orch.initialize();
        orch
    }

    #[test]
    fn test_outdoor_tick_skips_indoor_units() {
        let orch = orchestrator();
        let out = orch.tick(&street_input());

        assert_eq!(out.regime.value().unwrap().regime, Regime::Outdoor);
        assert!(out.pose.is_none());
        assert!(out.poi.is_none());
        assert_eq!(out.guidance.value().unwrap().action, GuidanceAction::GoStraight);
        assert_eq!(out.tick, 0);
        assert_eq!(out.session, orch.session_id());
    }

    #[test]
    fn test_indoor_tick_with_empty_catalog_still_reports_siblings() {
        let orch = orchestrator();
        let mut input = doorway_input();
        input.pois = Some(vec![store("far", PoiCategory::Store, 500.0, 500.0)]);

        let out = orch.tick(&input);
        assert!(out.is_indoor());
        assert!(out.regime.is_ok());
        assert!(out.pose.as_ref().unwrap().is_ok());
        assert!(out.guidance.is_ok());

        let poi = out.poi.unwrap();
        assert!(!poi.is_ok());
        assert_eq!(poi.confidence(), 0.0);
    }

    #[test]
    fn test_indoor_tick_ranks_on_route_poi_first() {
        let orch = orchestrator();
        let mut input = doorway_input();
        input.pois = Some(vec![
            store("cafe", PoiCategory::Restaurant, 8.0, 5.0),
            // Within reach of the route step's end at (30, 5)
            store("books", PoiCategory::Store, 25.0, 8.0),
        ]);

        let out = orch.tick(&input);
        let recognition = out.poi.unwrap().into_value().unwrap();
        assert_eq!(recognition.top_pois.len(), 2);
        assert_eq!(recognition.top_pois[0].poi_id, "books");
        assert_eq!(recognition.top_pois[1].poi_id, "cafe");
        assert_eq!(orch.last_pose().unwrap().zone_id.as_deref(), Some("lobby"));
    }

    #[test]
    fn test_escalator_in_catalog_drives_guidance() {
        let orch = orchestrator();
        let mut input = doorway_input();
        let mut lounge = store("lounge", PoiCategory::Restaurant, 20.0, 20.0);
        lounge.position.floor = 2;
        input.pois = Some(vec![store("esc-1", PoiCategory::Escalator, 7.0, 5.0), lounge]);
        input.goal = Some(UserGoal {
            target_poi_id: Some("lounge".into()),
            interest_categories: Vec::new(),
        });

        let out = orch.tick(&input);
        assert_eq!(out.guidance.value().unwrap().action, GuidanceAction::TakeEscalator);
    }

    #[test]
    fn test_stairs_ignored_without_goal() {
        let orch = orchestrator();
        let mut input = doorway_input();
        input.pois = Some(vec![store("stairs-1", PoiCategory::Stairs, 7.0, 6.0)]);

        let out = orch.tick(&input);
        assert_eq!(out.guidance.value().unwrap().action, GuidanceAction::GoStraight);
    }

    #[test]
    fn test_escalator_ignored_when_goal_on_same_floor() {
        let orch = orchestrator();
        let mut input = doorway_input();
        input.pois = Some(vec![
            store("esc-1", PoiCategory::Escalator, 7.0, 5.0),
            store("cafe", PoiCategory::Restaurant, 20.0, 5.0),
        ]);
        input.goal = Some(UserGoal {
            target_poi_id: Some("cafe".into()),
            interest_categories: Vec::new(),
        });

        let out = orch.tick(&input);
        assert_eq!(out.guidance.value().unwrap().action, GuidanceAction::GoStraight);
    }

    #[test]
    fn test_entrance_hint_outdoors() {
        let orch = orchestrator();
        let mut input = street_input();
        // Door on the fence's north edge; the fix is two meters outside it
        let door = GeoPoint::new(37.50100, 127.0005);
        input.geofences[0].entry_points[0].position = door;
        input.route = Some(
            Route::from_waypoints(&[RoutePoint::Geo(GeoPoint::new(37.5020, 127.0005)), RoutePoint::Geo(door)])
                .unwrap(),
        );
        input.fix.position = GeoPoint::new(37.50102, 127.0005);

        let out = orch.tick(&input);
        let regime = out.regime.value().unwrap();
        assert_eq!(regime.regime, Regime::Outdoor);
        assert_eq!(regime.entry_point_id.as_deref(), Some("north-door"));
        assert_eq!(out.guidance.value().unwrap().action, GuidanceAction::Enter);
    }

    #[test]
    fn test_missing_route_fails_only_guidance() {
        let orch = orchestrator();
        let mut input = street_input();
        input.route = None;
        let out = orch.tick(&input);
        assert!(out.regime.is_ok());
        assert!(!out.guidance.is_ok());
    }

    #[test]
    fn test_isolate_converts_panic() {
        let outcome: UnitOutcome<u8> = isolate("test-unit", || panic!("corrupt polygon"));
        assert!(!outcome.is_ok());
        assert_eq!(outcome.confidence(), 0.0);
        assert!(outcome.failure_reason().unwrap().contains("corrupt polygon"));
    }

    #[test]
    fn test_pose_acceptance_rules() {
        let pose = |confidence: f64, t: u64| IndoorPose {
            position: PlanarPoint::new(0.0, 0.0),
            floor: 1,
            heading_deg: 0.0,
            zone_id: None,
            confidence,
            relocalization_needed: false,
            timestamp_ms: t,
        };
        assert!(should_accept_pose(None, &pose(0.5, 10), 0.3));
        assert!(!should_accept_pose(None, &pose(0.2, 10), 0.3));
        assert!(!should_accept_pose(Some(&pose(0.9, 20)), &pose(0.8, 10), 0.3));
        assert!(should_accept_pose(Some(&pose(0.9, 20)), &pose(0.8, 20), 0.3));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut orch = orchestrator();
        orch.tick(&doorway_input());
        assert!(orch.last_pose().is_some());

        orch.cleanup();
        orch.cleanup();
        orch.stop_loop();
        assert!(orch.last_pose().is_none());
        assert!(!orch.is_running());
    }

    #[test]
    fn test_start_loop_requires_runtime() {
        let mut orch = orchestrator();
        let result = orch.start_loop(|| -> Option<TickInput> { None }, |_out: TickOutput| {}, 5.0);
        assert!(matches!(result, Err(LoopError::Env(_))));
    }

    #[tokio::test]
    async fn test_start_loop_rejects_bad_rate() {
        let mut orch = orchestrator();
        assert!(matches!(
            orch.start_loop(|| -> Option<TickInput> { None }, |_out: TickOutput| {}, 0.0),
            Err(LoopError::InvalidRate(_))
        ));
        assert!(matches!(
            orch.start_loop(|| -> Option<TickInput> { None }, |_out: TickOutput| {}, f64::NAN),
            Err(LoopError::InvalidRate(_))
        ));
    }

    #[tokio::test]
    async fn test_loop_respects_rate_and_stops() {
        let mut orch = orchestrator();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);

        orch.start_loop(
            || Some(street_input()),
            move |_out: TickOutput| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
            20.0,
        )
        .unwrap();
        assert!(orch.is_running());

        tokio::time::sleep(Duration::from_millis(300)).await;
        orch.stop_loop();
        let at_stop = count.load(Ordering::SeqCst);
        assert!((2..=8).contains(&at_stop), "ran {at_stop} ticks in 300 ms at 20 Hz");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_loop_ends_when_source_is_exhausted() {
        let mut orch = orchestrator();
        let mut remaining = 3;
        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outputs);

        orch.start_loop(
            move || {
                if remaining == 0 {
                    return None;
                }
                remaining -= 1;
                Some(street_input())
            },
            move |out: TickOutput| sink.lock().unwrap().push(out.tick),
            50.0,
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*outputs.lock().unwrap(), vec![0, 1, 2]);
        assert!(!orch.is_running());
    }
}
