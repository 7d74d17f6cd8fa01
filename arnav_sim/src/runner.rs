//! Scenario runner - replays a walk through the intelligence layer.

use std::sync::Arc;
use std::time::Duration;

use arnav_core::validation::ValidationReport;
use arnav_core::{
    GroundTruth, GuidanceAction, IntelligenceConfig, Orchestrator, Regime, TickInput, TickOutput, ValidationSession,
};
use arnav_env::{NavContext, SessionId};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::{ScenarioId, ScenarioPlan};
use crate::venue::Venue;
use crate::walker::{TruthState, Walker};

/// RNG stream feeding the walker's sensor noise.
const WALKER_STREAM: u64 = 1;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Accuracy against ground truth
    pub report: ValidationReport,

    /// Scenario-level counters
    pub metrics: ScenarioMetrics,
}

/// Counters collected during a replay, beyond the validation report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Real indoor/outdoor crossings
    pub truth_regime_changes: usize,

    /// Ticks whose guidance was ENTER
    pub enter_prompts: usize,

    /// Ticks whose guidance was TAKE_ESCALATOR
    pub escalator_prompts: usize,

    /// Ticks with at least one ranked POI
    pub poi_ticks: usize,

    /// Regime emitted on the last tick
    pub final_regime: Option<Regime>,
}

/// Folds tick outputs into `ScenarioMetrics`.
#[derive(Default)]
struct MetricsCollector {
    metrics: ScenarioMetrics,
    last_truth: Option<Regime>,
}

impl MetricsCollector {
    fn observe(&mut self, truth: &GroundTruth, output: &TickOutput) {
        let m = &mut self.metrics;
        if self.last_truth.map_or(false, |r| r != truth.regime) {
            m.truth_regime_changes += 1;
        }
        self.last_truth = Some(truth.regime);

        match output.guidance.value().map(|g| g.action) {
            Some(GuidanceAction::Enter) => m.enter_prompts += 1,
            Some(GuidanceAction::TakeEscalator) => m.escalator_prompts += 1,
            _ => {}
        }
        if output
            .poi
            .as_ref()
            .and_then(|p| p.value())
            .map_or(false, |r| !r.top_pois.is_empty())
        {
            m.poi_ticks += 1;
        }
        m.final_regime = output.regime.value().map(|r| r.regime);
    }
}

/// A walker plus the static inputs every tick carries.
struct Replay {
    walker: Walker,
    plan: ScenarioPlan,
    venue: Arc<Venue>,
}

impl Replay {
    fn new(venue: Arc<Venue>, plan: ScenarioPlan, context: &SimContext) -> Result<Self, SimError> {
        let walker = Walker::new(
            Arc::clone(&venue),
            plan.path.clone(),
            plan.floor,
            plan.walker.clone(),
            context.rng_stream(WALKER_STREAM),
        )?;
        Ok(Self { walker, plan, venue })
    }

    /// Advance the walker one tick and assemble what the host would send.
    fn next(&mut self, dt_s: f64, now_ms: u64) -> (TickInput, GroundTruth, TruthState) {
        let frame = self.walker.step(dt_s, now_ms);
        let state = self.walker.truth();

        let mut input = TickInput::new(frame.fix);
        input.geofences = self.venue.geofences.clone();
        input.camera = Some(frame.camera);
        input.inertial = Some(frame.inertial);
        input.route = Some(self.plan.route.clone());
        input.pois = Some(self.venue.catalog.clone());
        input.indoor_map = Some(self.venue.indoor_map.clone());
        input.vps = frame.vps;
        input.goal = self.plan.goal.clone();
        input.top_k = self.plan.top_k;

        let truth = GroundTruth {
            regime: if state.indoor { Regime::Indoor } else { Regime::Outdoor },
            position: state.indoor.then_some(state.position),
            floor: state.indoor.then_some(state.floor),
            expected_action: self.walker.expected_action(),
        };
        (input, truth, state)
    }
}

/// Runs scenarios against a fresh orchestrator on a virtual clock.
pub struct ScenarioRunner {
    seed: u64,
    tick_rate_hz: Option<f64>,
    duration_secs: Option<f64>,
    config: IntelligenceConfig,
    venue: Arc<Venue>,
}

impl ScenarioRunner {
    /// Creates a runner for the demo mall.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_rate_hz: None,
            duration_secs: None,
            config: IntelligenceConfig::default(),
            venue: Arc::new(Venue::demo_mall()),
        }
    }

    /// Sets the tick rate (default: the configured loop rate).
    pub fn with_tick_rate(mut self, hz: f64) -> Self {
        self.tick_rate_hz = Some(hz);
        self
    }

    /// Overrides every scenario's duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_config(mut self, config: IntelligenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario tick by tick and checks its pass criteria.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.execute(scenario, None)
    }

    /// Like `run`, also sampling every `interval`-th tick into an export.
    pub fn run_with_export(&self, scenario: ScenarioId, interval: u64) -> Result<(ScenarioResult, SimExport), SimError> {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some((&mut export, interval.max(1))))?;
        export.finalize(result.passed, result.report.clone());
        Ok((result, export))
    }

    /// Runs a scenario through the orchestrator's own tick loop.
    ///
    /// The loop sleeps on the virtual clock, so this completes as fast as
    /// the ticks compute. Must be awaited inside a Tokio runtime.
    pub async fn run_looped(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let plan = scenario.plan(&self.venue)?;
        let rate = self.effective_rate()?;
        let dt = 1.0 / rate;
        let ticks = self.tick_count(&plan, rate);

        let context = SimContext::shared(self.seed);
        let mut orchestrator = self.orchestrator(&context);
        let mut replay = Replay::new(Arc::clone(&self.venue), plan, &context)?;

        let (truth_tx, mut truth_rx) = mpsc::unbounded_channel::<GroundTruth>();
        let (output_tx, mut output_rx) = mpsc::unbounded_channel::<TickOutput>();

        let mut remaining = ticks;
        let clock = Arc::clone(&context);
        let source = move || -> Option<TickInput> {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let (input, truth, _) = replay.next(dt, clock.now_ms());
            truth_tx.send(truth).ok()?;
            Some(input)
        };
        orchestrator.start_loop(
            source,
            move |output| {
                // The receiver outlives the loop unless the run was abandoned
                let _ = output_tx.send(output);
            },
            rate,
        )?;

        let mut validation = ValidationSession::new(scenario.name());
        let mut metrics = MetricsCollector::default();
        while let Some(output) = output_rx.recv().await {
            let Some(truth) = truth_rx.recv().await else {
                break;
            };
            validation.record(&truth, &output);
            metrics.observe(&truth, &output);
        }
        orchestrator.cleanup();

        Ok(self.conclude(scenario, validation, metrics.metrics, context.now()))
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        mut export: Option<(&mut SimExport, u64)>,
    ) -> Result<ScenarioResult, SimError> {
        let plan = scenario.plan(&self.venue)?;
        let rate = self.effective_rate()?;
        let dt = 1.0 / rate;
        let period = Duration::from_secs_f64(dt);
        let ticks = self.tick_count(&plan, rate);

        info!(scenario = scenario.name(), seed = self.seed, ticks, rate, "Running scenario");

        let context = SimContext::shared(self.seed);
        let mut orchestrator = self.orchestrator(&context);
        let mut replay = Replay::new(Arc::clone(&self.venue), plan, &context)?;

        let mut validation = ValidationSession::new(scenario.name());
        let mut metrics = MetricsCollector::default();
        let mut emitted: Option<Regime> = None;
        let log_every = (rate * 5.0).round().max(1.0) as u64;

        for tick in 0..ticks {
            let (input, truth, state) = replay.next(dt, context.now_ms());
            let output = orchestrator.tick(&input);

            validation.record(&truth, &output);
            metrics.observe(&truth, &output);

            let regime = output.regime.value().map(|r| r.regime);
            let changed = match (emitted, regime) {
                (Some(before), Some(after)) if before != after => Some((before, after)),
                _ => None,
            };
            if regime.is_some() {
                emitted = regime;
            }

            if let Some((sink, interval)) = export.as_mut() {
                let mut frame = SimFrame::from_output(context.now().as_secs_f64(), &state, &output);
                if let Some((before, after)) = changed {
                    frame.events.push(SimEvent::info(format!("regime {before} -> {after}")));
                }
                if tick % *interval == 0 || !frame.events.is_empty() {
                    sink.add_frame(frame);
                }
            }

            if tick % log_every == 0 {
                debug!(
                    t = context.now().as_secs_f64(),
                    x = state.position.x,
                    y = state.position.y,
                    truth_indoor = state.indoor,
                    regime = ?regime,
                    "Replay progress"
                );
            }

            context.advance_time(period);
        }
        orchestrator.cleanup();

        Ok(self.conclude(scenario, validation, metrics.metrics, context.now()))
    }

    fn orchestrator(&self, context: &Arc<SimContext>) -> Orchestrator<SimContext> {
        let mut orchestrator = Orchestrator::new(Arc::clone(context), self.config.clone())
            .with_session(SessionId::from_seed(self.seed));
        orchestrator.initialize();
        orchestrator
    }

    /// Requested rate, capped by the loop ceiling so both run modes agree.
    fn effective_rate(&self) -> Result<f64, SimError> {
        let loop_config = &self.config.tick_loop;
        let rate = self.tick_rate_hz.unwrap_or(loop_config.default_rate_hz);
        if !(rate.is_finite() && rate > 0.0) {
            return Err(SimError::InvalidRate(rate));
        }
        Ok(rate.min(loop_config.max_rate_hz))
    }

    fn tick_count(&self, plan: &ScenarioPlan, rate: f64) -> u64 {
        let duration = self.duration_secs.unwrap_or(plan.duration_secs).max(0.0);
        (duration * rate).round() as u64
    }

    fn conclude(
        &self,
        scenario: ScenarioId,
        validation: ValidationSession,
        metrics: ScenarioMetrics,
        elapsed: Duration,
    ) -> ScenarioResult {
        let report = validation.generate_report();
        let verdict = scenario.check(&report, &metrics);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            total_ticks: report.total_ticks as u64,
            final_time_secs: elapsed.as_secs_f64(),
            failure_reason: verdict.err(),
            report,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_count_follows_duration_and_rate() {
        let runner = ScenarioRunner::new(1).with_tick_rate(10.0).with_duration(3.0);
        let result = runner.run(ScenarioId::CorridorWalk).unwrap();
        assert_eq!(result.total_ticks, 30);
        assert!((result.final_time_secs - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let runner = ScenarioRunner::new(1).with_tick_rate(0.0);
        assert!(matches!(runner.run(ScenarioId::MallEntry), Err(SimError::InvalidRate(_))));
    }

    #[test]
    fn test_rate_capped_at_loop_ceiling() {
        let runner = ScenarioRunner::new(1).with_tick_rate(100.0).with_duration(1.0);
        let result = runner.run(ScenarioId::CorridorWalk).unwrap();
        assert_eq!(result.total_ticks, 30);
    }

    #[test]
    fn test_same_seed_same_report() {
        let a = ScenarioRunner::new(99).with_duration(20.0).run(ScenarioId::MallEntry).unwrap();
        let b = ScenarioRunner::new(99).with_duration(20.0).run(ScenarioId::MallEntry).unwrap();
        assert_eq!(a.report.regime_changes, b.report.regime_changes);
        assert_eq!(a.report.regime_accuracy, b.report.regime_accuracy);
        assert_eq!(a.report.pose_rmse_m, b.report.pose_rmse_m);
        assert_eq!(a.metrics.enter_prompts, b.metrics.enter_prompts);
    }

    #[test]
    fn test_corridor_walk_settles_indoor_with_pose() {
        let result = ScenarioRunner::new(7).with_duration(10.0).run(ScenarioId::CorridorWalk).unwrap();
        assert_eq!(result.metrics.final_regime, Some(Regime::Indoor));
        assert!(result.report.pose_samples > 0);
        assert_eq!(result.report.failures.guidance, 0);
        assert_eq!(result.metrics.truth_regime_changes, 0);
    }

    #[test]
    fn test_outdoor_start_is_outdoor() {
        let result = ScenarioRunner::new(3).with_duration(5.0).run(ScenarioId::MallEntry).unwrap();
        assert_eq!(result.metrics.final_regime, Some(Regime::Outdoor));
        // Unit B never runs outdoors
        assert_eq!(result.report.pose_samples, 0);
        assert_eq!(result.report.failures.pose, 0);
    }

    #[test]
    fn test_export_samples_frames() {
        let runner = ScenarioRunner::new(5).with_tick_rate(5.0).with_duration(4.0);
        let (result, export) = runner.run_with_export(ScenarioId::CorridorWalk, 5).unwrap();
        assert_eq!(result.total_ticks, 20);
        assert!(export.frames.len() >= 4);
        assert_eq!(export.scenario, "corridor_walk");
        assert!(export.report.is_some());
    }

    #[tokio::test]
    async fn test_looped_run_matches_tick_count() {
        let runner = ScenarioRunner::new(11).with_tick_rate(10.0).with_duration(2.0);
        let result = runner.run_looped(ScenarioId::CorridorWalk).await.unwrap();
        assert_eq!(result.total_ticks, 20);
        assert_eq!(result.metrics.final_regime, Some(Regime::Indoor));
    }

    #[tokio::test]
    async fn test_looped_and_stepped_runs_agree() {
        let runner = ScenarioRunner::new(21).with_tick_rate(5.0).with_duration(6.0);
        let stepped = runner.run(ScenarioId::CorridorWalk).unwrap();
        let looped = runner.run_looped(ScenarioId::CorridorWalk).await.unwrap();
        assert_eq!(stepped.report.total_ticks, looped.report.total_ticks);
        assert_eq!(stepped.report.pose_rmse_m, looped.report.pose_rmse_m);
        assert_eq!(stepped.report.regime_changes, looped.report.regime_changes);
    }
}
