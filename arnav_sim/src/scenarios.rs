//! Replay scenarios through the demo mall.

use arnav_core::validation::ValidationReport;
use arnav_core::{PlanarPoint, PoiCategory, Regime, Route, RoutePoint, UserGoal};

use crate::error::SimError;
use crate::runner::ScenarioMetrics;
use crate::venue::Venue;
use crate::walker::WalkerConfig;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// SIM-001: walk across the plaza and through the south door
    MallEntry,

    /// SIM-002: indoor corridor walk tracked by dead reckoning
    CorridorWalk,

    /// SIM-003: pacing back and forth across the doorway
    BoundaryDither,

    /// SIM-004: long indoor loop with gyro drift and sparse fixes
    LandmarkRelocalization,

    /// SIM-005: slow browse past shops towards the escalator
    PoiBrowse,
}

/// Everything needed to replay one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    /// Ground-truth walk, floor-plan meters
    pub path: Vec<PlanarPoint>,
    pub floor: i32,
    pub route: Route,
    pub goal: Option<UserGoal>,
    pub top_k: Option<usize>,
    pub walker: WalkerConfig,
    pub duration_secs: f64,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::MallEntry,
            ScenarioId::CorridorWalk,
            ScenarioId::BoundaryDither,
            ScenarioId::LandmarkRelocalization,
            ScenarioId::PoiBrowse,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::MallEntry => "mall_entry",
            ScenarioId::CorridorWalk => "corridor_walk",
            ScenarioId::BoundaryDither => "boundary_dither",
            ScenarioId::LandmarkRelocalization => "landmark_relocalization",
            ScenarioId::PoiBrowse => "poi_browse",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::MallEntry => "Plaza approach, ENTER prompt at the door, settle INDOOR",
            ScenarioId::CorridorWalk => "Indoor L-shaped walk, pose tracked between VPS fixes",
            ScenarioId::BoundaryDither => "Repeated doorway crossings, regime must not chatter",
            ScenarioId::LandmarkRelocalization => "Gyro bias drift corrected by landmark sightings",
            ScenarioId::PoiBrowse => "Ranked POIs along the way, escalator prompt for an upstairs goal",
        }
    }

    /// Build the walk, route and noise model for this scenario.
    pub fn plan(&self, venue: &Venue) -> Result<ScenarioPlan, SimError> {
        let plan = match self {
            ScenarioId::MallEntry => {
                let path = points(&[(30.0, 80.0), (30.0, 40.0), (30.0, 25.0), (45.0, 25.0)]);
                let mut route = Route::from_waypoints(&[
                    RoutePoint::Geo(venue.to_geo(path[0])),
                    RoutePoint::Geo(venue.to_geo(path[1])),
                ])?;
                route.extend(planar_route(&path[1..])?);
                ScenarioPlan {
                    path,
                    floor: 0,
                    route,
                    goal: Some(UserGoal {
                        target_poi_id: Some("cafe".into()),
                        interest_categories: Vec::new(),
                    }),
                    top_k: None,
                    walker: WalkerConfig::default(),
                    duration_secs: 65.0,
                }
            }
            ScenarioId::CorridorWalk => {
                let path = points(&[(10.0, 25.0), (38.0, 25.0), (38.0, 8.0), (54.0, 8.0)]);
                ScenarioPlan {
                    route: planar_route(&path)?,
                    path,
                    floor: 0,
                    goal: None,
                    top_k: None,
                    walker: WalkerConfig::default(),
                    duration_secs: 50.0,
                }
            }
            ScenarioId::BoundaryDither => {
                let mut path = Vec::new();
                for _ in 0..6 {
                    path.push(PlanarPoint::new(30.0, 47.0));
                    path.push(PlanarPoint::new(30.0, 33.0));
                }
                let mut route = Route::from_waypoints(&[
                    RoutePoint::Geo(venue.to_geo(PlanarPoint::new(30.0, 60.0))),
                    RoutePoint::Geo(venue.to_geo(venue.door)),
                ])?;
                route.extend(planar_route(&[venue.door, PlanarPoint::new(30.0, 20.0)])?);
                ScenarioPlan {
                    path,
                    floor: 0,
                    route,
                    goal: None,
                    top_k: None,
                    walker: WalkerConfig::default(),
                    duration_secs: 60.0,
                }
            }
            ScenarioId::LandmarkRelocalization => {
                let path = points(&[
                    (17.0, 20.0),
                    (34.0, 20.0),
                    (46.0, 10.0),
                    (56.0, 10.0),
                    (56.0, 32.0),
                    (10.0, 32.0),
                ]);
                ScenarioPlan {
                    route: planar_route(&path)?,
                    path,
                    floor: 0,
                    goal: None,
                    top_k: None,
                    walker: WalkerConfig {
                        gyro_bias: 0.003,
                        accel_sigma: 0.15,
                        vps_interval_ticks: Some(150),
                        ..WalkerConfig::default()
                    },
                    duration_secs: 95.0,
                }
            }
            ScenarioId::PoiBrowse => {
                let path = points(&[(10.0, 25.0), (30.0, 25.0), (44.0, 28.0), (52.0, 22.0), (54.0, 20.0)]);
                ScenarioPlan {
                    route: planar_route(&path)?,
                    path,
                    floor: 0,
                    goal: Some(UserGoal {
                        target_poi_id: Some("sky_lounge".into()),
                        interest_categories: vec![PoiCategory::Exhibit],
                    }),
                    top_k: Some(3),
                    walker: WalkerConfig {
                        speed_mps: 0.7,
                        ..WalkerConfig::default()
                    },
                    duration_secs: 75.0,
                }
            }
        };
        Ok(plan)
    }

    /// Pass criteria, checked against the run's report and metrics.
    pub fn check(&self, report: &ValidationReport, metrics: &ScenarioMetrics) -> Result<(), String> {
        if report.total_ticks == 0 {
            return Err("no ticks executed".into());
        }
        if report.failures.guidance > 0 {
            return Err(format!("{} guidance failures", report.failures.guidance));
        }

        match self {
            ScenarioId::MallEntry => {
                expect_final(metrics, Regime::Indoor)?;
                at_least("regime accuracy", report.regime_accuracy, 0.75)?;
                if metrics.enter_prompts == 0 {
                    return Err("no ENTER prompt near the door".into());
                }
            }
            ScenarioId::CorridorWalk => {
                expect_final(metrics, Regime::Indoor)?;
                // Tolerated only until the first VPS fix is adopted
                if report.failures.pose > 10 {
                    return Err(format!("{} pose failures", report.failures.pose));
                }
                at_most("pose RMSE", report.pose_rmse_m, 3.0)?;
                if report.floor_accuracy.map_or(false, |a| a < 1.0) {
                    return Err("floor estimate drifted".into());
                }
            }
            ScenarioId::BoundaryDither => {
                if report.failures.regime > 0 {
                    return Err(format!("{} regime failures", report.failures.regime));
                }
                let allowed = metrics.truth_regime_changes + 1;
                if report.regime_changes > allowed {
                    return Err(format!(
                        "regime chattered: {} changes for {} real crossings",
                        report.regime_changes, metrics.truth_regime_changes
                    ));
                }
            }
            ScenarioId::LandmarkRelocalization => {
                if report.failures.pose > 0 {
                    return Err(format!("{} pose failures", report.failures.pose));
                }
                at_most("pose RMSE", report.pose_rmse_m, 4.0)?;
                at_most("max pose error", report.max_pose_error_m, 10.0)?;
            }
            ScenarioId::PoiBrowse => {
                if report.failures.poi > 0 {
                    return Err(format!("{} POI failures", report.failures.poi));
                }
                if metrics.poi_ticks == 0 {
                    return Err("no POIs were ranked".into());
                }
                if metrics.escalator_prompts == 0 {
                    return Err("no escalator prompt for an upstairs goal".into());
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mall_entry" | "mallentry" | "sim-001" => Ok(ScenarioId::MallEntry),
            "corridor_walk" | "corridorwalk" | "sim-002" => Ok(ScenarioId::CorridorWalk),
            "boundary_dither" | "boundarydither" | "sim-003" => Ok(ScenarioId::BoundaryDither),
            "landmark_relocalization" | "landmarkrelocalization" | "sim-004" => {
                Ok(ScenarioId::LandmarkRelocalization)
            }
            "poi_browse" | "poibrowse" | "sim-005" => Ok(ScenarioId::PoiBrowse),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

fn points(coords: &[(f64, f64)]) -> Vec<PlanarPoint> {
    coords.iter().map(|&(x, y)| PlanarPoint::new(x, y)).collect()
}

fn planar_route(path: &[PlanarPoint]) -> Result<Route, SimError> {
    let waypoints: Vec<RoutePoint> = path.iter().map(|p| RoutePoint::Planar(*p)).collect();
    Ok(Route::from_waypoints(&waypoints)?)
}

fn expect_final(metrics: &ScenarioMetrics, expected: Regime) -> Result<(), String> {
    match metrics.final_regime {
        Some(r) if r == expected => Ok(()),
        other => Err(format!("final regime {:?}, expected {}", other, expected)),
    }
}

fn at_least(what: &str, value: f64, min: f64) -> Result<(), String> {
    if value < min {
        return Err(format!("{what} {value:.2} below {min:.2}"));
    }
    Ok(())
}

fn at_most(what: &str, value: Option<f64>, max: f64) -> Result<(), String> {
    match value {
        Some(v) if v > max => Err(format!("{what} {v:.2} above {max:.2}")),
        Some(_) => Ok(()),
        None => Err(format!("{what} not measured")),
    }
}
