//! Unit D: POI recognition and prioritization.
//!
//! Filters the catalog to what is plausibly visible, scores each POI from
//! its static priority, the user's goal and interests, route proximity,
//! camera feature similarity and distance, then surfaces the top K with AR
//! anchor hints and call-to-action suggestions.


use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::cosine_similarity;
use crate::guidance::Route;
use crate::types::{CameraFrame, PlanarPoint, UnitOutcome};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoiConfig {
    pub default_top_k: usize,

    /// POIs farther than this from the user are not considered (default: 50 m)
    pub max_distance_m: f64,

    /// POIs within this distance of an upcoming step end are on the route (default: 10 m)
    pub on_route_radius_m: f64,

    /// Upcoming route steps checked for proximity (default: 3)
    pub route_lookahead_steps: usize,

    /// Priority used when a POI declares none (default: 0.5)
    pub default_priority: f64,

    pub goal_priority: f64,
    pub on_route_priority: f64,
    pub interest_priority: f64,

    /// Blend of priority and camera match (default: 0.7 / 0.3)
    pub priority_weight: f64,
    pub match_weight: f64,

    /// Match score when no feature comparison is possible (default: 0.5)
    pub default_match_score: f64,

    /// Maximum bonus for a POI right next to the user (default: 0.2)
    pub distance_bonus_weight: f64,

    pub anchor_max_m: f64,
    pub eye_level_m: f64,

    /// Surfaced POIs considered for calls to action (default: 3)
    pub cta_candidates: usize,

    /// Blend of mean match and mean score in the result confidence (default: 0.6 / 0.4)
    pub confidence_match_weight: f64,
    pub confidence_score_weight: f64,
}

impl Default for PoiConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_distance_m: 50.0,
            on_route_radius_m: 10.0,
            route_lookahead_steps: 3,
            default_priority: 0.5,
            goal_priority: 1.0,
            on_route_priority: 0.8,
            interest_priority: 0.7,
            priority_weight: 0.7,
            match_weight: 0.3,
            default_match_score: 0.5,
            distance_bonus_weight: 0.2,
            anchor_max_m: 10.0,
            eye_level_m: 1.5,
            cta_candidates: 3,
            confidence_match_weight: 0.6,
            confidence_score_weight: 0.4,
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Store,
    Restaurant,
    Exhibit,
    Restroom,
    Exit,
    Entrance,
    Escalator,
    Elevator,
    Stairs,
    Other,
}

/// A planar position on a given floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorPoint {
    pub x: f64,
    pub y: f64,
    pub floor: i32,
}

impl FloorPoint {
    pub fn new(x: f64, y: f64, floor: i32) -> Self {
        Self { x, y, floor }
    }

    pub fn planar(&self) -> PlanarPoint {
        PlanarPoint::new(self.x, self.y)
    }

    fn distance_to(&self, other: &FloorPoint) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub category: PoiCategory,
    pub position: FloorPoint,

    /// Static priority in [0, 1]
    #[serde(default)]
    pub priority: Option<f64>,

    #[serde(default)]
    pub features: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserGoal {
    #[serde(default)]
    pub target_poi_id: Option<String>,

    #[serde(default)]
    pub interest_categories: Vec<PoiCategory>,
}

impl UserGoal {
    fn is_target(&self, poi: &Poi) -> bool {
        self.target_poi_id.as_deref() == Some(poi.id.as_str())
    }
}

/// The zone the user is believed to be in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRef {
    pub id: String,
    pub floor: i32,
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPoi {
    pub poi_id: String,
    pub name: String,
    pub category: PoiCategory,
    pub score: f64,
    pub match_score: f64,
    pub distance_m: Option<f64>,

    /// Camera-relative overlay offset, at most `anchor_max_m` away
    pub anchor_hint: Option<Vector3<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CtaKind {
    Enter,
    ViewInfo,
    Navigate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToAction {
    pub kind: CtaKind,
    pub poi_id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecognition {
    pub top_pois: Vec<RankedPoi>,
    pub calls_to_action: Vec<CallToAction>,
}

/// Per-tick input to the recognizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoiInput<'a> {
    pub camera: Option<&'a CameraFrame>,
    pub catalog: &'a [Poi],
    pub goal: Option<&'a UserGoal>,
    pub zone: Option<&'a ZoneRef>,
    pub pose: Option<FloorPoint>,
    pub route: Option<&'a Route>,

    /// Index of the step the user is on; route lookahead starts here
    pub route_step: usize,

    pub top_k: Option<usize>,
}

// ============================================================================
// SCORING
// ============================================================================

/// Catalog entries worth scoring this tick.
///
/// With a pose: same floor and within `max_distance_m`. Without a pose but
/// with a zone: same floor as the zone. Otherwise the whole catalog.
pub fn filter_candidates<'a>(
    catalog: &'a [Poi],
    pose: Option<FloorPoint>,
    zone: Option<&ZoneRef>,
    max_distance_m: f64,
) -> Vec<&'a Poi> {
    catalog
        .iter()
        .filter(|poi| match (pose, zone) {
            (Some(p), _) => poi.position.floor == p.floor && poi.position.distance_to(&p) <= max_distance_m,
            (None, Some(z)) => poi.position.floor == z.floor,
            (None, None) => true,
        })
        .collect()
}

/// Cosine similarity between the frame and the POI's reference features,
/// floored at 0, or the default when either side has no features.
pub fn camera_match_score(camera: Option<&CameraFrame>, poi: &Poi, config: &PoiConfig) -> f64 {
    match (camera.and_then(|c| c.features.as_deref()), poi.features.as_deref()) {
        (Some(observed), Some(reference)) => cosine_similarity(observed, reference).max(0.0),
        _ => config.default_match_score,
    }
}

/// Whether the POI lies near one of the next few route step ends.
pub fn is_on_route(poi: &Poi, route: &Route, from_step: usize, config: &PoiConfig) -> bool {
    route
        .steps
        .iter()
        .skip(from_step)
        .take(config.route_lookahead_steps)
        .filter_map(|s| s.end.as_planar())
        .any(|end| (end.x - poi.position.x).hypot(end.y - poi.position.y) < config.on_route_radius_m)
}

/// Inputs to the priority blend of one POI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityFactors {
    pub base: f64,
    pub is_goal: bool,
    pub on_route: bool,
    pub interest: bool,
    pub match_score: f64,
    pub distance_m: Option<f64>,
}

/// Final score in [0, 1]:
/// goal / route / interest overrides, then the priority-match blend, then
/// the inverse-distance bonus.
pub fn blended_priority(f: &PriorityFactors, config: &PoiConfig) -> f64 {
    let mut priority = f.base;
    if f.is_goal {
        priority = config.goal_priority;
    }
    if f.on_route {
        priority = priority.max(config.on_route_priority);
    }
    if f.interest {
        priority = priority.max(config.interest_priority);
    }

    let mut score = priority * config.priority_weight + f.match_score * config.match_weight;
    if let Some(d) = f.distance_m {
        let closeness = (1.0 - d / config.max_distance_m).max(0.0);
        score += closeness * config.distance_bonus_weight;
    }
    score.clamp(0.0, 1.0)
}

/// Offset toward the POI, scaled to at most `anchor_max_m`.
///
/// `None` without a pose or across floors; a POI at the user's position
/// anchors straight overhead at eye level.
pub fn anchor_hint(poi: &Poi, pose: Option<FloorPoint>, config: &PoiConfig) -> Option<Vector3<f64>> {
    let pose = pose?;
    if poi.position.floor != pose.floor {
        return None;
    }
    let dx = poi.position.x - pose.x;
    let dy = poi.position.y - pose.y;
    let d = dx.hypot(dy);
    if d == 0.0 {
        return Some(Vector3::new(0.0, config.eye_level_m, 0.0));
    }
    let reach = d.min(config.anchor_max_m);
    Some(Vector3::new(dx / d * reach, config.eye_level_m, dy / d * reach))
}

/// Suggested actions for the first few surfaced POIs.
pub fn calls_to_action(
    ranked: &[(RankedPoi, &Poi)],
    goal: Option<&UserGoal>,
    config: &PoiConfig,
) -> Vec<CallToAction> {
    let mut actions = Vec::new();
    for (_, poi) in ranked.iter().take(config.cta_candidates) {
        if goal.map_or(false, |g| g.is_target(poi)) {
            actions.push(CallToAction {
                kind: CtaKind::Navigate,
                poi_id: poi.id.clone(),
                label: format!("Navigate to {}", poi.name),
            });
        }
        match poi.category {
            PoiCategory::Store | PoiCategory::Restaurant => actions.push(CallToAction {
                kind: CtaKind::Enter,
                poi_id: poi.id.clone(),
                label: format!("Enter {}", poi.name),
            }),
            PoiCategory::Exhibit => actions.push(CallToAction {
                kind: CtaKind::ViewInfo,
                poi_id: poi.id.clone(),
                label: format!("About {}", poi.name),
            }),
            _ => {}
        }
    }
    actions
}

/// Blend of mean match score and mean final score over the surfaced set.
pub fn recognition_confidence(top: &[RankedPoi], config: &PoiConfig) -> f64 {
    if top.is_empty() {
        return 0.0;
    }
    let n = top.len() as f64;
    let mean_match = top.iter().map(|p| p.match_score).sum::<f64>() / n;
    let mean_score = top.iter().map(|p| p.score).sum::<f64>() / n;
    (mean_match * config.confidence_match_weight + mean_score * config.confidence_score_weight).clamp(0.0, 1.0)
}

// ============================================================================
// RECOGNIZER
// ============================================================================

/// Stateless POI recognizer.
pub struct PoiRecognizer {
    config: PoiConfig,
}

impl PoiRecognizer {
    pub fn new(config: PoiConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PoiConfig::default())
    }

    pub fn config(&self) -> &PoiConfig {
        &self.config
    }

    pub fn tick(&self, input: &PoiInput<'_>) -> UnitOutcome<PoiRecognition> {
        match self.recognize(input) {
            Ok((result, confidence)) => UnitOutcome::ok(result, confidence),
            Err(e) => {
                warn!(error = %e, "POI recognition failed");
                UnitOutcome::failed(e.to_string())
            }
        }
    }

    pub fn recognize(&self, input: &PoiInput<'_>) -> Result<(PoiRecognition, f64), PoiError> {
        let top_k = input.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 {
            return Err(PoiError::InvalidTopK);
        }

        let candidates = filter_candidates(input.catalog, input.pose, input.zone, self.config.max_distance_m);
        if candidates.is_empty() {
            return Err(PoiError::NoCandidates {
                catalog: input.catalog.len(),
            });
        }

        let mut ranked: Vec<(RankedPoi, &Poi)> = candidates
            .into_iter()
            .map(|poi| {
                let match_score = camera_match_score(input.camera, poi, &self.config);
                let distance_m = input.pose.map(|p| poi.position.distance_to(&p));
                let factors = PriorityFactors {
                    base: poi
                        .priority
                        .filter(|p| p.is_finite())
                        .unwrap_or(self.config.default_priority),
                    is_goal: input.goal.map_or(false, |g| g.is_target(poi)),
                    on_route: input.pose.is_some()
                        && input
                            .route
                            .map_or(false, |r| is_on_route(poi, r, input.route_step, &self.config)),
                    interest: input
                        .goal
                        .map_or(false, |g| g.interest_categories.contains(&poi.category)),
                    match_score,
                    distance_m,
                };
                let ranked = RankedPoi {
                    poi_id: poi.id.clone(),
                    name: poi.name.clone(),
                    category: poi.category,
                    score: blended_priority(&factors, &self.config),
                    match_score,
                    distance_m,
                    anchor_hint: anchor_hint(poi, input.pose, &self.config),
                };
                (ranked, poi)
            })
            .collect();

        // Stable sort keeps catalog order among equal scores
        ranked.sort_by(|a, b| b.0.score.total_cmp(&a.0.score));
        ranked.truncate(top_k);

        let calls_to_action = calls_to_action(&ranked, input.goal, &self.config);
        let top_pois: Vec<RankedPoi> = ranked.into_iter().map(|(r, _)| r).collect();
        let confidence = recognition_confidence(&top_pois, &self.config);

        debug!(surfaced = top_pois.len(), ctas = calls_to_action.len(), confidence, "POIs ranked");

        Ok((
            PoiRecognition {
                top_pois,
                calls_to_action,
            },
            confidence,
        ))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PoiError {
    #[error("No POIs within range ({catalog} in catalog)")]
    NoCandidates { catalog: usize },

    #[error("Top-K must be at least 1")]
    InvalidTopK,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guidance::RoutePoint;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn poi(id: &str, category: PoiCategory, x: f64, y: f64, floor: i32, priority: f64) -> Poi {
        Poi {
            id: id.into(),
            name: id.to_uppercase(),
            category,
            position: FloorPoint::new(x, y, floor),
            priority: Some(priority),
            features: None,
        }
    }

    fn sample_catalog() -> Vec<Poi> {
        vec![
            poi("cafe", PoiCategory::Restaurant, 5.0, 0.0, 1, 0.5),
            poi("shoes", PoiCategory::Store, 20.0, 0.0, 1, 0.6),
            poi("mural", PoiCategory::Exhibit, 0.0, 30.0, 1, 0.4),
            poi("upstairs-shop", PoiCategory::Store, 1.0, 1.0, 2, 0.9),
            poi("far-shop", PoiCategory::Store, 200.0, 0.0, 1, 0.9),
            poi("restroom", PoiCategory::Restroom, 10.0, 10.0, 1, 0.3),
        ]
    }

    fn input<'a>(catalog: &'a [Poi], pose: Option<FloorPoint>) -> PoiInput<'a> {
        PoiInput {
            catalog,
            pose,
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_by_floor_and_distance() {
        let catalog = sample_catalog();
        let pose = Some(FloorPoint::new(0.0, 0.0, 1));
        let ids: Vec<_> = filter_candidates(&catalog, pose, None, 50.0)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["cafe", "shoes", "mural", "restroom"]);

        let zone = ZoneRef { id: "upper".into(), floor: 2 };
        let ids: Vec<_> = filter_candidates(&catalog, None, Some(&zone), 50.0)
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["upstairs-shop"]);

        assert_eq!(filter_candidates(&catalog, None, None, 50.0).len(), catalog.len());
    }

    #[test]
    fn test_nothing_in_range_fails() {
        let catalog = vec![poi("far-shop", PoiCategory::Store, 200.0, 0.0, 1, 0.9)];
        let recognizer = PoiRecognizer::with_defaults();
        let outcome = recognizer.tick(&input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1))));
        assert!(!outcome.is_ok());
        assert_eq!(outcome.confidence(), 0.0);

        let outcome = recognizer.tick(&input(&[], None));
        assert!(!outcome.is_ok());
    }

    #[test]
    fn test_goal_ranks_first() {
        let catalog = sample_catalog();
        let goal = UserGoal {
            target_poi_id: Some("mural".into()),
            interest_categories: Vec::new(),
        };
        let recognizer = PoiRecognizer::with_defaults();
        let (result, _) = recognizer
            .recognize(&PoiInput {
                goal: Some(&goal),
                ..input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1)))
            })
            .unwrap();

        assert_eq!(result.top_pois[0].poi_id, "mural");
        assert!(result
            .calls_to_action
            .iter()
            .any(|c| c.kind == CtaKind::Navigate && c.poi_id == "mural"));
    }

    #[test]
    fn test_interest_and_route_raise_priority() {
        let config = PoiConfig::default();
        let base = PriorityFactors {
            base: 0.2,
            is_goal: false,
            on_route: false,
            interest: false,
            match_score: 0.5,
            distance_m: None,
        };
        assert_relative_eq!(blended_priority(&base, &config), 0.2 * 0.7 + 0.5 * 0.3);

        let interest = PriorityFactors { interest: true, ..base };
        assert_relative_eq!(blended_priority(&interest, &config), 0.7 * 0.7 + 0.5 * 0.3);

        let route = PriorityFactors { on_route: true, ..interest };
        assert_relative_eq!(blended_priority(&route, &config), 0.8 * 0.7 + 0.5 * 0.3);

        let near = PriorityFactors { distance_m: Some(0.0), ..route };
        assert_relative_eq!(blended_priority(&near, &config), 0.91, epsilon = 1e-12);

        let goal = PriorityFactors { is_goal: true, match_score: 1.0, ..near };
        assert_eq!(blended_priority(&goal, &config), 1.0);
    }

    #[test]
    fn test_on_route_uses_upcoming_planar_steps() {
        let config = PoiConfig::default();
        let route = Route::from_waypoints(&[
            RoutePoint::Planar(PlanarPoint::new(0.0, 0.0)),
            RoutePoint::Planar(PlanarPoint::new(10.0, 0.0)),
            RoutePoint::Planar(PlanarPoint::new(10.0, 40.0)),
            RoutePoint::Planar(PlanarPoint::new(50.0, 40.0)),
            RoutePoint::Planar(PlanarPoint::new(90.0, 40.0)),
        ])
        .unwrap();
        let shoes = poi("shoes", PoiCategory::Store, 12.0, 2.0, 1, 0.5);
        let kiosk = poi("kiosk", PoiCategory::Other, 88.0, 40.0, 1, 0.5);

        assert!(is_on_route(&shoes, &route, 0, &config));
        assert!(!is_on_route(&kiosk, &route, 0, &config));
        assert!(is_on_route(&kiosk, &route, 1, &config));
    }

    #[test]
    fn test_top_k_truncates_and_sorts() {
        let catalog = sample_catalog();
        let recognizer = PoiRecognizer::with_defaults();
        let (result, confidence) = recognizer
            .recognize(&PoiInput {
                top_k: Some(2),
                ..input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1)))
            })
            .unwrap();

        assert_eq!(result.top_pois.len(), 2);
        assert!(result.top_pois[0].score >= result.top_pois[1].score);
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[test]
    fn test_non_finite_priority_falls_back_to_default() {
        let mut catalog = sample_catalog();
        let mut broken = poi("broken", PoiCategory::Store, 8.0, 0.0, 1, 0.0);
        broken.priority = Some(f64::NAN);
        catalog.push(broken);
        catalog.push(poi("plain", PoiCategory::Store, 8.0, 0.0, 1, 0.5));

        let recognizer = PoiRecognizer::with_defaults();
        let (result, _) = recognizer
            .recognize(&PoiInput {
                top_k: Some(10),
                ..input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1)))
            })
            .unwrap();

        assert!(result.top_pois.iter().all(|p| p.score.is_finite()));
        assert!(result.top_pois.windows(2).all(|w| w[0].score >= w[1].score));
        let score_of = |id: &str| result.top_pois.iter().find(|p| p.poi_id == id).unwrap().score;
        assert_relative_eq!(score_of("broken"), score_of("plain"));
    }

    #[test]
    fn test_camera_match_scores() {
        let config = PoiConfig::default();
        let mut mural = poi("mural", PoiCategory::Exhibit, 0.0, 0.0, 1, 0.5);
        assert_eq!(camera_match_score(None, &mural, &config), 0.5);

        mural.features = Some(vec![1.0, 0.0]);
        let frame = CameraFrame {
            timestamp_ms: 0,
            features: Some(vec![-1.0, 0.0]),
            indoor_hint: None,
        };
        assert_eq!(camera_match_score(Some(&frame), &mural, &config), 0.0);

        let frame = CameraFrame {
            features: Some(vec![1.0, 0.0]),
            ..frame
        };
        assert_relative_eq!(camera_match_score(Some(&frame), &mural, &config), 1.0);
    }

    #[test]
    fn test_anchor_hint_cases() {
        let config = PoiConfig::default();
        let pose = Some(FloorPoint::new(0.0, 0.0, 1));

        let near = poi("a", PoiCategory::Store, 3.0, 4.0, 1, 0.5);
        assert_relative_eq!(anchor_hint(&near, pose, &config).unwrap(), Vector3::new(3.0, 1.5, 4.0));

        let far = poi("b", PoiCategory::Store, 30.0, 40.0, 1, 0.5);
        assert_relative_eq!(anchor_hint(&far, pose, &config).unwrap(), Vector3::new(6.0, 1.5, 8.0), epsilon = 1e-12);

        let here = poi("c", PoiCategory::Store, 0.0, 0.0, 1, 0.5);
        assert_eq!(anchor_hint(&here, pose, &config), Some(Vector3::new(0.0, 1.5, 0.0)));

        let other_floor = poi("d", PoiCategory::Store, 3.0, 4.0, 2, 0.5);
        assert_eq!(anchor_hint(&other_floor, pose, &config), None);
        assert_eq!(anchor_hint(&near, None, &config), None);
    }

    #[test]
    fn test_calls_to_action_by_category() {
        let catalog = vec![
            poi("cafe", PoiCategory::Restaurant, 1.0, 0.0, 1, 0.9),
            poi("mural", PoiCategory::Exhibit, 2.0, 0.0, 1, 0.8),
            poi("restroom", PoiCategory::Restroom, 3.0, 0.0, 1, 0.7),
        ];
        let recognizer = PoiRecognizer::with_defaults();
        let (result, _) = recognizer
            .recognize(&input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1))))
            .unwrap();

        let kinds: Vec<_> = result.calls_to_action.iter().map(|c| (c.kind, c.poi_id.as_str())).collect();
        assert_eq!(kinds, vec![(CtaKind::Enter, "cafe"), (CtaKind::ViewInfo, "mural")]);
    }

    #[test]
    fn test_zero_top_k_fails() {
        let catalog = sample_catalog();
        let recognizer = PoiRecognizer::with_defaults();
        let outcome = recognizer.tick(&PoiInput {
            top_k: Some(0),
            ..input(&catalog, None)
        });
        assert!(!outcome.is_ok());
    }

    proptest! {
        #[test]
        fn prop_top_k_bounded_and_sorted(
            k in 1usize..8,
            priorities in proptest::collection::vec(0.0f64..1.0, 1..20),
        ) {
            let catalog: Vec<Poi> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| poi(&format!("p{i}"), PoiCategory::Store, i as f64, 0.0, 1, *p))
                .collect();
            let recognizer = PoiRecognizer::with_defaults();
            let (result, confidence) = recognizer
                .recognize(&PoiInput { top_k: Some(k), ..input(&catalog, Some(FloorPoint::new(0.0, 0.0, 1))) })
                .unwrap();
            prop_assert!(result.top_pois.len() <= k);
            prop_assert!(result.top_pois.windows(2).all(|w| w[0].score >= w[1].score));
            prop_assert!((0.0..=1.0).contains(&confidence));
            for ranked in &result.top_pois {
                let anchor = ranked.anchor_hint.unwrap();
                prop_assert!(anchor.x.hypot(anchor.z) <= 10.0 + 1e-9);
            }
        }
    }
}
