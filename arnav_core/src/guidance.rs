//! Unit C: route to next-action guidance.
//!
//! Picks the route step nearest the user, turns it into one discrete
//! micro-instruction for the next few seconds, and places an AR anchor a
//! few meters ahead along the user's heading. A short action history damps
//! flapping between actions and smooths the anchor.
//!
//! Headings in both frames increase clockwise (compass outdoors, image-axis
//! floor plans indoors), so a positive heading difference is a right turn.

use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::{haversine_distance, initial_bearing, normalize_angle, planar_bearing, planar_distance};
use crate::types::{GeoPoint, PlanarPoint, UnitOutcome};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Heading differences below this go straight (default: 30°)
    pub straight_threshold_deg: f64,

    /// Differences above this are treated as a reversal (default: 150°)
    pub reversal_threshold_deg: f64,

    /// Structural hints closer than this take precedence (default: 5 m)
    pub structural_radius_m: f64,

    pub directional_confidence: f64,
    pub reversal_confidence: f64,
    pub escalator_confidence: f64,
    pub elevator_confidence: f64,
    pub stairs_confidence: f64,
    pub doorway_confidence: f64,

    /// Multiplier when no route point shares the pose's frame (default: 0.5)
    pub unmatched_frame_penalty: f64,

    /// Recent actions consulted for the majority check (default: 5)
    pub smoothing_window: usize,

    /// Actions retained in history (default: 10)
    pub history_len: usize,

    /// Consecutive ticks the previous action may be re-emitted (default: 3)
    pub max_hold_ticks: u32,

    /// Confidence multiplier for a re-emitted action (default: 0.9)
    pub hold_decay: f64,

    /// Floor for a re-emitted action's confidence (default: 0.5)
    pub hold_floor: f64,

    /// Share of the previous anchor kept when blending (default: 0.7)
    pub anchor_retain: f64,

    pub anchor_min_m: f64,
    pub anchor_max_m: f64,

    /// Anchor height above the ground (default: 1.5 m)
    pub eye_level_m: f64,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            straight_threshold_deg: 30.0,
            reversal_threshold_deg: 150.0,
            structural_radius_m: 5.0,
            directional_confidence: 0.8,
            reversal_confidence: 0.7,
            escalator_confidence: 0.9,
            elevator_confidence: 0.9,
            stairs_confidence: 0.8,
            doorway_confidence: 0.8,
            unmatched_frame_penalty: 0.5,
            smoothing_window: 5,
            history_len: 10,
            max_hold_ticks: 3,
            hold_decay: 0.9,
            hold_floor: 0.5,
            anchor_retain: 0.7,
            anchor_min_m: 3.0,
            anchor_max_m: 10.0,
            eye_level_m: 1.5,
        }
    }
}

// ============================================================================
// ROUTE
// ============================================================================

/// A route vertex in either frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum RoutePoint {
    Geo(GeoPoint),
    Planar(PlanarPoint),
}

impl RoutePoint {
    /// Distance in meters, or `None` when the frames differ.
    pub fn distance_to(&self, other: &RoutePoint) -> Option<f64> {
        match (self, other) {
            (RoutePoint::Geo(a), RoutePoint::Geo(b)) => Some(haversine_distance(*a, *b)),
            (RoutePoint::Planar(a), RoutePoint::Planar(b)) => Some(planar_distance(*a, *b)),
            _ => None,
        }
    }

    pub fn bearing_to(&self, other: &RoutePoint) -> Option<f64> {
        match (self, other) {
            (RoutePoint::Geo(a), RoutePoint::Geo(b)) => Some(initial_bearing(*a, *b)),
            (RoutePoint::Planar(a), RoutePoint::Planar(b)) => Some(planar_bearing(*a, *b)),
            _ => None,
        }
    }

    pub fn as_planar(&self) -> Option<PlanarPoint> {
        match self {
            RoutePoint::Planar(p) => Some(*p),
            RoutePoint::Geo(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub distance_m: f64,
    pub instruction: String,
    pub start: RoutePoint,
    pub end: RoutePoint,

    /// Direction of travel along the step, degrees in [0, 360)
    pub bearing_deg: f64,
}

/// Ordered pedestrian route. Outdoor legs use geo points, indoor legs use
/// floor-plan points; a route may mix both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

impl Route {
    pub fn new(steps: Vec<RouteStep>) -> Self {
        Self { steps }
    }

    /// Build a route from a polyline, one step per segment.
    pub fn from_waypoints(points: &[RoutePoint]) -> Result<Self, GuidanceError> {
        if points.len() < 2 {
            return Err(GuidanceError::TooFewWaypoints(points.len()));
        }

        let mut steps = Vec::with_capacity(points.len() - 1);
        for (i, pair) in points.windows(2).enumerate() {
            let (start, end) = (pair[0], pair[1]);
            let (Some(distance_m), Some(bearing_deg)) = (start.distance_to(&end), start.bearing_to(&end))
            else {
                return Err(GuidanceError::MixedFrames(i));
            };
            steps.push(RouteStep {
                distance_m,
                instruction: format!("Walk {:.0} m heading {:.0}°", distance_m, bearing_deg),
                start,
                end,
                bearing_deg,
            });
        }
        Ok(Self { steps })
    }

    /// Append another route's steps, e.g. an indoor leg after an outdoor one.
    pub fn extend(&mut self, other: Route) {
        self.steps.extend(other.steps);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn total_distance_m(&self) -> f64 {
        self.steps.iter().map(|s| s.distance_m).sum()
    }
}

// ============================================================================
// POSE & HINTS
// ============================================================================

/// The user's current pose as seen by guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum CurrentPose {
    Outdoor {
        position: GeoPoint,
        heading_deg: Option<f64>,
    },
    Indoor {
        position: PlanarPoint,
        floor: i32,
        heading_deg: f64,
    },
}

impl CurrentPose {
    pub fn as_route_point(&self) -> RoutePoint {
        match self {
            CurrentPose::Outdoor { position, .. } => RoutePoint::Geo(*position),
            CurrentPose::Indoor { position, .. } => RoutePoint::Planar(*position),
        }
    }

    pub fn heading(&self) -> Option<f64> {
        match self {
            CurrentPose::Outdoor { heading_deg, .. } => *heading_deg,
            CurrentPose::Indoor { heading_deg, .. } => Some(*heading_deg),
        }
    }

    pub fn floor(&self) -> Option<i32> {
        match self {
            CurrentPose::Outdoor { .. } => None,
            CurrentPose::Indoor { floor, .. } => Some(*floor),
        }
    }

    pub fn distance_to(&self, point: &RoutePoint) -> Option<f64> {
        self.as_route_point().distance_to(point)
    }

    fn is_finite(&self) -> bool {
        match self {
            CurrentPose::Outdoor { position, heading_deg } => {
                position.is_finite() && heading_deg.map_or(true, f64::is_finite)
            }
            CurrentPose::Indoor { position, heading_deg, .. } => position.is_finite() && heading_deg.is_finite(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralKind {
    Escalator,
    Elevator,
    Stairs,
    Exit,
    Entrance,
}

/// A nearby structural feature (floor change or doorway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralHint {
    pub kind: StructuralKind,
    pub position: RoutePoint,

    /// Floor the feature leads to, when known
    #[serde(default)]
    pub floor: Option<i32>,

    /// Distance from the user in meters
    pub distance_m: f64,
}

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuidanceAction {
    GoStraight,
    TurnLeft,
    TurnRight,
    TakeEscalator,
    TakeElevator,
    GoUpstairs,
    GoDownstairs,
    Enter,
    Exit,
    /// Reserved for hosts; never produced by the generator
    Wait,
}

impl std::fmt::Display for GuidanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GuidanceAction::GoStraight => "GO_STRAIGHT",
            GuidanceAction::TurnLeft => "TURN_LEFT",
            GuidanceAction::TurnRight => "TURN_RIGHT",
            GuidanceAction::TakeEscalator => "TAKE_ESCALATOR",
            GuidanceAction::TakeElevator => "TAKE_ELEVATOR",
            GuidanceAction::GoUpstairs => "GO_UPSTAIRS",
            GuidanceAction::GoDownstairs => "GO_DOWNSTAIRS",
            GuidanceAction::Enter => "ENTER",
            GuidanceAction::Exit => "EXIT",
            GuidanceAction::Wait => "WAIT",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGuidance {
    pub action: GuidanceAction,
    pub distance_to_action_m: f64,
    pub confidence: f64,

    /// Overlay offset relative to the user: (ahead-x, height, ahead-z)
    pub anchor: Option<Vector3<f64>>,

    pub description: Option<String>,
    pub step_index: usize,
    pub remaining_distance_m: f64,
}

/// Per-tick input to the generator.
#[derive(Debug, Clone, Copy)]
pub struct GuidanceInput<'a> {
    pub route: &'a Route,
    pub pose: &'a CurrentPose,
    pub is_indoor: bool,
    pub hints: &'a [StructuralHint],
}

// ============================================================================
// DECISION HELPERS
// ============================================================================

/// Index of the step owning the endpoint nearest the pose, with its distance.
///
/// Only endpoints in the pose's frame are considered. When a step's end and
/// the next step's start coincide, the later step wins.
pub fn nearest_step(pose: &CurrentPose, route: &Route) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, step) in route.steps.iter().enumerate() {
        if let Some(d) = pose.distance_to(&step.start) {
            if best.map_or(true, |(_, b)| d <= b) {
                best = Some((i, d));
            }
        }
        if let Some(d) = pose.distance_to(&step.end) {
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((i, d));
            }
        }
    }
    best
}

/// Map a signed heading difference to a directional action and confidence.
pub fn directional_action(diff_deg: f64, config: &GuidanceConfig) -> (GuidanceAction, f64) {
    let magnitude = diff_deg.abs();
    let turn = if diff_deg >= 0.0 {
        GuidanceAction::TurnRight
    } else {
        GuidanceAction::TurnLeft
    };

    if magnitude < config.straight_threshold_deg {
        (GuidanceAction::GoStraight, config.directional_confidence)
    } else if magnitude <= config.reversal_threshold_deg {
        (turn, config.directional_confidence)
    } else {
        (turn, config.reversal_confidence)
    }
}

/// Point `distance_m` ahead along `heading_deg`, clamped to the anchor
/// range, at eye level.
pub fn anchor_ahead(heading_deg: f64, distance_m: f64, config: &GuidanceConfig) -> Vector3<f64> {
    let d = distance_m.clamp(config.anchor_min_m, config.anchor_max_m);
    let h = heading_deg.to_radians();
    Vector3::new(h.cos() * d, config.eye_level_m, h.sin() * d)
}

/// Distance to the end of `step_index` plus every later step.
pub fn remaining_distance(pose: &CurrentPose, route: &Route, step_index: usize) -> f64 {
    let Some(step) = route.steps.get(step_index) else {
        return 0.0;
    };
    let to_end = pose.distance_to(&step.end).unwrap_or(step.distance_m);
    to_end + route.steps[step_index + 1..].iter().map(|s| s.distance_m).sum::<f64>()
}

struct Decision {
    action: GuidanceAction,
    confidence: f64,
    distance_m: f64,
    description: String,
}

fn structural_decision(
    input: &GuidanceInput<'_>,
    target: &RoutePoint,
    config: &GuidanceConfig,
) -> Option<Decision> {
    let radius = config.structural_radius_m;
    let near = |kind: StructuralKind| {
        input
            .hints
            .iter()
            .find(|h| h.kind == kind && h.distance_m < radius)
    };
    // Doorways only count when the route actually passes through them
    let on_route = |h: &&StructuralHint| h.position.distance_to(target).map_or(false, |d| d < radius);

    if !input.is_indoor {
        return near(StructuralKind::Entrance).filter(on_route).map(|h| Decision {
            action: GuidanceAction::Enter,
            confidence: config.doorway_confidence,
            distance_m: h.distance_m,
            description: "Enter the building".into(),
        });
    }

    if let Some(h) = near(StructuralKind::Escalator) {
        return Some(Decision {
            action: GuidanceAction::TakeEscalator,
            confidence: config.escalator_confidence,
            distance_m: h.distance_m,
            description: "Take the escalator".into(),
        });
    }
    if let Some(h) = near(StructuralKind::Elevator) {
        return Some(Decision {
            action: GuidanceAction::TakeElevator,
            confidence: config.elevator_confidence,
            distance_m: h.distance_m,
            description: "Take the elevator".into(),
        });
    }
    // Stairs go both ways, so they need a known target floor
    let stairs = near(StructuralKind::Stairs).and_then(|h| {
        let target = h.floor?;
        let current = input.pose.floor()?;
        (target != current).then_some((h, target > current))
    });
    if let Some((h, up)) = stairs {
        return Some(Decision {
            action: if up { GuidanceAction::GoUpstairs } else { GuidanceAction::GoDownstairs },
            confidence: config.stairs_confidence,
            distance_m: h.distance_m,
            description: if up { "Take the stairs up" } else { "Take the stairs down" }.into(),
        });
    }
    near(StructuralKind::Exit).filter(on_route).map(|h| Decision {
        action: GuidanceAction::Exit,
        confidence: config.doorway_confidence,
        distance_m: h.distance_m,
        description: "Exit the building".into(),
    })
}

// ============================================================================
// GENERATOR
// ============================================================================

pub struct GuidanceGenerator {
    config: GuidanceConfig,
    last: Option<ActionGuidance>,
    history: VecDeque<GuidanceAction>,
    hold_streak: u32,
}

impl GuidanceGenerator {
    pub fn new(config: GuidanceConfig) -> Self {
        Self {
            config,
            last: None,
            history: VecDeque::new(),
            hold_streak: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(GuidanceConfig::default())
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn last_guidance(&self) -> Option<&ActionGuidance> {
        self.last.as_ref()
    }

    pub fn initialize(&mut self) {
        self.last = None;
        self.history.clear();
        self.hold_streak = 0;
    }

    pub fn cleanup(&mut self) {
        self.history.clear();
        self.history.shrink_to_fit();
        self.hold_streak = 0;
    }

    pub fn tick(&mut self, input: &GuidanceInput<'_>) -> UnitOutcome<ActionGuidance> {
        match self.generate(input) {
            Ok(guidance) => {
                let confidence = guidance.confidence;
                UnitOutcome::ok(guidance, confidence)
            }
            Err(e) => {
                warn!(error = %e, "Action guidance failed");
                UnitOutcome::failed(e.to_string())
            }
        }
    }

    pub fn generate(&mut self, input: &GuidanceInput<'_>) -> Result<ActionGuidance, GuidanceError> {
        if input.route.is_empty() {
            return Err(GuidanceError::EmptyRoute);
        }
        if !input.pose.is_finite() {
            return Err(GuidanceError::InvalidPose);
        }

        let (step_index, matched) = match nearest_step(input.pose, input.route) {
            Some((i, _)) => (i, true),
            None => (0, false),
        };
        let step = &input.route.steps[step_index];
        let target = step.end;
        // Without a heading, assume the user faces along the route
        let heading = input.pose.heading().unwrap_or(step.bearing_deg);

        let decision = structural_decision(input, &target, &self.config).unwrap_or_else(|| {
            let diff = normalize_angle(step.bearing_deg - heading);
            let (action, confidence) = directional_action(diff, &self.config);
            let description = match action {
                GuidanceAction::GoStraight => format!("Go straight for {:.0} m", step.distance_m),
                _ if diff.abs() > self.config.reversal_threshold_deg => "Turn around".to_string(),
                GuidanceAction::TurnRight => "Turn right".to_string(),
                _ => "Turn left".to_string(),
            };
            Decision {
                action,
                confidence,
                distance_m: input.pose.distance_to(&target).unwrap_or(0.0),
                description,
            }
        });

        let confidence = if matched {
            decision.confidence
        } else {
            decision.confidence * self.config.unmatched_frame_penalty
        };

        let fresh = ActionGuidance {
            action: decision.action,
            distance_to_action_m: decision.distance_m,
            confidence,
            anchor: Some(anchor_ahead(heading, decision.distance_m, &self.config)),
            description: Some(decision.description),
            step_index,
            remaining_distance_m: remaining_distance(input.pose, input.route, step_index),
        };

        let emitted = self.smooth(fresh);
        debug!(
            action = %emitted.action,
            step = emitted.step_index,
            distance = emitted.distance_to_action_m,
            "Guidance emitted"
        );

        self.last = Some(emitted.clone());
        self.history.push_back(emitted.action);
        while self.history.len() > self.config.history_len {
            self.history.pop_front();
        }
        Ok(emitted)
    }

    fn smooth(&mut self, mut fresh: ActionGuidance) -> ActionGuidance {
        let Some(prev) = &self.last else {
            return fresh;
        };

        if fresh.action != prev.action && self.history.len() > 2 {
            let window = self.config.smoothing_window;
            let support = self
                .history
                .iter()
                .rev()
                .take(window)
                .filter(|&&a| a == fresh.action)
                .count();
            if (support as f64) < window as f64 / 2.0 && self.hold_streak < self.config.max_hold_ticks {
                self.hold_streak += 1;
                let mut held = prev.clone();
                held.confidence = (prev.confidence * self.config.hold_decay).max(self.config.hold_floor);
                debug!(candidate = %fresh.action, held = %held.action, "Holding previous action");
                return held;
            }
        }
        self.hold_streak = 0;

        if let (Some(old), Some(new)) = (prev.anchor, fresh.anchor) {
            fresh.anchor = Some(old + (new - old) * (1.0 - self.config.anchor_retain));
        }
        fresh
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum GuidanceError {
    #[error("No route steps available")]
    EmptyRoute,

    #[error("Current pose has non-finite coordinates")]
    InvalidPose,

    #[error("A route needs at least two waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("Waypoint {0} and its successor are in different frames")]
    MixedFrames(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn planar(x: f64, y: f64) -> RoutePoint {
        RoutePoint::Planar(PlanarPoint::new(x, y))
    }

    fn indoor(x: f64, y: f64, heading: f64) -> CurrentPose {
        CurrentPose::Indoor {
            position: PlanarPoint::new(x, y),
            floor: 1,
            heading_deg: heading,
        }
    }

    fn corridor() -> Route {
        Route::from_waypoints(&[planar(0.0, 0.0), planar(10.0, 0.0), planar(10.0, 10.0), planar(20.0, 10.0)]).unwrap()
    }

    fn run(generator: &mut GuidanceGenerator, route: &Route, pose: &CurrentPose) -> ActionGuidance {
        let input = GuidanceInput {
            route,
            pose,
            is_indoor: matches!(pose, CurrentPose::Indoor { .. }),
            hints: &[],
        };
        generator.generate(&input).unwrap()
    }

    #[test]
    fn test_empty_route_fails() {
        let mut generator = GuidanceGenerator::with_defaults();
        let route = Route::default();
        let pose = indoor(0.0, 0.0, 0.0);
        let input = GuidanceInput {
            route: &route,
            pose: &pose,
            is_indoor: true,
            hints: &[],
        };
        let outcome = generator.tick(&input);
        assert!(!outcome.is_ok());
        assert_eq!(outcome.confidence(), 0.0);
    }

    #[test]
    fn test_straight_along_outdoor_step() {
        let p1 = GeoPoint::new(37.5000, 127.0000);
        let p2 = GeoPoint::new(37.5000, 127.0010);
        let route = Route::new(vec![RouteStep {
            distance_m: haversine_distance(p1, p2),
            instruction: "Head east".into(),
            start: RoutePoint::Geo(p1),
            end: RoutePoint::Geo(p2),
            bearing_deg: 90.0,
        }]);
        let pose = CurrentPose::Outdoor {
            position: p1,
            heading_deg: Some(90.0),
        };

        let mut generator = GuidanceGenerator::with_defaults();
        let g = run(&mut generator, &route, &pose);
        assert_eq!(g.action, GuidanceAction::GoStraight);
        assert_relative_eq!(g.distance_to_action_m, haversine_distance(p1, p2), epsilon = 1e-6);
        assert_relative_eq!(g.confidence, 0.8);
    }

    #[test]
    fn test_turn_direction_follows_sign() {
        let route = Route::from_waypoints(&[planar(0.0, 0.0), planar(0.0, 10.0)]).unwrap();
        assert_relative_eq!(route.steps[0].bearing_deg, 90.0);

        let cases = [
            (0.0, GuidanceAction::TurnRight, 0.8),
            (180.0, GuidanceAction::TurnLeft, 0.8),
            (80.0, GuidanceAction::GoStraight, 0.8),
            (280.0, GuidanceAction::TurnRight, 0.7),
            (260.0, GuidanceAction::TurnLeft, 0.7),
        ];
        for (heading, expected, confidence) in cases {
            let mut generator = GuidanceGenerator::with_defaults();
            let g = run(&mut generator, &route, &indoor(0.0, 0.0, heading));
            assert_eq!(g.action, expected, "heading {heading}");
            assert_relative_eq!(g.confidence, confidence);
        }
    }

    #[test]
    fn test_escalator_preferred_over_elevator() {
        let route = corridor();
        let pose = indoor(1.0, 0.0, 0.0);
        let hints = vec![
            StructuralHint {
                kind: StructuralKind::Elevator,
                position: planar(2.0, 0.0),
                floor: Some(2),
                distance_m: 1.0,
            },
            StructuralHint {
                kind: StructuralKind::Escalator,
                position: planar(4.0, 0.0),
                floor: Some(2),
                distance_m: 3.0,
            },
        ];
        let input = GuidanceInput {
            route: &route,
            pose: &pose,
            is_indoor: true,
            hints: &hints,
        };
        let mut generator = GuidanceGenerator::with_defaults();
        let g = generator.generate(&input).unwrap();
        assert_eq!(g.action, GuidanceAction::TakeEscalator);
        assert_relative_eq!(g.confidence, 0.9);
        assert_relative_eq!(g.distance_to_action_m, 3.0);
    }

    #[test]
    fn test_stairs_direction_from_floor() {
        let route = corridor();
        let pose = indoor(1.0, 0.0, 0.0);
        for (floor, expected) in [(Some(2), GuidanceAction::GoUpstairs), (Some(0), GuidanceAction::GoDownstairs)] {
            let hints = vec![StructuralHint {
                kind: StructuralKind::Stairs,
                position: planar(3.0, 0.0),
                floor,
                distance_m: 2.0,
            }];
            let input = GuidanceInput {
                route: &route,
                pose: &pose,
                is_indoor: true,
                hints: &hints,
            };
            let mut generator = GuidanceGenerator::with_defaults();
            assert_eq!(generator.generate(&input).unwrap().action, expected);
        }
    }

    #[test]
    fn test_stairs_without_target_floor_are_ignored() {
        let route = corridor();
        let pose = indoor(1.0, 0.0, 0.0);
        for floor in [None, Some(1)] {
            let hints = vec![StructuralHint {
                kind: StructuralKind::Stairs,
                position: planar(3.0, 0.0),
                floor,
                distance_m: 2.0,
            }];
            let input = GuidanceInput {
                route: &route,
                pose: &pose,
                is_indoor: true,
                hints: &hints,
            };
            let mut generator = GuidanceGenerator::with_defaults();
            assert_eq!(generator.generate(&input).unwrap().action, GuidanceAction::GoStraight);
        }
    }

    #[test]
    fn test_structural_hints_ignored_outdoors_and_far_away() {
        let route = corridor();
        let pose = indoor(1.0, 0.0, 0.0);
        let near_escalator = vec![StructuralHint {
            kind: StructuralKind::Escalator,
            position: planar(2.0, 0.0),
            floor: Some(2),
            distance_m: 1.0,
        }];
        let input = GuidanceInput {
            route: &route,
            pose: &pose,
            is_indoor: false,
            hints: &near_escalator,
        };
        let mut generator = GuidanceGenerator::with_defaults();
        assert_eq!(generator.generate(&input).unwrap().action, GuidanceAction::GoStraight);

        let far_escalator = vec![StructuralHint {
            distance_m: 8.0,
            ..near_escalator[0].clone()
        }];
        let input = GuidanceInput {
            route: &route,
            pose: &pose,
            is_indoor: true,
            hints: &far_escalator,
        };
        let mut generator = GuidanceGenerator::with_defaults();
        assert_eq!(generator.generate(&input).unwrap().action, GuidanceAction::GoStraight);
    }

    #[test]
    fn test_enter_at_entrance_on_route() {
        let door = GeoPoint::new(37.50090, 127.00050);
        let start = GeoPoint::new(37.50120, 127.00050);
        let route = Route::from_waypoints(&[RoutePoint::Geo(start), RoutePoint::Geo(door)]).unwrap();
        let pose = CurrentPose::Outdoor {
            position: GeoPoint::new(37.50092, 127.00050),
            heading_deg: Some(180.0),
        };
        let hints = vec![StructuralHint {
            kind: StructuralKind::Entrance,
            position: RoutePoint::Geo(door),
            floor: None,
            distance_m: pose.distance_to(&RoutePoint::Geo(door)).unwrap(),
        }];
        let input = GuidanceInput {
            route: &route,
            pose: &pose,
            is_indoor: false,
            hints: &hints,
        };
        let mut generator = GuidanceGenerator::with_defaults();
        let g = generator.generate(&input).unwrap();
        assert_eq!(g.action, GuidanceAction::Enter);
        assert!(g.distance_to_action_m < 5.0);
    }

    #[test]
    fn test_identical_ticks_are_deterministic() {
        let route = corridor();
        let pose = indoor(2.0, 0.5, 10.0);
        let mut generator = GuidanceGenerator::with_defaults();
        let first = run(&mut generator, &route, &pose);
        let second = run(&mut generator, &route, &pose);
        assert_eq!(first.action, second.action);
        assert_eq!(first.anchor, second.anchor);
        assert_eq!(first, second);
    }

    #[test]
    fn test_flapping_action_is_held_then_released() {
        let route = Route::from_waypoints(&[planar(0.0, 0.0), planar(20.0, 0.0)]).unwrap();
        let mut generator = GuidanceGenerator::with_defaults();

        for _ in 0..4 {
            let g = run(&mut generator, &route, &indoor(1.0, 0.0, 0.0));
            assert_eq!(g.action, GuidanceAction::GoStraight);
        }

        // Heading swings 90° left of the route: the fresh action is a right turn
        let mut held_confidence = 0.8;
        for _ in 0..3 {
            let g = run(&mut generator, &route, &indoor(1.0, 0.0, 270.0));
            assert_eq!(g.action, GuidanceAction::GoStraight);
            held_confidence = f64::max(held_confidence * 0.9, 0.5);
            assert_relative_eq!(g.confidence, held_confidence, epsilon = 1e-12);
        }

        // Holding is bounded; the persistent change gets through
        let g = run(&mut generator, &route, &indoor(1.0, 0.0, 270.0));
        assert_eq!(g.action, GuidanceAction::TurnRight);
        let g = run(&mut generator, &route, &indoor(1.0, 0.0, 270.0));
        assert_eq!(g.action, GuidanceAction::TurnRight);
    }

    #[test]
    fn test_anchor_blends_toward_new_position() {
        let route = Route::from_waypoints(&[planar(0.0, 0.0), planar(20.0, 0.0)]).unwrap();
        let mut generator = GuidanceGenerator::with_defaults();

        let first = run(&mut generator, &route, &indoor(0.0, 0.0, 0.0));
        let a = first.anchor.unwrap();
        assert_relative_eq!(a, Vector3::new(10.0, 1.5, 0.0), epsilon = 1e-9);

        let second = run(&mut generator, &route, &indoor(0.0, 0.0, 20.0));
        let fresh = anchor_ahead(20.0, second.distance_to_action_m, generator.config());
        let expected = a * 0.7 + fresh * 0.3;
        assert_relative_eq!(second.anchor.unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_unmatched_frame_degrades_confidence() {
        let route = Route::from_waypoints(&[
            RoutePoint::Geo(GeoPoint::new(37.5, 127.0)),
            RoutePoint::Geo(GeoPoint::new(37.5, 127.001)),
        ])
        .unwrap();
        let mut generator = GuidanceGenerator::with_defaults();
        let g = run(&mut generator, &route, &indoor(0.0, 0.0, route.steps[0].bearing_deg));
        assert_eq!(g.step_index, 0);
        assert_eq!(g.distance_to_action_m, 0.0);
        assert_relative_eq!(g.confidence, 0.4);
    }

    #[test]
    fn test_remaining_distance_and_step_advance() {
        let route = corridor();
        let mut generator = GuidanceGenerator::with_defaults();

        let g = run(&mut generator, &route, &indoor(0.0, 0.0, 0.0));
        assert_eq!(g.step_index, 0);
        assert_relative_eq!(g.remaining_distance_m, 30.0, epsilon = 1e-9);

        // Standing on the first corner advances to the second step
        let (index, _) = nearest_step(&indoor(10.0, 0.0, 90.0), &route).unwrap();
        assert_eq!(index, 1);
        assert_relative_eq!(remaining_distance(&indoor(10.0, 0.0, 90.0), &route, 1), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mixed_waypoints_rejected() {
        let err = Route::from_waypoints(&[planar(0.0, 0.0), RoutePoint::Geo(GeoPoint::new(1.0, 1.0))]);
        assert!(matches!(err, Err(GuidanceError::MixedFrames(0))));
        assert!(matches!(Route::from_waypoints(&[planar(0.0, 0.0)]), Err(GuidanceError::TooFewWaypoints(1))));
    }

    proptest! {
        #[test]
        fn prop_anchor_within_range(heading in 0.0f64..360.0, distance in 0.0f64..500.0) {
            let config = GuidanceConfig::default();
            let anchor = anchor_ahead(heading, distance, &config);
            let horizontal = anchor.x.hypot(anchor.z);
            prop_assert!(horizontal >= 3.0 - 1e-9 && horizontal <= 10.0 + 1e-9);
            prop_assert_eq!(anchor.y, 1.5);
        }

        #[test]
        fn prop_directional_action_is_symmetric(diff in 0.0f64..180.0) {
            let config = GuidanceConfig::default();
            let (right, c1) = directional_action(diff, &config);
            let (left, c2) = directional_action(-diff, &config);
            prop_assert_eq!(c1, c2);
            if diff < 30.0 {
                prop_assert_eq!(right, GuidanceAction::GoStraight);
                prop_assert_eq!(left, GuidanceAction::GoStraight);
            } else {
                prop_assert_eq!(right, GuidanceAction::TurnRight);
                prop_assert_eq!(left, GuidanceAction::TurnLeft);
            }
        }
    }
}
