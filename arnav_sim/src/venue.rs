//! The simulated venue: one building on a local floor-plan frame.
//!
//! The venue is authored in planar meters (x east, y south, origin at the
//! building's north-west corner) and projected to geographic coordinates
//! around a fixed origin for the outdoor inputs.

use arnav_core::geometry::planar_point_in_polygon;
use arnav_core::pose::{IndoorZone, Landmark};
use arnav_core::poi::FloorPoint;
use arnav_core::types::{EntryPoint, GeofenceKind};
use arnav_core::{GeoPoint, Geofence, IndoorMap, PlanarPoint, Poi, PoiCategory};

/// Meters per degree of latitude on the mean-radius sphere used by haversine.
const METERS_PER_DEGREE: f64 = 6_371_008.8 * std::f64::consts::PI / 180.0;

/// Feature dimension of the simulated camera summaries.
pub const FEATURE_DIM: usize = 8;

/// Ground truth and catalogs for one simulated building.
#[derive(Debug, Clone)]
pub struct Venue {
    /// Geographic position of planar (0, 0)
    pub origin: GeoPoint,

    /// Building outline in planar meters
    pub footprint: Vec<PlanarPoint>,

    /// Main doorway, on the footprint edge
    pub door: PlanarPoint,

    pub geofences: Vec<Geofence>,
    pub indoor_map: IndoorMap,
    pub catalog: Vec<Poi>,
}

impl Venue {
    /// A two-level mall, 60 m x 40 m, with its door on the south wall.
    pub fn demo_mall() -> Self {
        let origin = GeoPoint::new(37.5100, 127.0200);
        let footprint = rect(0.0, 0.0, 60.0, 40.0);
        let door = PlanarPoint::new(30.0, 40.0);

        let mut venue = Self {
            origin,
            footprint: footprint.clone(),
            door,
            geofences: Vec::new(),
            indoor_map: IndoorMap::default(),
            catalog: Vec::new(),
        };

        venue.geofences = vec![Geofence {
            id: "mall".into(),
            name: "Riverside Mall".into(),
            kind: GeofenceKind::Building,
            polygon: footprint.iter().map(|p| venue.to_geo(*p)).collect(),
            floor: Some(0),
            entry_points: vec![EntryPoint {
                id: "south_door".into(),
                name: "South Entrance".into(),
                position: venue.to_geo(door),
            }],
        }];

        venue.indoor_map = IndoorMap {
            zones: vec![
                IndoorZone {
                    id: "atrium".into(),
                    name: "Atrium".into(),
                    floor: 0,
                    polygon: rect(0.0, 0.0, 40.0, 40.0),
                    landmarks: vec![landmark("fountain", "Fountain", 20.0, 20.0, FOUNTAIN)],
                },
                IndoorZone {
                    id: "east_wing".into(),
                    name: "East Wing".into(),
                    floor: 0,
                    polygon: rect(40.0, 0.0, 60.0, 40.0),
                    landmarks: vec![landmark("directory", "Mall Directory", 50.0, 10.0, DIRECTORY)],
                },
                IndoorZone {
                    id: "upper_level".into(),
                    name: "Upper Level".into(),
                    floor: 1,
                    polygon: rect(0.0, 0.0, 60.0, 40.0),
                    landmarks: Vec::new(),
                },
            ],
        };

        venue.catalog = vec![
            poi("cafe", "Corner Cafe", PoiCategory::Restaurant, 34.0, 30.0, 0, Some(0.6), Some(CAFE)),
            poi("bookstore", "Page Turner Books", PoiCategory::Store, 12.0, 14.0, 0, None, None),
            poi("gallery", "Harbor Gallery", PoiCategory::Exhibit, 46.0, 30.0, 0, None, Some(GALLERY)),
            poi("restroom", "Restrooms", PoiCategory::Restroom, 5.0, 35.0, 0, Some(0.3), None),
            poi("main_exit", "South Exit", PoiCategory::Exit, 30.0, 38.0, 0, None, None),
            poi("escalator_east", "East Escalator", PoiCategory::Escalator, 56.0, 20.0, 0, None, None),
            poi("sky_lounge", "Sky Lounge", PoiCategory::Restaurant, 55.0, 20.0, 1, Some(0.7), None),
        ];

        venue
    }

    /// Project a planar point to geographic coordinates.
    pub fn to_geo(&self, p: PlanarPoint) -> GeoPoint {
        let lat = self.origin.lat - p.y / METERS_PER_DEGREE;
        let lng = self.origin.lng + p.x / (METERS_PER_DEGREE * self.origin.lat.to_radians().cos());
        GeoPoint::new(lat, lng)
    }

    /// Whether a planar point is inside the building.
    pub fn is_inside(&self, p: PlanarPoint) -> bool {
        planar_point_in_polygon(p, &self.footprint)
    }

    /// Every landmark of every zone.
    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.indoor_map.zones.iter().flat_map(|z| z.landmarks.iter())
    }

    pub fn poi(&self, id: &str) -> Option<&Poi> {
        self.catalog.iter().find(|p| p.id == id)
    }
}

/// Convert a planar heading (0° along +x, clockwise) to a compass heading.
pub fn compass_heading(planar_deg: f64) -> f64 {
    (planar_deg + 90.0).rem_euclid(360.0)
}

// Appearance signatures
const FOUNTAIN: [f32; FEATURE_DIM] = [0.9, 0.2, 0.0, 0.0, 0.5, 0.0, 0.0, 0.1];
const DIRECTORY: [f32; FEATURE_DIM] = [0.0, 0.0, 1.0, 0.3, 0.0, 0.6, 0.0, 0.0];
const CAFE: [f32; FEATURE_DIM] = [0.1, 0.8, 0.0, 0.0, 0.0, 0.0, 0.7, 0.2];
const GALLERY: [f32; FEATURE_DIM] = [0.0, 0.0, 0.2, 0.9, 0.1, 0.0, 0.0, 0.6];

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<PlanarPoint> {
    vec![
        PlanarPoint::new(x0, y0),
        PlanarPoint::new(x1, y0),
        PlanarPoint::new(x1, y1),
        PlanarPoint::new(x0, y1),
    ]
}

fn landmark(id: &str, name: &str, x: f64, y: f64, features: [f32; FEATURE_DIM]) -> Landmark {
    Landmark {
        id: id.into(),
        name: name.into(),
        position: PlanarPoint::new(x, y),
        floor: None,
        features: Some(features.to_vec()),
    }
}

#[allow(clippy::too_many_arguments)]
fn poi(
    id: &str,
    name: &str,
    category: PoiCategory,
    x: f64,
    y: f64,
    floor: i32,
    priority: Option<f64>,
    features: Option<[f32; FEATURE_DIM]>,
) -> Poi {
    Poi {
        id: id.into(),
        name: name.into(),
        category,
        position: FloorPoint::new(x, y, floor),
        priority,
        features: features.map(|f| f.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use arnav_core::geometry::{geo_point_in_polygon, haversine_distance, initial_bearing, planar_bearing};

    #[test]
    fn test_projection_preserves_distance() {
        let venue = Venue::demo_mall();
        let a = PlanarPoint::new(0.0, 0.0);
        let b = PlanarPoint::new(30.0, 40.0);
        let d = haversine_distance(venue.to_geo(a), venue.to_geo(b));
        assert_relative_eq!(d, 50.0, epsilon = 0.1);
    }

    #[test]
    fn test_compass_heading_matches_projection() {
        let venue = Venue::demo_mall();
        let a = PlanarPoint::new(10.0, 10.0);
        for b in [PlanarPoint::new(20.0, 10.0), PlanarPoint::new(10.0, 20.0), PlanarPoint::new(0.0, 10.0)] {
            let planar = planar_bearing(a, b);
            let geo = initial_bearing(venue.to_geo(a), venue.to_geo(b));
            let diff = (compass_heading(planar) - geo + 540.0).rem_euclid(360.0) - 180.0;
            assert!(diff.abs() < 0.1, "planar {planar} geo {geo}");
        }
    }

    #[test]
    fn test_geofence_matches_footprint() {
        let venue = Venue::demo_mall();
        let fence = &venue.geofences[0];
        let inside = venue.to_geo(PlanarPoint::new(30.0, 20.0));
        let outside = venue.to_geo(PlanarPoint::new(30.0, 60.0));

        assert!(geo_point_in_polygon(inside, &fence.polygon));
        assert!(!geo_point_in_polygon(outside, &fence.polygon));
        assert!(venue.is_inside(PlanarPoint::new(30.0, 20.0)));
        assert!(!venue.is_inside(PlanarPoint::new(30.0, 60.0)));
    }

    #[test]
    fn test_zones_cover_ground_floor() {
        let venue = Venue::demo_mall();
        let atrium = venue.indoor_map.zone_at(PlanarPoint::new(20.0, 20.0), 0);
        let wing = venue.indoor_map.zone_at(PlanarPoint::new(50.0, 20.0), 0);
        assert_eq!(atrium.map(|z| z.id.as_str()), Some("atrium"));
        assert_eq!(wing.map(|z| z.id.as_str()), Some("east_wing"));
        assert_eq!(venue.landmarks().count(), 2);
    }

    #[test]
    fn test_catalog_lookup() {
        let venue = Venue::demo_mall();
        assert_eq!(venue.poi("sky_lounge").map(|p| p.position.floor), Some(1));
        assert!(venue.poi("missing").is_none());
    }
}
