#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry utilities for the clustering pipeline.
//!
//! Buffering works on a geodesic approximation: each vertex of the input
//! is swept into a circle of haversine destinations and the search area
//! is the convex hull of all circle points (per component polygon for
//! multipolygons). This over-covers concave inputs, which only widens a
//! search area that is heuristic to begin with.
//!
//! Numeric precision follows the upstream GeoJSON coordinate resolution;
//! no higher precision is claimed.

use geo::{
    Centroid, ConvexHull, Coord, CoordsIter, GeometryCollection, MultiPoint, MultiPolygon, Point,
    Polygon,
};
use piste_map_models::RunConvention;

/// Mean earth radius in metres, as used by the haversine formulas.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Number of bearings swept per vertex when buffering.
const BUFFER_CIRCLE_STEPS: u32 = 32;

/// Converts a GeoJSON geometry into a `geo` geometry.
///
/// Returns `None` for geometry the `geo` type system cannot represent.
#[must_use]
pub fn to_geo(geometry: &geojson::Geometry) -> Option<geo::Geometry<f64>> {
    geo::Geometry::<f64>::try_from(geometry.clone()).ok()
}

/// Converts a `geo` geometry back into a GeoJSON geometry.
#[must_use]
pub fn from_geo(geometry: &geo::Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

/// Haversine distance between two WGS84 points, in metres.
#[must_use]
pub fn haversine_distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lng = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.y().to_radians().cos() * b.y().to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    EARTH_RADIUS_M * 2.0 * h.sqrt().asin()
}

/// Destination point reached from `origin` along `bearing_deg` (clockwise
/// from north) after `distance_m` metres on the sphere.
#[must_use]
pub fn haversine_destination(origin: Point<f64>, bearing_deg: f64, distance_m: f64) -> Point<f64> {
    let lat1 = origin.y().to_radians();
    let lng1 = origin.x().to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lng2 = lng1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    Point::new(lng2.to_degrees(), lat2.to_degrees())
}

/// Expands a geometry outward by `km` kilometres.
///
/// Returns a `Polygon` for most inputs, a `MultiPolygon` when the input
/// is a multipolygon, and `None` when the input is degenerate (no
/// coordinates, non-finite coordinates, or a non-positive distance).
#[must_use]
pub fn buffer_km(geometry: &geojson::Geometry, km: f64) -> Option<geo::Geometry<f64>> {
    if km <= 0.0 {
        return None;
    }

    let geom = to_geo(geometry)?;
    match geom {
        geo::Geometry::MultiPolygon(mp) => {
            let hulls: Vec<Polygon<f64>> = mp
                .0
                .iter()
                .filter_map(|polygon| hull_around(polygon.coords_iter(), km))
                .collect();
            if hulls.is_empty() {
                None
            } else {
                Some(geo::Geometry::MultiPolygon(MultiPolygon(hulls)))
            }
        }
        other => hull_around(other.coords_iter(), km).map(geo::Geometry::Polygon),
    }
}

/// Convex hull of geodesic circles swept around each coordinate.
fn hull_around(coords: impl Iterator<Item = Coord<f64>>, km: f64) -> Option<Polygon<f64>> {
    let distance_m = km * 1000.0;
    let mut circle_points: Vec<Point<f64>> = Vec::new();

    for coord in coords {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return None;
        }
        let origin = Point::new(coord.x, coord.y);
        for step in 0..BUFFER_CIRCLE_STEPS {
            let bearing = f64::from(step) * 360.0 / f64::from(BUFFER_CIRCLE_STEPS);
            circle_points.push(haversine_destination(origin, bearing, distance_m));
        }
    }

    if circle_points.is_empty() {
        return None;
    }

    Some(MultiPoint::from(circle_points).convex_hull())
}

/// Centroid of a heterogeneous geometry collection.
#[must_use]
pub fn centroid_point(geometries: &[geojson::Geometry]) -> Option<Point<f64>> {
    let collection = GeometryCollection(geometries.iter().filter_map(to_geo).collect::<Vec<_>>());
    collection.centroid()
}

/// Centroid of a heterogeneous geometry collection, as a GeoJSON point.
#[must_use]
pub fn centroid(geometries: &[geojson::Geometry]) -> Option<geojson::Geometry> {
    centroid_point(geometries)
        .map(|point| geojson::Geometry::new(geojson::Value::Point(vec![point.x(), point.y()])))
}

/// Combined haversine length of the line parts of a geometry, in km.
///
/// Polygons and points contribute nothing; runs drawn as areas have no
/// meaningful length.
#[must_use]
pub fn line_length_km(geometry: &geojson::Geometry) -> f64 {
    let Some(geom) = to_geo(geometry) else {
        return 0.0;
    };

    let lines: Vec<&geo::LineString<f64>> = match &geom {
        geo::Geometry::LineString(line) => vec![line],
        geo::Geometry::MultiLineString(multi) => multi.0.iter().collect(),
        _ => Vec::new(),
    };

    lines
        .iter()
        .map(|line| {
            line.0
                .windows(2)
                .map(|pair| {
                    haversine_distance_m(
                        Point::new(pair[0].x, pair[0].y),
                        Point::new(pair[1].x, pair[1].y),
                    )
                })
                .sum::<f64>()
        })
        .sum::<f64>()
        / 1000.0
}

/// Regional run-difficulty colour convention for a geometry's position.
///
/// A pure function of the centroid coordinates: longitudes in the
/// Americas map to the North American convention, the Japanese
/// archipelago to the Japanese one, everything else to the European one.
#[must_use]
pub fn run_convention(geometry: &geojson::Geometry) -> RunConvention {
    let Some(point) = centroid_point(std::slice::from_ref(geometry)) else {
        return RunConvention::Europe;
    };
    let (lng, lat) = (point.x(), point.y());

    if (122.0..=154.0).contains(&lng) && (20.0..=46.5).contains(&lat) {
        RunConvention::Japan
    } else if (-180.0..=-30.0).contains(&lng) {
        RunConvention::NorthAmerica
    } else {
        RunConvention::Europe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lng: f64, lat: f64) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Point(vec![lng, lat]))
    }

    #[test]
    fn haversine_distance_matches_known_value() {
        // Innsbruck to Zurich is roughly 288 km.
        let d = haversine_distance_m(Point::new(11.39, 47.27), Point::new(8.54, 47.37));
        assert!((d - 288_000.0).abs() < 10_000.0, "got {d}");
    }

    #[test]
    fn destination_roundtrip_distance() {
        let origin = Point::new(10.0, 46.0);
        let dest = haversine_destination(origin, 90.0, 500.0);
        let d = haversine_distance_m(origin, dest);
        assert!((d - 500.0).abs() < 1.0, "got {d}");
    }

    #[test]
    fn buffer_of_point_contains_origin() {
        use geo::Contains as _;

        let buffered = buffer_km(&point(10.0, 46.0), 0.5).unwrap();
        let geo::Geometry::Polygon(polygon) = buffered else {
            panic!("expected polygon");
        };
        assert!(polygon.contains(&Point::new(10.0, 46.0)));
        // A point ~400 m east is inside the 500 m buffer.
        let east = haversine_destination(Point::new(10.0, 46.0), 90.0, 400.0);
        assert!(polygon.contains(&east));
        // A point ~2 km east is not.
        let far = haversine_destination(Point::new(10.0, 46.0), 90.0, 2000.0);
        assert!(!polygon.contains(&far));
    }

    #[test]
    fn buffer_of_multipolygon_keeps_components() {
        let geometry = geojson::Geometry::new(geojson::Value::MultiPolygon(vec![
            vec![vec![
                vec![10.0, 46.0],
                vec![10.01, 46.0],
                vec![10.01, 46.01],
                vec![10.0, 46.0],
            ]],
            vec![vec![
                vec![11.0, 47.0],
                vec![11.01, 47.0],
                vec![11.01, 47.01],
                vec![11.0, 47.0],
            ]],
        ]));
        let buffered = buffer_km(&geometry, 0.5).unwrap();
        let geo::Geometry::MultiPolygon(mp) = buffered else {
            panic!("expected multipolygon");
        };
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn degenerate_buffer_inputs_yield_none() {
        let empty = geojson::Geometry::new(geojson::Value::MultiPolygon(vec![]));
        assert!(buffer_km(&empty, 0.5).is_none());
        assert!(buffer_km(&point(10.0, 46.0), 0.0).is_none());
        assert!(buffer_km(&point(f64::NAN, 46.0), 0.5).is_none());
    }

    #[test]
    fn centroid_of_two_points_is_midpoint() {
        let c = centroid_point(&[point(10.0, 46.0), point(10.2, 46.2)]).unwrap();
        assert!((c.x() - 10.1).abs() < 1e-9);
        assert!((c.y() - 46.1).abs() < 1e-9);
    }

    #[test]
    fn centroid_of_empty_collection_is_none() {
        assert!(centroid_point(&[]).is_none());
    }

    #[test]
    fn line_length_is_haversine_sum() {
        let line = geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![10.0, 46.0],
            vec![10.01, 46.0],
        ]));
        let km = line_length_km(&line);
        // One hundredth of a degree of longitude at 46N is ~0.77 km.
        assert!((km - 0.77).abs() < 0.05, "got {km}");
        assert!(line_length_km(&point(10.0, 46.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn conventions_by_region() {
        assert_eq!(run_convention(&point(11.3, 47.2)), RunConvention::Europe);
        assert_eq!(
            run_convention(&point(-106.8, 39.6)),
            RunConvention::NorthAmerica
        );
        assert_eq!(run_convention(&point(138.5, 36.6)), RunConvention::Japan);
    }
}
