//! Exact clipping of straight segments against a buffer polygon.

use geo::{BoundingRect, Coord, Geometry, Intersects, Line, MultiLineString, MultiPolygon, Rect};
use tracing::{trace, warn};

use crate::error::GeometryError;
use crate::geometry::{
    boundary_of, line_intersections, planar_length, point_in_polygon, project_point_onto_line,
};

/// Crossings closer than this (feet) along a segment are treated as one.
const CROSSING_EPS: f64 = 1e-9;

/// A buffer polygon in planar feet, with the pieces every clip needs
/// computed once.
#[derive(Debug, Clone)]
pub struct BufferZone {
    polygon: MultiPolygon<f64>,
    boundary: MultiLineString<f64>,
    bbox: Option<Rect<f64>>,
}

impl BufferZone {
    pub fn new(polygon: MultiPolygon<f64>) -> Self {
        let boundary = boundary_of(&polygon);
        let bbox = polygon.bounding_rect();
        Self {
            polygon,
            boundary,
            bbox,
        }
    }

    /// Planar bounding box; `None` for an empty (zero-distance) buffer.
    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.bbox
    }

    pub fn covers(&self, c: Coord<f64>) -> bool {
        point_in_polygon(c, &self.polygon)
    }

    pub fn intersects_segment(&self, segment: Line<f64>) -> bool {
        match self.bbox {
            Some(bbox) if bbox.intersects(&segment) => self.polygon.intersects(&segment),
            _ => false,
        }
    }

    pub fn intersects_geometry(&self, geometry: &Geometry<f64>) -> bool {
        self.bbox.is_some() && geometry.intersects(&self.polygon)
    }

    /// Length of `segment` inside the zone. Failures are logged and count
    /// as zero so one bad segment never stops a scan.
    pub fn inside_length(&self, segment: Line<f64>) -> f64 {
        match self.try_inside_length(segment) {
            Ok(len) => len,
            Err(e) => {
                warn!(error = %e, ?segment, "segment clip failed, counting 0");
                0.0
            }
        }
    }

    /// Length of `segment` inside the zone, in `[0, segment length]`.
    pub fn try_inside_length(&self, segment: Line<f64>) -> Result<f64, GeometryError> {
        let finite = |c: Coord<f64>| c.x.is_finite() && c.y.is_finite();
        if !finite(segment.start) || !finite(segment.end) {
            return Err(GeometryError::computation("segment has non-finite coordinates"));
        }

        let full = planar_length(segment);
        if full == 0.0 || self.bbox.is_none() {
            return Ok(0.0);
        }

        let start_inside = self.covers(segment.start);
        let end_inside = self.covers(segment.end);
        if start_inside && end_inside {
            return Ok(full);
        }

        let mut crossings: Vec<f64> = line_intersections(segment, &self.boundary)
            .into_iter()
            .map(|p| project_point_onto_line(segment, p))
            .collect();
        if crossings.is_empty() {
            // Intersect predicate and crossing search disagree right at the boundary.
            return Ok(if start_inside { full } else { 0.0 });
        }
        crossings.sort_by(f64::total_cmp);
        crossings.dedup_by(|a, b| (*a - *b).abs() < CROSSING_EPS);

        let point_at = |d: f64| {
            let t = d / full;
            Coord {
                x: segment.start.x + t * (segment.end.x - segment.start.x),
                y: segment.start.y + t * (segment.end.y - segment.start.y),
            }
        };

        let mut inside = start_inside;
        let mut prev = 0.0;
        let mut total = 0.0;
        for d in crossings.into_iter().chain(std::iter::once(full)) {
            let span = d - prev;
            if span > CROSSING_EPS {
                // A touch at a vertex or a tangent reports a crossing without
                // a change of side.
                let mid_inside = self.covers(point_at(prev + span / 2.0));
                if mid_inside != inside {
                    trace!(at = prev, "resyncing inside flag after tangential crossing");
                    inside = mid_inside;
                }
                if inside {
                    total += span;
                }
            }
            inside = !inside;
            prev = d;
        }

        Ok(total.clamp(0.0, full))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::buffer;
    use geo::{LineString, Polygon, line_string};

    fn corridor(len: f64, half_width: f64) -> BufferZone {
        let line = LineString::from(vec![(0.0, 0.0), (len, 0.0)]);
        BufferZone::new(buffer(&Geometry::LineString(line), half_width).unwrap())
    }

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> Line<f64> {
        Line::new(Coord { x: x1, y: y1 }, Coord { x: x2, y: y2 })
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected} ± {tol}, got {actual}"
        );
    }

    #[test]
    fn fully_inside_counts_whole_segment() {
        let zone = corridor(1000.0, 100.0);
        assert_close(zone.inside_length(seg(100.0, 50.0, 900.0, 50.0)), 800.0, 1e-9);
    }

    #[test]
    fn fully_outside_counts_nothing() {
        let zone = corridor(1000.0, 100.0);
        assert_eq!(zone.inside_length(seg(0.0, 200.0, 1000.0, 200.0)), 0.0);
    }

    #[test]
    fn perpendicular_crossing_counts_only_corridor_width() {
        let zone = corridor(500.0, 100.0);
        let len = zone.inside_length(seg(250.0, -250.0, 250.0, 250.0));
        assert_close(len, 200.0, 1.0);
    }

    #[test]
    fn half_in_half_out() {
        let zone = corridor(1000.0, 100.0);
        let len = zone.inside_length(seg(500.0, 0.0, 500.0, 400.0));
        assert_close(len, 100.0, 1.0);
    }

    #[test]
    fn exits_and_reenters_a_concave_zone() {
        // U-shaped zone: two vertical arms joined at the bottom.
        let u = MultiPolygon::new(vec![Polygon::new(
            line_string![
                (x: 0.0, y: 0.0),
                (x: 300.0, y: 0.0),
                (x: 300.0, y: 300.0),
                (x: 200.0, y: 300.0),
                (x: 200.0, y: 100.0),
                (x: 100.0, y: 100.0),
                (x: 100.0, y: 300.0),
                (x: 0.0, y: 300.0),
            ],
            vec![],
        )]);
        let zone = BufferZone::new(u);
        // Crosses the left arm, the gap, then the right arm.
        let len = zone.inside_length(seg(-50.0, 200.0, 350.0, 200.0));
        assert_close(len, 200.0, 1e-6);
    }

    #[test]
    fn grazing_a_vertex_adds_nothing() {
        let square = MultiPolygon::new(vec![Polygon::new(
            line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            vec![],
        )]);
        let zone = BufferZone::new(square);
        // Passes through the corner (10, 10) only.
        assert_close(zone.inside_length(seg(0.0, 20.0, 20.0, 0.0)), 0.0, 1e-9);
    }

    #[test]
    fn empty_zone_and_zero_length_segment() {
        let empty = BufferZone::new(MultiPolygon::new(vec![]));
        assert_eq!(empty.inside_length(seg(0.0, 0.0, 10.0, 0.0)), 0.0);
        assert!(!empty.intersects_segment(seg(0.0, 0.0, 10.0, 0.0)));

        let zone = corridor(100.0, 10.0);
        assert_eq!(zone.inside_length(seg(5.0, 0.0, 5.0, 0.0)), 0.0);
    }

    #[test]
    fn no_crossings_found_falls_back_to_start_side() {
        // Boundary search finds nothing, as when predicate and crossing
        // search disagree at the boundary. The start point decides.
        let mut zone = corridor(100.0, 10.0);
        zone.boundary = MultiLineString::new(vec![]);

        let from_inside = seg(50.0, 0.0, 50.0, 30.0);
        assert!(zone.intersects_segment(from_inside));
        assert_eq!(zone.try_inside_length(from_inside).unwrap(), 30.0);

        let from_outside = seg(50.0, 30.0, 50.0, 0.0);
        assert!(zone.intersects_segment(from_outside));
        assert_eq!(zone.try_inside_length(from_outside).unwrap(), 0.0);
    }

    #[test]
    fn non_finite_segment_degrades_to_zero() {
        let zone = corridor(100.0, 10.0);
        assert!(zone.try_inside_length(seg(f64::NAN, 0.0, 5.0, 0.0)).is_err());
        assert_eq!(zone.inside_length(seg(f64::NAN, 0.0, 5.0, 0.0)), 0.0);
    }

    #[test]
    fn result_is_bounded_by_segment_length() {
        let zone = corridor(600.0, 75.0);
        // Fan of segments through and around the corridor.
        for i in 0..36 {
            let angle = (i as f64) * std::f64::consts::PI / 18.0;
            for &(cx, cy) in &[(300.0, 0.0), (0.0, 60.0), (650.0, -90.0)] {
                let s = seg(
                    cx - 400.0 * angle.cos(),
                    cy - 400.0 * angle.sin(),
                    cx + 400.0 * angle.cos(),
                    cy + 400.0 * angle.sin(),
                );
                let len = zone.inside_length(s);
                assert!(len >= 0.0);
                assert!(len <= planar_length(s) + 1e-9, "{len} > {}", planar_length(s));
            }
        }
    }
}
