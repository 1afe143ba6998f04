//! Geometry primitives the matchers are composed from.
//!
//! Reference data arrives in WGS84 degrees. Every distance-based test runs in a
//! [`LocalFrame`]: an equirectangular plane in feet centred on the drawn
//! geometry, so buffer radii and containment checks share one linear unit.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::{
    BooleanOps, ConvexHull, Coord, Geometry, Haversine, Intersects, Length, Line, LineString,
    MapCoords, MultiLineString, MultiPoint, MultiPolygon, Polygon, Rect,
};

use crate::error::GeometryError;

pub const FEET_PER_METER: f64 = 3.280_839_895;

/// Mean earth radius (same value `geo` uses for haversine), in feet.
const EARTH_RADIUS_FT: f64 = 6_371_008.8 * FEET_PER_METER;

/// Vertices used to approximate a full circle when buffering.
const CIRCLE_STEPS: usize = 64;

/// Equirectangular projection around a fixed origin, output in feet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: Coord<f64>,
    x_scale: f64,
    y_scale: f64,
}

impl LocalFrame {
    pub fn new(origin: Coord<f64>) -> Self {
        let y_scale = EARTH_RADIUS_FT.to_radians();
        let x_scale = y_scale * origin.y.to_radians().cos().max(1e-9);
        Self {
            origin,
            x_scale,
            y_scale,
        }
    }

    pub fn project(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.origin.x) * self.x_scale,
            y: (c.y - self.origin.y) * self.y_scale,
        }
    }

    pub fn unproject(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.x + c.x / self.x_scale,
            y: self.origin.y + c.y / self.y_scale,
        }
    }

    pub fn project_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        geometry.map_coords(|c| self.project(c))
    }

    /// Planar rectangle back to degrees. The projection is axis-aligned, so
    /// the corners map exactly.
    pub fn unproject_rect(&self, rect: Rect<f64>) -> Rect<f64> {
        Rect::new(self.unproject(rect.min()), self.unproject(rect.max()))
    }
}

/// Haversine length of a polyline, in feet.
pub fn length(line: &LineString<f64>) -> Result<f64, GeometryError> {
    if line.0.len() < 2 {
        return Err(GeometryError::degenerate(format!(
            "length needs at least 2 vertices, got {}",
            line.0.len()
        )));
    }
    Ok(line.length::<Haversine>() * FEET_PER_METER)
}

pub fn planar_length(segment: Line<f64>) -> f64 {
    let d = segment.delta();
    d.x.hypot(d.y)
}

/// Expand a planar point or line geometry into the region within
/// `distance_ft` of it. A non-positive distance yields an empty region.
pub fn buffer(geometry: &Geometry<f64>, distance_ft: f64) -> Result<MultiPolygon<f64>, GeometryError> {
    if !distance_ft.is_finite() {
        return Err(GeometryError::computation(format!(
            "buffer distance is not finite: {distance_ft}"
        )));
    }
    if distance_ft <= 0.0 {
        return Ok(MultiPolygon::new(vec![]));
    }

    let mut pieces = Vec::new();
    collect_buffer_pieces(geometry, distance_ft, &mut pieces)?;
    if pieces.is_empty() {
        return Err(GeometryError::degenerate("nothing to buffer"));
    }
    Ok(union_all(pieces))
}

fn collect_buffer_pieces(
    geometry: &Geometry<f64>,
    r: f64,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), GeometryError> {
    match geometry {
        Geometry::Point(p) => out.push(circle(p.0, r)),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| circle(p.0, r))),
        Geometry::Line(l) => out.push(capsule(*l, r)),
        Geometry::LineString(ls) => line_pieces(ls, r, out),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                line_pieces(ls, r, out);
            }
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_buffer_pieces(g, r, out)?;
            }
        }
        _ => {
            return Err(GeometryError::computation(
                "only point and line geometries can be buffered",
            ));
        }
    }
    Ok(())
}

fn line_pieces(ls: &LineString<f64>, r: f64, out: &mut Vec<Polygon<f64>>) {
    match ls.0.as_slice() {
        [] => {}
        [only] => out.push(circle(*only, r)),
        _ => out.extend(ls.lines().map(|l| capsule(l, r))),
    }
}

fn circle_points(center: Coord<f64>, r: f64) -> impl Iterator<Item = Coord<f64>> {
    (0..CIRCLE_STEPS).map(move |i| {
        let angle = std::f64::consts::TAU * i as f64 / CIRCLE_STEPS as f64;
        Coord {
            x: center.x + r * angle.cos(),
            y: center.y + r * angle.sin(),
        }
    })
}

fn circle(center: Coord<f64>, r: f64) -> Polygon<f64> {
    Polygon::new(LineString::from_iter(circle_points(center, r)), vec![])
}

/// Stadium shape around one segment: hull of the two end circles.
fn capsule(segment: Line<f64>, r: f64) -> Polygon<f64> {
    if segment.start == segment.end {
        return circle(segment.start, r);
    }
    let points: Vec<Coord<f64>> = circle_points(segment.start, r)
        .chain(circle_points(segment.end, r))
        .collect();
    MultiPoint::from(points).convex_hull()
}

/// Pairwise union keeps each boolean op on similarly sized operands.
fn union_all(pieces: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = pieces
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut iter = layer.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        layer = next;
    }
    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

pub fn intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.intersects(b)
}

/// Containment where the boundary counts as inside.
pub fn point_in_polygon(point: Coord<f64>, polygon: &MultiPolygon<f64>) -> bool {
    polygon.coordinate_position(&point) != CoordPos::Outside
}

/// All rings, exterior and interior, as one multi-line.
pub fn boundary_of(polygon: &MultiPolygon<f64>) -> MultiLineString<f64> {
    let rings = polygon
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .cloned()
        .collect();
    MultiLineString::new(rings)
}

/// Points where `segment` meets `boundary`, ordered along the segment.
/// A collinear overlap contributes both of its ends.
pub fn line_intersections(segment: Line<f64>, boundary: &MultiLineString<f64>) -> Vec<Coord<f64>> {
    let mut points = Vec::new();
    for edge in boundary.iter().flat_map(|ring| ring.lines()) {
        match line_intersection(segment, edge) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => points.push(intersection),
            Some(LineIntersection::Collinear { intersection }) => {
                points.push(intersection.start);
                points.push(intersection.end);
            }
            None => {}
        }
    }
    points.sort_by(|a, b| {
        project_point_onto_line(segment, *a).total_cmp(&project_point_onto_line(segment, *b))
    });
    points.dedup();
    points
}

/// Distance from `segment.start` to the orthogonal projection of `point`,
/// clamped to the segment.
pub fn project_point_onto_line(segment: Line<f64>, point: Coord<f64>) -> f64 {
    let d = segment.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    let t = ((point.x - segment.start.x) * d.x + (point.y - segment.start.y) * d.y) / len2;
    t.clamp(0.0, 1.0) * len2.sqrt()
}

/// Explode any line-like geometry into its 2-vertex segments.
pub fn segments(geometry: &Geometry<f64>) -> Result<Vec<Line<f64>>, GeometryError> {
    let mut out = Vec::new();
    collect_segments(geometry, &mut out)?;
    if out.is_empty() {
        return Err(GeometryError::degenerate("line feature has no segments"));
    }
    Ok(out)
}

fn collect_segments(geometry: &Geometry<f64>, out: &mut Vec<Line<f64>>) -> Result<(), GeometryError> {
    match geometry {
        Geometry::Line(l) => out.push(*l),
        Geometry::LineString(ls) => out.extend(ls.lines()),
        Geometry::MultiLineString(mls) => out.extend(mls.iter().flat_map(|ls| ls.lines())),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                collect_segments(g, out)?;
            }
        }
        _ => {
            return Err(GeometryError::degenerate(
                "expected a line or multi-line geometry",
            ));
        }
    }
    Ok(())
}
