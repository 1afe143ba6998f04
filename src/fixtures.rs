//! Test geometry built in planar feet around a fixed origin, returned in
//! degrees. Drawn geometries start at the origin, so the analysis frame
//! coincides with the fixture frame.

use geo::{Coord, LineString, MultiLineString, Point, Polygon};

use crate::feature::DrawnGeometry;
use crate::geometry::LocalFrame;

pub const ORIGIN: Coord<f64> = Coord { x: -90.05, y: 35.15 };

pub fn frame() -> LocalFrame {
    LocalFrame::new(ORIGIN)
}

pub fn line_ft(points: &[(f64, f64)]) -> LineString<f64> {
    points
        .iter()
        .map(|&(x, y)| frame().unproject(Coord { x, y }))
        .collect()
}

pub fn multi_line_ft(parts: &[&[(f64, f64)]]) -> MultiLineString<f64> {
    MultiLineString::new(parts.iter().map(|p| line_ft(p)).collect())
}

pub fn point_ft(x: f64, y: f64) -> Point<f64> {
    Point(frame().unproject(Coord { x, y }))
}

/// Axis-aligned rectangle between two corners, in feet.
pub fn rect_ft(min: (f64, f64), max: (f64, f64)) -> Polygon<f64> {
    Polygon::new(
        line_ft(&[min, (max.0, min.1), max, (min.0, max.1)]),
        vec![],
    )
}

/// Horizontal drawn line from the origin, `len` feet long.
pub fn drawn_line(len: f64) -> DrawnGeometry {
    DrawnGeometry::line(line_ft(&[(0.0, 0.0), (len, 0.0)])).expect("two vertices")
}

pub fn drawn_point() -> DrawnGeometry {
    DrawnGeometry::Point(Point(ORIGIN))
}
