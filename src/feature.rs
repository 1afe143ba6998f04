use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use geo::{Coord, Geometry, LineString, Point};
use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Attribute fields tried, in order, when a dataset has no display field or
/// the configured one is empty.
const NAME_FIELDS: &[&str] = &[
    "NAME", "Name", "name", "TITLE", "Title", "title", "LABEL", "Label", "label", "ID", "Id",
    "id", "FID", "OBJECTID",
];

const UNNAMED: &str = "Unnamed";

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    /// Numeric view; text that parses as a number counts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            AttrValue::Text(s) => Cow::Borrowed(s.as_str()),
            AttrValue::Number(_) => Cow::Owned(self.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, AttrValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            AttrValue::Number(n) => write!(f, "{n}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

pub type Attributes = BTreeMap<String, AttrValue>;

/// The user-drawn geometry, in WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawnGeometry {
    Point(Point<f64>),
    Line(DrawnLine),
}

/// A polyline with at least two vertices. Only [`DrawnGeometry::line`]
/// builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnLine(LineString<f64>);

impl DrawnLine {
    pub fn line_string(&self) -> &LineString<f64> {
        &self.0
    }

    fn start(&self) -> Coord<f64> {
        self.0.0[0]
    }
}

impl DrawnGeometry {
    pub fn point(lon: f64, lat: f64) -> Self {
        DrawnGeometry::Point(Point::new(lon, lat))
    }

    /// Build a polyline, rejecting fewer than two vertices.
    pub fn line(coords: impl Into<LineString<f64>>) -> Result<Self, GeometryError> {
        let ls: LineString<f64> = coords.into();
        if ls.0.len() < 2 {
            return Err(GeometryError::degenerate(format!(
                "drawn line needs at least 2 vertices, got {}",
                ls.0.len()
            )));
        }
        Ok(DrawnGeometry::Line(DrawnLine(ls)))
    }

    pub fn first_coord(&self) -> Coord<f64> {
        match self {
            DrawnGeometry::Point(p) => p.0,
            DrawnGeometry::Line(line) => line.start(),
        }
    }

    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            DrawnGeometry::Point(p) => Geometry::Point(*p),
            DrawnGeometry::Line(line) => Geometry::LineString(line.line_string().clone()),
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, DrawnGeometry::Point(_))
    }
}

impl TryFrom<Geometry<f64>> for DrawnGeometry {
    type Error = GeometryError;

    fn try_from(geometry: Geometry<f64>) -> Result<Self, Self::Error> {
        match geometry {
            Geometry::Point(p) => Ok(DrawnGeometry::Point(p)),
            Geometry::LineString(ls) => DrawnGeometry::line(ls),
            Geometry::Line(l) => DrawnGeometry::line(vec![l.start, l.end]),
            Geometry::MultiLineString(mls) => {
                let mut parts = mls.0.into_iter();
                match (parts.next(), parts.next()) {
                    (Some(part), None) => DrawnGeometry::line(part),
                    _ => Err(GeometryError::degenerate(
                        "drawn multi-line must have exactly one part",
                    )),
                }
            }
            other => Err(GeometryError::degenerate(format!(
                "drawn geometry must be a point or a single line, got {}",
                geometry_type_name(&other)
            ))),
        }
    }
}

/// One feature of a reference layer.
#[derive(Debug, Clone, Default)]
pub struct ReferenceFeature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Attributes,
}

impl ReferenceFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key).filter(|v| !v.is_blank())
    }

    /// Label for the feature: the display field if set, then common name
    /// fields, then a placeholder.
    pub fn display_name(&self, display_field: Option<&str>) -> String {
        display_field
            .and_then(|field| self.attr(field))
            .map(|v| v.to_string().trim().to_string())
            .or_else(|| self.common_name())
            .unwrap_or_else(|| UNNAMED.to_string())
    }

    /// First non-empty value among the usual name fields.
    pub fn common_name(&self) -> Option<String> {
        NAME_FIELDS
            .iter()
            .find_map(|field| self.attr(field))
            .map(|v| v.to_string().trim().to_string())
    }

    /// Attributes restricted to `fields` (plus the display field). An empty
    /// selection keeps everything.
    pub fn selected_attributes(&self, fields: &[String], display_field: Option<&str>) -> Attributes {
        if fields.is_empty() {
            return self.attributes.clone();
        }
        self.attributes
            .iter()
            .filter(|(k, _)| fields.iter().any(|f| f == *k) || display_field == Some(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
