//! Layer preparation: complexity statistics, simplification and coordinate
//! rounding for GeoJSON reference layers.

use std::collections::BTreeMap;
use std::fmt;

use geo::{Coord, CoordsIter, Geometry, GeometryCollection, LineString, MapCoords, Polygon, Simplify};
use geojson::{Feature, FeatureCollection, Value};
use serde::Serialize;
use tracing::warn;

use crate::feature::{ReferenceFeature, geometry_type_name};
use crate::layers::convert_properties;

/// Minimum coordinates a simplified line keeps.
const MIN_LINE_COORDS: usize = 2;
/// Minimum coordinates a simplified ring keeps, closing coordinate included.
const MIN_RING_COORDS: usize = 4;

const NULL_GEOMETRY: &str = "Null";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Reasonable,
    Moderate,
    OverDetailed,
    /// Point layers: nothing to simplify.
    NotApplicable,
}

impl Complexity {
    fn assess(primary_type: &str, average_coords: f64) -> Self {
        match primary_type {
            "LineString" | "MultiLineString" | "Polygon" | "MultiPolygon" => {
                if average_coords > 500.0 {
                    Complexity::OverDetailed
                } else if average_coords > 200.0 {
                    Complexity::Moderate
                } else {
                    Complexity::Reasonable
                }
            }
            _ => Complexity::NotApplicable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexFeature {
    pub index: usize,
    pub name: String,
    pub coords: usize,
}

/// Size and complexity summary of one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub feature_count: usize,
    pub geometry_types: BTreeMap<String, usize>,
    pub total_coords: usize,
    pub average_coords: f64,
    pub max_coords: usize,
    /// Smallest non-zero coordinate count.
    pub min_coords: Option<usize>,
    pub most_complex: Option<ComplexFeature>,
    /// Mean decimal places of the first feature's first coordinate.
    pub precision_decimals: Option<f64>,
    pub complexity: Complexity,
}

impl LayerStats {
    pub fn from_collection(fc: &FeatureCollection) -> Self {
        let mut geometry_types = BTreeMap::new();
        let mut counts = Vec::with_capacity(fc.features.len());

        for feature in &fc.features {
            let geometry = to_geo(feature);
            let type_name = geometry.as_ref().map_or(NULL_GEOMETRY, geometry_type_name);
            *geometry_types.entry(type_name.to_string()).or_insert(0) += 1;
            counts.push(geometry.as_ref().map_or(0, |g| g.coords_count()));
        }

        let total_coords: usize = counts.iter().sum();
        let average_coords = if counts.is_empty() {
            0.0
        } else {
            total_coords as f64 / counts.len() as f64
        };
        // First feature wins ties.
        let most_complex = counts
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, usize)>, (i, &n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((i, n)),
            })
            .filter(|&(_, n)| n > 0)
            .map(|(index, coords)| ComplexFeature {
                index,
                name: feature_name(&fc.features[index]).unwrap_or_else(|| format!("Feature #{index}")),
                coords,
            });
        let primary_type = geometry_types
            .iter()
            .fold(None, |best: Option<(&String, usize)>, (t, &n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((t, n)),
            })
            .map_or("", |(t, _)| t.as_str());

        Self {
            feature_count: fc.features.len(),
            complexity: Complexity::assess(primary_type, average_coords),
            total_coords,
            average_coords,
            max_coords: counts.iter().copied().max().unwrap_or(0),
            min_coords: counts.iter().copied().filter(|&n| n > 0).min(),
            most_complex,
            precision_decimals: fc.features.first().and_then(to_geo).and_then(sample_precision),
            geometry_types,
        }
    }

    pub fn precision_advice(&self) -> &'static str {
        match self.precision_decimals {
            Some(d) if d > 8.0 => "excessive precision, trim to 6 decimals",
            Some(d) if d > 6.0 => "high precision, trimming to 6 decimals recommended",
            Some(_) => "appropriate precision",
            None => "no coordinates to sample",
        }
    }
}

impl fmt::Display for LayerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Features: {}", self.feature_count)?;
        let types: Vec<String> = self.geometry_types.iter().map(|(t, n)| format!("{t}: {n}")).collect();
        writeln!(f, "Geometry types: {}", types.join(", "))?;
        writeln!(f, "Total coordinates: {}", self.total_coords)?;
        writeln!(f, "Average per feature: {:.0}", self.average_coords)?;
        writeln!(f, "Max in single feature: {}", self.max_coords)?;
        if let Some(min) = self.min_coords {
            writeln!(f, "Min in single feature: {min}")?;
        }
        if let Some(c) = &self.most_complex {
            writeln!(f, "Most complex feature: {} (#{}, {} vertices)", c.name, c.index, c.coords)?;
        }
        if let Some(d) = self.precision_decimals {
            writeln!(f, "Decimal places: ~{d:.0} ({})", self.precision_advice())?;
        }
        write!(f, "Complexity: {:?}", self.complexity)
    }
}

fn to_geo(feature: &Feature) -> Option<Geometry<f64>> {
    let geometry = feature.geometry.as_ref()?;
    Geometry::<f64>::try_from(geometry.value.clone()).ok()
}

fn feature_name(feature: &Feature) -> Option<String> {
    let attributes = feature.properties.as_ref().map(convert_properties)?;
    ReferenceFeature {
        geometry: None,
        attributes,
    }
    .common_name()
}

fn decimals(v: f64) -> usize {
    v.to_string().split_once('.').map_or(0, |(_, frac)| frac.len())
}

fn sample_precision(geometry: Geometry<f64>) -> Option<f64> {
    let c = geometry.coords_iter().next()?;
    Some((decimals(c.x) + decimals(c.y)) as f64 / 2.0)
}

/// Coordinate counts before and after optimisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeStats {
    pub features: usize,
    pub coords_before: usize,
    pub coords_after: usize,
}

impl OptimizeStats {
    pub fn reduction_pct(&self) -> f64 {
        if self.coords_before == 0 {
            return 0.0;
        }
        self.coords_before.saturating_sub(self.coords_after) as f64 / self.coords_before as f64 * 100.0
    }
}

fn simplify_line(line: &LineString<f64>, tolerance: f64, min_coords: usize) -> LineString<f64> {
    let simplified = line.simplify(&tolerance);
    if simplified.0.len() >= min_coords {
        simplified
    } else {
        line.clone()
    }
}

fn simplify_polygon(polygon: &Polygon<f64>, tolerance: f64) -> Polygon<f64> {
    Polygon::new(
        simplify_line(polygon.exterior(), tolerance, MIN_RING_COORDS),
        polygon
            .interiors()
            .iter()
            .map(|ring| simplify_line(ring, tolerance, MIN_RING_COORDS))
            .collect(),
    )
}

/// Douglas-Peucker per line and ring; points pass through.
fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(ls) => Geometry::LineString(simplify_line(ls, tolerance, MIN_LINE_COORDS)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(
            mls.iter()
                .map(|ls| simplify_line(ls, tolerance, MIN_LINE_COORDS))
                .collect(),
        ),
        Geometry::Polygon(p) => Geometry::Polygon(simplify_polygon(p, tolerance)),
        Geometry::MultiPolygon(mp) => {
            Geometry::MultiPolygon(mp.iter().map(|p| simplify_polygon(p, tolerance)).collect())
        }
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(GeometryCollection(
            gc.iter().map(|g| simplify_geometry(g, tolerance)).collect(),
        )),
        other => other.clone(),
    }
}

fn round_geometry(geometry: &Geometry<f64>, precision: u32) -> Geometry<f64> {
    let scale = 10f64.powi(precision as i32);
    let round = |v: f64| (v * scale).round() / scale;
    geometry.map_coords(|c| Coord {
        x: round(c.x),
        y: round(c.y),
    })
}

/// Simplify every feature by `tolerance_deg`, then round coordinates to
/// `precision` decimals. Properties and foreign members are kept; features
/// whose geometry cannot be read pass through untouched.
pub fn optimize_collection(
    fc: &FeatureCollection,
    tolerance_deg: f64,
    precision: u32,
) -> (FeatureCollection, OptimizeStats) {
    let mut stats = OptimizeStats {
        features: fc.features.len(),
        ..OptimizeStats::default()
    };
    let features = fc
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let Some(geometry) = feature.geometry.as_ref() else {
                return feature.clone();
            };
            let geo = match Geometry::<f64>::try_from(geometry.value.clone()) {
                Ok(geo) => geo,
                Err(e) => {
                    warn!(feature = index, error = %e, "leaving unreadable geometry as is");
                    return feature.clone();
                }
            };
            let optimized = round_geometry(&simplify_geometry(&geo, tolerance_deg), precision);
            stats.coords_before += geo.coords_count();
            stats.coords_after += optimized.coords_count();

            let mut out = feature.clone();
            out.bbox = None;
            out.geometry = Some(geojson::Geometry::new(Value::from(&optimized)));
            out
        })
        .collect();

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: fc.foreign_members.clone(),
    };
    (collection, stats)
}
