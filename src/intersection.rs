//! Polygon layers matched by plain intersection with the drawn geometry.

use geo::{Geometry, MultiPolygon};
use tracing::debug;

use crate::config::DatasetConfig;
use crate::dispatch::AnalysisContext;
use crate::error::AnalysisError;
use crate::feature::{DrawnGeometry, geometry_type_name};
use crate::geometry::{intersects, point_in_polygon};
use crate::index::ReferenceLayer;
use crate::result::{MatchResult, MatchedFeature};

/// Areal geometry as a multipolygon; `None` for anything else or for rings
/// too short to enclose an area.
fn as_area(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let area = match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        Geometry::Rect(r) => MultiPolygon::new(vec![r.to_polygon()]),
        Geometry::Triangle(t) => MultiPolygon::new(vec![t.to_polygon()]),
        _ => return None,
    };
    let valid = !area.0.is_empty() && area.iter().all(|p| p.exterior().0.len() >= 4);
    valid.then_some(area)
}

pub fn run(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let drawn = ctx.drawn.to_geometry();
    let mut features = Vec::new();
    for index in ctx.direct_candidates(layer) {
        ctx.visit(&config.id, index)?;
        let feature = &layer.features()[index];
        if !config.admits(&feature.attributes) {
            continue;
        }
        let Some(geometry) = &feature.geometry else {
            debug!(dataset = %config.id, feature = index, "skipping feature without geometry");
            continue;
        };
        let Some(area) = as_area(geometry) else {
            debug!(
                dataset = %config.id,
                feature = index,
                geometry = geometry_type_name(geometry),
                "skipping non-areal or degenerate geometry"
            );
            continue;
        };
        let hit = match ctx.drawn {
            DrawnGeometry::Point(p) => point_in_polygon(p.0, &area),
            DrawnGeometry::Line(_) => intersects(&drawn, &Geometry::MultiPolygon(area)),
        };
        if hit {
            features.push(MatchedFeature::from_feature(feature, config, None));
        }
    }
    Ok(MatchResult::FeatureList { features })
}
