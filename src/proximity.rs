//! Features within a fixed radius of the drawn geometry.
//!
//! All four result shapes share one step: buffer the drawn geometry by the
//! radius in the planar frame and keep every admitted feature that touches
//! the buffer.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::DatasetConfig;
use crate::dispatch::AnalysisContext;
use crate::error::AnalysisError;
use crate::feature::ReferenceFeature;
use crate::index::ReferenceLayer;
use crate::result::{MatchResult, MatchedFeature};

const UNKNOWN_CATEGORY: &str = "Unknown";

/// Features within `radius_ft`, in collection order.
fn within_radius<'l>(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    radius_ft: f64,
    layer: &'l ReferenceLayer,
) -> Result<Vec<&'l ReferenceFeature>, AnalysisError> {
    let zone = ctx.buffer_zone(radius_ft)?;
    let mut hits = Vec::new();
    for index in ctx.candidates(layer, &zone) {
        ctx.visit(&config.id, index)?;
        let feature = &layer.features()[index];
        if !config.admits(&feature.attributes) {
            continue;
        }
        let Some(geometry) = ctx.projected_feature(&config.id, index, feature) else {
            continue;
        };
        if zone.intersects_geometry(&geometry) {
            hits.push(feature);
        }
    }
    debug!(dataset = %config.id, radius_ft, hits = hits.len(), "proximity scan done");
    Ok(hits)
}

fn report(hits: &[&ReferenceFeature], config: &DatasetConfig) -> Vec<MatchedFeature> {
    hits.iter()
        .map(|f| MatchedFeature::from_feature(f, config, None))
        .collect()
}

/// Every feature within the radius, sorted by display name.
pub fn list(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    radius_ft: f64,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let mut features = report(&within_radius(ctx, config, radius_ft, layer)?, config);
    features.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(MatchResult::FeatureList { features })
}

/// Number of features within the radius, optionally per category of
/// `group_field`.
pub fn count(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    radius_ft: f64,
    group_field: Option<&str>,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let hits = within_radius(ctx, config, radius_ft, layer)?;
    let mut by_category = BTreeMap::new();
    if let Some(field) = group_field {
        for f in &hits {
            let category = f
                .attr(field)
                .map(|v| v.to_string().trim().to_string())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            *by_category.entry(category).or_insert(0) += 1;
        }
    }
    Ok(MatchResult::Count {
        total: hits.len(),
        by_category,
        features: report(&hits, config),
    })
}

/// Whether anything lies within the radius.
pub fn binary(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    radius_ft: f64,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let hits = within_radius(ctx, config, radius_ft, layer)?;
    Ok(MatchResult::Binary {
        detected: !hits.is_empty(),
        features: report(&hits, config),
    })
}

/// Sum of `sum_field` over features within the radius. Non-numeric values
/// contribute nothing.
pub fn acreage(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    radius_ft: f64,
    sum_field: &str,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let hits = within_radius(ctx, config, radius_ft, layer)?;
    let total: f64 = hits
        .iter()
        .filter_map(|f| match f.attr(sum_field).and_then(|v| v.as_f64()) {
            Some(v) if v.is_finite() && v >= 0.0 => Some(v),
            other => {
                debug!(dataset = %config.id, field = sum_field, value = ?other, "ignoring value in sum");
                None
            }
        })
        .sum();
    Ok(MatchResult::Acreage {
        total,
        features: report(&hits, config),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeFilter, FilterOp, Method};
    use crate::dispatch::CancelToken;
    use crate::feature::DrawnGeometry;
    use crate::fixtures::{drawn_line, drawn_point, point_ft, rect_ft};

    fn with_ctx<T>(drawn: &DrawnGeometry, f: impl FnOnce(&AnalysisContext<'_>) -> T) -> T {
        let cancel = CancelToken::new();
        let ctx = AnalysisContext::new(drawn, &cancel);
        f(&ctx)
    }

    fn config(method: Method) -> DatasetConfig {
        DatasetConfig::new("layer", method)
    }

    #[test]
    fn point_radius_keeps_only_the_nearer_point() {
        let layer = ReferenceLayer::new(vec![
            ReferenceFeature::new(point_ft(280.0, 0.0)).with_attr("NAME", "280 ft"),
            ReferenceFeature::new(point_ft(0.0, 320.0)).with_attr("NAME", "320 ft"),
        ]);
        let config = config(Method::Proximity { radius_ft: 300.0 });
        let result = with_ctx(&drawn_point(), |ctx| list(ctx, &config, 300.0, &layer)).unwrap();
        let names: Vec<&str> = result.features().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["280 ft"]);
    }

    #[test]
    fn list_is_sorted_by_display_name() {
        let layer = ReferenceLayer::new(vec![
            ReferenceFeature::new(point_ft(100.0, 50.0)).with_attr("SCHOOL", "Whitehaven High"),
            ReferenceFeature::new(point_ft(300.0, -50.0)).with_attr("SCHOOL", "Airways Middle"),
            ReferenceFeature::new(point_ft(600.0, 20.0)).with_attr("SCHOOL", "Lester Prep"),
        ]);
        let config = config(Method::Proximity { radius_ft: 100.0 }).with_display_field("SCHOOL");
        let result = with_ctx(&drawn_line(1000.0), |ctx| list(ctx, &config, 100.0, &layer)).unwrap();
        let names: Vec<&str> = result.features().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Airways Middle", "Lester Prep", "Whitehaven High"]);
    }

    #[test]
    fn count_breaks_down_by_category() {
        let layer = ReferenceLayer::new(vec![
            ReferenceFeature::new(point_ft(100.0, 10.0)).with_attr("SEVERITY", "Fatal"),
            ReferenceFeature::new(point_ft(200.0, -10.0)).with_attr("SEVERITY", "Injury"),
            ReferenceFeature::new(point_ft(300.0, 10.0)).with_attr("SEVERITY", "Injury"),
            ReferenceFeature::new(point_ft(400.0, 10.0)),
            ReferenceFeature::new(point_ft(400.0, 900.0)).with_attr("SEVERITY", "Fatal"),
        ]);
        let method = Method::ProximityCount {
            radius_ft: 50.0,
            group_field: Some("SEVERITY".into()),
        };
        let config = config(method);
        let result =
            with_ctx(&drawn_line(1000.0), |ctx| count(ctx, &config, 50.0, Some("SEVERITY"), &layer)).unwrap();
        let MatchResult::Count {
            total,
            by_category,
            features,
        } = result
        else {
            panic!("count result expected");
        };
        assert_eq!(total, 4);
        assert_eq!(features.len(), 4);
        assert_eq!(by_category["Fatal"], 1);
        assert_eq!(by_category["Injury"], 2);
        assert_eq!(by_category["Unknown"], 1);
    }

    #[test]
    fn count_without_group_field_has_no_breakdown() {
        let layer = ReferenceLayer::new(vec![ReferenceFeature::new(point_ft(10.0, 10.0))]);
        let config = config(Method::ProximityCount {
            radius_ft: 50.0,
            group_field: None,
        });
        let result = with_ctx(&drawn_point(), |ctx| count(ctx, &config, 50.0, None, &layer)).unwrap();
        assert!(matches!(result, MatchResult::Count { total: 1, ref by_category, .. } if by_category.is_empty()));
    }

    #[test]
    fn binary_respects_the_prefilter() {
        let layer = ReferenceLayer::new(vec![
            ReferenceFeature::new(rect_ft((100.0, 50.0), (200.0, 150.0))).with_attr("ZONE", "X"),
            ReferenceFeature::new(rect_ft((400.0, 500.0), (500.0, 600.0))).with_attr("ZONE", "AE"),
        ]);
        let config = config(Method::Binary { radius_ft: 100.0 })
            .with_filter(AttributeFilter::new("ZONE", FilterOp::Ne, "X"));
        let result = with_ctx(&drawn_line(1000.0), |ctx| binary(ctx, &config, 100.0, &layer)).unwrap();
        assert!(matches!(result, MatchResult::Binary { detected: false, .. }));

        let unfiltered = DatasetConfig {
            filter: None,
            ..config
        };
        let result = with_ctx(&drawn_line(1000.0), |ctx| binary(ctx, &unfiltered, 100.0, &layer)).unwrap();
        assert!(matches!(result, MatchResult::Binary { detected: true, .. }));
    }

    #[test]
    fn acreage_sums_numeric_values_only() {
        let layer = ReferenceLayer::new(vec![
            ReferenceFeature::new(rect_ft((100.0, 20.0), (200.0, 120.0))).with_attr("ACRES", 2.5),
            ReferenceFeature::new(rect_ft((300.0, -120.0), (400.0, -20.0))).with_attr("ACRES", "4"),
            ReferenceFeature::new(rect_ft((500.0, 20.0), (600.0, 120.0))).with_attr("ACRES", "n/a"),
            ReferenceFeature::new(rect_ft((500.0, 800.0), (600.0, 900.0))).with_attr("ACRES", 100.0),
        ]);
        let config = config(Method::Acreage {
            radius_ft: 50.0,
            sum_field: "ACRES".into(),
        });
        let result = with_ctx(&drawn_line(1000.0), |ctx| acreage(ctx, &config, 50.0, "ACRES", &layer)).unwrap();
        let MatchResult::Acreage { total, features } = result else {
            panic!("acreage result expected");
        };
        assert_eq!(features.len(), 3);
        assert!((total - 6.5).abs() < 1e-12);
    }
}
