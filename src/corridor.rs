//! Corridor matching: does a reference line run along the drawn line?

use std::collections::HashSet;

use geo::Geometry;
use tracing::{debug, trace, warn};

use crate::clip::BufferZone;
use crate::config::{CorridorParams, DatasetConfig};
use crate::dispatch::AnalysisContext;
use crate::error::{AnalysisError, GeometryError};
use crate::geometry::segments;
use crate::index::ReferenceLayer;
use crate::result::{MatchResult, MatchedFeature};

/// Total length of a planar line geometry inside `zone`, summed segment by
/// segment across every part.
pub fn measure_overlap(zone: &BufferZone, geometry: &Geometry<f64>) -> Result<f64, GeometryError> {
    Ok(segments(geometry)?
        .into_iter()
        .filter(|s| zone.intersects_segment(*s))
        .map(|s| zone.inside_length(s))
        .sum())
}

/// Result of testing one feature against the corridor.
pub(crate) enum CorridorHit {
    /// Drawn point: the feature touches its buffer. No length applies.
    Touch,
    /// Drawn line: clipped overlap, already at or above the threshold.
    Overlap(f64),
}

/// Test one projected feature against the corridor, `None` when it does not
/// qualify. Features that cannot be measured are logged and skipped.
pub(crate) fn corridor_hit(
    ctx: &AnalysisContext<'_>,
    zone: &BufferZone,
    geometry: &Geometry<f64>,
    min_shared_ft: f64,
    dataset: &str,
    index: usize,
) -> Option<CorridorHit> {
    if ctx.drawn.is_point() {
        return zone.intersects_geometry(geometry).then_some(CorridorHit::Touch);
    }
    match measure_overlap(zone, geometry) {
        Ok(len) if len > 0.0 && len >= min_shared_ft => Some(CorridorHit::Overlap(len)),
        Ok(len) => {
            trace!(dataset, feature = index, overlap_ft = len, "below shared length threshold");
            None
        }
        Err(e) => {
            warn!(dataset, feature = index, error = %e, "skipping feature");
            None
        }
    }
}

pub fn run(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    params: &CorridorParams,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let zone = ctx.buffer_zone(params.buffer_ft)?;
    let normalizer = params
        .normalize_names
        .as_ref()
        .map(|n| n.compile())
        .transpose()
        .map_err(|e| AnalysisError::dataset(&config.id, e.to_string()))?;

    let mut features = Vec::new();
    for index in ctx.candidates(layer, &zone) {
        ctx.visit(&config.id, index)?;
        let feature = &layer.features()[index];
        if !config.admits(&feature.attributes) {
            continue;
        }
        let Some(geometry) = ctx.projected_feature(&config.id, index, feature) else {
            continue;
        };
        let overlap_ft = match corridor_hit(ctx, &zone, &geometry, params.min_shared_ft, &config.id, index) {
            Some(CorridorHit::Touch) => None,
            Some(CorridorHit::Overlap(len)) => Some(len),
            None => continue,
        };
        features.push(MatchedFeature::from_feature(feature, config, overlap_ft));
    }

    if let Some(normalizer) = normalizer {
        let before = features.len();
        let mut seen = HashSet::new();
        features.retain_mut(|f| {
            if !seen.insert(normalizer.key(&f.name)) {
                return false;
            }
            f.name = normalizer.normalize(&f.name);
            true
        });
        debug!(before, after = features.len(), "deduplicated by normalised name");
    }

    Ok(MatchResult::FeatureList { features })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AttributeFilter, FilterOp, Method, NameNormalization};
    use crate::dispatch::CancelToken;
    use crate::feature::{DrawnGeometry, ReferenceFeature};
    use crate::fixtures::{drawn_line, drawn_point, line_ft, multi_line_ft};

    fn config(params: &CorridorParams) -> DatasetConfig {
        DatasetConfig::new("roads", Method::Corridor(params.clone()))
    }

    fn run_corridor(
        drawn: &DrawnGeometry,
        config: &DatasetConfig,
        features: Vec<ReferenceFeature>,
    ) -> Vec<MatchedFeature> {
        let Method::Corridor(params) = &config.method else {
            panic!("corridor config expected");
        };
        let cancel = CancelToken::new();
        let ctx = AnalysisContext::new(drawn, &cancel);
        run(&ctx, config, params, &ReferenceLayer::new(features))
            .unwrap()
            .features()
            .to_vec()
    }

    fn overlap(drawn: &DrawnGeometry, reference: impl Into<Geometry<f64>>, buffer_ft: f64) -> f64 {
        let cancel = CancelToken::new();
        let ctx = AnalysisContext::new(drawn, &cancel);
        let zone = ctx.buffer_zone(buffer_ft).unwrap();
        measure_overlap(&zone, &ctx.frame.project_geometry(&reference.into())).unwrap()
    }

    fn assert_between(value: f64, lo: f64, hi: f64) {
        assert!(value >= lo && value <= hi, "expected {lo}..={hi}, got {value}");
    }

    #[test]
    fn parallel_offset_line_matches() {
        let drawn = drawn_line(1000.0);
        let reference = line_ft(&[(100.0, 50.0), (900.0, 50.0)]);
        assert_between(overlap(&drawn, reference.clone(), 100.0), 700.0, 850.0);

        let matched = run_corridor(
            &drawn,
            &config(&CorridorParams::default()),
            vec![ReferenceFeature::new(reference).with_attr("NAME", "Summer Ave")],
        );
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "Summer Ave");
        assert_between(matched[0].overlap_ft.unwrap(), 700.0, 850.0);
    }

    #[test]
    fn perpendicular_crossing_does_not_match() {
        let drawn = drawn_line(500.0);
        let reference = line_ft(&[(250.0, -250.0), (250.0, 250.0)]);
        assert_between(overlap(&drawn, reference.clone(), 100.0), 0.0, 250.0);

        let matched = run_corridor(
            &drawn,
            &config(&CorridorParams::default()),
            vec![ReferenceFeature::new(reference)],
        );
        assert!(matched.is_empty());
    }

    #[test]
    fn line_outside_buffer_has_no_overlap() {
        let drawn = drawn_line(1000.0);
        let reference = line_ft(&[(0.0, 200.0), (1000.0, 200.0)]);
        assert_eq!(overlap(&drawn, reference.clone(), 100.0), 0.0);
        let matched = run_corridor(
            &drawn,
            &config(&CorridorParams::default()),
            vec![ReferenceFeature::new(reference)],
        );
        assert!(matched.is_empty());
    }

    #[test]
    fn short_parallel_segment_is_below_threshold() {
        let drawn = drawn_line(1000.0);
        let reference = line_ft(&[(400.0, 30.0), (500.0, 30.0)]);
        assert_between(overlap(&drawn, reference.clone(), 100.0), 50.0, 150.0);
        let matched = run_corridor(
            &drawn,
            &config(&CorridorParams::default()),
            vec![ReferenceFeature::new(reference)],
        );
        assert!(matched.is_empty());
    }

    #[test]
    fn multi_part_overlap_accumulates_across_parts() {
        let drawn = drawn_line(1000.0);
        let reference = multi_line_ft(&[
            &[(100.0, 50.0), (350.0, 50.0)],
            &[(700.0, -250.0), (700.0, 250.0)],
        ]);
        let total = overlap(&drawn, reference.clone(), 100.0);
        assert_between(total, 350.0, 650.0);

        let matched = run_corridor(
            &drawn,
            &config(&CorridorParams::default()),
            vec![ReferenceFeature::new(reference)],
        );
        assert_eq!(matched.len(), 1);
        assert_between(matched[0].overlap_ft.unwrap(), 350.0, 650.0);
    }

    #[test]
    fn overlap_never_shrinks_as_buffer_grows() {
        let drawn = DrawnGeometry::line(line_ft(&[(0.0, 0.0), (600.0, 0.0), (900.0, 300.0)])).unwrap();
        let reference = line_ft(&[(-100.0, 120.0), (500.0, -60.0), (1000.0, 250.0)]);
        let mut previous = 0.0;
        for buffer_ft in [0.0, 10.0, 40.0, 80.0, 120.0, 200.0, 400.0] {
            let len = overlap(&drawn, reference.clone(), buffer_ft);
            assert!(len + 1e-6 >= previous, "buffer {buffer_ft}: {len} < {previous}");
            previous = len;
        }
    }

    #[test]
    fn zero_buffer_matches_nothing() {
        let params = CorridorParams {
            buffer_ft: 0.0,
            min_shared_ft: 0.0,
            normalize_names: None,
        };
        let matched = run_corridor(
            &drawn_line(500.0),
            &config(&params),
            vec![ReferenceFeature::new(line_ft(&[(0.0, 0.0), (500.0, 0.0)]))],
        );
        assert!(matched.is_empty());
    }

    #[test]
    fn drawn_point_matches_by_touch() {
        let features = vec![
            ReferenceFeature::new(line_ft(&[(-500.0, 80.0), (500.0, 80.0)])).with_attr("NAME", "near"),
            ReferenceFeature::new(line_ft(&[(-500.0, 150.0), (500.0, 150.0)])).with_attr("NAME", "far"),
        ];
        let matched = run_corridor(&drawn_point(), &config(&CorridorParams::default()), features);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "near");
        assert_eq!(matched[0].overlap_ft, None);
    }

    #[test]
    fn filter_excludes_before_measuring() {
        let features = vec![
            ReferenceFeature::new(line_ft(&[(0.0, 10.0), (900.0, 10.0)]))
                .with_attr("NAME", "A")
                .with_attr("RELIABLE", "Yes"),
            ReferenceFeature::new(line_ft(&[(0.0, -10.0), (900.0, -10.0)]))
                .with_attr("NAME", "B")
                .with_attr("RELIABLE", "No"),
        ];
        let config = config(&CorridorParams::default())
            .with_filter(AttributeFilter::new("RELIABLE", FilterOp::Eq, "yes"));
        let matched = run_corridor(&drawn_line(1000.0), &config, features);
        let names: Vec<&str> = matched.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["A"]);
    }

    #[test]
    fn directional_pairs_collapse_to_one_name() {
        let params = CorridorParams {
            normalize_names: Some(NameNormalization::default()),
            ..CorridorParams::default()
        };
        let eastbound = line_ft(&[(0.0, 20.0), (1000.0, 20.0)]);
        let features = vec![
            ReferenceFeature::new(eastbound.clone()).with_attr("NAME", "Poplar Ave EB"),
            ReferenceFeature::new(line_ft(&[(1000.0, -20.0), (0.0, -20.0)])).with_attr("NAME", "Poplar Ave WB"),
            ReferenceFeature::new(line_ft(&[(0.0, 60.0), (1000.0, 60.0)])).with_attr("NAME", "Walnut Grove Rd"),
        ];
        let matched = run_corridor(&drawn_line(1000.0), &config(&params), features);
        let names: Vec<&str> = matched.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Poplar Ave", "Walnut Grove Rd"]);
        assert_eq!(matched[0].geometry, Some(Geometry::LineString(eastbound)));
    }

    #[test]
    fn feature_without_geometry_is_skipped() {
        let features = vec![
            ReferenceFeature::default().with_attr("NAME", "ghost"),
            ReferenceFeature::new(line_ft(&[(0.0, 10.0), (900.0, 10.0)])).with_attr("NAME", "real"),
        ];
        let matched = run_corridor(&drawn_line(1000.0), &config(&CorridorParams::default()), features);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "real");
    }
}
