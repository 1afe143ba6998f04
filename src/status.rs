//! Corridor overlap broken down by a categorical status attribute.

use std::collections::BTreeMap;

use crate::config::{DatasetConfig, QualityMean, StatusParams};
use crate::corridor::{CorridorHit, corridor_hit};
use crate::dispatch::AnalysisContext;
use crate::error::AnalysisError;
use crate::index::ReferenceLayer;
use crate::result::{MatchResult, MatchedFeature};

#[derive(Debug, Default)]
struct StatusTotals {
    total_ft: f64,
    by_status_ft: BTreeMap<String, f64>,
    quality_sum: f64,
    quality_weight: f64,
}

impl StatusTotals {
    fn add(&mut self, overlap_ft: f64, status: Option<String>, quality: Option<(f64, f64)>) {
        self.total_ft += overlap_ft;
        if let Some(status) = status {
            *self.by_status_ft.entry(status).or_insert(0.0) += overlap_ft;
        }
        if let Some((value, weight)) = quality {
            self.quality_sum += value * weight;
            self.quality_weight += weight;
        }
    }

    fn percentages(&self) -> BTreeMap<String, f64> {
        if self.total_ft <= 0.0 {
            return BTreeMap::new();
        }
        self.by_status_ft
            .iter()
            .map(|(status, len)| (status.clone(), len / self.total_ft * 100.0))
            .collect()
    }

    fn quality_mean(&self) -> Option<f64> {
        (self.quality_weight > 0.0).then(|| self.quality_sum / self.quality_weight)
    }
}

pub fn run(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    params: &StatusParams,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let zone = ctx.buffer_zone(params.buffer_ft)?;
    let mut totals = StatusTotals::default();
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
            Some(CorridorHit::Overlap(len)) => len,
            // A drawn point has no length to share.
            Some(CorridorHit::Touch) => 0.0,
            None => continue,
        };

        let status = feature
            .attr(&params.status_field)
            .map(|v| v.to_string().trim().to_string());
        let quality = params
            .quality_field
            .as_deref()
            .and_then(|field| feature.attr(field))
            .and_then(|v| v.as_f64())
            .filter(|v| v.is_finite())
            .map(|v| match params.quality_mean {
                QualityMean::PerFeature => (v, 1.0),
                QualityMean::LengthWeighted => (v, overlap_ft),
            });
        totals.add(overlap_ft, status, quality);
        features.push(MatchedFeature::from_feature(feature, config, Some(overlap_ft)));
    }

    Ok(MatchResult::LengthByStatus {
        total_length_ft: totals.total_ft,
        by_status_pct: totals.percentages(),
        quality_mean: totals.quality_mean(),
        features,
    })
}
