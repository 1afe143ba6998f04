//! Runs every configured dataset against one drawn geometry.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geo::{BoundingRect, Geometry, Rect};
use rayon::prelude::*;
use tracing::{debug, error, info_span, warn};

use crate::clip::BufferZone;
use crate::config::{DatasetConfig, Method};
use crate::error::{AnalysisError, GeometryError};
use crate::feature::{DrawnGeometry, ReferenceFeature};
use crate::geometry::{LocalFrame, buffer};
use crate::index::ReferenceLayer;
use crate::result::{AnalysisResults, MatchResult};
use crate::{corridor, intersection, proximity, status};

/// Cooperative cancellation shared between the caller and a running
/// analysis. Checked before each dataset and each feature.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Called with the dataset id and feature index before a matcher looks at
/// each candidate feature.
pub type FeatureObserver<'a> = &'a (dyn Fn(&str, usize) + Sync);

/// Per-run state shared by every matcher: the drawn geometry, its planar
/// frame, and the cancellation token.
pub struct AnalysisContext<'a> {
    pub drawn: &'a DrawnGeometry,
    pub frame: LocalFrame,
    projected: Geometry<f64>,
    cancel: &'a CancelToken,
    observer: Option<FeatureObserver<'a>>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(drawn: &'a DrawnGeometry, cancel: &'a CancelToken) -> Self {
        let frame = LocalFrame::new(drawn.first_coord());
        let projected = frame.project_geometry(&drawn.to_geometry());
        Self {
            drawn,
            frame,
            projected,
            cancel,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: FeatureObserver<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn check_cancelled(&self) -> Result<(), AnalysisError> {
        if self.cancel.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Per-feature checkpoint: notify the observer, then honour a pending
    /// cancel.
    pub fn visit(&self, dataset: &str, index: usize) -> Result<(), AnalysisError> {
        if let Some(observe) = self.observer {
            observe(dataset, index);
        }
        self.check_cancelled()
    }

    /// The drawn geometry buffered by `distance_ft` in the planar frame.
    pub fn buffer_zone(&self, distance_ft: f64) -> Result<BufferZone, GeometryError> {
        buffer(&self.projected, distance_ft).map(BufferZone::new)
    }

    /// Candidate feature indices whose envelopes reach the zone.
    pub fn candidates(&self, layer: &ReferenceLayer, zone: &BufferZone) -> Vec<usize> {
        match zone.bbox() {
            Some(bbox) => layer.candidates(self.frame.unproject_rect(bbox)),
            None => Vec::new(),
        }
    }

    /// Candidates whose envelopes touch the drawn geometry itself.
    pub fn direct_candidates(&self, layer: &ReferenceLayer) -> Vec<usize> {
        let area = self
            .drawn
            .to_geometry()
            .bounding_rect()
            .unwrap_or_else(|| Rect::new(self.drawn.first_coord(), self.drawn.first_coord()));
        layer.candidates(area)
    }

    /// The feature's geometry in the planar frame, or `None` (logged) when
    /// it has none.
    pub fn projected_feature(
        &self,
        dataset: &str,
        index: usize,
        feature: &ReferenceFeature,
    ) -> Option<Geometry<f64>> {
        match &feature.geometry {
            Some(g) => Some(self.frame.project_geometry(g)),
            None => {
                warn!(dataset, feature = index, "skipping feature without geometry");
                None
            }
        }
    }
}

/// Run the matcher selected by the dataset's method.
pub fn analyze_dataset(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    ctx.check_cancelled()?;
    match &config.method {
        Method::Corridor(params) => corridor::run(ctx, config, params, layer),
        Method::Intersection => intersection::run(ctx, config, layer),
        Method::Proximity { radius_ft } => proximity::list(ctx, config, *radius_ft, layer),
        Method::ProximityCount {
            radius_ft,
            group_field,
        } => proximity::count(ctx, config, *radius_ft, group_field.as_deref(), layer),
        Method::StatusCorridor(params) => status::run(ctx, config, params, layer),
        Method::Binary { radius_ft } => proximity::binary(ctx, config, *radius_ft, layer),
        Method::Acreage {
            radius_ft,
            sum_field,
        } => proximity::acreage(ctx, config, *radius_ft, sum_field, layer),
    }
}

/// Run one dataset, turning any failure other than cancellation into an
/// empty result.
fn run_isolated(
    ctx: &AnalysisContext<'_>,
    config: &DatasetConfig,
    layer: &ReferenceLayer,
) -> Result<MatchResult, AnalysisError> {
    let _span = info_span!("dataset", id = %config.id, method = config.method.tag()).entered();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyze_dataset(ctx, config, layer)));
    match outcome {
        Ok(Ok(result)) => {
            debug!(matched = result.features().len(), "dataset analysed");
            Ok(result)
        }
        Ok(Err(AnalysisError::Cancelled)) => Err(AnalysisError::Cancelled),
        Ok(Err(e)) => {
            warn!(error = %e, "dataset analysis failed, using empty result");
            Ok(MatchResult::empty_for(&config.method))
        }
        Err(payload) => {
            let e = AnalysisError::dataset(&config.id, panic_message(payload.as_ref()));
            error!(error = %e, "dataset analysis panicked, using empty result");
            Ok(MatchResult::empty_for(&config.method))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn active_datasets<'c>(
    configs: &'c [DatasetConfig],
    data: &'c HashMap<String, ReferenceLayer>,
) -> Vec<(&'c DatasetConfig, &'c ReferenceLayer)> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .filter_map(|c| match data.get(&c.id) {
            Some(layer) => Some((c, layer)),
            None => {
                debug!(dataset = %c.id, "no data loaded, skipping");
                None
            }
        })
        .collect()
}

/// Analyse every enabled dataset that has data, one after another.
pub fn analyze_all(
    drawn: &DrawnGeometry,
    configs: &[DatasetConfig],
    data: &HashMap<String, ReferenceLayer>,
) -> AnalysisResults {
    // A token nobody else holds can never cancel.
    analyze_all_with_cancel(drawn, configs, data, &CancelToken::new()).unwrap_or_default()
}

/// Like [`analyze_all`], but stops with [`AnalysisError::Cancelled`] once
/// `cancel` is triggered.
pub fn analyze_all_with_cancel(
    drawn: &DrawnGeometry,
    configs: &[DatasetConfig],
    data: &HashMap<String, ReferenceLayer>,
    cancel: &CancelToken,
) -> Result<AnalysisResults, AnalysisError> {
    analyze_with_context(&AnalysisContext::new(drawn, cancel), configs, data, false)
}

/// Datasets are independent, so they can run on the rayon pool. Each one
/// writes only its own entry.
pub fn analyze_all_parallel(
    drawn: &DrawnGeometry,
    configs: &[DatasetConfig],
    data: &HashMap<String, ReferenceLayer>,
    cancel: &CancelToken,
) -> Result<AnalysisResults, AnalysisError> {
    analyze_with_context(&AnalysisContext::new(drawn, cancel), configs, data, true)
}

/// Analyse every active dataset under a caller-built context, e.g. one with
/// a [`FeatureObserver`] attached.
pub fn analyze_with_context(
    ctx: &AnalysisContext<'_>,
    configs: &[DatasetConfig],
    data: &HashMap<String, ReferenceLayer>,
    parallel: bool,
) -> Result<AnalysisResults, AnalysisError> {
    let active = active_datasets(configs, data);
    if parallel {
        return active
            .par_iter()
            .map(|(config, layer)| run_isolated(ctx, config, layer).map(|r| (config.id.clone(), r)))
            .collect::<Result<Vec<_>, _>>()
            .map(|pairs| pairs.into_iter().collect());
    }

    let mut results = AnalysisResults::new();
    for (config, layer) in active {
        let result = run_isolated(ctx, config, layer)?;
        results.insert(config.id.clone(), result);
    }
    Ok(results)
}
