use std::collections::BTreeMap;

use geo::Geometry;
use serde::{Serialize, Serializer};

use crate::config::{DatasetConfig, Method};
use crate::feature::{Attributes, ReferenceFeature};

/// Results of one analysis run, keyed by dataset id.
pub type AnalysisResults = BTreeMap<String, MatchResult>;

/// A reference feature that matched, as reported downstream.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedFeature {
    pub name: String,
    pub attributes: Attributes,
    /// Clipped length inside the corridor, for length-based methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_ft: Option<f64>,
    #[serde(serialize_with = "serialize_geometry")]
    pub geometry: Option<Geometry<f64>>,
}

impl MatchedFeature {
    /// Report `feature` with the dataset's display name and field selection.
    pub fn from_feature(
        feature: &ReferenceFeature,
        config: &DatasetConfig,
        overlap_ft: Option<f64>,
    ) -> Self {
        let display_field = config.display_field.as_deref();
        Self {
            name: feature.display_name(display_field),
            attributes: feature.selected_attributes(&config.fields, display_field),
            overlap_ft,
            geometry: feature.geometry.clone(),
        }
    }
}

fn serialize_geometry<S: Serializer>(
    geometry: &Option<Geometry<f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    geometry
        .as_ref()
        .map(|g| geojson::Geometry::new(geojson::Value::from(g)))
        .serialize(serializer)
}

/// Outcome for one dataset. The variant is fixed by the dataset's method.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchResult {
    FeatureList {
        features: Vec<MatchedFeature>,
    },
    Count {
        total: usize,
        by_category: BTreeMap<String, usize>,
        features: Vec<MatchedFeature>,
    },
    LengthByStatus {
        total_length_ft: f64,
        /// Share of `total_length_ft` per status value, in percent.
        by_status_pct: BTreeMap<String, f64>,
        quality_mean: Option<f64>,
        features: Vec<MatchedFeature>,
    },
    Binary {
        detected: bool,
        features: Vec<MatchedFeature>,
    },
    Acreage {
        total: f64,
        features: Vec<MatchedFeature>,
    },
}

impl MatchResult {
    /// The zeroed result substituted when a dataset fails.
    pub fn empty_for(method: &Method) -> Self {
        match method {
            Method::Corridor(_) | Method::Intersection | Method::Proximity { .. } => {
                MatchResult::FeatureList {
                    features: Vec::new(),
                }
            }
            Method::ProximityCount { .. } => MatchResult::Count {
                total: 0,
                by_category: BTreeMap::new(),
                features: Vec::new(),
            },
            Method::StatusCorridor(_) => MatchResult::LengthByStatus {
                total_length_ft: 0.0,
                by_status_pct: BTreeMap::new(),
                quality_mean: None,
                features: Vec::new(),
            },
            Method::Binary { .. } => MatchResult::Binary {
                detected: false,
                features: Vec::new(),
            },
            Method::Acreage { .. } => MatchResult::Acreage {
                total: 0.0,
                features: Vec::new(),
            },
        }
    }

    pub fn features(&self) -> &[MatchedFeature] {
        match self {
            MatchResult::FeatureList { features }
            | MatchResult::Count { features, .. }
            | MatchResult::LengthByStatus { features, .. }
            | MatchResult::Binary { features, .. }
            | MatchResult::Acreage { features, .. } => features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features().is_empty()
    }
}
