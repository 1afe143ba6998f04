//! Dataset configuration.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::feature::{AttrValue, Attributes};

/// All configured datasets for one run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub datasets: Vec<DatasetConfig>,
}

impl AnalysisConfig {
    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.id.as_str()) {
                return Err(ConfigError::DuplicateId(dataset.id.clone()));
            }
            dataset.validate()?;
        }
        Ok(())
    }
}

/// One reference layer and how to analyse it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(flatten)]
    pub method: Method,

    /// Applied to every candidate before any geometric test.
    #[serde(default)]
    pub filter: Option<AttributeFilter>,

    #[serde(default)]
    pub display_field: Option<String>,

    /// Extra attributes reported for matched features; empty keeps all.
    #[serde(default)]
    pub fields: Vec<String>,

    /// Where the CLI loads the layer from (path or http(s) URL).
    #[serde(default)]
    pub source: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl DatasetConfig {
    pub fn new(id: impl Into<String>, method: Method) -> Self {
        Self {
            id: id.into(),
            name: None,
            enabled: true,
            method,
            filter: None,
            display_field: None,
            fields: Vec::new(),
            source: None,
        }
    }

    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_display_field(mut self, field: &str) -> Self {
        self.display_field = Some(field.to_string());
        self
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether a feature's attributes pass the configured pre-filter.
    pub fn admits(&self, attributes: &Attributes) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(attributes))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |field: &'static str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidDistance {
                    dataset: self.id.clone(),
                    field,
                    value,
                })
            }
        };
        match &self.method {
            Method::Corridor(p) => {
                check("buffer_ft", p.buffer_ft)?;
                check("min_shared_ft", p.min_shared_ft)?;
                if let Some(norm) = &p.normalize_names {
                    norm.compile().map_err(|e| ConfigError::Invalid {
                        dataset: self.id.clone(),
                        reason: format!("bad name suffix pattern: {e}"),
                    })?;
                }
            }
            Method::StatusCorridor(p) => {
                check("buffer_ft", p.buffer_ft)?;
                check("min_shared_ft", p.min_shared_ft)?;
            }
            Method::Intersection => {}
            Method::Proximity { radius_ft }
            | Method::ProximityCount { radius_ft, .. }
            | Method::Binary { radius_ft }
            | Method::Acreage { radius_ft, .. } => check("radius_ft", *radius_ft)?,
        }
        Ok(())
    }
}

/// Analysis method, one per result shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    /// Reference lines running within a buffer of the drawn line.
    Corridor(CorridorParams),
    /// Reference polygons touched by the drawn geometry.
    Intersection,
    /// Features within a radius, listed.
    Proximity { radius_ft: f64 },
    /// Features within a radius, counted (optionally per category).
    ProximityCount {
        radius_ft: f64,
        #[serde(default)]
        group_field: Option<String>,
    },
    /// Corridor overlap broken down by a status attribute.
    StatusCorridor(StatusParams),
    /// Whether any feature lies within a radius.
    Binary { radius_ft: f64 },
    /// Sum of a numeric attribute over features within a radius.
    Acreage { radius_ft: f64, sum_field: String },
}

impl Method {
    pub fn tag(&self) -> &'static str {
        match self {
            Method::Corridor(_) => "corridor",
            Method::Intersection => "intersection",
            Method::Proximity { .. } => "proximity",
            Method::ProximityCount { .. } => "proximity_count",
            Method::StatusCorridor(_) => "status_corridor",
            Method::Binary { .. } => "binary",
            Method::Acreage { .. } => "acreage",
        }
    }
}

fn default_buffer_ft() -> f64 {
    100.0
}

fn default_min_shared_ft() -> f64 {
    300.0
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CorridorParams {
    /// Half-width of the corridor around the drawn line.
    #[serde(default = "default_buffer_ft")]
    pub buffer_ft: f64,
    /// Clipped length a feature needs inside the corridor to match.
    #[serde(default = "default_min_shared_ft")]
    pub min_shared_ft: f64,
    #[serde(default)]
    pub normalize_names: Option<NameNormalization>,
}

impl Default for CorridorParams {
    fn default() -> Self {
        Self {
            buffer_ft: default_buffer_ft(),
            min_shared_ft: default_min_shared_ft(),
            normalize_names: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StatusParams {
    #[serde(default = "default_buffer_ft")]
    pub buffer_ft: f64,
    #[serde(default = "default_min_shared_ft")]
    pub min_shared_ft: f64,
    pub status_field: String,
    #[serde(default)]
    pub quality_field: Option<String>,
    #[serde(default)]
    pub quality_mean: QualityMean,
}

impl StatusParams {
    pub fn new(status_field: &str) -> Self {
        Self {
            buffer_ft: default_buffer_ft(),
            min_shared_ft: default_min_shared_ft(),
            status_field: status_field.to_string(),
            quality_field: None,
            quality_mean: QualityMean::default(),
        }
    }
}

/// How the status aggregator averages its quality metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMean {
    /// Plain mean over matched features, as existing reports expect.
    #[default]
    PerFeature,
    /// Each feature's metric weighted by its clipped overlap length.
    LengthWeighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[serde(alias = "==", alias = "=")]
    Eq,
    #[serde(alias = "!=", alias = "<>")]
    Ne,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
}

/// `field <operator> value` test on a feature's attributes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AttributeFilter {
    pub field: String,
    pub operator: FilterOp,
    pub value: AttrValue,
}

impl AttributeFilter {
    pub fn new(field: &str, operator: FilterOp, value: impl Into<AttrValue>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }

    pub fn matches(&self, attributes: &Attributes) -> bool {
        let Some(actual) = attributes.get(&self.field) else {
            return self.operator == FilterOp::Ne;
        };
        let ordering = match (actual.as_f64(), self.value.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                let a = actual.as_text();
                let b = self.value.as_text();
                if matches!(self.operator, FilterOp::Eq | FilterOp::Ne) {
                    Some(if a.trim().eq_ignore_ascii_case(b.trim()) {
                        Ordering::Equal
                    } else {
                        Ordering::Less
                    })
                } else {
                    Some(a.trim().cmp(b.trim()))
                }
            }
        };
        let Some(ordering) = ordering else {
            return self.operator == FilterOp::Ne;
        };
        match self.operator {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        }
    }
}

fn default_suffixes() -> Vec<String> {
    [
        "NB",
        "SB",
        "EB",
        "WB",
        "Northbound",
        "Southbound",
        "Eastbound",
        "Westbound",
        "Inbound",
        "Outbound",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Directional suffixes stripped from display names before deduplication.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NameNormalization {
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for NameNormalization {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
        }
    }
}

impl NameNormalization {
    pub fn compile(&self) -> Result<NameNormalizer, regex::Error> {
        let mut suffixes: Vec<&str> = self.suffixes.iter().map(String::as_str).collect();
        // Longest first so "Northbound" is not shadowed by a shorter entry.
        suffixes.sort_by_key(|s| std::cmp::Reverse(s.len()));
        let alternatives = suffixes
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| regex::escape(s.trim()))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = if alternatives.is_empty() {
            None
        } else {
            // A suffix must follow a separator or a digit ("I-240WB"), never
            // the letters of a word ("Horeb"). The digit is kept.
            Some(Regex::new(&format!(
                r"(?i)(?:[\s\-_/,(]+|(\d))(?:{alternatives})\)?\s*$"
            ))?)
        };
        Ok(NameNormalizer { pattern })
    }
}

/// Compiled form of [`NameNormalization`].
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    pattern: Option<Regex>,
}

impl NameNormalizer {
    /// Strip one trailing directional suffix. A name that is nothing but a
    /// suffix is kept as is.
    pub fn normalize(&self, name: &str) -> String {
        let trimmed = name.trim();
        let Some(pattern) = &self.pattern else {
            return trimmed.to_string();
        };
        let stripped = pattern.replace(trimmed, "${1}");
        let stripped = stripped.trim();
        if stripped.is_empty() {
            trimmed.to_string()
        } else {
            stripped.to_string()
        }
    }

    /// Key used to deduplicate normalised names.
    pub fn key(&self, name: &str) -> String {
        self.normalize(name).to_lowercase()
    }
}
