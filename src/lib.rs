//! Screen a drawn route or site against reference GIS layers.
//!
//! Each configured dataset is matched against the drawn geometry with one
//! method (corridor overlap, polygon intersection, radius proximity, status
//! breakdown, detection or attribute sum) and yields one [`MatchResult`].

pub mod clip;
pub mod config;
pub mod corridor;
pub mod dispatch;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod index;
pub mod intersection;
pub mod layers;
pub mod optimize;
pub mod output;
pub mod proximity;
pub mod result;
pub mod status;

#[cfg(test)]
mod fixtures;

pub use config::{AnalysisConfig, DatasetConfig, Method};
pub use dispatch::{
    AnalysisContext, CancelToken, analyze_all, analyze_all_parallel, analyze_all_with_cancel,
    analyze_with_context,
};
pub use error::{AnalysisError, ConfigError, GeometryError};
pub use feature::{AttrValue, DrawnGeometry, DrawnLine, ReferenceFeature};
pub use index::ReferenceLayer;
pub use result::{AnalysisResults, MatchResult, MatchedFeature};
