//! Loading reference layers and the drawn geometry from GeoJSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::{debug, info, warn};

use crate::feature::{AttrValue, Attributes, DrawnGeometry, ReferenceFeature};

const USER_AGENT: &str = concat!("corridor-screen/", env!("CARGO_PKG_VERSION"));

fn parse_geojson(json: &str) -> Result<GeoJson> {
    json.parse::<GeoJson>().context("Failed to parse GeoJSON")
}

fn into_features(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    }
}

/// Parse a GeoJSON document into reference features. A bare Feature or
/// Geometry is accepted as a one-feature layer.
pub fn parse_feature_collection(json: &str) -> Result<Vec<ReferenceFeature>> {
    let features = into_features(parse_geojson(json)?);
    Ok(features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| to_reference_feature(index, feature))
        .collect())
}

fn to_reference_feature(index: usize, feature: Feature) -> ReferenceFeature {
    let geometry = feature
        .geometry
        .and_then(|g| match geo::Geometry::<f64>::try_from(g.value) {
            Ok(geometry) => Some(geometry),
            Err(e) => {
                warn!(feature = index, error = %e, "unreadable geometry");
                None
            }
        });
    let attributes = feature
        .properties
        .as_ref()
        .map(convert_properties)
        .unwrap_or_default();
    ReferenceFeature {
        geometry,
        attributes,
    }
}

/// Scalar properties only: booleans become text, nulls and nested values
/// are dropped.
pub(crate) fn convert_properties(properties: &JsonObject) -> Attributes {
    properties
        .iter()
        .filter_map(|(key, value)| {
            let value = match value {
                JsonValue::Number(n) => AttrValue::Number(n.as_f64()?),
                JsonValue::String(s) => AttrValue::Text(s.clone()),
                JsonValue::Bool(b) => AttrValue::Text(b.to_string()),
                JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

/// Read a GeoJSON FeatureCollection file as is.
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read GeoJSON file: {}", path.display()))?;
    match parse_geojson(&json)? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => bail!("{} is not a FeatureCollection", path.display()),
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Load a reference layer from a file path (relative to `base_dir`) or an
/// http(s) URL. Remote layers are cached under `cache_dir`.
pub fn load_layer(source: &str, base_dir: &Path, cache_dir: &Path) -> Result<Vec<ReferenceFeature>> {
    let json = if is_remote(source) {
        std::fs::create_dir_all(cache_dir)?;
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        fetch_cached(&client, source, &cache_dir.join(cache_file_name(source)))?
    } else {
        let path = resolve(base_dir, source);
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read layer file: {}", path.display()))?
    };
    let features = parse_feature_collection(&json).with_context(|| format!("Invalid layer: {source}"))?;
    info!(source, features = features.len(), "loaded layer");
    Ok(features)
}

fn resolve(base_dir: &Path, source: &str) -> PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Fetch a URL, using a cached file if it exists.
fn fetch_cached(client: &reqwest::blocking::Client, url: &str, cache_path: &Path) -> Result<String> {
    if cache_path.exists() {
        debug!(url, cache = %cache_path.display(), "using cached layer");
        return std::fs::read_to_string(cache_path).context("Failed to read cache file");
    }

    let response = client.get(url).send()?.error_for_status()?;
    let body = response.text()?;

    std::fs::write(cache_path, &body).context("Failed to write cache file")?;
    Ok(body)
}

/// File name for a cached URL: alphanumerics kept, everything else folded
/// to `_`.
fn cache_file_name(url: &str) -> String {
    let stem = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect::<String>();
    let stem = stem.trim_end_matches(".geojson").trim_end_matches(".json");
    format!("{stem}.geojson")
}

/// Parse the drawn geometry from a GeoJSON Geometry, Feature or
/// FeatureCollection (its first feature).
pub fn parse_drawn_geometry(json: &str) -> Result<DrawnGeometry> {
    let Some(feature) = into_features(parse_geojson(json)?).into_iter().next() else {
        bail!("GeoJSON contains no features");
    };
    let Some(geometry) = feature.geometry else {
        bail!("drawn feature has no geometry");
    };
    let geometry = geo::Geometry::<f64>::try_from(geometry.value).context("Unreadable drawn geometry")?;
    Ok(DrawnGeometry::try_from(geometry)?)
}

pub fn load_drawn_geometry(path: &Path) -> Result<DrawnGeometry> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read drawn geometry: {}", path.display()))?;
    parse_drawn_geometry(&json).with_context(|| format!("Invalid drawn geometry in {}", path.display()))
}
