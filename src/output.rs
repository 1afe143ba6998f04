use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};

use crate::result::{AnalysisResults, MatchResult, MatchedFeature};

/// Convert analysis results to a GeoJSON FeatureCollection, one feature per
/// match, tagged with its dataset id.
pub fn to_geojson(results: &AnalysisResults) -> GeoJson {
    let features: Vec<Feature> = results
        .iter()
        .flat_map(|(dataset_id, result)| {
            result
                .features()
                .iter()
                .map(move |m| matched_to_feature(dataset_id, m))
        })
        .collect();

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn matched_to_feature(dataset_id: &str, matched: &MatchedFeature) -> Feature {
    let mut properties = JsonObject::new();
    for (key, value) in &matched.attributes {
        if let Ok(v) = serde_json::to_value(value) {
            properties.insert(key.clone(), v);
        }
    }
    properties.insert("dataset_id".into(), JsonValue::from(dataset_id));
    properties.insert("name".into(), JsonValue::from(matched.name.as_str()));
    if let Some(overlap) = matched.overlap_ft {
        properties.insert("overlap_ft".into(), JsonValue::from((overlap * 10.0).round() / 10.0));
    }

    Feature {
        bbox: None,
        geometry: matched.geometry.as_ref().map(|g| Geometry::new(Value::from(g))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// One human-readable line per dataset.
pub fn summary_lines(results: &AnalysisResults) -> Vec<String> {
    results
        .iter()
        .map(|(id, result)| format!("{id}: {}", summarize(result)))
        .collect()
}

fn summarize(result: &MatchResult) -> String {
    match result {
        MatchResult::FeatureList { features } => {
            let names: Vec<&str> = features.iter().map(|f| f.name.as_str()).collect();
            if names.is_empty() {
                "no matches".to_string()
            } else {
                format!("{} matched ({})", names.len(), names.join(", "))
            }
        }
        MatchResult::Count {
            total, by_category, ..
        } => {
            if by_category.is_empty() {
                format!("{total} within radius")
            } else {
                let parts: Vec<String> = by_category.iter().map(|(k, n)| format!("{k}: {n}")).collect();
                format!("{total} within radius ({})", parts.join(", "))
            }
        }
        MatchResult::LengthByStatus {
            total_length_ft,
            by_status_pct,
            quality_mean,
            ..
        } => {
            let mut line = format!("{total_length_ft:.0} ft");
            if !by_status_pct.is_empty() {
                let parts: Vec<String> = by_status_pct.iter().map(|(k, pct)| format!("{k} {pct:.1}%")).collect();
                line.push_str(&format!(" ({})", parts.join(", ")));
            }
            if let Some(q) = quality_mean {
                line.push_str(&format!(", quality mean {q:.1}"));
            }
            line
        }
        MatchResult::Binary { detected, features } => {
            if *detected {
                format!("detected ({} features)", features.len())
            } else {
                "not detected".to_string()
            }
        }
        MatchResult::Acreage { total, features } => {
            format!("{total:.2} total over {} features", features.len())
        }
    }
}
