//! Enricher (spec §4.4): performs the left-join against a single feature or
//! a feature collection, expressed over `serde_json::Value` so the manager
//! stays agnostic of any concrete Feature type.

use serde_json::{Map, Value};

use super::model::JoinTable;

/// Joins `feature_value` (a GeoJSON Feature or FeatureCollection) against
/// `table`, matching `table.collection_key`'s value in each feature's
/// `properties` against `table.join_key`. Matching rows have `table`'s
/// `join_fields` merged into `properties`; every feature gets `joined: bool`
/// and, for a FeatureCollection, `numberJoined` on the top-level object.
///
/// A feature with no `properties` object is treated as having an empty one
/// (never panics; always reports `joined: false`).
pub fn perform_join(feature_value: &mut Value, table: &JoinTable) -> usize {
    match feature_value {
        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("FeatureCollection") => {
            let mut number_joined = 0;
            if let Some(Value::Array(features)) = obj.get_mut("features") {
                for feature in features.iter_mut() {
                    if join_single_feature(feature, table) {
                        number_joined += 1;
                    }
                }
            }
            obj.insert("numberJoined".to_string(), Value::from(number_joined));
            number_joined
        }
        _ => {
            if join_single_feature(feature_value, table) {
                1
            } else {
                0
            }
        }
    }
}

fn join_single_feature(feature: &mut Value, table: &JoinTable) -> bool {
    let Value::Object(feature_obj) = feature else {
        return false;
    };

    let properties = feature_obj
        .entry("properties".to_string())
        .or_insert_with(|| Value::Object(Map::new()));

    let Value::Object(properties) = properties else {
        feature_obj.insert("joined".to_string(), Value::Bool(false));
        return false;
    };

    let key_value = properties
        .get(&table.collection_key)
        .map(value_as_join_key);

    let matched = key_value
        .as_deref()
        .and_then(|key| table.data.get(key))
        .cloned();

    match matched {
        Some(values) => {
            for (field_name, value) in table.join_fields.iter().zip(values.iter()) {
                properties.insert(field_name.clone(), Value::String(value.clone()));
            }
            properties.insert("joined".to_string(), Value::Bool(true));
            true
        }
        None => {
            properties.insert("joined".to_string(), Value::Bool(false));
            false
        }
    }
}

/// Renders a property value as a join-key string, mirroring how the CSV
/// ingestor stores keys (trimmed text, numbers without trailing `.0`).
fn value_as_join_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
