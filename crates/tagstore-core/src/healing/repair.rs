//! Structural repair of a raw tasks document.
//!
//! Works on `serde_json::Value` so that a document too broken to deserialize
//! into [`TaggedStore`](crate::domain::TaggedStore) can still be fixed. Only
//! malformed pieces are replaced; valid sibling fields are kept.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::domain::MASTER_TAG;

/// Tag that receives legacy tasks when `master` already exists.
pub const LEGACY_TAG: &str = "legacy";

fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn fresh_metadata(tag: &str, now: DateTime<Utc>) -> Value {
    json!({
        "created": timestamp(now),
        "updated": timestamp(now),
        "description": format!("Tasks for {tag} context"),
    })
}

/// An empty tag entry with fresh metadata.
pub fn fresh_tag(tag: &str, now: DateTime<Utc>) -> Value {
    json!({ "tasks": [], "metadata": fresh_metadata(tag, now) })
}

/// A document holding only an empty `master` tag.
pub fn minimal_document(now: DateTime<Utc>) -> Value {
    let mut doc = Map::new();
    doc.insert(MASTER_TAG.to_string(), fresh_tag(MASTER_TAG, now));
    Value::Object(doc)
}

fn is_timestamp(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok())
}

/// Repair one tag entry in place. Returns what was changed.
fn repair_tag(tag: &str, entry: &mut Value, now: DateTime<Utc>) -> Vec<String> {
    let Some(fields) = entry.as_object_mut() else {
        *entry = fresh_tag(tag, now);
        return vec![format!("tag '{tag}': replaced non-object entry")];
    };

    let mut actions = Vec::new();
    if !fields.get("tasks").is_some_and(Value::is_array) {
        fields.insert("tasks".to_string(), Value::Array(Vec::new()));
        actions.push(format!("tag '{tag}': reset malformed tasks list"));
    }

    match fields.get_mut("metadata").and_then(Value::as_object_mut) {
        None => {
            fields.insert("metadata".to_string(), fresh_metadata(tag, now));
            actions.push(format!("tag '{tag}': rebuilt metadata"));
        }
        Some(metadata) => {
            for key in ["created", "updated"] {
                if !is_timestamp(metadata.get(key)) {
                    metadata.insert(key.to_string(), timestamp(now));
                    actions.push(format!("tag '{tag}': fixed metadata.{key}"));
                }
            }
            if metadata
                .get("description")
                .is_some_and(|d| !d.is_string() && !d.is_null())
            {
                metadata.remove("description");
                actions.push(format!("tag '{tag}': dropped malformed metadata.description"));
            }
        }
    }
    actions
}

/// Move a top-level `{"tasks": [...]}` list into a tag.
fn migrate_legacy(doc: &mut Map<String, Value>, now: DateTime<Utc>) -> Option<String> {
    if !doc.get("tasks").is_some_and(Value::is_array) {
        return None;
    }
    let tasks = doc.remove("tasks").unwrap_or_else(|| Value::Array(Vec::new()));
    let target = if doc.contains_key(MASTER_TAG) {
        LEGACY_TAG
    } else {
        MASTER_TAG
    };
    let metadata = match doc.remove("metadata") {
        Some(Value::Object(mut legacy)) => {
            for key in ["created", "updated"] {
                if !is_timestamp(legacy.get(key)) {
                    legacy.insert(key.to_string(), timestamp(now));
                }
            }
            Value::Object(legacy)
        }
        _ => fresh_metadata(target, now),
    };
    doc.insert(target.to_string(), json!({ "tasks": tasks, "metadata": metadata }));
    Some(format!("migrated legacy task list into tag '{target}'"))
}

/// Repair a parsed document. Returns the repaired value and a description
/// of each change; an empty list means the document was already sound.
///
/// `doc` must be a JSON object.
pub fn repair_document(doc: Map<String, Value>, now: DateTime<Utc>) -> (Map<String, Value>, Vec<String>) {
    let mut doc = doc;
    let mut actions: Vec<String> = migrate_legacy(&mut doc, now).into_iter().collect();

    for (tag, entry) in doc.iter_mut() {
        actions.extend(repair_tag(tag, entry, now));
    }

    if !doc.contains_key(MASTER_TAG) {
        doc.insert(MASTER_TAG.to_string(), fresh_tag(MASTER_TAG, now));
        actions.push("synthesized missing master tag".to_string());
    }
    (doc, actions)
}
