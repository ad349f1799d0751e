//! JSON document helpers shared by the storage delegates
//!
//! Entities are stored as JSON objects that carry the payload fields plus
//! the persistence-owned `id`, `created_at` and `updated_at` keys.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::domain::storage::{
    Entity, EntityId, FieldName, Include, CREATED_AT_FIELD, ID_FIELD, RESERVED_FIELDS,
    UPDATED_AT_FIELD,
};
use crate::domain::DomainError;

pub type Document = Map<String, Value>;

/// Serializes a create/update payload, rejecting non-objects and reserved keys
pub fn payload_object<P: Serialize>(
    model: &str,
    payload: &P,
) -> Result<Document, DomainError> {
    let value = serde_json::to_value(payload)?;

    let Value::Object(object) = value else {
        return Err(DomainError::validation(format!(
            "Payload for model '{}' must serialize to an object",
            model
        )));
    };

    if let Some(key) = RESERVED_FIELDS.iter().find(|k| object.contains_key(**k)) {
        return Err(DomainError::validation(format!(
            "Payload for model '{}' may not set '{}'",
            model, key
        )));
    }

    Ok(object)
}

/// Adds a generated id and matching creation/modification timestamps
pub fn stamp_new(
    document: &mut Document,
    id: &EntityId,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    let timestamp = serde_json::to_value(now)?;

    document.insert(ID_FIELD.to_string(), Value::String(id.as_str().to_string()));
    document.insert(CREATED_AT_FIELD.to_string(), timestamp.clone());
    document.insert(UPDATED_AT_FIELD.to_string(), timestamp);
    Ok(())
}

/// Merges a patch into a document and refreshes `updated_at`
///
/// The new timestamp never goes below the stored one.
pub fn apply_patch(
    document: &mut Document,
    patch: &Document,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    for (key, value) in patch {
        document.insert(key.clone(), value.clone());
    }

    let updated_at = timestamp_of(document, UPDATED_AT_FIELD)
        .map(|previous| previous.max(now))
        .unwrap_or(now);
    document.insert(UPDATED_AT_FIELD.to_string(), serde_json::to_value(updated_at)?);
    Ok(())
}

fn timestamp_of(document: &Document, key: &str) -> Option<DateTime<Utc>> {
    document
        .get(key)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

/// True when every criteria key equals the document value (missing = null)
pub fn matches(document: &Document, criteria: &Document) -> bool {
    criteria.iter().all(|(key, expected)| {
        let actual = document.get(key).unwrap_or(&Value::Null);
        values_equal(key, actual, expected)
    })
}

fn is_timestamp_key(key: &str) -> bool {
    key == CREATED_AT_FIELD || key == UPDATED_AT_FIELD
}

fn values_equal(key: &str, actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (exact_integer(a), exact_integer(b)) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::String(a), Value::String(b)) if is_timestamp_key(key) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(a), Some(b)) => a == b,
                _ => a == b,
            }
        }
        _ => actual == expected,
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn exact_integer(number: &Number) -> Option<i128> {
    number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from))
}

/// Integers compare exactly; floats by value, then integers after floats of equal value
fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    match (exact_integer(a), exact_integer(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (left, right) => {
            let x = a.as_f64().unwrap_or(0.0);
            let y = b.as_f64().unwrap_or(0.0);
            x.total_cmp(&y).then_with(|| left.is_some().cmp(&right.is_some()))
        }
    }
}

/// Total order used for sorting: null < bool < number < string < array < object
///
/// Strings under `created_at`/`updated_at` order chronologically, with
/// unparseable values first; every other string orders lexically.
pub fn compare_values(key: &str, a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) if is_timestamp_key(key) => parse_timestamp(a)
            .cmp(&parse_timestamp(b))
            .then_with(|| a.cmp(b)),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Decodes a stored document, keeping only the included relations
pub fn decode<E: Entity>(
    mut document: Document,
    include: &Include<E::Relation>,
) -> Result<E, DomainError> {
    strip_relations::<E>(&mut document, include);

    serde_json::from_value(Value::Object(document)).map_err(|e| {
        DomainError::serialization(format!("Failed to decode {} record: {}", E::MODEL, e))
    })
}

fn strip_relations<E: Entity>(document: &mut Document, include: &Include<E::Relation>) {
    for relation in <E::Relation as FieldName>::all() {
        if !include.contains(relation) {
            document.remove(relation.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage::fixtures::{draft, quantity_patch, Stock, StockRelation, Warehouse};
    use chrono::Duration;
    use serde_json::json;

    fn object(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_payload_object_accepts_draft() {
        let document = payload_object("stock", &draft("p-1", "AAPL", 3)).unwrap();

        assert_eq!(document.get("puuid"), Some(&json!("p-1")));
        assert!(!document.contains_key("warehouse"));
    }

    #[test]
    fn test_payload_object_rejects_reserved_keys() {
        let result = payload_object("stock", &json!({ "id": "x", "symbol": "AAPL" }));
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_payload_object_rejects_non_objects() {
        let result = payload_object("stock", &42);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[test]
    fn test_stamp_new_sets_id_and_equal_timestamps() {
        let mut document = Document::new();
        let id = EntityId::new("s-1");

        stamp_new(&mut document, &id, Utc::now()).unwrap();

        assert_eq!(document.get("id"), Some(&json!("s-1")));
        assert_eq!(document.get("created_at"), document.get("updated_at"));
    }

    #[test]
    fn test_apply_patch_keeps_updated_at_monotonic() {
        let now = Utc::now();
        let mut document = Document::new();
        stamp_new(&mut document, &EntityId::new("s-1"), now).unwrap();

        let patch = payload_object("stock", &quantity_patch(9)).unwrap();
        apply_patch(&mut document, &patch, now - Duration::seconds(30)).unwrap();

        assert_eq!(document.get("quantity"), Some(&json!(9)));
        assert_eq!(timestamp_of(&document, UPDATED_AT_FIELD), Some(now));
    }

    #[test]
    fn test_matches_treats_missing_as_null() {
        let document = object(json!({ "symbol": "AAPL", "quantity": 3 }));

        assert!(matches(&document, &object(json!({ "symbol": "AAPL" }))));
        assert!(matches(&document, &object(json!({ "quantity": 3.0 }))));
        assert!(matches(&document, &object(json!({ "warehouse": null }))));
        assert!(!matches(&document, &object(json!({ "symbol": "MSFT" }))));
        assert!(matches(&document, &Document::new()));
    }

    #[test]
    fn test_compare_values_orders_timestamps_chronologically() {
        let earlier = json!("2024-01-01T00:00:00Z");
        let later = json!("2024-01-01T00:00:00.5Z");

        assert_eq!(
            compare_values(CREATED_AT_FIELD, &earlier, &later),
            Ordering::Less
        );
        assert_eq!(compare_values("quantity", &json!(2), &json!(10)), Ordering::Less);
        assert_eq!(
            compare_values("active", &Value::Null, &json!(false)),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_values_plain_strings_are_lexical() {
        let offset = json!("2024-01-01T01:00:00+01:00");
        let utc = json!("2024-01-01T00:00:00Z");

        assert_eq!(compare_values("symbol", &utc, &offset), Ordering::Less);
        assert_eq!(
            compare_values(UPDATED_AT_FIELD, &utc, &offset),
            Ordering::Less
        );
        assert_eq!(
            compare_values(UPDATED_AT_FIELD, &json!("zzz"), &utc),
            Ordering::Less
        );
    }

    #[test]
    fn test_compare_values_large_integers_exactly() {
        let a = json!(9_007_199_254_740_992i64);
        let b = json!(9_007_199_254_740_993i64);

        assert_eq!(compare_values("quantity", &a, &b), Ordering::Less);
        assert_eq!(compare_values("quantity", &json!(1.5), &json!(2)), Ordering::Less);
        assert_eq!(
            compare_values("quantity", &json!(u64::MAX), &json!(-1)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_matches_large_integers_exactly() {
        let document = object(json!({ "quantity": 9_007_199_254_740_992i64 }));

        assert!(matches(
            &document,
            &object(json!({ "quantity": 9_007_199_254_740_992i64 }))
        ));
        assert!(!matches(
            &document,
            &object(json!({ "quantity": 9_007_199_254_740_993i64 }))
        ));
    }

    #[test]
    fn test_matches_timestamps_only_on_timestamp_keys() {
        let document = object(json!({
            "symbol": "2024-01-01T01:00:00+01:00",
            "created_at": "2024-01-01T01:00:00+01:00",
        }));

        assert!(!matches(
            &document,
            &object(json!({ "symbol": "2024-01-01T00:00:00Z" }))
        ));
        assert!(matches(
            &document,
            &object(json!({ "created_at": "2024-01-01T00:00:00Z" }))
        ));
    }

    #[test]
    fn test_decode_strips_relations_not_included() {
        let mut document = payload_object(
            "stock",
            &crate::domain::storage::fixtures::StockDraft {
                warehouse: Some(Warehouse {
                    code: "W1".to_string(),
                    city: "Lyon".to_string(),
                }),
                ..draft("p-1", "AAPL", 3)
            },
        )
        .unwrap();
        stamp_new(&mut document, &EntityId::new("s-1"), Utc::now()).unwrap();

        let without: Stock = decode(document.clone(), &Include::none()).unwrap();
        let with: Stock = decode(document, &Include::of([StockRelation::Warehouse])).unwrap();

        assert!(without.warehouse.is_none());
        assert_eq!(with.warehouse.unwrap().code, "W1");
    }
}
