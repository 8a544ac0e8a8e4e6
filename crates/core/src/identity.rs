//! Component identity builder.
//!
//! A pricing component has a **dual identity**:
//!
//! - the *semantic id* is a deterministic string derived from the component's
//!   business coordinates (order, optional refund, dimensions, type). It is
//!   **stable across repricing**: re-emitting an equivalent component in a
//!   later snapshot produces the same semantic id, which is what makes
//!   last-version projection and refund lineage possible.
//! - the *instance id* pins one appearance of that semantic component inside
//!   a specific pricing snapshot. It is the primary key of the pricing fact
//!   table and must be unique across the entire store.
//!
//! ## Canonical-dimension rule
//!
//! Dimensions arrive as a flat JSON map. Insertion order is meaningless:
//! keys are sorted lexicographically, null/empty values are dropped, and the
//! surviving `key-value` pairs are joined with `-`. Non-scalar values
//! (objects, arrays) are a producer bug and fail identity construction
//! rather than silently stringifying.

use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::id::{OrderId, RefundId};

/// Number of hex characters kept from the SHA-256 digest.
const INSTANCE_ID_HEX_LEN: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("component_type is missing or empty")]
    MissingComponentType,

    #[error("dimension '{key}' has a non-scalar value")]
    NonScalarDimension { key: String },
}

/// Render a scalar dimension value for the semantic id.
///
/// Returns `None` for null and empty strings (dropped from the id), an error
/// for objects/arrays.
fn scalar_segment(key: &str, value: &JsonValue) -> Result<Option<String>, IdentityError> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::String(s) if s.is_empty() => Ok(None),
        JsonValue::String(s) => Ok(Some(s.clone())),
        JsonValue::Number(n) => Ok(Some(n.to_string())),
        JsonValue::Bool(b) => Ok(Some(b.to_string())),
        JsonValue::Object(_) | JsonValue::Array(_) => Err(IdentityError::NonScalarDimension {
            key: key.to_string(),
        }),
    }
}

/// Build the deterministic semantic id of a pricing component.
///
/// ```text
/// cs-{order_id}[-{refund_id}]-{sorted_dims_joined_by_'-'}-{component_type}
/// ```
///
/// Components with no (surviving) dimensions are order-level:
/// `cs-{order_id}[-{refund_id}]-{component_type}`.
pub fn semantic_id(
    order_id: &OrderId,
    refund_id: Option<&RefundId>,
    dimensions: &Map<String, JsonValue>,
    component_type: &str,
) -> Result<String, IdentityError> {
    if component_type.trim().is_empty() {
        return Err(IdentityError::MissingComponentType);
    }

    let mut keys: Vec<&String> = dimensions.keys().collect();
    keys.sort();

    let mut parts: Vec<String> = Vec::with_capacity(keys.len() + 3);
    parts.push(format!("cs-{order_id}"));
    if let Some(refund_id) = refund_id {
        parts.push(refund_id.to_string());
    }
    for key in keys {
        // Safe: key came from the map above.
        let value = &dimensions[key.as_str()];
        if let Some(rendered) = scalar_segment(key, value)? {
            parts.push(format!("{key}-{rendered}"));
        }
    }
    parts.push(component_type.to_string());

    Ok(parts.join("-"))
}

/// Canonicalize a dimension map for persistence.
///
/// Keys sorted, null/empty values dropped. The canonical bytes are what make
/// the content-addressable semantic id stable across serializers.
pub fn canonical_dimensions(
    dimensions: &Map<String, JsonValue>,
) -> Result<JsonValue, IdentityError> {
    let mut keys: Vec<&String> = dimensions.keys().collect();
    keys.sort();

    // serde_json::Map preserves insertion order, so inserting in sorted key
    // order yields canonical serialization.
    let mut out = Map::with_capacity(keys.len());
    for key in keys {
        let value = &dimensions[key.as_str()];
        if scalar_segment(key, value)?.is_some() {
            out.insert(key.clone(), value.clone());
        }
    }
    Ok(JsonValue::Object(out))
}

/// Build the snapshot-unique instance id of a component occurrence.
///
/// Truncated SHA-256 over `semantic_id || "\0" || pricing_snapshot_id`;
/// 16 hex chars (64 bits) is collision-free at realistic volumes.
pub fn instance_id(semantic_id: &str, pricing_snapshot_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(semantic_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(pricing_snapshot_id.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(INSTANCE_ID_HEX_LEN);
    for byte in digest.iter().take(INSTANCE_ID_HEX_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order() -> OrderId {
        OrderId::new("ORD-9001")
    }

    fn dims(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn semantic_id_sorts_dimension_keys() {
        let a = dims(json!({"order_detail_id": "OD-001", "room_night": "N2"}));
        let b = dims(json!({"room_night": "N2", "order_detail_id": "OD-001"}));

        let id_a = semantic_id(&order(), None, &a, "RoomRate").unwrap();
        let id_b = semantic_id(&order(), None, &b, "RoomRate").unwrap();

        assert_eq!(id_a, id_b);
        assert_eq!(
            id_a,
            "cs-ORD-9001-order_detail_id-OD-001-room_night-N2-RoomRate"
        );
    }

    #[test]
    fn empty_dimensions_yield_order_level_id() {
        let id = semantic_id(&order(), None, &Map::new(), "Markup").unwrap();
        assert_eq!(id, "cs-ORD-9001-Markup");
    }

    #[test]
    fn null_and_empty_values_are_dropped() {
        let d = dims(json!({"order_detail_id": "OD-001", "promo": null, "note": ""}));
        let id = semantic_id(&order(), None, &d, "Tax").unwrap();
        assert_eq!(id, "cs-ORD-9001-order_detail_id-OD-001-Tax");
    }

    #[test]
    fn refund_id_changes_the_semantic_id() {
        let d = dims(json!({"order_detail_id": "OD-001"}));
        let original = semantic_id(&order(), None, &d, "RoomRate").unwrap();
        let refund_id = RefundId::new("RFD-001");
        let refund = semantic_id(&order(), Some(&refund_id), &d, "RoomRate").unwrap();

        assert_ne!(original, refund);
        assert_eq!(refund, "cs-ORD-9001-RFD-001-order_detail_id-OD-001-RoomRate");
    }

    #[test]
    fn numeric_and_bool_dimensions_are_scalars() {
        let d = dims(json!({"pax": 2, "flex": true}));
        let id = semantic_id(&order(), None, &d, "Fee").unwrap();
        assert_eq!(id, "cs-ORD-9001-flex-true-pax-2-Fee");
    }

    #[test]
    fn non_scalar_dimension_is_rejected() {
        let d = dims(json!({"nested": {"a": 1}}));
        let err = semantic_id(&order(), None, &d, "Fee").unwrap_err();
        assert_eq!(
            err,
            IdentityError::NonScalarDimension {
                key: "nested".to_string()
            }
        );
    }

    #[test]
    fn missing_component_type_is_rejected() {
        let err = semantic_id(&order(), None, &Map::new(), " ").unwrap_err();
        assert_eq!(err, IdentityError::MissingComponentType);
    }

    #[test]
    fn canonical_dimensions_sorted_and_pruned() {
        let d = dims(json!({"z": "last", "a": "first", "gone": null}));
        let canon = canonical_dimensions(&d).unwrap();
        assert_eq!(
            serde_json::to_string(&canon).unwrap(),
            r#"{"a":"first","z":"last"}"#
        );
    }

    #[test]
    fn instance_id_is_deterministic_and_snapshot_scoped() {
        let sem = "cs-ORD-9001-order_detail_id-OD-001-RoomRate";
        let a = instance_id(sem, "snap-1");
        let b = instance_id(sem, "snap-1");
        let c = instance_id(sem, "snap-2");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
