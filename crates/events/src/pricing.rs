//! PricingUpdated body (`pricing.commerce.v1`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use uprl_core::OrderDetailId;

use crate::envelope::{EventEnvelope, ParseError};

/// One component of a pricing snapshot, as emitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PricingComponent {
    pub component_type: String,
    /// Signed, minor units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub dimensions: Map<String, JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_refund: bool,
    #[serde(default)]
    pub refund_of_component_semantic_id: Option<String>,
}

/// Producer-declared totals; checked against the component sum at ingest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Totals {
    pub customer_total: i64,
    pub currency: String,
}

/// FX rates and currencies attached to an order detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxContext {
    pub payment_currency: String,
    pub supply_currency: String,
    pub record_currency: String,
    pub gbv_currency: String,
    pub payment_value: i64,
    pub supply_to_payment_fx_rate: f64,
    pub supply_to_record_fx_rate: f64,
    pub payment_to_gbv_fx_rate: f64,
    pub source: String,
    pub timestamp_fx_rate: String,
}

/// Entity/FX context resolved per order detail.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetailContext {
    pub order_detail_id: OrderDetailId,
    #[serde(default)]
    pub entity_context: Option<JsonValue>,
    #[serde(default)]
    pub fx_context: Option<FxContext>,
}

#[derive(Debug, Deserialize)]
struct PricingBodyWire {
    components: Vec<PricingComponent>,
    #[serde(default)]
    version: Option<i64>,
    #[serde(default)]
    totals: Option<Totals>,
    #[serde(default)]
    detail_context: Option<DetailContext>,
    #[serde(default)]
    detail_contexts: Option<Vec<DetailContext>>,
}

/// Canonical PricingUpdated body (legacy `detail_context` lifted).
#[derive(Debug, Clone, PartialEq)]
pub struct PricingUpdatedBody {
    pub components: Vec<PricingComponent>,
    /// Producer-pinned version; present only on re-deliveries of historical
    /// snapshots. Normally the registry assigns the version.
    pub version: Option<i64>,
    pub totals: Option<Totals>,
    pub detail_contexts: Vec<DetailContext>,
}

impl PricingUpdatedBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        let wire: PricingBodyWire = env.body_as()?;

        let detail_contexts = match (wire.detail_context, wire.detail_contexts) {
            (Some(_), Some(_)) => {
                return Err(ParseError::body(
                    "both detail_context and detail_contexts present; send one",
                ))
            }
            (Some(single), None) => vec![single],
            (None, Some(many)) => many,
            (None, None) => Vec::new(),
        };

        if let Some(version) = wire.version {
            if version < 1 {
                return Err(ParseError::body(format!(
                    "pinned version must be >= 1, got {version}"
                )));
            }
        }

        Ok(Self {
            components: wire.components,
            version: wire.version,
            totals: wire.totals,
            detail_contexts,
        })
    }
}
