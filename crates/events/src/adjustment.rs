//! PartnerAdjustment body (`partner.adjustment.v1`).
//!
//! A single-line obligation written outside any supplier timeline: it carries
//! version `-1` and persists across supplier status changes.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use uprl_core::{AmountEffect, OrderDetailId, PartyType};

use crate::envelope::{EventEnvelope, ParseError};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerAdjustmentBody {
    pub order_detail_id: OrderDetailId,
    pub supplier_reference_id: String,
    #[serde(default)]
    pub fulfillment_instance_id: Option<String>,
    pub party_type: PartyType,
    pub party_id: String,
    #[serde(default)]
    pub party_name: Option<String>,
    pub obligation_type: String,
    /// Unsigned magnitude; direction lives in `amount_effect`.
    pub amount: i64,
    pub amount_effect: AmountEffect,
    pub currency: String,
    #[serde(default)]
    pub calculation: Option<JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PartnerAdjustmentBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        let body: PartnerAdjustmentBody = env.body_as()?;

        if body.amount < 0 {
            return Err(ParseError::body(format!(
                "adjustment amount must be non-negative, got {}; use amount_effect for direction",
                body.amount
            )));
        }
        if body
            .fulfillment_instance_id
            .as_deref()
            .is_some_and(|v| v.is_empty())
        {
            return Err(ParseError::body(
                "fulfillment_instance_id must be non-empty when present",
            ));
        }

        Ok(body)
    }
}
