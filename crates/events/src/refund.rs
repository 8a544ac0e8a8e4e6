//! Refund bodies: `refund.components.v1` and `refund.lifecycle.v1`.
//!
//! `refund.issued` creates pricing components with lineage back to the
//! original component; `RefundLifecycle` is a status-only timeline event.

use serde::Deserialize;

use uprl_core::{RefundId, RefundStatus};

use crate::envelope::{EventEnvelope, ParseError};
use crate::pricing::PricingComponent;

/// RefundIssued body: components with lineage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundIssuedBody {
    pub refund_id: RefundId,
    pub components: Vec<PricingComponent>,
    /// Producer-pinned pricing version (re-delivery path), like PricingUpdated.
    #[serde(default)]
    pub version: Option<i64>,
}

impl RefundIssuedBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        let body: RefundIssuedBody = env.body_as()?;

        for (idx, component) in body.components.iter().enumerate() {
            if component
                .refund_of_component_semantic_id
                .as_deref()
                .map_or(true, str::is_empty)
            {
                return Err(ParseError::body(format!(
                    "refund component [{idx}] is missing refund_of_component_semantic_id"
                )));
            }
            // Invariant: refund components are strictly negative; the lineage
            // row must subtract from the order total.
            if component.amount >= 0 {
                return Err(ParseError::body(format!(
                    "refund component [{idx}] amount must be negative, got {}",
                    component.amount
                )));
            }
        }

        Ok(body)
    }
}

/// RefundLifecycle body: status transition for one refund.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefundLifecycleBody {
    pub refund_id: RefundId,
    pub status: RefundStatus,
    pub refund_amount: i64,
    pub currency: String,
    #[serde(default)]
    pub refund_reason: Option<String>,
}

impl RefundLifecycleBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        env.body_as()
    }
}
