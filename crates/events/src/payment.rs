//! PaymentLifecycle body (`payment.timeline.v1`).
//!
//! Two inbound shapes exist: the canonical nested `payment` object and a
//! legacy flat form (`status`/`payment_method`/`amount`/`currency` at the
//! body root). The flat form is lifted to the nested one before validation.
//!
//! Instruments arrive as `{type, <one sub-payload>}`. Exactly one sub-payload
//! may be populated and it must agree with `type`; multi-populated
//! instruments are producer bugs and are rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use uprl_core::{PaymentMethod, PaymentStatus};

use crate::envelope::{EventEnvelope, ParseError};

// ─────────────────────────────────────────────────────────────────────────────
// Instrument
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualAccountInstrument {
    pub bank: String,
    pub va_number_masked: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardInstrument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    pub last4: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EWalletInstrument {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_masked: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BnplInstrument {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenor_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrInstrument {
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyInstrument {
    pub program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_used: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hint: Option<String>,
}

/// Typed instrument sum; the persisted canonical form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Instrument {
    #[serde(rename = "VA")]
    VirtualAccount(VirtualAccountInstrument),
    #[serde(rename = "CARD")]
    Card(CardInstrument),
    #[serde(rename = "EWALLET")]
    EWallet(EWalletInstrument),
    #[serde(rename = "BNPL")]
    Bnpl(BnplInstrument),
    #[serde(rename = "QR")]
    Qr(QrInstrument),
    #[serde(rename = "LOYALTY")]
    Loyalty(LoyaltyInstrument),
}

/// Wire shape: a tag plus parallel optional sub-payloads.
#[derive(Debug, Clone, Deserialize)]
struct InstrumentWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    va: Option<VirtualAccountInstrument>,
    #[serde(default)]
    card: Option<CardInstrument>,
    #[serde(default)]
    ewallet: Option<EWalletInstrument>,
    #[serde(default)]
    bnpl: Option<BnplInstrument>,
    #[serde(default)]
    qr: Option<QrInstrument>,
    #[serde(default)]
    loyalty: Option<LoyaltyInstrument>,
}

impl Instrument {
    fn from_wire(wire: InstrumentWire) -> Result<Self, ParseError> {
        let populated = [
            wire.va.is_some(),
            wire.card.is_some(),
            wire.ewallet.is_some(),
            wire.bnpl.is_some(),
            wire.qr.is_some(),
            wire.loyalty.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();

        if populated != 1 {
            return Err(ParseError::body(format!(
                "instrument must populate exactly one sub-payload, found {populated}"
            )));
        }

        let mismatch = || {
            ParseError::body(format!(
                "instrument type '{}' does not match its populated sub-payload",
                wire.kind
            ))
        };

        match wire.kind.as_str() {
            "VA" => wire.va.map(Instrument::VirtualAccount).ok_or_else(mismatch),
            "CARD" => wire.card.map(Instrument::Card).ok_or_else(mismatch),
            "EWALLET" => wire.ewallet.map(Instrument::EWallet).ok_or_else(mismatch),
            "BNPL" => wire.bnpl.map(Instrument::Bnpl).ok_or_else(mismatch),
            "QR" => wire.qr.map(Instrument::Qr).ok_or_else(mismatch),
            "LOYALTY" => wire.loyalty.map(Instrument::Loyalty).ok_or_else(mismatch),
            other => Err(ParseError::body(format!("unknown instrument type '{other}'"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment body
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical nested payment payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub currency: String,
    pub payment_id: Option<String>,
    pub pg_reference_id: Option<String>,
    pub authorized_amount: Option<i64>,
    pub captured_amount: Option<i64>,
    pub captured_amount_total: Option<i64>,
    pub instrument: Option<Instrument>,
    pub bnpl_plan: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PaymentMethodWire {
    Typed(PaymentMethod),
    /// Legacy: a bare channel string.
    Channel(String),
}

impl PaymentMethodWire {
    fn lift(self) -> PaymentMethod {
        match self {
            PaymentMethodWire::Typed(m) => m,
            PaymentMethodWire::Channel(channel) => PaymentMethod {
                channel,
                provider: None,
                brand: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentWire {
    status: PaymentStatus,
    payment_method: PaymentMethodWire,
    currency: String,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    pg_reference_id: Option<String>,
    #[serde(default)]
    authorized_amount: Option<i64>,
    #[serde(default)]
    captured_amount: Option<i64>,
    #[serde(default)]
    captured_amount_total: Option<i64>,
    #[serde(default)]
    instrument: Option<InstrumentWire>,
    #[serde(default)]
    bnpl_plan: Option<JsonValue>,
}

impl PaymentWire {
    fn lift(self) -> Result<Payment, ParseError> {
        let instrument = self.instrument.map(Instrument::from_wire).transpose()?;
        Ok(Payment {
            status: self.status,
            payment_method: self.payment_method.lift(),
            currency: self.currency,
            payment_id: self.payment_id,
            pg_reference_id: self.pg_reference_id,
            authorized_amount: self.authorized_amount,
            captured_amount: self.captured_amount,
            captured_amount_total: self.captured_amount_total,
            instrument,
            bnpl_plan: self.bnpl_plan,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaymentBodyWire {
    #[serde(default)]
    payment: Option<PaymentWire>,
    // Legacy flat fields.
    #[serde(default)]
    status: Option<PaymentStatus>,
    #[serde(default)]
    payment_method: Option<PaymentMethodWire>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
}

/// Canonical PaymentLifecycle body.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentLifecycleBody {
    pub payment: Payment,
}

impl PaymentLifecycleBody {
    pub fn from_envelope(env: &EventEnvelope) -> Result<Self, ParseError> {
        let wire: PaymentBodyWire = env.body_as()?;

        let payment = match wire.payment {
            Some(nested) => nested.lift()?,
            None => {
                // Legacy flat shape: lift to the nested form. The single
                // legacy `amount` lands on the field its status implies.
                let status = wire
                    .status
                    .ok_or(ParseError::MissingField("payment.status"))?;
                let payment_method = wire
                    .payment_method
                    .ok_or(ParseError::MissingField("payment.payment_method"))?
                    .lift();
                let currency = wire
                    .currency
                    .ok_or(ParseError::MissingField("payment.currency"))?;

                let (authorized_amount, captured_amount, captured_amount_total) = match status {
                    PaymentStatus::Authorized => (wire.amount, None, None),
                    _ => (None, wire.amount, wire.amount),
                };

                Payment {
                    status,
                    payment_method,
                    currency,
                    payment_id: None,
                    pg_reference_id: None,
                    authorized_amount,
                    captured_amount,
                    captured_amount_total,
                    instrument: None,
                    bnpl_plan: None,
                }
            }
        };

        Ok(Self { payment })
    }
}
