//! Postgres-backed fact store.
//!
//! Persistent implementation using PostgreSQL. Append-only semantics are
//! enforced by the access pattern (INSERT-only, `ON CONFLICT DO NOTHING`)
//! and commits are transactional: all rows of one event land together or
//! not at all.
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Constraint` |
//! | PoolTimedOut / Io | n/a | `Unavailable` |
//! | ColumnDecode / Decode | n/a | `Serialization` |
//!
//! ## Concurrency
//!
//! The store itself only guarantees row durability and statement atomicity;
//! `MAX(version) + 1` assignment is serialized by the pipeline's per-scope
//! locks. A cross-process race that slips past them still trips the unique
//! index on `(scope, version)` and surfaces as `Conflict`, which the
//! pipeline retries.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use uprl_core::{
    AmountEffect, CanonicalComponentType, DlqEntry, ErrorKind, OrderDetailId, OrderId, PartyType,
    PaymentMethod, PaymentTimelineFact, PricingComponentFact, RefundId, RefundTimelineFact,
    SupplierPayableLine, SupplierTimelineFact, VersionScope,
};

use super::r#trait::{
    CommitOutcome, ComponentLineage, DlqFilter, FactBatch, FactStore, StoreError, VersionRange,
};

/// DDL for the six fact tables and the §4.3 secondary indexes.
const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS pricing_components_fact (
        component_instance_id TEXT PRIMARY KEY,
        component_semantic_id TEXT NOT NULL,
        event_id TEXT NOT NULL,
        order_id TEXT NOT NULL,
        pricing_snapshot_id TEXT NOT NULL,
        version BIGINT NOT NULL,
        component_type TEXT NOT NULL,
        canonical_component_type TEXT NOT NULL,
        amount BIGINT NOT NULL,
        currency TEXT NOT NULL,
        dimensions JSONB NOT NULL,
        description TEXT,
        is_refund BOOLEAN NOT NULL DEFAULT FALSE,
        refund_of_component_semantic_id TEXT,
        emitter_service TEXT,
        emitted_at TIMESTAMPTZ NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL,
        metadata JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_pricing_order_semantic_version \
     ON pricing_components_fact(order_id, component_semantic_id, version DESC)",
    "CREATE INDEX IF NOT EXISTS idx_pricing_event \
     ON pricing_components_fact(event_id)",
    "CREATE INDEX IF NOT EXISTS idx_pricing_refund_of \
     ON pricing_components_fact(refund_of_component_semantic_id)",
    r#"
    CREATE TABLE IF NOT EXISTS payment_timeline (
        event_id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        timeline_version BIGINT NOT NULL,
        status TEXT NOT NULL,
        payment_method JSONB NOT NULL,
        payment_id TEXT,
        pg_reference_id TEXT,
        authorized_amount BIGINT,
        captured_amount BIGINT,
        captured_amount_total BIGINT,
        currency TEXT NOT NULL,
        instrument JSONB,
        emitter_service TEXT,
        emitted_at TIMESTAMPTZ NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL,
        metadata JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_payment_order_version \
     ON payment_timeline(order_id, timeline_version DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS supplier_timeline (
        event_id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        order_detail_id TEXT NOT NULL,
        supplier_id TEXT NOT NULL,
        supplier_reference_id TEXT NOT NULL,
        booking_code TEXT,
        fulfillment_instance_id TEXT,
        supplier_timeline_version BIGINT NOT NULL,
        status TEXT NOT NULL,
        amount BIGINT NOT NULL,
        amount_basis TEXT,
        currency TEXT NOT NULL,
        fx_context JSONB,
        entity_context JSONB,
        emitter_service TEXT,
        emitted_at TIMESTAMPTZ NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL,
        metadata JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_supplier_instance_version \
     ON supplier_timeline(order_id, order_detail_id, supplier_reference_id, \
     COALESCE(fulfillment_instance_id, '__BOOKING_LEVEL__'), supplier_timeline_version DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS supplier_payable_lines (
        line_id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL,
        order_id TEXT NOT NULL,
        order_detail_id TEXT NOT NULL,
        supplier_reference_id TEXT NOT NULL,
        fulfillment_instance_id TEXT,
        supplier_timeline_version BIGINT NOT NULL,
        party_type TEXT NOT NULL,
        party_id TEXT NOT NULL,
        party_name TEXT,
        obligation_type TEXT NOT NULL,
        amount BIGINT NOT NULL,
        amount_effect TEXT NOT NULL DEFAULT 'INCREASES_PAYABLE',
        currency TEXT NOT NULL,
        calculation JSONB,
        description TEXT,
        ingested_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_payable_lines_projection \
     ON supplier_payable_lines(order_id, order_detail_id, supplier_reference_id, \
     COALESCE(fulfillment_instance_id, '__BOOKING_LEVEL__'), party_id, obligation_type, \
     supplier_timeline_version DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS refund_timeline (
        event_id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL,
        refund_id TEXT NOT NULL,
        refund_timeline_version BIGINT NOT NULL,
        status TEXT NOT NULL,
        refund_amount BIGINT NOT NULL,
        currency TEXT NOT NULL,
        reason TEXT,
        emitter_service TEXT,
        emitted_at TIMESTAMPTZ NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL,
        metadata JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_refund_order_refund_version \
     ON refund_timeline(order_id, refund_id, refund_timeline_version DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS dlq (
        dlq_id TEXT PRIMARY KEY,
        event_id TEXT,
        event_type TEXT,
        order_id TEXT,
        raw_event JSONB NOT NULL,
        error_kind TEXT NOT NULL,
        error_detail TEXT NOT NULL,
        received_at TIMESTAMPTZ NOT NULL,
        retry_count INT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dlq_kind ON dlq(error_kind, received_at DESC)",
];

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            if db.code().as_deref() == Some("23505") {
                StoreError::Conflict(db.message().to_string())
            } else {
                StoreError::Constraint(db.message().to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn json_or_decode_err(label: &str, value: serde_json::Value) -> Result<PaymentMethod, StoreError> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::Serialization(format!("{label}: {e}")))
}

/// Postgres-backed append-only fact store.
#[derive(Debug, Clone)]
pub struct PostgresFactStore {
    pool: Arc<PgPool>,
}

impl PostgresFactStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(map_sqlx)?;
        }
        Ok(())
    }

    async fn event_exists(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        event_id: &str,
    ) -> Result<bool, StoreError> {
        // Table names come from a fixed internal set, never from input.
        let sql = format!("SELECT 1 FROM {table} WHERE event_id = $1 LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(event_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(row.is_some())
    }

    async fn insert_pricing(
        tx: &mut Transaction<'_, Postgres>,
        row: &PricingComponentFact,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pricing_components_fact (
                component_instance_id, component_semantic_id, event_id, order_id,
                pricing_snapshot_id, version, component_type, canonical_component_type,
                amount, currency, dimensions, description, is_refund,
                refund_of_component_semantic_id, emitter_service, emitted_at,
                ingested_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (component_instance_id) DO NOTHING
            "#,
        )
        .bind(&row.component_instance_id)
        .bind(&row.component_semantic_id)
        .bind(&row.event_id)
        .bind(row.order_id.as_str())
        .bind(&row.pricing_snapshot_id)
        .bind(row.version)
        .bind(&row.component_type)
        .bind(row.canonical_component_type.as_str())
        .bind(row.amount)
        .bind(&row.currency)
        .bind(&row.dimensions)
        .bind(&row.description)
        .bind(row.is_refund)
        .bind(&row.refund_of_component_semantic_id)
        .bind(&row.emitter_service)
        .bind(row.emitted_at)
        .bind(row.ingested_at)
        .bind(&row.metadata)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_payment(
        tx: &mut Transaction<'_, Postgres>,
        row: &PaymentTimelineFact,
    ) -> Result<(), StoreError> {
        let payment_method = serde_json::to_value(&row.payment_method)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO payment_timeline (
                event_id, order_id, timeline_version, status, payment_method,
                payment_id, pg_reference_id, authorized_amount, captured_amount,
                captured_amount_total, currency, instrument, emitter_service,
                emitted_at, ingested_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&row.event_id)
        .bind(row.order_id.as_str())
        .bind(row.timeline_version)
        .bind(&row.status)
        .bind(payment_method)
        .bind(&row.payment_id)
        .bind(&row.pg_reference_id)
        .bind(row.authorized_amount)
        .bind(row.captured_amount)
        .bind(row.captured_amount_total)
        .bind(&row.currency)
        .bind(&row.instrument)
        .bind(&row.emitter_service)
        .bind(row.emitted_at)
        .bind(row.ingested_at)
        .bind(&row.metadata)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_supplier(
        tx: &mut Transaction<'_, Postgres>,
        row: &SupplierTimelineFact,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO supplier_timeline (
                event_id, order_id, order_detail_id, supplier_id, supplier_reference_id,
                booking_code, fulfillment_instance_id, supplier_timeline_version, status,
                amount, amount_basis, currency, fx_context, entity_context,
                emitter_service, emitted_at, ingested_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&row.event_id)
        .bind(row.order_id.as_str())
        .bind(row.order_detail_id.as_str())
        .bind(&row.supplier_id)
        .bind(&row.supplier_reference_id)
        .bind(&row.booking_code)
        .bind(&row.fulfillment_instance_id)
        .bind(row.supplier_timeline_version)
        .bind(&row.status)
        .bind(row.amount)
        .bind(&row.amount_basis)
        .bind(&row.currency)
        .bind(&row.fx_context)
        .bind(&row.entity_context)
        .bind(&row.emitter_service)
        .bind(row.emitted_at)
        .bind(row.ingested_at)
        .bind(&row.metadata)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_line(
        tx: &mut Transaction<'_, Postgres>,
        row: &SupplierPayableLine,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO supplier_payable_lines (
                line_id, event_id, order_id, order_detail_id, supplier_reference_id,
                fulfillment_instance_id, supplier_timeline_version, party_type, party_id,
                party_name, obligation_type, amount, amount_effect, currency,
                calculation, description, ingested_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (line_id) DO NOTHING
            "#,
        )
        .bind(&row.line_id)
        .bind(&row.event_id)
        .bind(row.order_id.as_str())
        .bind(row.order_detail_id.as_str())
        .bind(&row.supplier_reference_id)
        .bind(&row.fulfillment_instance_id)
        .bind(row.supplier_timeline_version)
        .bind(row.party_type.as_str())
        .bind(&row.party_id)
        .bind(&row.party_name)
        .bind(&row.obligation_type)
        .bind(row.amount)
        .bind(row.amount_effect.as_str())
        .bind(&row.currency)
        .bind(&row.calculation)
        .bind(&row.description)
        .bind(row.ingested_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_refund(
        tx: &mut Transaction<'_, Postgres>,
        row: &RefundTimelineFact,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refund_timeline (
                event_id, order_id, refund_id, refund_timeline_version, status,
                refund_amount, currency, reason, emitter_service, emitted_at,
                ingested_at, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&row.event_id)
        .bind(row.order_id.as_str())
        .bind(row.refund_id.as_str())
        .bind(row.refund_timeline_version)
        .bind(&row.status)
        .bind(row.refund_amount)
        .bind(&row.currency)
        .bind(&row.reason)
        .bind(&row.emitter_service)
        .bind(row.emitted_at)
        .bind(row.ingested_at)
        .bind(&row.metadata)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    fn pricing_from_row(row: &PgRow) -> Result<PricingComponentFact, StoreError> {
        let canonical_raw: String = row.try_get("canonical_component_type").map_err(map_sqlx)?;
        Ok(PricingComponentFact {
            component_instance_id: row.try_get("component_instance_id").map_err(map_sqlx)?,
            component_semantic_id: row.try_get("component_semantic_id").map_err(map_sqlx)?,
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(map_sqlx)?),
            pricing_snapshot_id: row.try_get("pricing_snapshot_id").map_err(map_sqlx)?,
            version: row.try_get("version").map_err(map_sqlx)?,
            component_type: row.try_get("component_type").map_err(map_sqlx)?,
            canonical_component_type: CanonicalComponentType::parse(&canonical_raw)
                .unwrap_or(CanonicalComponentType::Other),
            amount: row.try_get("amount").map_err(map_sqlx)?,
            currency: row.try_get("currency").map_err(map_sqlx)?,
            dimensions: row.try_get("dimensions").map_err(map_sqlx)?,
            description: row.try_get("description").map_err(map_sqlx)?,
            is_refund: row.try_get("is_refund").map_err(map_sqlx)?,
            refund_of_component_semantic_id: row
                .try_get("refund_of_component_semantic_id")
                .map_err(map_sqlx)?,
            emitter_service: row.try_get("emitter_service").map_err(map_sqlx)?,
            emitted_at: row.try_get("emitted_at").map_err(map_sqlx)?,
            ingested_at: row.try_get("ingested_at").map_err(map_sqlx)?,
            metadata: row.try_get("metadata").map_err(map_sqlx)?,
        })
    }

    fn payment_from_row(row: &PgRow) -> Result<PaymentTimelineFact, StoreError> {
        let payment_method: serde_json::Value = row.try_get("payment_method").map_err(map_sqlx)?;
        Ok(PaymentTimelineFact {
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(map_sqlx)?),
            timeline_version: row.try_get("timeline_version").map_err(map_sqlx)?,
            status: row.try_get("status").map_err(map_sqlx)?,
            payment_method: json_or_decode_err("payment_method", payment_method)?,
            payment_id: row.try_get("payment_id").map_err(map_sqlx)?,
            pg_reference_id: row.try_get("pg_reference_id").map_err(map_sqlx)?,
            authorized_amount: row.try_get("authorized_amount").map_err(map_sqlx)?,
            captured_amount: row.try_get("captured_amount").map_err(map_sqlx)?,
            captured_amount_total: row.try_get("captured_amount_total").map_err(map_sqlx)?,
            currency: row.try_get("currency").map_err(map_sqlx)?,
            instrument: row.try_get("instrument").map_err(map_sqlx)?,
            emitter_service: row.try_get("emitter_service").map_err(map_sqlx)?,
            emitted_at: row.try_get("emitted_at").map_err(map_sqlx)?,
            ingested_at: row.try_get("ingested_at").map_err(map_sqlx)?,
            metadata: row.try_get("metadata").map_err(map_sqlx)?,
        })
    }

    fn supplier_from_row(row: &PgRow) -> Result<SupplierTimelineFact, StoreError> {
        Ok(SupplierTimelineFact {
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(map_sqlx)?),
            order_detail_id: OrderDetailId::new(
                row.try_get::<String, _>("order_detail_id").map_err(map_sqlx)?,
            ),
            supplier_id: row.try_get("supplier_id").map_err(map_sqlx)?,
            supplier_reference_id: row.try_get("supplier_reference_id").map_err(map_sqlx)?,
            booking_code: row.try_get("booking_code").map_err(map_sqlx)?,
            fulfillment_instance_id: row.try_get("fulfillment_instance_id").map_err(map_sqlx)?,
            supplier_timeline_version: row
                .try_get("supplier_timeline_version")
                .map_err(map_sqlx)?,
            status: row.try_get("status").map_err(map_sqlx)?,
            amount: row.try_get("amount").map_err(map_sqlx)?,
            amount_basis: row.try_get("amount_basis").map_err(map_sqlx)?,
            currency: row.try_get("currency").map_err(map_sqlx)?,
            fx_context: row.try_get("fx_context").map_err(map_sqlx)?,
            entity_context: row.try_get("entity_context").map_err(map_sqlx)?,
            emitter_service: row.try_get("emitter_service").map_err(map_sqlx)?,
            emitted_at: row.try_get("emitted_at").map_err(map_sqlx)?,
            ingested_at: row.try_get("ingested_at").map_err(map_sqlx)?,
            metadata: row.try_get("metadata").map_err(map_sqlx)?,
        })
    }

    fn line_from_row(row: &PgRow) -> Result<SupplierPayableLine, StoreError> {
        let party_type: String = row.try_get("party_type").map_err(map_sqlx)?;
        let amount_effect: String = row.try_get("amount_effect").map_err(map_sqlx)?;
        Ok(SupplierPayableLine {
            line_id: row.try_get("line_id").map_err(map_sqlx)?,
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(map_sqlx)?),
            order_detail_id: OrderDetailId::new(
                row.try_get::<String, _>("order_detail_id").map_err(map_sqlx)?,
            ),
            supplier_reference_id: row.try_get("supplier_reference_id").map_err(map_sqlx)?,
            fulfillment_instance_id: row.try_get("fulfillment_instance_id").map_err(map_sqlx)?,
            supplier_timeline_version: row
                .try_get("supplier_timeline_version")
                .map_err(map_sqlx)?,
            party_type: PartyType::parse(&party_type).ok_or_else(|| {
                StoreError::Serialization(format!("unknown party_type '{party_type}'"))
            })?,
            party_id: row.try_get("party_id").map_err(map_sqlx)?,
            party_name: row.try_get("party_name").map_err(map_sqlx)?,
            obligation_type: row.try_get("obligation_type").map_err(map_sqlx)?,
            amount: row.try_get("amount").map_err(map_sqlx)?,
            amount_effect: AmountEffect::parse(&amount_effect).ok_or_else(|| {
                StoreError::Serialization(format!("unknown amount_effect '{amount_effect}'"))
            })?,
            currency: row.try_get("currency").map_err(map_sqlx)?,
            calculation: row.try_get("calculation").map_err(map_sqlx)?,
            description: row.try_get("description").map_err(map_sqlx)?,
            ingested_at: row.try_get("ingested_at").map_err(map_sqlx)?,
        })
    }

    fn refund_from_row(row: &PgRow) -> Result<RefundTimelineFact, StoreError> {
        Ok(RefundTimelineFact {
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            order_id: OrderId::new(row.try_get::<String, _>("order_id").map_err(map_sqlx)?),
            refund_id: RefundId::new(row.try_get::<String, _>("refund_id").map_err(map_sqlx)?),
            refund_timeline_version: row.try_get("refund_timeline_version").map_err(map_sqlx)?,
            status: row.try_get("status").map_err(map_sqlx)?,
            refund_amount: row.try_get("refund_amount").map_err(map_sqlx)?,
            currency: row.try_get("currency").map_err(map_sqlx)?,
            reason: row.try_get("reason").map_err(map_sqlx)?,
            emitter_service: row.try_get("emitter_service").map_err(map_sqlx)?,
            emitted_at: row.try_get("emitted_at").map_err(map_sqlx)?,
            ingested_at: row.try_get("ingested_at").map_err(map_sqlx)?,
            metadata: row.try_get("metadata").map_err(map_sqlx)?,
        })
    }

    fn dlq_from_row(row: &PgRow) -> Result<DlqEntry, StoreError> {
        let error_kind: String = row.try_get("error_kind").map_err(map_sqlx)?;
        let retry_count: i32 = row.try_get("retry_count").map_err(map_sqlx)?;
        Ok(DlqEntry {
            dlq_id: row.try_get("dlq_id").map_err(map_sqlx)?,
            event_id: row.try_get("event_id").map_err(map_sqlx)?,
            event_type: row.try_get("event_type").map_err(map_sqlx)?,
            order_id: row
                .try_get::<Option<String>, _>("order_id")
                .map_err(map_sqlx)?
                .map(OrderId::new),
            raw_event: row.try_get("raw_event").map_err(map_sqlx)?,
            error_kind: ErrorKind::parse(&error_kind).ok_or_else(|| {
                StoreError::Serialization(format!("unknown error_kind '{error_kind}'"))
            })?,
            error_detail: row.try_get("error_detail").map_err(map_sqlx)?,
            received_at: row.try_get("received_at").map_err(map_sqlx)?,
            retry_count: retry_count.max(0) as u32,
        })
    }

    fn range_clause(range: VersionRange, column: &str, next_param: usize) -> (String, Vec<i64>) {
        let mut clause = String::new();
        let mut binds = Vec::new();
        if let Some(from) = range.from {
            clause.push_str(&format!(" AND {column} >= ${}", next_param + binds.len()));
            binds.push(from);
        }
        if let Some(to) = range.to {
            clause.push_str(&format!(" AND {column} <= ${}", next_param + binds.len()));
            binds.push(to);
        }
        (clause, binds)
    }
}

#[async_trait]
impl FactStore for PostgresFactStore {
    async fn commit(&self, batch: FactBatch) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let table = match &batch {
            FactBatch::Pricing(_) => "pricing_components_fact",
            FactBatch::Payment(_) => "payment_timeline",
            FactBatch::Supplier { .. } => "supplier_timeline",
            FactBatch::Refund(_) => "refund_timeline",
            FactBatch::Adjustment(_) => "supplier_payable_lines",
        };
        if self.event_exists(&mut tx, table, batch.event_id()).await? {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(CommitOutcome::DuplicateEvent);
        }

        let rows = batch.row_count();
        match &batch {
            FactBatch::Pricing(components) => {
                for component in components {
                    Self::insert_pricing(&mut tx, component).await?;
                }
            }
            FactBatch::Payment(row) => Self::insert_payment(&mut tx, row).await?,
            FactBatch::Supplier { timeline, lines } => {
                Self::insert_supplier(&mut tx, timeline).await?;
                for line in lines {
                    Self::insert_line(&mut tx, line).await?;
                }
            }
            FactBatch::Refund(row) => Self::insert_refund(&mut tx, row).await?,
            FactBatch::Adjustment(line) => Self::insert_line(&mut tx, line).await?,
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(CommitOutcome::Committed { rows })
    }

    async fn max_version(&self, scope: &VersionScope) -> Result<Option<i64>, StoreError> {
        let row = match scope {
            VersionScope::Pricing { order_id } => {
                sqlx::query("SELECT MAX(version) FROM pricing_components_fact WHERE order_id = $1")
                    .bind(order_id.as_str())
                    .fetch_one(&*self.pool)
                    .await
            }
            VersionScope::Payment { order_id } => {
                sqlx::query("SELECT MAX(timeline_version) FROM payment_timeline WHERE order_id = $1")
                    .bind(order_id.as_str())
                    .fetch_one(&*self.pool)
                    .await
            }
            VersionScope::Supplier {
                order_id,
                order_detail_id,
                supplier_reference_id,
                fulfillment,
            } => {
                sqlx::query(
                    "SELECT MAX(supplier_timeline_version) FROM supplier_timeline \
                     WHERE order_id = $1 AND order_detail_id = $2 \
                     AND supplier_reference_id = $3 \
                     AND COALESCE(fulfillment_instance_id, '__BOOKING_LEVEL__') = $4",
                )
                .bind(order_id.as_str())
                .bind(order_detail_id.as_str())
                .bind(supplier_reference_id)
                .bind(fulfillment.as_key())
                .fetch_one(&*self.pool)
                .await
            }
            VersionScope::Refund {
                order_id,
                refund_id,
            } => {
                sqlx::query(
                    "SELECT MAX(refund_timeline_version) FROM refund_timeline \
                     WHERE order_id = $1 AND refund_id = $2",
                )
                .bind(order_id.as_str())
                .bind(refund_id.as_str())
                .fetch_one(&*self.pool)
                .await
            }
            // Reserved family; no backing table yet.
            VersionScope::Issuance { .. } => return Ok(None),
        };

        let row = row.map_err(map_sqlx)?;
        row.try_get::<Option<i64>, _>(0).map_err(map_sqlx)
    }

    async fn pricing_components(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PricingComponentFact>, StoreError> {
        let (clause, binds) = Self::range_clause(range, "version", 2);
        let sql = format!(
            "SELECT * FROM pricing_components_fact WHERE order_id = $1{clause} \
             ORDER BY version ASC, emitted_at ASC, ingested_at ASC"
        );
        let mut query = sqlx::query(&sql).bind(order_id.as_str());
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&*self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(Self::pricing_from_row).collect()
    }

    async fn payment_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<PaymentTimelineFact>, StoreError> {
        let (clause, binds) = Self::range_clause(range, "timeline_version", 2);
        let sql = format!(
            "SELECT * FROM payment_timeline WHERE order_id = $1{clause} \
             ORDER BY timeline_version ASC, emitted_at ASC"
        );
        let mut query = sqlx::query(&sql).bind(order_id.as_str());
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&*self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(Self::payment_from_row).collect()
    }

    async fn supplier_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<SupplierTimelineFact>, StoreError> {
        let (clause, binds) = Self::range_clause(range, "supplier_timeline_version", 2);
        let sql = format!(
            "SELECT * FROM supplier_timeline WHERE order_id = $1{clause} \
             ORDER BY supplier_timeline_version ASC, emitted_at ASC"
        );
        let mut query = sqlx::query(&sql).bind(order_id.as_str());
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&*self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(Self::supplier_from_row).collect()
    }

    async fn payable_lines(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<SupplierPayableLine>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM supplier_payable_lines WHERE order_id = $1 \
             ORDER BY supplier_timeline_version ASC, party_id ASC, obligation_type ASC, line_id ASC",
        )
        .bind(order_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(Self::line_from_row).collect()
    }

    async fn refund_timeline(
        &self,
        order_id: &OrderId,
        range: VersionRange,
    ) -> Result<Vec<RefundTimelineFact>, StoreError> {
        let (clause, binds) = Self::range_clause(range, "refund_timeline_version", 2);
        let sql = format!(
            "SELECT * FROM refund_timeline WHERE order_id = $1{clause} \
             ORDER BY refund_id ASC, refund_timeline_version ASC"
        );
        let mut query = sqlx::query(&sql).bind(order_id.as_str());
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&*self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(Self::refund_from_row).collect()
    }

    async fn component_lineage(
        &self,
        semantic_id: &str,
    ) -> Result<ComponentLineage, StoreError> {
        let original = sqlx::query(
            "SELECT * FROM pricing_components_fact \
             WHERE component_semantic_id = $1 AND is_refund = FALSE ORDER BY version ASC",
        )
        .bind(semantic_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        let refunds = sqlx::query(
            "SELECT * FROM pricing_components_fact \
             WHERE refund_of_component_semantic_id = $1 AND is_refund = TRUE ORDER BY version ASC",
        )
        .bind(semantic_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(ComponentLineage {
            original: original
                .iter()
                .map(Self::pricing_from_row)
                .collect::<Result<_, _>>()?,
            refunds: refunds
                .iter()
                .map(Self::pricing_from_row)
                .collect::<Result<_, _>>()?,
        })
    }

    async fn order_ids(&self) -> Result<Vec<OrderId>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT order_id FROM ( \
                SELECT order_id FROM pricing_components_fact \
                UNION SELECT order_id FROM payment_timeline \
                UNION SELECT order_id FROM supplier_timeline \
                UNION SELECT order_id FROM refund_timeline \
             ) AS all_orders ORDER BY order_id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("order_id")
                    .map(OrderId::new)
                    .map_err(map_sqlx)
            })
            .collect()
    }

    async fn push_dlq(&self, entry: DlqEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO dlq (
                dlq_id, event_id, event_type, order_id, raw_event, error_kind,
                error_detail, received_at, retry_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (dlq_id) DO NOTHING
            "#,
        )
        .bind(&entry.dlq_id)
        .bind(&entry.event_id)
        .bind(&entry.event_type)
        .bind(entry.order_id.as_ref().map(|id| id.as_str().to_string()))
        .bind(&entry.raw_event)
        .bind(entry.error_kind.as_str())
        .bind(&entry.error_detail)
        .bind(entry.received_at)
        .bind(entry.retry_count as i32)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn list_dlq(&self, filter: DlqFilter) -> Result<Vec<DlqEntry>, StoreError> {
        let mut sql = "SELECT * FROM dlq WHERE TRUE".to_string();
        let mut param = 1;
        if filter.error_kind.is_some() {
            sql.push_str(&format!(" AND error_kind = ${param}"));
            param += 1;
        }
        if filter.order_id.is_some() {
            sql.push_str(&format!(" AND order_id = ${param}"));
            param += 1;
        }
        sql.push_str(" ORDER BY received_at DESC");
        if filter.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${param}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(kind) = filter.error_kind {
            query = query.bind(kind.as_str());
        }
        if let Some(order_id) = &filter.order_id {
            query = query.bind(order_id.as_str().to_string());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit as i64);
        }

        let rows = query.fetch_all(&*self.pool).await.map_err(map_sqlx)?;
        rows.iter().map(Self::dlq_from_row).collect()
    }
}
