//! HTTP surface of the UPRL Core.
//!
//! One axum app: `POST /events` feeds the ingestion pipeline; everything
//! else is a read over the fact store (latest-state views, effective
//! payables, per-family history, DLQ inspection).

pub mod app;
