//! Flattens Windows event-log XML records into single-level JSON and removes
//! duplicates across a Kafka stream.
//!
//! Per record the pipeline runs: event-marker pre-filter, XML parse, dedup-key
//! extraction (`Computer` + `EventRecordID`), a check-then-set against a
//! durable per-partition RocksDB store, flattening, and publish to the output
//! topic. Offsets are committed only behind a store flush, so dedup state and
//! read position recover together.

pub mod config;
pub mod error;
pub mod event;
pub mod kafka;
pub mod metrics_const;
pub mod processor;
pub mod service;
pub mod store;
pub mod store_manager;
