//! # dlq-hero
//!
//! `dlq-hero` moves dead-lettered messages between a broker subscription and
//! local files: drain them out for inspection, republish them, or resend and
//! clear them in bulk across a whole namespace.
//!
//! ## Core Modules
//!
//! - `broker`: the broker boundary (directory and data client traits) and
//!   `LocalBroker`, an embedded sled-backed implementation.
//! - `record`: the persisted record format and its conversions.
//! - `persistence`: JSON-lines record files.
//! - `pipeline`: the concurrent drain and publish pipelines.
//! - `admin`: stats report and the bulk dead-letter operator.
//! - `config`: layered configuration loading.
//! - `utils`: error type and logging setup.

pub mod admin;
pub mod broker;
pub mod config;
pub mod persistence;
pub mod pipeline;
pub mod record;
pub mod utils;
