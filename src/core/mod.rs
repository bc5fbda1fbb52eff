//! Core pipeline: HTTP transport, token exchange, usage model, attribute
//! derivation, MQTT publishing, and run metrics.

pub mod attributes;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod mqtt;
pub mod pipeline;
pub mod projection;
pub mod token;
pub mod usage;
