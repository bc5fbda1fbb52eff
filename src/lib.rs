//! xfinity-usage - scheduled internet-usage collector.
//!
//! Authenticates against the Xfinity OAuth2 endpoint, queries the GraphQL
//! API for internet-usage data, derives Home-Assistant-friendly attributes,
//! publishes them to MQTT as retained messages, and pushes run metrics to an
//! optional Prometheus Pushgateway. One pull-and-publish cycle per process
//! invocation; scheduling is external.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;

pub use error::{ErrorCategory, ExitCode, Result, UsageError};
