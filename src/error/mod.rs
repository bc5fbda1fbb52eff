//! Error types for xfinity-usage.
//!
//! Uses `thiserror` for structured error types that map to exit codes and
//! Prometheus error-category labels.
//!
//! ## Error Taxonomy
//!
//! Every failure in a run falls into one of the categories from
//! [`ErrorCategory`]: configuration validation, token refresh, usage fetch,
//! usage parse, MQTT publish, metrics push, or internal. All are terminal for
//! the run; the process records the category, attempts a best-effort metrics
//! push, and exits non-zero.
//!
//! [`UsageError::InvalidMeasurement`] and [`UsageError::InvalidUsageStructure`]
//! are kept as distinct variants from the transport errors: they indicate an
//! upstream schema or data change that needs human attention rather than a
//! transient network condition.

use thiserror::Error;

/// Convenience result type alias.
pub type Result<T> = std::result::Result<T, UsageError>;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories, used as the `category` label on the
/// `errors_total` counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid configuration (flags/environment).
    ConfigValidation,
    /// OAuth2 refresh-token exchange failed.
    TokenRefresh,
    /// GraphQL usage request failed (transport or non-200 status).
    UsageFetch,
    /// Usage payload was structurally invalid or carried an unconvertible
    /// measurement.
    UsageParse,
    /// MQTT connect, publish, or acknowledgement failed.
    MqttPublish,
    /// Pushgateway delivery failed.
    MetricsPush,
    /// Unexpected errors (I/O, serialization, deadline backstop).
    Internal,
}

impl ErrorCategory {
    /// Label value recorded on the `errors_total` metric.
    #[must_use]
    pub const fn metric_label(self) -> &'static str {
        match self {
            Self::ConfigValidation => "config_validation",
            Self::TokenRefresh => "token_refresh",
            Self::UsageFetch => "usage_fetch",
            Self::UsageParse => "usage_parse",
            Self::MqttPublish => "mqtt_publish",
            Self::MetricsPush => "metrics_push",
            Self::Internal => "internal",
        }
    }

    /// Human-readable description of the category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConfigValidation => "Configuration error",
            Self::TokenRefresh => "Token refresh error",
            Self::UsageFetch => "Usage fetch error",
            Self::UsageParse => "Usage parse error",
            Self::MqttPublish => "MQTT publish error",
            Self::MetricsPush => "Metrics push error",
            Self::Internal => "Internal error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Config validation or upstream schema/data errors
    ParseError = 3,
    /// Run deadline elapsed
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for xfinity-usage operations.
#[derive(Error, Debug)]
pub enum UsageError {
    // ==========================================================================
    // Configuration errors (Category: ConfigValidation)
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A specific flag or environment value is invalid.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    // ==========================================================================
    // Token errors (Category: TokenRefresh)
    // ==========================================================================
    /// OAuth2 refresh-token exchange failed.
    #[error("token refresh failed{}: {message}", fmt_status(.status))]
    TokenRefresh {
        status: Option<u16>,
        message: String,
    },

    // ==========================================================================
    // Fetch errors (Category: UsageFetch)
    // ==========================================================================
    /// GraphQL usage request failed.
    #[error("usage fetch failed{}: {message}", fmt_status(.status))]
    UsageFetch {
        status: Option<u16>,
        message: String,
    },

    // ==========================================================================
    // Parse errors (Category: UsageParse)
    // ==========================================================================
    /// Required nesting level absent from the usage payload.
    #[error("invalid usage data structure: {0}")]
    InvalidUsageStructure(String),

    /// A measured value could not be converted to gigabytes.
    #[error("invalid measurement: {reason}")]
    InvalidMeasurement { reason: String },

    // ==========================================================================
    // Publish errors (Category: MqttPublish)
    // ==========================================================================
    /// MQTT connect, publish, or acknowledgement failed.
    #[error("mqtt publish failed: {0}")]
    MqttPublish(String),

    // ==========================================================================
    // Metrics errors (Category: MetricsPush)
    // ==========================================================================
    /// Pushgateway delivery failed.
    #[error("metrics push failed: {0}")]
    MetricsPush(String),

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// Overall run deadline elapsed.
    #[error("run timed out after {0} seconds")]
    Timeout(u64),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (status {s})"))
}

impl UsageError {
    /// Returns the error category for metrics labelling.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::ConfigInvalid { .. } => ErrorCategory::ConfigValidation,
            Self::TokenRefresh { .. } => ErrorCategory::TokenRefresh,
            Self::UsageFetch { .. } => ErrorCategory::UsageFetch,
            Self::InvalidUsageStructure(_) | Self::InvalidMeasurement { .. } => {
                ErrorCategory::UsageParse
            }
            Self::MqttPublish(_) => ErrorCategory::MqttPublish,
            Self::MetricsPush(_) => ErrorCategory::MetricsPush,
            Self::Timeout(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_)
            | Self::ConfigInvalid { .. }
            | Self::InvalidUsageStructure(_)
            | Self::InvalidMeasurement { .. } => ExitCode::ParseError,

            Self::Timeout(_) => ExitCode::Timeout,

            Self::TokenRefresh { .. }
            | Self::UsageFetch { .. }
            | Self::MqttPublish(_)
            | Self::MetricsPush(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }
}
