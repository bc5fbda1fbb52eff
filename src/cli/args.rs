//! CLI argument definitions using clap.
//!
//! Secrets come from the environment by default so schedulers never put them
//! on a command line; every flag can still override its env var.

use std::time::Duration;

use clap::Parser;

use crate::core::mqtt::MqttSettings;
use crate::error::{Result, UsageError};

/// Fetch Xfinity internet usage and publish it to MQTT for Home Assistant.
#[derive(Parser, Debug, Clone)]
#[command(name = "xfinity-usage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Overall run timeout in seconds
    #[arg(long, default_value_t = 90, value_name = "SECONDS")]
    pub timeout: u64,

    /// OAuth client id
    #[arg(long, default_value = "xfinity-android-application")]
    pub client_id: String,

    /// OAuth client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth refresh token
    #[arg(long, env = "REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// OAuth access token (skips the refresh exchange)
    #[arg(long, env = "ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// OAuth application id
    #[arg(long, env = "APPLICATION_ID")]
    pub application_id: Option<String>,

    /// MQTT broker url (mqtt:// or tcp://)
    #[arg(long, env = "MQTT_URL")]
    pub mqtt_url: Option<String>,

    /// MQTT client id
    #[arg(long, default_value = "xfinity-usage")]
    pub mqtt_client_id: String,

    /// MQTT state topic
    #[arg(long, default_value = "homeassistant/sensor/xfinity_internet/state")]
    pub mqtt_state_topic: String,

    /// MQTT attributes topic
    #[arg(long, default_value = "homeassistant/sensor/xfinity_internet/attributes")]
    pub mqtt_attributes_topic: String,

    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// Prometheus job name
    #[arg(long, default_value = "xfinity-usage")]
    pub prometheus_job: String,

    /// Prometheus Pushgateway endpoint (metrics are skipped when unset)
    #[arg(long, env = "PROMETHEUS_ENDPOINT")]
    pub prometheus_endpoint: Option<String>,

    /// Ad-hoc GraphQL query to run instead of the publish pipeline
    #[arg(long, env = "QUERY")]
    pub query: Option<String>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit JSON logs to stderr
    #[arg(long)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long)]
    pub verbose: bool,
}

fn is_unset(value: Option<&String>) -> bool {
    value.is_none_or(|s| s.trim().is_empty())
}

impl Cli {
    /// Overall run timeout budget.
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Validate required configuration before the pipeline starts.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigValidation`-category error naming the first missing
    /// value.
    pub fn validate(&self) -> Result<()> {
        let missing = |flag: &str| UsageError::Config(format!("missing --{flag}"));

        if self.client_id.is_empty() {
            return Err(missing("client-id"));
        }
        if is_unset(self.client_secret.as_ref()) {
            return Err(missing("client-secret"));
        }
        if is_unset(self.refresh_token.as_ref()) && is_unset(self.access_token.as_ref()) {
            return Err(UsageError::Config(
                "either --refresh-token or --access-token must be provided".to_string(),
            ));
        }
        if is_unset(self.mqtt_url.as_ref()) {
            return Err(missing("mqtt-url"));
        }
        if self.mqtt_client_id.is_empty() {
            return Err(missing("mqtt-client-id"));
        }
        if self.mqtt_state_topic.is_empty() {
            return Err(missing("mqtt-state-topic"));
        }
        if is_unset(self.mqtt_username.as_ref()) {
            return Err(missing("mqtt-username"));
        }
        if is_unset(self.mqtt_password.as_ref()) {
            return Err(missing("mqtt-password"));
        }
        if self.timeout == 0 {
            return Err(UsageError::ConfigInvalid {
                key: "timeout".to_string(),
                message: "timeout must be greater than 0 seconds".to_string(),
            });
        }
        Ok(())
    }

    /// Broker settings for the publisher. Call after [`Cli::validate`].
    #[must_use]
    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            url: self.mqtt_url.clone().unwrap_or_default(),
            username: self.mqtt_username.clone().unwrap_or_default(),
            password: self.mqtt_password.clone().unwrap_or_default(),
            client_id: self.mqtt_client_id.clone(),
            state_topic: self.mqtt_state_topic.clone(),
            attributes_topic: self.mqtt_attributes_topic.clone(),
        }
    }
}
