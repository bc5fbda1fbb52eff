//! Run-scoped Prometheus metrics and Pushgateway delivery.
//!
//! The sink owns its own `Registry` rather than registering into the process
//! default: metrics live exactly as long as one run and tests can construct
//! substitutable in-memory sinks freely.
//!
//! Delivery uses the text exposition format over the shared async HTTP
//! client (`PUT <endpoint>/metrics/job/<job>`), which is what the
//! Pushgateway speaks.

use std::time::Duration;

use chrono::Utc;
use prometheus::{
    Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use reqwest::Client;

use crate::error::{ErrorCategory, Result, UsageError};

/// Metrics for one run, pushed once at process exit.
pub struct RunMetrics {
    registry: Registry,

    runs_total: IntCounter,
    runs_success_total: IntCounter,
    errors_total: IntCounterVec,
    last_run_timestamp: Gauge,
    last_success_timestamp: Gauge,
    last_run_success: Gauge,
    consecutive_failures: Gauge,
    execution_duration: Histogram,
    token_refresh_duration: Histogram,
    usage_fetch_duration: Histogram,
    mqtt_publish_duration: Histogram,
    retries_total: IntCounterVec,
    projection_degraded_total: IntCounter,
    build_info: GaugeVec,
}

impl RunMetrics {
    /// Create a sink with every metric registered in a fresh registry.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn new() -> Self {
        let registry = Registry::new();

        let runs_total = IntCounter::new(
            "xfinity_usage_runs_total",
            "Total number of xfinity-usage runs",
        )
        .unwrap();
        let runs_success_total = IntCounter::new(
            "xfinity_usage_runs_success_total",
            "Total number of successful xfinity-usage runs",
        )
        .unwrap();
        let errors_total = IntCounterVec::new(
            Opts::new(
                "xfinity_usage_errors_total",
                "Total number of errors by category",
            ),
            &["category"],
        )
        .unwrap();
        let last_run_timestamp = Gauge::new(
            "xfinity_usage_last_run_timestamp",
            "Timestamp of the last run (success or failure)",
        )
        .unwrap();
        let last_success_timestamp = Gauge::new(
            "xfinity_usage_last_success_timestamp",
            "Timestamp of the last successful run",
        )
        .unwrap();
        let last_run_success = Gauge::new(
            "xfinity_usage_last_run_success",
            "Whether the last run was successful (1) or failed (0)",
        )
        .unwrap();
        let consecutive_failures = Gauge::new(
            "xfinity_usage_consecutive_failures",
            "Number of consecutive failures since last success",
        )
        .unwrap();
        let execution_duration = Histogram::with_opts(HistogramOpts::new(
            "xfinity_usage_execution_duration_seconds",
            "Execution duration in seconds",
        ))
        .unwrap();
        let token_refresh_duration = Histogram::with_opts(HistogramOpts::new(
            "xfinity_usage_token_refresh_duration_seconds",
            "Token refresh operation duration in seconds",
        ))
        .unwrap();
        let usage_fetch_duration = Histogram::with_opts(HistogramOpts::new(
            "xfinity_usage_usage_fetch_duration_seconds",
            "Usage data fetch operation duration in seconds",
        ))
        .unwrap();
        let mqtt_publish_duration = Histogram::with_opts(HistogramOpts::new(
            "xfinity_usage_mqtt_publish_duration_seconds",
            "MQTT publish operation duration in seconds",
        ))
        .unwrap();
        let retries_total = IntCounterVec::new(
            Opts::new(
                "xfinity_usage_retries_total",
                "Total number of HTTP retries by host, method, and status code",
            ),
            &["host", "method", "status_code"],
        )
        .unwrap();
        let projection_degraded_total = IntCounter::new(
            "xfinity_usage_projection_degraded_total",
            "Runs where the billing projection degraded to current usage",
        )
        .unwrap();
        let build_info = GaugeVec::new(
            Opts::new(
                "xfinity_usage_build_info",
                "Build information (version, rustc)",
            ),
            &["version", "rustc_version"],
        )
        .unwrap();

        for collector in [
            Box::new(runs_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(runs_success_total.clone()),
            Box::new(errors_total.clone()),
            Box::new(last_run_timestamp.clone()),
            Box::new(last_success_timestamp.clone()),
            Box::new(last_run_success.clone()),
            Box::new(consecutive_failures.clone()),
            Box::new(execution_duration.clone()),
            Box::new(token_refresh_duration.clone()),
            Box::new(usage_fetch_duration.clone()),
            Box::new(mqtt_publish_duration.clone()),
            Box::new(retries_total.clone()),
            Box::new(projection_degraded_total.clone()),
            Box::new(build_info.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            runs_total,
            runs_success_total,
            errors_total,
            last_run_timestamp,
            last_success_timestamp,
            last_run_success,
            consecutive_failures,
            execution_duration,
            token_refresh_duration,
            usage_fetch_duration,
            mqtt_publish_duration,
            retries_total,
            projection_degraded_total,
            build_info,
        }
    }

    /// Record the start of a run.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_run_start(&self) {
        self.runs_total.inc();
        self.last_run_timestamp.set(Utc::now().timestamp() as f64);
    }

    /// Record a successful run.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_success(&self) {
        self.runs_success_total.inc();
        self.last_success_timestamp
            .set(Utc::now().timestamp() as f64);
        self.last_run_success.set(1.0);
        self.consecutive_failures.set(0.0);
    }

    /// Record a failed run.
    pub fn record_failure(&self) {
        self.last_run_success.set(0.0);
        self.consecutive_failures.inc();
    }

    /// Increment the error counter for a category.
    pub fn record_error(&self, category: ErrorCategory) {
        self.errors_total
            .with_label_values(&[category.metric_label()])
            .inc();
    }

    /// Count one HTTP retry.
    pub fn record_retry(&self, host: &str, method: &str, status_code: u16) {
        self.retries_total
            .with_label_values(&[host, method, &status_code.to_string()])
            .inc();
    }

    /// Count one degraded billing projection.
    pub fn record_projection_degraded(&self) {
        self.projection_degraded_total.inc();
    }

    /// Set the build-info gauge.
    pub fn set_build_info(&self, version: &str, rustc_version: &str) {
        self.build_info
            .with_label_values(&[version, rustc_version])
            .set(1.0);
    }

    /// Observe total execution duration.
    pub fn observe_execution(&self, elapsed: Duration) {
        self.execution_duration.observe(elapsed.as_secs_f64());
    }

    /// Observe token-refresh duration.
    pub fn observe_token_refresh(&self, elapsed: Duration) {
        self.token_refresh_duration.observe(elapsed.as_secs_f64());
    }

    /// Observe usage-fetch duration.
    pub fn observe_usage_fetch(&self, elapsed: Duration) {
        self.usage_fetch_duration.observe(elapsed.as_secs_f64());
    }

    /// Observe MQTT publish duration.
    pub fn observe_mqtt_publish(&self, elapsed: Duration) {
        self.mqtt_publish_duration.observe(elapsed.as_secs_f64());
    }

    /// Encode every registered metric in the text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::MetricsPush`] if encoding fails.
    pub fn encode(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| UsageError::MetricsPush(format!("failed to encode metrics: {e}")))
    }

    /// Push all metrics to a Prometheus Pushgateway.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::MetricsPush`] on encoding, transport, or status
    /// failure.
    pub async fn push(&self, client: &Client, endpoint: &str, job: &str) -> Result<()> {
        let body = self.encode()?;
        let url = format!("{}/metrics/job/{job}", endpoint.trim_end_matches('/'));

        let response = client
            .put(&url)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .send()
            .await
            .map_err(|e| UsageError::MetricsPush(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UsageError::MetricsPush(format!(
                "pushgateway returned status {status}: {body}"
            )));
        }
        Ok(())
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sink_registers_without_collision() {
        // Two sinks must coexist; nothing is process-global.
        let first = RunMetrics::new();
        let second = RunMetrics::new();
        first.record_run_start();
        second.record_run_start();
    }

    #[test]
    fn encode_includes_recorded_metrics() {
        let metrics = RunMetrics::new();
        metrics.record_run_start();
        metrics.record_error(ErrorCategory::UsageFetch);
        metrics.record_retry("gw.api.dh.comcast.com", "POST", 503);
        metrics.observe_execution(Duration::from_millis(1500));

        let text = metrics.encode().unwrap();
        assert!(text.contains("xfinity_usage_runs_total 1"));
        assert!(text.contains(r#"xfinity_usage_errors_total{category="usage_fetch"} 1"#));
        assert!(text.contains(r#"status_code="503""#));
        assert!(text.contains("xfinity_usage_execution_duration_seconds_count 1"));
    }

    #[test]
    fn build_info_carries_version_labels() {
        let metrics = RunMetrics::new();
        metrics.set_build_info("0.1.0", "1.89.0");
        let text = metrics.encode().unwrap();
        assert!(text.contains("xfinity_usage_build_info{"));
        assert!(text.contains(r#"rustc_version="1.89.0""#));
        assert!(text.contains(r#"version="0.1.0""#));
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let metrics = RunMetrics::new();
        metrics.record_failure();
        metrics.record_failure();
        metrics.record_success();
        let text = metrics.encode().unwrap();
        assert!(text.contains("xfinity_usage_consecutive_failures 0"));
        assert!(text.contains("xfinity_usage_last_run_success 1"));
    }
}
