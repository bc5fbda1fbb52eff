//! Run orchestration.
//!
//! One sequential pull-and-publish cycle: validate config, obtain an access
//! token, fetch the usage report, derive attributes, publish to MQTT. Each
//! network stage is timed into its histogram; every stage shares the run's
//! timeout budget.

use std::time::Instant;

use chrono::Utc;
use reqwest::Client;

use crate::cli::Cli;
use crate::core::{metrics::RunMetrics, mqtt, token, usage};
use crate::error::Result;

/// Execute one run against the given configuration.
///
/// # Errors
///
/// Returns the first stage failure; the caller records its category and
/// pushes metrics regardless.
pub async fn run(cfg: &Cli, client: &Client, metrics: &RunMetrics) -> Result<()> {
    cfg.validate()?;

    let deadline = Instant::now() + cfg.timeout_duration();
    let access_token = access_token(cfg, client, metrics).await?;

    // Ad-hoc query mode: log the raw response and skip the publish pipeline.
    if let Some(query) = cfg.query.as_deref() {
        tracing::info!("running test query");
        let value = usage::run_query(client, metrics, &access_token, query).await?;
        tracing::info!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let fetch_start = Instant::now();
    let fetched = usage::fetch(client, metrics, &access_token).await;
    metrics.observe_usage_fetch(fetch_start.elapsed());
    let report = fetched?;

    let (_, period) = report.first_period()?;
    let current_gb = period.current_usage.gb()?;
    tracing::info!("usage {current_gb:7.2} GB");
    if let Ok(allowed_gb) = period.allowable_usage.gb() {
        tracing::info!("allowed {allowed_gb:7.2} GB");
    }

    let attributes = report.to_attributes(Utc::now(), metrics)?;

    let publish_budget = deadline.saturating_duration_since(Instant::now());
    let publish_start = Instant::now();
    let published = mqtt::publish(&cfg.mqtt_settings(), current_gb, &attributes, publish_budget)
        .await;
    metrics.observe_mqtt_publish(publish_start.elapsed());
    published?;

    metrics.record_success();
    Ok(())
}

/// Obtain an access token: use the provided one, or refresh.
async fn access_token(cfg: &Cli, client: &Client, metrics: &RunMetrics) -> Result<String> {
    if let Some(provided) = cfg.access_token.as_deref()
        && !provided.trim().is_empty()
    {
        tracing::info!("using provided access token");
        return Ok(provided.to_string());
    }

    let refresh_start = Instant::now();
    let refreshed = token::refresh(
        client,
        metrics,
        cfg.refresh_token.as_deref().unwrap_or_default(),
        &cfg.client_id,
        cfg.client_secret.as_deref().unwrap_or_default(),
        cfg.application_id.as_deref().unwrap_or_default(),
    )
    .await;
    metrics.observe_token_refresh(refresh_start.elapsed());

    let token = refreshed?;
    tracing::info!(expires_in = token.expires_in, "token refreshed");
    tracing::debug!(access_token = %token.access_token, "token detail");
    Ok(token.access_token)
}
