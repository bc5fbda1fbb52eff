//! Internet-usage report model and GraphQL fetch.
//!
//! The upstream response is pervasively optional: any nesting level may be
//! absent, and absence at any level invalidates the whole report. The model
//! keeps every level as an explicit `Option` and collapses the structure in a
//! single validation pass ([`RawUsageReport::first_period`]) so the attribute
//! derivation never sees a partially-present report.

use reqwest::Client;
use serde::Deserialize;

use crate::core::http::execute_with_retry;
use crate::core::metrics::RunMetrics;
use crate::error::{Result, UsageError};

/// GraphQL usage endpoint.
pub const USAGE_URL: &str = "https://gw.api.dh.comcast.com/galileo/graphql";

/// Fixed query body for the `InternetDataUsage` operation.
pub const USAGE_BODY: &str = r#"{"operationName":"InternetDataUsage","variables":{},"query":"query InternetDataUsage { accountByServiceAccountId { internet { usage { inPaidOverage courtesy { totalAllowableCourtesy usedCourtesy remainingCourtesy } monthlyUsage { policy month year startDate endDate daysRemaining currentUsage { value unit } allowableUsage { value unit } overage overageCharge maximumOverageCharge courtesyCredit } } } } }"}"#;

/// Headers the gateway expects on the usage operation.
const USAGE_EXTRA_HEADERS: [(&str, &str); 8] = [
    ("x-apollo-operation-name", "InternetDataUsage"),
    (
        "x-apollo-operation-id",
        "61994c6016ac8c0ebcca875084919e5e01cb3b116a86aaf9646e597c3a1fbd06",
    ),
    (
        "accept",
        "multipart/mixed; deferSpec=20220824, application/json",
    ),
    ("user-agent", "Digital Home / Samsung SM-G991B / Android 14"),
    ("client", "digital-home-android"),
    ("client-detail", "MOBILE;Samsung;SM-G991B;Android 14;v5.38.0"),
    ("accept-language", "en-US"),
    ("content-type", "application/json"),
];

/// Scale factor between adjacent data-volume units (decimal: 1 TB = 1000 GB,
/// 1 GB = 1000 MB). The upstream API reports decimal units.
pub const UNIT_SCALE: f64 = 1000.0;

// =============================================================================
// Report model
// =============================================================================

/// Raw usage payload as returned by the GraphQL endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUsageReport {
    pub data: Option<UsageData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageData {
    #[serde(rename = "accountByServiceAccountId")]
    pub account: Option<Account>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    pub internet: Option<Internet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Internet {
    pub usage: Option<UsageDetails>,
}

/// The usage block: overall overage state, courtesy credits, and the list of
/// billing periods.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDetails {
    pub in_paid_overage: Option<bool>,
    pub courtesy: Option<Courtesy>,
    #[serde(default)]
    pub monthly_usage: Vec<MonthlyPeriod>,
}

/// Courtesy-credit summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Courtesy {
    pub total_allowable_courtesy: Option<i64>,
    pub used_courtesy: Option<i64>,
    pub remaining_courtesy: Option<i64>,
}

/// One billing cycle. Only the first element of `monthlyUsage` is consumed;
/// later elements are ignored by design.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPeriod {
    #[serde(default)]
    pub policy: String,
    pub month: Option<i64>,
    pub year: Option<i64>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    pub days_remaining: Option<i64>,
    #[serde(default)]
    pub current_usage: MeasuredValue,
    #[serde(default)]
    pub allowable_usage: MeasuredValue,
    #[serde(default)]
    pub overage: bool,
    pub overage_charge: Option<i64>,
    pub maximum_overage_charge: Option<i64>,
    #[serde(default)]
    pub courtesy_credit: bool,
}

/// A magnitude paired with a unit of data volume.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MeasuredValue {
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
}

impl MeasuredValue {
    /// Express the magnitude in gigabytes.
    ///
    /// Unit matching is case-insensitive over `mb`/`gb`/`tb`, scaled by
    /// [`UNIT_SCALE`].
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::InvalidMeasurement`] when the magnitude is
    /// absent or the unit is unrecognized. Never silently defaults to zero.
    pub fn gb(&self) -> Result<f64> {
        let value = self.value.ok_or_else(|| UsageError::InvalidMeasurement {
            reason: "no usage value".to_string(),
        })?;
        match self.unit.to_lowercase().as_str() {
            "mb" => Ok(value / UNIT_SCALE),
            "gb" => Ok(value),
            "tb" => Ok(value * UNIT_SCALE),
            other => Err(UsageError::InvalidMeasurement {
                reason: format!("unknown unit {other:?}"),
            }),
        }
    }
}

impl RawUsageReport {
    /// Collapse the nested optional structure into the current billing
    /// period, or fail when any required level is absent.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::InvalidUsageStructure`] naming the first missing
    /// level.
    pub fn first_period(&self) -> Result<(&UsageDetails, &MonthlyPeriod)> {
        let missing = |level: &str| UsageError::InvalidUsageStructure(format!("{level} missing"));

        let usage = self
            .data
            .as_ref()
            .ok_or_else(|| missing("data"))?
            .account
            .as_ref()
            .ok_or_else(|| missing("account"))?
            .internet
            .as_ref()
            .ok_or_else(|| missing("internet"))?
            .usage
            .as_ref()
            .ok_or_else(|| missing("usage"))?;

        let period = usage
            .monthly_usage
            .first()
            .ok_or_else(|| missing("monthly usage"))?;

        Ok((usage, period))
    }
}

// =============================================================================
// Fetch
// =============================================================================

async fn post_graphql(
    client: &Client,
    metrics: &RunMetrics,
    url: &str,
    access_token: &str,
    body: &str,
) -> Result<Vec<u8>> {
    let mut builder = client
        .post(url)
        .header("authorization", format!("Bearer {access_token}"))
        .header("x-id-token", access_token);
    for (key, value) in USAGE_EXTRA_HEADERS {
        builder = builder.header(key, value);
    }

    let request = builder
        .body(body.to_string())
        .build()
        .map_err(|e| UsageError::UsageFetch {
            status: None,
            message: format!("failed to build request: {e}"),
        })?;

    let response = execute_with_retry(client, request, metrics)
        .await
        .map_err(|e| UsageError::UsageFetch {
            status: None,
            message: e.to_string(),
        })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| UsageError::UsageFetch {
        status: Some(status.as_u16()),
        message: format!("failed to read response body: {e}"),
    })?;

    if !status.is_success() {
        return Err(UsageError::UsageFetch {
            status: Some(status.as_u16()),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    Ok(bytes.to_vec())
}

/// Fetch the internet-usage report.
///
/// # Errors
///
/// Returns [`UsageError::UsageFetch`] on transport or status failure, or
/// [`UsageError::InvalidUsageStructure`] when the body is not valid JSON for
/// the report shape.
pub async fn fetch(
    client: &Client,
    metrics: &RunMetrics,
    access_token: &str,
) -> Result<RawUsageReport> {
    fetch_at(client, metrics, USAGE_URL, access_token).await
}

/// Fetch the internet-usage report from the given endpoint.
///
/// # Errors
///
/// Same failure modes as [`fetch`].
pub async fn fetch_at(
    client: &Client,
    metrics: &RunMetrics,
    url: &str,
    access_token: &str,
) -> Result<RawUsageReport> {
    let body = post_graphql(client, metrics, url, access_token, USAGE_BODY).await?;
    serde_json::from_slice(&body).map_err(|e| {
        UsageError::InvalidUsageStructure(format!("failed to parse usage response: {e}"))
    })
}

/// Run an arbitrary GraphQL query with the same auth and headers, returning
/// the parsed JSON. Debug aid behind `--query`.
///
/// # Errors
///
/// Returns [`UsageError::UsageFetch`] on transport/status failure or an
/// unparsable body.
pub async fn run_query(
    client: &Client,
    metrics: &RunMetrics,
    access_token: &str,
    query: &str,
) -> Result<serde_json::Value> {
    let body = post_graphql(client, metrics, USAGE_URL, access_token, query).await?;
    serde_json::from_slice(&body).map_err(|e| UsageError::UsageFetch {
        status: None,
        message: format!("failed to parse JSON response: {e}"),
    })
}
