//! Home Assistant attribute derivation.
//!
//! Transforms a validated usage report into the attribute set published on
//! the MQTT attributes topic. The record is immutable once built and is the
//! sole payload handed to the publisher.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::metrics::RunMetrics;
use crate::core::projection;
use crate::core::usage::RawUsageReport;
use crate::error::Result;

/// Attribute set published to MQTT for Home Assistant.
///
/// Serialized with snake_case keys; the field set and key names are a wire
/// contract with existing dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageAttributes {
    // Main Home Assistant attributes.
    pub friendly_name: String,
    pub unit_of_measurement: String,
    pub device_class: String,
    pub state_class: String,
    pub icon: String,

    // Derived attributes.
    pub start_date: String,
    pub end_date: String,
    pub days_remaining: i64,
    pub usage_remaining: i64,
    pub usage_estimated: f64,
    pub usage_daily_average: f64,
    pub allowable_usage: i64,
    pub in_paid_overage: bool,
    pub overage_charges: i64,
    pub overage_used: i64,
    pub maximum_overage_charge: i64,
    pub policy: String,
}

impl RawUsageReport {
    /// Build the publishable attribute set from this report.
    ///
    /// `now` is the moment of calculation for the billing projection;
    /// degraded projections are counted on the metrics sink.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::UsageError::InvalidUsageStructure`] when a
    /// required nesting level is absent and
    /// [`crate::error::UsageError::InvalidMeasurement`] when current or
    /// allowable usage cannot be converted to GB.
    #[allow(clippy::cast_possible_truncation)] // integer GB truncation is the wire contract
    pub fn to_attributes(
        &self,
        now: DateTime<Utc>,
        metrics: &RunMetrics,
    ) -> Result<UsageAttributes> {
        let (usage, period) = self.first_period()?;

        let current_gb = period.current_usage.gb()?;
        let allowable_gb = period.allowable_usage.gb()?;

        // Remaining allowance is clamped, never negative.
        let usage_remaining = ((allowable_gb - current_gb) as i64).max(0);

        // The upstream overage flag, not the arithmetic, decides whether
        // overage is in effect.
        let overage_used = if period.overage {
            ((current_gb - allowable_gb) as i64).max(0)
        } else {
            0
        };

        let projection = projection::project(current_gb, &period.start_date, &period.end_date, now);
        if projection.degraded {
            metrics.record_projection_degraded();
        }

        Ok(UsageAttributes {
            friendly_name: "Xfinity Usage".to_string(),
            unit_of_measurement: "GB".to_string(),
            device_class: "data_size".to_string(),
            state_class: "measurement".to_string(),
            icon: "mdi:wan".to_string(),

            start_date: period.start_date.clone(),
            end_date: period.end_date.clone(),
            days_remaining: period.days_remaining.unwrap_or(0),
            usage_remaining,
            usage_estimated: projection.estimated_gb,
            usage_daily_average: projection.daily_average_gb,
            allowable_usage: allowable_gb as i64,
            in_paid_overage: usage.in_paid_overage.unwrap_or(false),
            overage_charges: period.overage_charge.unwrap_or(0),
            overage_used,
            maximum_overage_charge: period.maximum_overage_charge.unwrap_or(0),
            policy: period.policy.clone(),
        })
    }
}
