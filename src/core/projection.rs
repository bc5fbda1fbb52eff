//! Billing-period usage projection.
//!
//! Linear extrapolation of end-of-period usage from the consumption rate so
//! far. Projection is best-effort telemetry: malformed period dates degrade
//! to "no projection" rather than failing the run.

use chrono::{DateTime, NaiveDate, Utc};

/// Result of projecting usage to the end of the billing period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Estimated usage at the end of the period, in GB.
    pub estimated_gb: f64,
    /// Average consumption rate, in GB per day.
    pub daily_average_gb: f64,
    /// True when the inputs were unusable and the projection degraded to the
    /// current usage with a zero rate.
    pub degraded: bool,
}

impl Projection {
    const fn degraded(current_gb: f64) -> Self {
        Self {
            estimated_gb: current_gb,
            daily_average_gb: 0.0,
            degraded: true,
        }
    }
}

/// Project end-of-period usage from the current consumption rate.
///
/// Day spans are measured in fractional days so sub-day precision is kept.
/// When either date is missing or unparsable, or the elapsed/total spans are
/// non-positive, the projection degrades to `(current_gb, 0.0)` and the
/// degradation is logged.
#[must_use]
pub fn project(current_gb: f64, start_date: &str, end_date: &str, now: DateTime<Utc>) -> Projection {
    if start_date.is_empty() || end_date.is_empty() {
        tracing::warn!("projection: start_date or end_date is empty, cannot estimate usage");
        return Projection::degraded(current_gb);
    }

    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d");
    let end = NaiveDate::parse_from_str(end_date, "%Y-%m-%d");
    let (Ok(start), Ok(end)) = (start, end) else {
        tracing::warn!(
            start_date,
            end_date,
            "projection: failed to parse period dates"
        );
        return Projection::degraded(current_gb);
    };

    let start = start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let end = end.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    let (Some(start), Some(end)) = (start, end) else {
        return Projection::degraded(current_gb);
    };

    let total_days = fractional_days(end - start);
    let days_elapsed = fractional_days(now - start);

    if days_elapsed <= 0.0 || total_days <= 0.0 {
        tracing::warn!(
            days_elapsed,
            total_days,
            "projection: non-positive day span, cannot estimate usage"
        );
        return Projection::degraded(current_gb);
    }

    let daily_average_gb = current_gb / days_elapsed;
    Projection {
        estimated_gb: daily_average_gb * total_days,
        daily_average_gb,
        degraded: false,
    }
}

#[allow(clippy::cast_precision_loss)] // period spans are tiny relative to f64 precision
fn fractional_days(span: chrono::TimeDelta) -> f64 {
    span.num_seconds() as f64 / 86_400.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn midnight(date: &str) -> DateTime<Utc> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn projects_linearly_from_elapsed_rate() {
        // 30-day period, evaluated exactly 15 days in with 150 GB consumed.
        let now = midnight("2024-05-01") + Duration::days(15);
        let projection = project(150.0, "2024-05-01", "2024-05-31", now);
        assert!(!projection.degraded);
        assert!((projection.daily_average_gb - 10.0).abs() < 1e-9);
        assert!((projection.estimated_gb - 300.0).abs() < 1e-9);
    }

    #[test]
    fn keeps_sub_day_precision() {
        // 12 hours into the period: 5 GB consumed -> 10 GB/day.
        let now = midnight("2024-05-01") + Duration::hours(12);
        let projection = project(5.0, "2024-05-01", "2024-05-31", now);
        assert!((projection.daily_average_gb - 10.0).abs() < 1e-9);
    }

    #[test]
    fn degrades_on_empty_dates() {
        let now = Utc::now();
        let projection = project(100.0, "", "2024-05-01", now);
        assert_eq!(
            projection,
            Projection {
                estimated_gb: 100.0,
                daily_average_gb: 0.0,
                degraded: true
            }
        );
        assert!(project(100.0, "2024-05-01", "", now).degraded);
    }

    #[test]
    fn degrades_on_malformed_dates() {
        let now = Utc::now();
        assert!(project(100.0, "05/01/2024", "2024-05-31", now).degraded);
        assert!(project(100.0, "2024-05-01", "not-a-date", now).degraded);
    }

    #[test]
    fn degrades_before_period_start() {
        let now = midnight("2024-04-30");
        let projection = project(100.0, "2024-05-01", "2024-05-31", now);
        assert!(projection.degraded);
        assert!((projection.estimated_gb - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn degrades_on_inverted_period() {
        let now = midnight("2024-05-15");
        assert!(project(100.0, "2024-05-31", "2024-05-01", now).degraded);
    }

    #[test]
    fn degrades_on_zero_length_period() {
        let now = midnight("2024-05-02");
        assert!(project(100.0, "2024-05-01", "2024-05-01", now).degraded);
    }
}
