//! Club settings model
//!
//! Operating hours, pricing configuration, cancellation policy and the
//! opening credit balance for a club. A `ClubSettings` value is an immutable
//! snapshot; admins replace it wholesale through the settings provider.

use chrono::Duration;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::AppError;
use crate::AppResult;

/// Latest hour value a club may configure
pub const MAX_HOUR: u32 = 23;

/// Pricing model used to compute a booking fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingModel {
    /// Per-hour price depending on whether the hour is a peak hour
    #[default]
    Variable,
    /// Flat price per hour
    FixedHourly,
    /// Flat price per member for the whole day
    FixedDaily,
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingModel::Variable => write!(f, "variable"),
            PricingModel::FixedHourly => write!(f, "fixed_hourly"),
            PricingModel::FixedDaily => write!(f, "fixed_daily"),
        }
    }
}

/// Daily opening window, `[start, end)` in whole hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingHours {
    pub start: u32,
    pub end: u32,
}

impl OperatingHours {
    /// Check whether `[start, end)` lies inside the opening window
    #[inline]
    pub fn contains(&self, start: u32, end: u32) -> bool {
        start >= self.start && end <= self.end
    }

    /// Every bookable hour of the day
    pub fn hours(&self) -> impl Iterator<Item = u32> {
        self.start..self.end
    }
}

impl Default for OperatingHours {
    fn default() -> Self {
        Self { start: 6, end: 22 }
    }
}

/// Pricing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub model: PricingModel,
    pub peak_hour_fee: Decimal,
    pub off_peak_hour_fee: Decimal,
    pub fixed_hourly_fee: Decimal,
    pub fixed_daily_fee: Decimal,
    pub guest_fee: Decimal,
    #[serde(default)]
    pub peak_hours: BTreeSet<u32>,
}

impl PricingConfig {
    #[inline]
    pub fn is_peak(&self, hour: u32) -> bool {
        self.peak_hours.contains(&hour)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            model: PricingModel::Variable,
            peak_hour_fee: Decimal::from(400),
            off_peak_hour_fee: Decimal::from(300),
            fixed_hourly_fee: Decimal::from(300),
            fixed_daily_fee: Decimal::from(1000),
            guest_fee: Decimal::from(150),
            peak_hours: [18, 19, 20].into_iter().collect(),
        }
    }
}

/// Refund rules applied when a paid reservation is cancelled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    /// Cancelling at least this many hours ahead refunds the whole fee
    pub full_refund_hours: u32,
    /// Share of the fee (0-100) refunded for later cancellations
    pub late_refund_percent: Decimal,
}

impl CancellationPolicy {
    /// Amount to refund for a cancellation made `notice` before the slot starts
    ///
    /// Late refunds are truncated to two decimal places so the club never
    /// refunds more than the configured share.
    pub fn refund_for(&self, fee: Decimal, notice: Duration) -> Decimal {
        if fee <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        if notice >= Duration::hours(i64::from(self.full_refund_hours)) {
            return fee;
        }

        (fee * self.late_refund_percent / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero)
    }
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            full_refund_hours: 12,
            late_refund_percent: Decimal::ZERO,
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Per-club configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClubSettings {
    pub operating_hours: OperatingHours,
    pub pricing: PricingConfig,
    #[serde(default)]
    pub initial_credit_balance: Decimal,
    #[serde(default)]
    pub cancellation: CancellationPolicy,
    /// IANA timezone the club's dates and hours are expressed in
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl ClubSettings {
    /// Resolve the club timezone, falling back to UTC for unknown names
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    /// Validate a settings snapshot before it is persisted
    pub fn validate(&self) -> AppResult<()> {
        let hours = &self.operating_hours;
        if hours.start > MAX_HOUR || hours.end > MAX_HOUR {
            return Err(AppError::Validation(format!(
                "Operating hours must be within 0-{}",
                MAX_HOUR
            )));
        }
        if hours.start >= hours.end {
            return Err(AppError::Validation(format!(
                "Operating hours start ({}) must be before end ({})",
                hours.start, hours.end
            )));
        }

        let pricing = &self.pricing;
        let fees = [
            ("peak_hour_fee", pricing.peak_hour_fee),
            ("off_peak_hour_fee", pricing.off_peak_hour_fee),
            ("fixed_hourly_fee", pricing.fixed_hourly_fee),
            ("fixed_daily_fee", pricing.fixed_daily_fee),
            ("guest_fee", pricing.guest_fee),
            ("initial_credit_balance", self.initial_credit_balance),
        ];
        if let Some((name, _)) = fees.iter().find(|(_, fee)| *fee < Decimal::ZERO) {
            return Err(AppError::Validation(format!("{} must not be negative", name)));
        }

        if let Some(hour) = pricing.peak_hours.iter().find(|h| **h > MAX_HOUR) {
            return Err(AppError::Validation(format!("Invalid peak hour {}", hour)));
        }

        let percent = self.cancellation.late_refund_percent;
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(
                "late_refund_percent must be between 0 and 100".to_string(),
            ));
        }

        if self.timezone.parse::<Tz>().is_err() {
            return Err(AppError::Validation(format!(
                "Unknown timezone '{}'",
                self.timezone
            )));
        }

        Ok(())
    }
}

impl Default for ClubSettings {
    fn default() -> Self {
        Self {
            operating_hours: OperatingHours::default(),
            pricing: PricingConfig::default(),
            initial_credit_balance: Decimal::ZERO,
            cancellation: CancellationPolicy::default(),
            timezone: default_timezone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(ClubSettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_hours() {
        let settings = ClubSettings {
            operating_hours: OperatingHours { start: 22, end: 5 },
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_rejects_negative_fee() {
        let mut settings = ClubSettings::default();
        settings.pricing.guest_fee = dec!(-1);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let settings = ClubSettings {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_operating_hours_contains() {
        let hours = OperatingHours { start: 5, end: 22 };
        assert!(hours.contains(5, 6));
        assert!(hours.contains(21, 22));
        assert!(!hours.contains(4, 6));
        assert!(!hours.contains(21, 23));
    }

    #[test]
    fn test_cancellation_refunds() {
        let policy = CancellationPolicy {
            full_refund_hours: 12,
            late_refund_percent: dec!(50),
        };

        assert_eq!(policy.refund_for(dec!(1240), Duration::hours(13)), dec!(1240));
        assert_eq!(policy.refund_for(dec!(1240), Duration::hours(12)), dec!(1240));
        assert_eq!(policy.refund_for(dec!(1240), Duration::hours(2)), dec!(620));
        assert_eq!(policy.refund_for(dec!(333), Duration::minutes(30)), dec!(166.50));
        assert_eq!(policy.refund_for(Decimal::ZERO, Duration::hours(48)), Decimal::ZERO);
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let json = r#"{
            "operating_hours": {"start": 5, "end": 22},
            "pricing": {
                "peak_hour_fee": "450",
                "off_peak_hour_fee": "320",
                "fixed_hourly_fee": "300",
                "fixed_daily_fee": "900",
                "guest_fee": "170",
                "peak_hours": [18, 19]
            }
        }"#;

        let settings: ClubSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.pricing.model, PricingModel::Variable);
        assert_eq!(settings.timezone, "UTC");
        assert_eq!(settings.cancellation.full_refund_hours, 12);
        assert!(settings.pricing.is_peak(18));
        assert!(!settings.pricing.is_peak(20));
    }
}
