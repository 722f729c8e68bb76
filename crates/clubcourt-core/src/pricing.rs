//! Pricing engine
//!
//! Pure fee computation for a booking under one of the three pricing models.
//! Fees are rounded up to the nearest 10.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{PricingConfig, PricingModel, RosterEntry, MAX_DURATION_HOURS};
use crate::AppResult;

/// Number of paying members and guests on a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterCounts {
    pub members: u32,
    pub guests: u32,
}

impl RosterCounts {
    pub fn new(members: u32, guests: u32) -> Self {
        Self { members, guests }
    }

    /// Count the roster of a booking made by `reserver`
    ///
    /// The reserver always counts as a member. Typed entries count as what
    /// they are. Untyped legacy names are split heuristically: with no typed
    /// member present, the first legacy name is a member and the rest guests.
    pub fn for_booking(reserver: Uuid, roster: &[RosterEntry]) -> Self {
        let mut members: u32 = 1;
        let mut guests: u32 = 0;
        let mut legacy: u32 = 0;
        let mut typed_member = false;

        for entry in roster {
            match entry {
                RosterEntry::Member { member_id, .. } => {
                    typed_member = true;
                    if *member_id != reserver {
                        members += 1;
                    }
                }
                RosterEntry::Guest { .. } => guests += 1,
                RosterEntry::Legacy { .. } => legacy += 1,
            }
        }

        if legacy > 0 {
            warn!(
                "Pricing roster with {} untyped legacy entries, applying member/guest heuristic",
                legacy
            );
            // The reserver is already counted; the first legacy name is assumed to be them
            if typed_member {
                guests += legacy;
            } else {
                guests += legacy - 1;
            }
        }

        Self { members, guests }
    }
}

/// One priced hour of a variable-rate booking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourLine {
    pub hour: u32,
    pub peak: bool,
    pub court_fee: Decimal,
    pub guest_fee: Decimal,
}

/// Fee breakdown for a booking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub model: PricingModel,
    pub counts: RosterCounts,
    /// Fee before rounding
    pub raw: Decimal,
    /// Fee charged, `raw` rounded up to the nearest 10
    pub fee: Decimal,
    /// Per-hour lines, only for variable pricing
    pub lines: Vec<HourLine>,
}

/// Round up to the nearest multiple of 10
#[inline]
pub fn round_up_to_ten(raw: Decimal) -> Decimal {
    let ten = Decimal::TEN;
    (raw / ten).ceil() * ten
}

/// Stateless pricing engine
pub struct PricingEngine;

impl PricingEngine {
    /// Compute the fee for a booking
    pub fn quote(
        start_hour: u32,
        duration_hours: u32,
        counts: RosterCounts,
        pricing: &PricingConfig,
    ) -> AppResult<PriceQuote> {
        if duration_hours == 0 || duration_hours > MAX_DURATION_HOURS {
            return Err(AppError::Validation(format!(
                "Duration must be between 1 and {} hours, got {}",
                MAX_DURATION_HOURS, duration_hours
            )));
        }

        let guests = Decimal::from(counts.guests);
        let duration = Decimal::from(duration_hours);
        let mut lines = Vec::new();

        let raw = match pricing.model {
            PricingModel::FixedDaily => {
                pricing.fixed_daily_fee * Decimal::from(counts.members) + guests * pricing.guest_fee
            }
            PricingModel::FixedHourly => {
                pricing.fixed_hourly_fee * duration + guests * pricing.guest_fee * duration
            }
            PricingModel::Variable => {
                for hour in start_hour..start_hour + duration_hours {
                    let peak = pricing.is_peak(hour);
                    lines.push(HourLine {
                        hour,
                        peak,
                        court_fee: if peak {
                            pricing.peak_hour_fee
                        } else {
                            pricing.off_peak_hour_fee
                        },
                        guest_fee: guests * pricing.guest_fee,
                    });
                }
                lines.iter().map(|l| l.court_fee + l.guest_fee).sum()
            }
        };

        let raw = raw.max(Decimal::ZERO);

        Ok(PriceQuote {
            model: pricing.model,
            counts,
            raw,
            fee: round_up_to_ten(raw),
            lines,
        })
    }

    /// Compute only the rounded fee
    pub fn fee(
        start_hour: u32,
        duration_hours: u32,
        counts: RosterCounts,
        pricing: &PricingConfig,
    ) -> AppResult<Decimal> {
        Ok(Self::quote(start_hour, duration_hours, counts, pricing)?.fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn club_pricing() -> PricingConfig {
        PricingConfig {
            model: PricingModel::Variable,
            peak_hour_fee: dec!(450),
            off_peak_hour_fee: dec!(320),
            fixed_hourly_fee: dec!(300),
            fixed_daily_fee: dec!(1000),
            guest_fee: dec!(170),
            peak_hours: [18, 19].into_iter().collect(),
        }
    }

    #[test]
    fn test_variable_two_members_one_guest() {
        let quote = PricingEngine::quote(18, 2, RosterCounts::new(2, 1), &club_pricing()).unwrap();

        assert_eq!(quote.raw, dec!(1240));
        assert_eq!(quote.fee, dec!(1240));
        assert_eq!(quote.lines.len(), 2);
        assert!(quote.lines.iter().all(|l| l.peak));
    }

    #[test]
    fn test_variable_mixed_peak() {
        // 17 off-peak, 18 peak
        let fee = PricingEngine::fee(17, 2, RosterCounts::new(1, 0), &club_pricing()).unwrap();
        assert_eq!(fee, dec!(770));
    }

    #[test]
    fn test_fixed_hourly() {
        let pricing = PricingConfig {
            model: PricingModel::FixedHourly,
            ..club_pricing()
        };
        // 300*3 + 2*170*3
        let fee = PricingEngine::fee(9, 3, RosterCounts::new(1, 2), &pricing).unwrap();
        assert_eq!(fee, dec!(1920));
    }

    #[test]
    fn test_fixed_daily_ignores_duration() {
        let pricing = PricingConfig {
            model: PricingModel::FixedDaily,
            ..club_pricing()
        };
        let short = PricingEngine::fee(9, 1, RosterCounts::new(3, 1), &pricing).unwrap();
        let long = PricingEngine::fee(9, 6, RosterCounts::new(3, 1), &pricing).unwrap();
        assert_eq!(short, dec!(3170));
        assert_eq!(short, long);
    }

    #[test]
    fn test_rounds_up_to_ten() {
        let pricing = PricingConfig {
            off_peak_hour_fee: dec!(301.5),
            ..club_pricing()
        };
        let quote = PricingEngine::quote(9, 1, RosterCounts::new(1, 0), &pricing).unwrap();
        assert_eq!(quote.raw, dec!(301.5));
        assert_eq!(quote.fee, dec!(310));
    }

    #[test]
    fn test_round_up_bounds() {
        for raw in [dec!(0), dec!(0.01), dec!(9.99), dec!(10), dec!(1234.5), dec!(999999.99)] {
            let rounded = round_up_to_ten(raw);
            assert!(rounded >= raw);
            assert!(rounded < raw + dec!(10));
            assert!((rounded % dec!(10)).is_zero());
        }
    }

    #[test]
    fn test_rejects_invalid_duration() {
        let counts = RosterCounts::new(1, 0);
        assert!(matches!(
            PricingEngine::quote(9, 0, counts, &club_pricing()),
            Err(AppError::Validation(_))
        ));
        assert!(PricingEngine::quote(9, 13, counts, &club_pricing()).is_err());
    }

    #[test]
    fn test_roster_counts_typed() {
        let reserver = Uuid::new_v4();
        let roster = vec![
            RosterEntry::member(reserver),
            RosterEntry::member(Uuid::new_v4()),
            RosterEntry::guest("Ana"),
        ];
        assert_eq!(RosterCounts::for_booking(reserver, &roster), RosterCounts::new(2, 1));
    }

    #[test]
    fn test_reserver_counts_when_absent() {
        let reserver = Uuid::new_v4();
        let roster = vec![RosterEntry::guest("Ana")];
        assert_eq!(RosterCounts::for_booking(reserver, &roster), RosterCounts::new(1, 1));
    }

    #[test]
    fn test_legacy_roster_heuristic() {
        let reserver = Uuid::new_v4();
        let legacy = |name: &str| RosterEntry::Legacy {
            name: name.to_string(),
        };

        let untyped = vec![legacy("Luis"), legacy("Marta"), legacy("Pedro")];
        assert_eq!(RosterCounts::for_booking(reserver, &untyped), RosterCounts::new(1, 2));

        let mixed = vec![RosterEntry::member(reserver), legacy("Marta")];
        assert_eq!(RosterCounts::for_booking(reserver, &mixed), RosterCounts::new(1, 1));
    }
}
