//! Payment predicate and tariff-window helpers.

use crate::event::TapEvent;
use crate::types::Rupiah;
use chrono::{NaiveDateTime, Timelike};

/// Fares above this are multi-mode integration fares.
pub const INTEGRATION_FARE_THRESHOLD: Rupiah = 3_500;

/// Tolerated gap between the booked fare and the observed balance drop,
/// absorbing upstream rounding.
const FARE_TOLERANCE: Rupiah = 1;

/// Did this event actually deduct fare from the card?
///
/// Requires the deduct flag, a positive fare, a strict balance drop, and
/// the drop agreeing with the fare within [`FARE_TOLERANCE`]. Fields that
/// were missing or unparseable in the export arrive here as fail-closed
/// defaults (zero / false) and therefore never pass.
pub fn is_payment(event: &TapEvent) -> bool {
    let deducted = event.balance_before - event.balance_after;
    event.deduct_flag
        && event.fare > 0
        && event.balance_before > event.balance_after
        && (deducted - event.fare).abs() <= FARE_TOLERANCE
}

/// Morning subsidy window: [05:00:00, 07:00:00] inclusive. From hour seven
/// only the exact 07:00:00 instant qualifies.
pub fn is_subsidy_time(t: NaiveDateTime) -> bool {
    match t.hour() {
        5 | 6 => true,
        7 => t.minute() == 0 && t.second() == 0,
        _ => false,
    }
}

pub fn is_integration_fare(fare: Rupiah) -> bool {
    fare > INTEGRATION_FARE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ev(fare: Rupiah, before: Rupiah, after: Rupiah, deduct: bool) -> TapEvent {
        TapEvent::new(
            "C1".into(),
            NaiveDate::from_ymd_opt(2024, 3, 11)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            "E-Money GATE [IN]".into(),
            "GATE 01 DUKUH ATAS".into(),
            fare,
            before,
            after,
            deduct,
            1,
        )
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 11)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn accepts_exact_and_rounded_deductions() {
        assert!(is_payment(&ev(3500, 10_000, 6_500, true)));
        assert!(is_payment(&ev(3500, 10_000, 6_501, true)));
        assert!(is_payment(&ev(3500, 10_000, 6_499, true)));
    }

    #[test]
    fn rejects_flag_fare_and_balance_inconsistencies() {
        // no deduct flag
        assert!(!is_payment(&ev(3500, 10_000, 6_500, false)));
        // zero fare (also the fail-closed default for unparseable fares)
        assert!(!is_payment(&ev(0, 10_000, 10_000, true)));
        // balance did not drop
        assert!(!is_payment(&ev(3500, 10_000, 10_000, true)));
        // drop disagrees with the fare beyond tolerance
        assert!(!is_payment(&ev(3500, 10_000, 3_000, true)));
    }

    #[test]
    fn negative_fare_is_never_a_payment() {
        assert!(!is_payment(&ev(-3500, 10_000, 6_500, true)));
    }

    #[test]
    fn subsidy_window_is_inclusive_of_both_edges() {
        assert!(!is_subsidy_time(at(4, 59, 59)));
        assert!(is_subsidy_time(at(5, 0, 0)));
        assert!(is_subsidy_time(at(6, 59, 59)));
        assert!(is_subsidy_time(at(7, 0, 0)));
        assert!(!is_subsidy_time(at(7, 0, 1)));
        assert!(!is_subsidy_time(at(14, 0, 0)));
    }

    #[test]
    fn integration_fare_is_strictly_above_regular() {
        assert!(!is_integration_fare(3_500));
        assert!(is_integration_fare(3_501));
        assert!(is_integration_fare(7_000));
    }
}
