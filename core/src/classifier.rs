//! The double-deduct classifier — one verdict per event.
//!
//! Two top-level branches: regular tap payments are judged by their
//! position inside the reconstructed trip and by the subsidy tariff;
//! UNBLOKIR corrections are judged by the detector signals, with a fixed
//! decision order that differs between deduction-type and refund-type
//! corrections.
//!
//! Verdict reasons keep the upstream operations vocabulary (`Payment
//! ke-N`, `DD Subsidi`, `Sah: ...`) — the output feeds the existing
//! refund workflow.

use crate::config::AuditConfig;
use crate::detectors::{
    detect_in_in_case, find_concurrent_in, find_last_unpaid_trip, find_near_concurrent_in,
};
use crate::error::AuditResult;
use crate::event::{EventTable, TapEvent};
use crate::payment::{is_integration_fare, is_payment, is_subsidy_time};
use crate::trip::{reconstruct_trips, Trip};
use crate::types::{EventPos, Rupiah};
use serde::{Deserialize, Serialize};

/// The classification outcome for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_double_deduct: bool,
    /// Amount to return to the rider. Zero unless `is_double_deduct`.
    pub refund: Rupiah,
    pub reason: String,
    pub is_integration_fare: bool,
}

impl Verdict {
    pub(crate) fn not_dd(reason: impl Into<String>, is_integration_fare: bool) -> Self {
        Self {
            is_double_deduct: false,
            refund: 0,
            reason: reason.into(),
            is_integration_fare,
        }
    }

    pub(crate) fn dd(refund: Rupiah, reason: impl Into<String>, is_integration_fare: bool) -> Self {
        Self {
            is_double_deduct: true,
            refund,
            reason: reason.into(),
            is_integration_fare,
        }
    }
}

/// Classify the event at `index`. Pure function of (table, config, index):
/// reconstructs the card's trips as of the event and applies the decision
/// rules. Independently re-evaluable for any row in any order.
pub fn classify(table: &EventTable, config: &AuditConfig, index: EventPos) -> AuditResult<Verdict> {
    let event = table.get(index)?;
    let trips = reconstruct_trips(table, config, &event.card_id, index)?;
    classify_with_trips(table, config, index, &trips)
}

/// Classification core against pre-reconstructed trips (as of `index`).
/// The batch driver calls this with its incrementally built per-card
/// trip list instead of replaying the history per row.
pub(crate) fn classify_with_trips(
    table: &EventTable,
    config: &AuditConfig,
    index: EventPos,
    trips: &[Trip],
) -> AuditResult<Verdict> {
    let event = table.get(index)?;
    if event.class.is_unblokir() {
        Ok(classify_unblokir(table, config, index, event, trips))
    } else {
        Ok(classify_tap(config, index, event, trips))
    }
}

fn classify_tap(
    config: &AuditConfig,
    index: EventPos,
    event: &TapEvent,
    trips: &[Trip],
) -> Verdict {
    if !is_payment(event) {
        return Verdict::not_dd("Bukan transaksi pembayaran", false);
    }
    let is_integration = is_integration_fare(event.fare);

    // A second (or later) payment inside one trip is a double deduct.
    if let Some((trip, ordinal)) = payment_ordinal(trips, index) {
        if ordinal > 1 {
            return Verdict::dd(
                event.fare,
                format!("DD: Payment ke-{ordinal} dalam trip idx {}", trip.start_pos),
                is_integration,
            );
        }
    }

    if is_subsidy_time(event.occurred_at) && event.fare == config.regular_fare {
        return Verdict::dd(
            config.subsidy_overcharge(),
            format!(
                "DD Subsidi: Jam 05:00-07:00 seharusnya tarif {}",
                config.subsidy_fare
            ),
            is_integration,
        );
    }

    Verdict::not_dd("Sah: Payment normal", is_integration)
}

fn classify_unblokir(
    table: &EventTable,
    config: &AuditConfig,
    index: EventPos,
    event: &TapEvent,
    trips: &[Trip],
) -> Verdict {
    // An UNBLOKIR is judged whether or not it passed the payment
    // predicate: a refund-type correction carries a negative fare.
    let fare_amount = event.fare.abs();
    let is_integration = is_integration_fare(fare_amount);
    let is_deduction = event.deduct_flag;

    let unpaid = find_last_unpaid_trip(trips, config, index, event.occurred_at);
    let in_in = detect_in_in_case(table, &event.card_id, index);
    let collision = find_concurrent_in(table, index)
        .map(|pos| (pos, 0))
        .or_else(|| find_near_concurrent_in(table, config, index));

    let subsidy_unpaid = unpaid
        .map(|trip| is_subsidy_time(trip.start_time) && fare_amount == config.regular_fare)
        .unwrap_or(false);

    if is_deduction {
        // Deduction-type UNBLOKIR: a tap collision outranks every other
        // explanation.
        if let Some((_, gap)) = collision {
            Verdict::dd(
                fare_amount,
                format!("DD: UNBLOKIR bersamaan dengan IN (gap {gap}s)"),
                is_integration,
            )
        } else if let Some(case) = in_in {
            Verdict::dd(
                fare_amount,
                format!(
                    "DD: UNBLOKIR pada kasus IN-IN (idx {} dan {})",
                    case.first_pos, case.second_pos
                ),
                is_integration,
            )
        } else if let Some(trip) = unpaid {
            if subsidy_unpaid {
                Verdict::dd(
                    config.subsidy_overcharge(),
                    format!(
                        "DD Subsidi: UNBLOKIR bayar trip subsidi idx {}, seharusnya {}",
                        trip.start_pos, config.subsidy_fare
                    ),
                    is_integration,
                )
            } else {
                Verdict::not_dd(
                    format!("Sah: UNBLOKIR bayar trip idx {}", trip.start_pos),
                    is_integration,
                )
            }
        } else {
            Verdict::dd(
                fare_amount,
                "DD: UNBLOKIR tanpa trip yang perlu dibayar",
                is_integration,
            )
        }
    } else {
        // Refund-type UNBLOKIR: IN-IN corrections and unpaid trips are
        // checked before tap collisions.
        if in_in.is_some() {
            Verdict::not_dd("Sah: koreksi kasus IN-IN", is_integration)
        } else if let Some(trip) = unpaid {
            if subsidy_unpaid {
                Verdict::dd(
                    config.subsidy_overcharge(),
                    format!(
                        "DD Subsidi: UNBLOKIR bayar trip subsidi idx {}, seharusnya {}",
                        trip.start_pos, config.subsidy_fare
                    ),
                    is_integration,
                )
            } else {
                Verdict::not_dd(
                    format!("Sah: refund UNBLOKIR untuk trip idx {}", trip.start_pos),
                    is_integration,
                )
            }
        } else if let Some((_, gap)) = collision {
            Verdict::dd(
                fare_amount,
                format!("DD: UNBLOKIR bersamaan dengan IN (gap {gap}s)"),
                is_integration,
            )
        } else {
            Verdict::dd(
                fare_amount,
                "DD: refund UNBLOKIR tanpa justifikasi",
                is_integration,
            )
        }
    }
}

/// The trip containing `pos` and the 1-based ordinal of `pos` among that
/// trip's paying members, counted up to and including `pos`. None when the
/// event belongs to no trip (e.g. a paying OUT with no open trip).
fn payment_ordinal(trips: &[Trip], pos: EventPos) -> Option<(&Trip, usize)> {
    for trip in trips {
        if let Some(member_idx) = trip.members.iter().position(|m| m.pos == pos) {
            let ordinal = trip.members[..=member_idx]
                .iter()
                .filter(|m| m.is_payment)
                .count();
            return Some((trip, ordinal));
        }
    }
    None
}
