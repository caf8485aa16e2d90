//! Anomaly detectors — independent predicates over the reconstructed
//! trips and the raw per-card timeline. Each answers one question the
//! classifier combines:
//!   - is there a trip still owed a payment?
//!   - did the rider register two entries with no exit between them?
//!   - does an IN tap collide with this event in time and station?

use crate::config::AuditConfig;
use crate::event::{Direction, EventClass, EventTable};
use crate::terminal::same_station;
use crate::trip::Trip;
use crate::types::EventPos;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// Find the most recent trip that is still owed a payment, scanning from
/// newest to oldest and skipping the trip that contains the target event
/// itself. A trip qualifies when any of:
///   (a) it has no payment at all;
///   (b) it is still open and older than the stale threshold relative to
///       the target event's time;
///   (c) it completed with payments on entry legs only — its closing
///       payment is outstanding.
pub fn find_last_unpaid_trip<'a>(
    trips: &'a [Trip],
    config: &AuditConfig,
    target_pos: EventPos,
    target_time: NaiveDateTime,
) -> Option<&'a Trip> {
    let stale = Duration::hours(config.stale_open_trip_hours);
    trips.iter().rev().find(|trip| {
        if trip.contains(target_pos) {
            return false;
        }
        if trip.payment_count == 0 {
            return true;
        }
        if !trip.is_completed && target_time - trip.start_time > stale {
            return true;
        }
        trip.is_completed && trip.paid_only_on_entry()
    })
}

/// Two consecutive entry taps with no exit between them. `first` is the
/// older tap, `second` the newer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InInCollision {
    pub first_pos: EventPos,
    pub first_time: NaiveDateTime,
    pub second_pos: EventPos,
    pub second_time: NaiveDateTime,
}

/// Scan the card's events strictly before `before`, newest first, for an
/// IN-IN pair. An OUT or UNBLOKIR between two INs breaks their adjacency;
/// unrecognized kinds (top-ups) do not.
pub fn detect_in_in_case(
    table: &EventTable,
    card: &str,
    before: EventPos,
) -> Option<InInCollision> {
    let events = table.events();
    let range = table.card_range(card);
    let upper = before.min(range.end);

    let mut newer: Option<(EventPos, NaiveDateTime)> = None;
    for pos in (range.start..upper).rev() {
        let event = &events[pos];
        match event.class {
            EventClass::Tap { direction: Direction::In, .. } => {
                if let Some((second_pos, second_time)) = newer {
                    return Some(InInCollision {
                        first_pos: pos,
                        first_time: event.occurred_at,
                        second_pos,
                        second_time,
                    });
                }
                newer = Some((pos, event.occurred_at));
            }
            EventClass::Tap { direction: Direction::Out, .. } | EventClass::Unblokir => {
                newer = None;
            }
            EventClass::Other => {}
        }
    }
    None
}

/// An IN tap for the same card at exactly the same instant, later in the
/// table, sharing a station with the target's terminal. The strongest
/// collision signal (gap 0 s).
pub fn find_concurrent_in(table: &EventTable, index: EventPos) -> Option<EventPos> {
    let events = table.events();
    let target = events.get(index)?;
    let range = table.card_range(&target.card_id);

    for pos in (index + 1)..range.end {
        let event = &events[pos];
        if event.occurred_at > target.occurred_at {
            break;
        }
        if event.class.is_in() && same_station(&target.terminal_name, &event.terminal_name) {
            return Some(pos);
        }
    }
    None
}

/// The first IN tap within `(t, t + collision window]` sharing a station
/// with the target's terminal. Returns the position and the gap in whole
/// seconds.
pub fn find_near_concurrent_in(
    table: &EventTable,
    config: &AuditConfig,
    index: EventPos,
) -> Option<(EventPos, i64)> {
    let events = table.events();
    let target = events.get(index)?;
    let deadline = target.occurred_at + Duration::seconds(config.tap_collision_window_secs);
    let range = table.card_range(&target.card_id);

    for pos in (index + 1)..range.end {
        let event = &events[pos];
        if event.occurred_at <= target.occurred_at {
            // Same-instant taps belong to the exact-collision probe.
            continue;
        }
        if event.occurred_at > deadline {
            break;
        }
        if event.class.is_in() && same_station(&target.terminal_name, &event.terminal_name) {
            let gap = (event.occurred_at - target.occurred_at).num_seconds();
            return Some((pos, gap));
        }
    }
    None
}
