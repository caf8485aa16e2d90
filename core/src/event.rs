//! The tap-event data model — one row per card transaction.
//!
//! RULE: the free-text `kind` label is decoded exactly once, when an event
//! is constructed. Everything downstream (trips, detectors, classifier)
//! matches on [`EventClass`], never on substrings.

use crate::error::{AuditError, AuditResult};
use crate::types::{CardId, EventPos, Rupiah};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Physical tap channel: station gate or onboard validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Gate,
    Tob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

/// Decoded transaction kind.
///
/// The upstream export encodes semantics inside a free-text label
/// (`"GATE [IN] ..."`, `"TOB [OUT] ..."`, `"UNBLOKIR"`). Labels that carry
/// neither a recognizable channel+direction pair nor the UNBLOKIR marker
/// (top-ups, reversals) decode to [`EventClass::Other`] and never start or
/// extend a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventClass {
    Tap { channel: Channel, direction: Direction },
    Unblokir,
    Other,
}

impl EventClass {
    /// Decode the free-text kind label. UNBLOKIR wins over everything else;
    /// a tap needs both a channel and a direction marker.
    pub fn parse(kind: &str) -> Self {
        let label = kind.to_uppercase();
        if label.contains("UNBLOKIR") {
            return EventClass::Unblokir;
        }

        let direction = if label.contains("[IN]") {
            Some(Direction::In)
        } else if label.contains("[OUT]") {
            Some(Direction::Out)
        } else {
            None
        };
        let channel = if label.contains("GATE") {
            Some(Channel::Gate)
        } else if label.contains("TOB") {
            Some(Channel::Tob)
        } else {
            None
        };

        match (channel, direction) {
            (Some(channel), Some(direction)) => EventClass::Tap { channel, direction },
            _ => EventClass::Other,
        }
    }

    pub fn is_unblokir(&self) -> bool {
        matches!(self, EventClass::Unblokir)
    }

    pub fn is_in(&self) -> bool {
        matches!(
            self,
            EventClass::Tap { direction: Direction::In, .. }
        )
    }

    pub fn is_out(&self) -> bool {
        matches!(
            self,
            EventClass::Tap { direction: Direction::Out, .. }
        )
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            EventClass::Tap { channel, .. } => Some(*channel),
            _ => None,
        }
    }
}

/// One validated row of the transaction export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapEvent {
    pub card_id: CardId,
    pub occurred_at: NaiveDateTime,
    /// Original free-text label, kept for reporting.
    pub kind: String,
    /// Decoded form of `kind`. Always derived via [`EventClass::parse`].
    pub class: EventClass,
    pub terminal_name: String,
    pub fare: Rupiah,
    pub balance_before: Rupiah,
    pub balance_after: Rupiah,
    /// The terminal asserted this event is supposed to deduct.
    pub deduct_flag: bool,
    /// Issuer card type; used only for summary partitioning.
    pub card_type_id: i64,
}

impl TapEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        card_id: CardId,
        occurred_at: NaiveDateTime,
        kind: String,
        terminal_name: String,
        fare: Rupiah,
        balance_before: Rupiah,
        balance_after: Rupiah,
        deduct_flag: bool,
        card_type_id: i64,
    ) -> Self {
        let class = EventClass::parse(&kind);
        Self {
            card_id,
            occurred_at,
            kind,
            class,
            terminal_name,
            fare,
            balance_before,
            balance_after,
            deduct_flag,
            card_type_id,
        }
    }
}

/// The validated, time-ordered batch of events.
///
/// Invariants, enforced by [`EventTable::new`] and fatal when violated:
/// - all events for one card form a single contiguous block;
/// - within a block, `occurred_at` is non-decreasing (ties keep input
///   order — the loader sorts stably).
///
/// The card index is built once, so every per-card computation scans only
/// that card's block instead of the whole table.
#[derive(Debug, Clone)]
pub struct EventTable {
    events: Vec<TapEvent>,
    cards: HashMap<CardId, Range<EventPos>>,
}

impl EventTable {
    pub fn new(events: Vec<TapEvent>) -> AuditResult<Self> {
        let mut cards: HashMap<CardId, Range<EventPos>> = HashMap::new();

        let mut i = 0;
        while i < events.len() {
            let card = events[i].card_id.clone();
            if cards.contains_key(&card) {
                return Err(AuditError::ContractViolation(format!(
                    "card {card} appears in more than one block; table must be sorted by (card, time)"
                )));
            }
            let start = i;
            let mut prev = events[i].occurred_at;
            i += 1;
            while i < events.len() && events[i].card_id == card {
                if events[i].occurred_at < prev {
                    return Err(AuditError::ContractViolation(format!(
                        "events for card {card} out of time order at position {i}"
                    )));
                }
                prev = events[i].occurred_at;
                i += 1;
            }
            cards.insert(card, start..i);
        }

        Ok(Self { events, cards })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TapEvent] {
        &self.events
    }

    pub fn get(&self, index: EventPos) -> AuditResult<&TapEvent> {
        self.events.get(index).ok_or(AuditError::IndexOutOfBounds {
            index,
            len: self.events.len(),
        })
    }

    /// Positions of the card's block, empty when the card is unknown.
    pub fn card_range(&self, card: &str) -> Range<EventPos> {
        self.cards.get(card).cloned().unwrap_or(0..0)
    }

    /// All cards present, in arbitrary order.
    pub fn card_ids(&self) -> impl Iterator<Item = &CardId> {
        self.cards.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 11)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn ev(card: &str, h: u32, m: u32) -> TapEvent {
        TapEvent::new(
            card.into(),
            at(h, m),
            "E-Money GATE [IN]".into(),
            "GATE 01 DUKUH ATAS".into(),
            3500,
            10_000,
            6_500,
            true,
            1,
        )
    }

    #[test]
    fn parses_gate_and_tob_taps() {
        assert_eq!(
            EventClass::parse("E-Money GATE [IN] Stasiun"),
            EventClass::Tap { channel: Channel::Gate, direction: Direction::In }
        );
        assert_eq!(
            EventClass::parse("TOB [OUT] Koridor 1"),
            EventClass::Tap { channel: Channel::Tob, direction: Direction::Out }
        );
    }

    #[test]
    fn unblokir_wins_over_tap_markers() {
        assert_eq!(
            EventClass::parse("UNBLOKIR GATE [IN]"),
            EventClass::Unblokir
        );
    }

    #[test]
    fn incomplete_labels_decode_to_other() {
        assert_eq!(EventClass::parse("TOP UP"), EventClass::Other);
        assert_eq!(EventClass::parse("GATE"), EventClass::Other);
        assert_eq!(EventClass::parse("[IN]"), EventClass::Other);
    }

    #[test]
    fn table_accepts_sorted_input_and_indexes_cards() {
        let table = EventTable::new(vec![ev("A", 8, 0), ev("A", 8, 5), ev("B", 9, 0)]).unwrap();
        assert_eq!(table.card_range("A"), 0..2);
        assert_eq!(table.card_range("B"), 2..3);
        assert_eq!(table.card_range("C"), 0..0);
    }

    #[test]
    fn table_rejects_out_of_order_times() {
        let err = EventTable::new(vec![ev("A", 8, 5), ev("A", 8, 0)]).unwrap_err();
        assert!(matches!(err, AuditError::ContractViolation(_)));
    }

    #[test]
    fn table_rejects_fragmented_card_blocks() {
        let err = EventTable::new(vec![ev("A", 8, 0), ev("B", 8, 5), ev("A", 9, 0)]).unwrap_err();
        assert!(matches!(err, AuditError::ContractViolation(_)));
    }
}
