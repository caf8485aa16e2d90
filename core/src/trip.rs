//! Trip reconstruction — the per-card state machine.
//!
//! TRANSITION RULES (fixed, documented, never reordered):
//!   - GATE IN: force-close any open trip, then start a new trip.
//!   - TOB IN: continues the open trip when within the trip window,
//!     otherwise force-closes it and starts a new trip.
//!   - OUT (either channel): closes the open trip; dropped when no trip
//!     is open. Channel identity never breaks trip continuity — a gate
//!     entry may be closed by an onboard validator exit and vice versa.
//!   - UNBLOKIR and unrecognized kinds: never trip members.
//!
//! An open trip older than the window (measured against the queried
//! event's time) is auto-completed when snapshotted.

use crate::config::AuditConfig;
use crate::error::AuditResult;
use crate::event::{Channel, Direction, EventClass, EventTable, TapEvent};
use crate::payment::is_payment;
use crate::types::EventPos;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

/// How a trip began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStart {
    GateIn,
    TobIn,
}

impl From<Channel> for TripStart {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Gate => TripStart::GateIn,
            Channel::Tob => TripStart::TobIn,
        }
    }
}

/// One tap belonging to a trip, tagged with its computed payment status.
#[derive(Debug, Clone, Serialize)]
pub struct TripMember {
    pub pos: EventPos,
    pub time: NaiveDateTime,
    pub direction: Direction,
    pub is_payment: bool,
}

/// One reconstructed rider journey. Ephemeral: rebuilt per query, never
/// cached across queries.
#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    /// 1-based sequence number within the card's history.
    pub trip_id: usize,
    pub start_pos: EventPos,
    pub start_time: NaiveDateTime,
    pub start_kind: TripStart,
    pub start_terminal: String,
    pub end_pos: Option<EventPos>,
    pub end_time: Option<NaiveDateTime>,
    pub end_terminal: Option<String>,
    pub end_channel: Option<Channel>,
    pub members: Vec<TripMember>,
    pub payment_count: usize,
    pub is_completed: bool,
}

impl Trip {
    pub fn is_paid(&self) -> bool {
        self.payment_count > 0
    }

    pub fn contains(&self, pos: EventPos) -> bool {
        self.members.iter().any(|m| m.pos == pos)
    }

    /// All of this trip's payments happened on entry legs — the closing
    /// payment is still outstanding.
    pub fn paid_only_on_entry(&self) -> bool {
        self.payment_count > 0
            && self
                .members
                .iter()
                .filter(|m| m.is_payment)
                .all(|m| m.direction == Direction::In)
    }
}

/// Incremental per-card trip builder.
///
/// Feed one card's events in table order through [`TripBuilder::observe`];
/// [`TripBuilder::as_of`] snapshots the trip list as seen from a query
/// time. The batch driver keeps one builder per card so the whole card
/// history is scanned exactly once.
#[derive(Debug)]
pub struct TripBuilder {
    max_trip: Duration,
    trips: Vec<Trip>,
    open: Option<Trip>,
}

impl TripBuilder {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            max_trip: Duration::hours(config.max_trip_hours),
            trips: Vec::new(),
            open: None,
        }
    }

    /// Feed the next event of the card. Events must arrive in table order.
    pub fn observe(&mut self, pos: EventPos, event: &TapEvent) {
        match event.class {
            EventClass::Tap { channel, direction: Direction::In } => {
                if channel == Channel::Tob {
                    if let Some(open) = self.open.as_mut() {
                        if event.occurred_at - open.start_time <= self.max_trip {
                            append_member(open, pos, event, Direction::In);
                            return;
                        }
                    }
                }
                // Missing OUT guard: an entry while a trip is open closes
                // the stale trip before the new one starts.
                self.force_close_open();
                let mut trip = Trip {
                    trip_id: self.trips.len() + 1,
                    start_pos: pos,
                    start_time: event.occurred_at,
                    start_kind: channel.into(),
                    start_terminal: event.terminal_name.clone(),
                    end_pos: None,
                    end_time: None,
                    end_terminal: None,
                    end_channel: None,
                    members: Vec::new(),
                    payment_count: 0,
                    is_completed: false,
                };
                append_member(&mut trip, pos, event, Direction::In);
                self.open = Some(trip);
            }
            EventClass::Tap { channel, direction: Direction::Out } => {
                if let Some(mut open) = self.open.take() {
                    append_member(&mut open, pos, event, Direction::Out);
                    open.end_pos = Some(pos);
                    open.end_time = Some(event.occurred_at);
                    open.end_terminal = Some(event.terminal_name.clone());
                    open.end_channel = Some(channel);
                    open.is_completed = true;
                    self.trips.push(open);
                }
                // An exit with no open trip neither starts nor extends one.
            }
            EventClass::Unblokir | EventClass::Other => {}
        }
    }

    /// Snapshot the trips as seen from `query_time`: every closed trip,
    /// plus the open one (auto-completed when older than the window),
    /// appended last.
    pub fn as_of(&self, query_time: NaiveDateTime) -> Vec<Trip> {
        let mut trips = self.trips.clone();
        if let Some(open) = &self.open {
            let mut last = open.clone();
            if query_time - last.start_time > self.max_trip {
                last.is_completed = true;
            }
            trips.push(last);
        }
        trips
    }

    fn force_close_open(&mut self) {
        if let Some(mut open) = self.open.take() {
            open.is_completed = true;
            self.trips.push(open);
        }
    }
}

fn append_member(trip: &mut Trip, pos: EventPos, event: &TapEvent, direction: Direction) {
    let paying = is_payment(event);
    trip.members.push(TripMember {
        pos,
        time: event.occurred_at,
        direction,
        is_payment: paying,
    });
    if paying {
        trip.payment_count += 1;
    }
}

/// Replay every event of `card` at positions `<= as_of` and return the
/// trip list as seen from the queried event's time. Pure: same inputs,
/// same trips.
pub fn reconstruct_trips(
    table: &EventTable,
    config: &AuditConfig,
    card: &str,
    as_of: EventPos,
) -> AuditResult<Vec<Trip>> {
    let query_time = table.get(as_of)?.occurred_at;
    let events = table.events();
    let mut builder = TripBuilder::new(config);
    for pos in table.card_range(card) {
        if pos > as_of {
            break;
        }
        builder.observe(pos, &events[pos]);
    }
    Ok(builder.as_of(query_time))
}
