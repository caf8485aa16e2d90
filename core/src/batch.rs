//! Batch driver and run statistics.
//!
//! `classify_all` drives the classifier over every row; `summarize`
//! aggregates the verdicts for the reporting side. One forward scan per
//! card: the card's trips are built incrementally and snapshotted per
//! event instead of replaying the full history for every row.

use crate::classifier::{classify_with_trips, Verdict};
use crate::config::AuditConfig;
use crate::event::{Channel, EventClass, EventTable};
use crate::trip::TripBuilder;
use crate::types::{CardId, Rupiah};
use serde::Serialize;
use std::collections::HashMap;

/// The classified batch: the table plus one verdict per row, in row order.
#[derive(Debug)]
pub struct AnalyzedTable {
    pub table: EventTable,
    pub verdicts: Vec<Verdict>,
    /// Rows whose classification failed internally and fell back to a
    /// not-DD verdict carrying the error text.
    pub error_count: usize,
}

/// Classify every row of the table exactly once.
///
/// Cards are independent: each card's block is processed with its own
/// trip builder, and a failure on one row degrades that row to a not-DD
/// verdict without losing the rest of the batch.
pub fn classify_all(table: EventTable, config: &AuditConfig) -> AnalyzedTable {
    // Card blocks are contiguous and partition the table, so walking the
    // cards in block order appends verdicts in row order.
    let mut cards: Vec<(usize, CardId)> = table
        .card_ids()
        .map(|card| (table.card_range(card).start, card.clone()))
        .collect();
    cards.sort();

    let mut verdicts = Vec::with_capacity(table.len());
    let mut error_count = 0;

    for (_, card) in &cards {
        let mut builder = TripBuilder::new(config);
        for pos in table.card_range(card) {
            let event = &table.events()[pos];
            builder.observe(pos, event);
            let trips = builder.as_of(event.occurred_at);
            let verdict = match classify_with_trips(&table, config, pos, &trips) {
                Ok(verdict) => verdict,
                Err(e) => {
                    error_count += 1;
                    log::warn!("classification failed at row {pos} (card {card}): {e}");
                    Verdict::not_dd(format!("Error: {e}"), false)
                }
            };
            verdicts.push(verdict);
        }
    }

    let dd_count = verdicts.iter().filter(|v| v.is_double_deduct).count();
    log::info!(
        "classified {} events across {} cards: {} DD, {} errors",
        verdicts.len(),
        cards.len(),
        dd_count,
        error_count
    );

    AnalyzedTable { table, verdicts, error_count }
}

/// Case count and refund sum for one event family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyBreakdown {
    pub cases: usize,
    pub refund: Rupiah,
}

/// Aggregate run statistics for the reporting side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DdSummary {
    pub total_transactions: usize,
    pub total_dd_cases: usize,
    pub total_refund: Rupiah,
    /// Refund owed by the operator issuer band (card types 1-5).
    pub total_refund_tj: Rupiah,
    /// Refund owed by the partner issuer band (card types 6-25).
    pub total_refund_jli: Rupiah,
    pub total_integration_fares: usize,
    pub dd_percentage: f64,
    pub integration_percentage: f64,
    /// Refund owed per card, DD rows only.
    pub refund_by_card: HashMap<CardId, Rupiah>,
    pub gate: FamilyBreakdown,
    pub tob: FamilyBreakdown,
    pub unblokir: FamilyBreakdown,
}

pub fn summarize(analyzed: &AnalyzedTable) -> DdSummary {
    let total = analyzed.table.len();
    let mut summary = DdSummary {
        total_transactions: total,
        ..DdSummary::default()
    };

    for (event, verdict) in analyzed.table.events().iter().zip(&analyzed.verdicts) {
        if verdict.is_integration_fare {
            summary.total_integration_fares += 1;
        }
        if !verdict.is_double_deduct {
            continue;
        }

        summary.total_dd_cases += 1;
        summary.total_refund += verdict.refund;
        match event.card_type_id {
            1..=5 => summary.total_refund_tj += verdict.refund,
            6..=25 => summary.total_refund_jli += verdict.refund,
            _ => {}
        }
        *summary
            .refund_by_card
            .entry(event.card_id.clone())
            .or_insert(0) += verdict.refund;

        let family = match event.class {
            EventClass::Tap { channel: Channel::Gate, .. } => Some(&mut summary.gate),
            EventClass::Tap { channel: Channel::Tob, .. } => Some(&mut summary.tob),
            EventClass::Unblokir => Some(&mut summary.unblokir),
            EventClass::Other => None,
        };
        if let Some(family) = family {
            family.cases += 1;
            family.refund += verdict.refund;
        }
    }

    summary.dd_percentage = percentage(summary.total_dd_cases, total);
    summary.integration_percentage = percentage(summary.total_integration_fares, total);
    summary
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
