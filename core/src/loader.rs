//! Ingestion of the upstream transaction export.
//!
//! The export is a CSV dump of the terminal back office. The loader
//! validates the header, coerces each row fail-closed (unparseable
//! numerics become 0, unparseable booleans become false, missing strings
//! become UNKNOWN), drops rows missing a critical field, stable-sorts by
//! (card, time) and hands the result to [`EventTable::new`]. One file,
//! one batch — no streaming, no persistence.

use crate::error::{AuditError, AuditResult};
use crate::event::{EventTable, TapEvent};
use crate::types::Rupiah;
use chrono::NaiveDateTime;
use std::path::Path;

/// Columns that must be present in the export header.
const REQUIRED_COLUMNS: [&str; 9] = [
    "trx",
    "trx_on",
    "balance_before_int",
    "fare_int",
    "balance_int",
    "deduct_boo",
    "terminal_name_var",
    "card_type_id_int",
    "card_number_var",
];

/// Timestamp formats seen in the export, tried in order.
const TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

pub fn load_csv(path: &Path) -> AuditResult<EventTable> {
    let content = std::fs::read_to_string(path)?;
    parse_csv(&content)
}

pub fn parse_csv(content: &str) -> AuditResult<EventTable> {
    let mut lines = content.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| AuditError::MalformedInput("empty file".into()))?;
    let header = split_fields(header_line.trim_end_matches('\r'));

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !header.iter().any(|h| h == *col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(AuditError::MalformedInput(format!(
            "missing columns: {}",
            missing.join(", ")
        )));
    }

    let idx_kind = column_index(&header, "trx")?;
    let idx_time = column_index(&header, "trx_on")?;
    let idx_before = column_index(&header, "balance_before_int")?;
    let idx_fare = column_index(&header, "fare_int")?;
    let idx_after = column_index(&header, "balance_int")?;
    let idx_deduct = column_index(&header, "deduct_boo")?;
    let idx_terminal = column_index(&header, "terminal_name_var")?;
    let idx_card_type = column_index(&header, "card_type_id_int")?;
    let idx_card = column_index(&header, "card_number_var")?;

    let mut events = Vec::new();
    let mut total_rows = 0usize;
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        total_rows += 1;

        let fields = split_fields(line);
        let field = |idx: usize| fields.get(idx).map(|f| f.trim()).unwrap_or("");

        // Rows missing a critical field are dropped, not fatal.
        let card = field(idx_card);
        let kind = field(idx_kind);
        let occurred_at = match parse_timestamp(field(idx_time)) {
            Some(t) if !card.is_empty() && !kind.is_empty() => t,
            _ => continue,
        };

        events.push(TapEvent::new(
            card.to_string(),
            occurred_at,
            kind.to_string(),
            non_empty_or_unknown(field(idx_terminal)),
            parse_rupiah(field(idx_fare)),
            parse_rupiah(field(idx_before)),
            parse_rupiah(field(idx_after)),
            parse_flag(field(idx_deduct)),
            parse_rupiah(field(idx_card_type)),
        ));
    }

    if events.is_empty() {
        return Err(AuditError::MalformedInput(
            "no valid rows after cleaning".into(),
        ));
    }
    if events.len() < total_rows {
        log::info!(
            "data cleaning: {total_rows} -> {} rows ({} dropped)",
            events.len(),
            total_rows - events.len()
        );
    }

    // Stable sort: ties on (card, time) keep file order.
    events.sort_by(|a, b| {
        a.card_id
            .cmp(&b.card_id)
            .then(a.occurred_at.cmp(&b.occurred_at))
    });

    EventTable::new(events)
}

fn column_index(header: &[String], name: &str) -> AuditResult<usize> {
    header
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AuditError::MalformedInput(format!("missing column {name}")))
}

/// Split one CSV line. Handles quoted fields with embedded commas and
/// doubled quotes. The export never emits embedded newlines.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Fail-closed numeric coercion: integers, float-formatted integers
/// ("3500.0"), or 0.
fn parse_rupiah(raw: &str) -> Rupiah {
    if raw.is_empty() {
        return 0;
    }
    raw.parse::<Rupiah>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f.round() as Rupiah))
        .unwrap_or(0)
}

/// Fail-closed boolean coercion: only a literal TRUE asserts the flag.
fn parse_flag(raw: &str) -> bool {
    raw.eq_ignore_ascii_case("true")
}

fn non_empty_or_unknown(raw: &str) -> String {
    if raw.is_empty() {
        "UNKNOWN".to_string()
    } else {
        raw.to_string()
    }
}
