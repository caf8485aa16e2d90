//! audit-runner: headless double-deduct audit over a tap-transaction export.
//!
//! Usage:
//!   audit-runner --input taps.csv
//!   audit-runner --input taps.csv --card 6013500012345678
//!   audit-runner --input taps.csv --subsidy
//!   audit-runner --input taps.csv --config audit.json --json

use anyhow::Result;
use chrono::NaiveDateTime;
use fareaudit_core::{
    batch::{classify_all, summarize, AnalyzedTable, DdSummary},
    classifier::Verdict,
    config::AuditConfig,
    loader::load_csv,
    payment::is_subsidy_time,
    trip::{reconstruct_trips, TripStart},
    types::Rupiah,
};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

#[derive(serde::Serialize)]
struct JsonReport<'a> {
    summary: &'a DdSummary,
    error_count: usize,
    verdicts: &'a [Verdict],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let input = arg_value(&args, "--input").ok_or_else(|| {
        anyhow::anyhow!(
            "usage: audit-runner --input <taps.csv> [--config <audit.json>] \
[--card <id>] [--subsidy] [--json]"
        )
    })?;
    let card = arg_value(&args, "--card");
    let config = match arg_value(&args, "--config") {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };
    let json_mode = args.iter().any(|a| a == "--json");
    let subsidy_mode = args.iter().any(|a| a == "--subsidy");

    log::info!("loading {input}");
    let table = load_csv(Path::new(input))?;
    log::info!("loaded {} events, classifying", table.len());
    let analyzed = classify_all(table, &config);
    let summary = summarize(&analyzed);

    if json_mode {
        let report = JsonReport {
            summary: &summary,
            error_count: analyzed.error_count,
            verdicts: &analyzed.verdicts,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&analyzed, &summary);
    if let Some(card) = card {
        print_card_analysis(&analyzed, &config, card);
    }
    if subsidy_mode {
        print_subsidy_analysis(&analyzed, &config);
    }

    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!(" {title}");
    println!("{}", "=".repeat(60));
}

fn print_subsection(title: &str) {
    println!("\n--- {title} ---");
}

fn print_summary(analyzed: &AnalyzedTable, summary: &DdSummary) {
    print_header("DD ANALYZER SUMMARY");

    println!("Total Transactions: {}", summary.total_transactions);
    println!(
        "DD Detected: {} ({:.2}%)",
        summary.total_dd_cases, summary.dd_percentage
    );
    println!("Total Refund Amount: Rp {}", summary.total_refund);
    println!("  Operator band (types 1-5):  Rp {}", summary.total_refund_tj);
    println!("  Partner band (types 6-25):  Rp {}", summary.total_refund_jli);
    println!(
        "Integration Fares: {} ({:.2}%)",
        summary.total_integration_fares, summary.integration_percentage
    );
    if analyzed.error_count > 0 {
        println!("Rows degraded by errors: {}", analyzed.error_count);
    }

    print_subsection("DD Breakdown by Reason");
    let mut by_reason: BTreeMap<&str, (usize, Rupiah)> = BTreeMap::new();
    for verdict in analyzed.verdicts.iter().filter(|v| v.is_double_deduct) {
        let entry = by_reason.entry(verdict.reason.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += verdict.refund;
    }
    for (reason, (count, refund)) in by_reason {
        println!("  {reason}: {count} (Rp {refund})");
    }

    print_subsection("DD by Event Family");
    println!(
        "  GATE:     {} cases, Rp {}",
        summary.gate.cases, summary.gate.refund
    );
    println!(
        "  TOB:      {} cases, Rp {}",
        summary.tob.cases, summary.tob.refund
    );
    println!(
        "  UNBLOKIR: {} cases, Rp {}",
        summary.unblokir.cases, summary.unblokir.refund
    );
}

fn print_card_analysis(analyzed: &AnalyzedTable, config: &AuditConfig, card: &str) {
    print_header(&format!("CARD ANALYSIS: {card}"));

    let range = analyzed.table.card_range(card);
    if range.is_empty() {
        println!("Card not found in dataset.");
        return;
    }

    let events = analyzed.table.events();
    let dd_count = range
        .clone()
        .filter(|&pos| analyzed.verdicts[pos].is_double_deduct)
        .count();
    let refund: Rupiah = range.clone().map(|pos| analyzed.verdicts[pos].refund).sum();
    let (first, last): (NaiveDateTime, NaiveDateTime) = (
        events[range.start].occurred_at,
        events[range.end - 1].occurred_at,
    );

    println!("Total Transactions: {}", range.len());
    println!("DD Detected: {dd_count}");
    println!("Date Range: {first} to {last}");
    if refund > 0 {
        println!("Total DD Refund: Rp {refund}");
    }

    print_subsection("Transaction Details");
    for pos in range.clone() {
        let event = &events[pos];
        let verdict = &analyzed.verdicts[pos];
        let mark = if verdict.is_double_deduct { "DD" } else { "OK" };
        let subsidy_mark = if is_subsidy_time(event.occurred_at) {
            " [subsidi]"
        } else {
            ""
        };
        println!(
            "  idx {pos:4}: {} | {:24} | Rp {:>6} | {mark}{subsidy_mark}",
            event.occurred_at.format("%H:%M:%S"),
            event.kind,
            event.fare
        );
        if verdict.is_double_deduct {
            println!("        -> {}", verdict.reason);
            if verdict.refund > 0 {
                println!("        -> Refund: Rp {}", verdict.refund);
            }
        }
    }

    print_subsection("Trip Analysis");
    match reconstruct_trips(&analyzed.table, config, card, range.end - 1) {
        Ok(trips) => {
            for trip in &trips {
                let status = if trip.is_completed { "completed" } else { "open" };
                let end = trip.end_terminal.as_deref().unwrap_or("-");
                println!(
                    "  trip {}: {} {} at {} -> {} | {} taps, {} payments, {status}",
                    trip.trip_id,
                    start_label(trip.start_kind),
                    trip.start_terminal,
                    trip.start_time.format("%H:%M:%S"),
                    end,
                    trip.members.len(),
                    trip.payment_count,
                );
            }
        }
        Err(e) => println!("  trip reconstruction failed: {e}"),
    }
}

fn print_subsidy_analysis(analyzed: &AnalyzedTable, config: &AuditConfig) {
    print_header("SUBSIDY TIME ANALYSIS");

    let events = analyzed.table.events();
    let in_window: Vec<usize> = (0..events.len())
        .filter(|&pos| is_subsidy_time(events[pos].occurred_at))
        .collect();
    println!("Total Subsidy Hour Transactions: {}", in_window.len());
    if in_window.is_empty() {
        return;
    }

    print_subsection("Fare Distribution in Subsidy Hours");
    let mut fares: BTreeMap<Rupiah, usize> = BTreeMap::new();
    for &pos in &in_window {
        *fares.entry(events[pos].fare).or_insert(0) += 1;
    }
    for (fare, count) in fares {
        let note = if fare == config.subsidy_fare {
            "expected".to_string()
        } else {
            format!("should be {}", config.subsidy_fare)
        };
        println!("  Rp {fare}: {count} ({note})");
    }

    let dd: Vec<usize> = in_window
        .iter()
        .copied()
        .filter(|&pos| analyzed.verdicts[pos].is_double_deduct)
        .collect();
    if !dd.is_empty() {
        print_subsection("Subsidy DD Issues");
        println!("  DD in Subsidy Hours: {}", dd.len());
        let refund: Rupiah = dd.iter().map(|&pos| analyzed.verdicts[pos].refund).sum();
        println!("  Total Refund: Rp {refund}");
    }
}

fn start_label(kind: TripStart) -> &'static str {
    match kind {
        TripStart::GateIn => "GATE_IN",
        TripStart::TobIn => "TOB_IN",
    }
}
