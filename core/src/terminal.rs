//! Terminal-name normalization and station identity.
//!
//! Gate terminals and onboard validators name the same physical station
//! differently (`"GATE 02 DUKUH ATAS"` vs `"TOB HALTE DUKUH ATAS"`). The
//! parser strips the channel prefix so both compare equal; anything it
//! cannot recognize is compared as-is, and unknown terminals never match.

/// Placeholder labels the loader writes for missing terminal names.
const UNKNOWN_MARKERS: [&str; 3] = ["UNKNOWN", "NAN", "NONE"];

/// Trim and uppercase. Empty and placeholder names become the empty string.
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim().to_uppercase();
    if UNKNOWN_MARKERS.contains(&trimmed.as_str()) {
        return String::new();
    }
    trimmed
}

/// Strip the channel prefix, leaving the bare station name.
///
/// Ordered rules, first match wins:
///   `GATE <n> X` -> `X`, `TOB HALTE X` -> `X`, `TOB X` -> `X`,
///   `HALTE X` -> `X`. Unmatched input returns the normalized name
///   unchanged.
pub fn parse_station_name(name: &str) -> String {
    let normalized = normalize(name);
    if normalized.is_empty() {
        return normalized;
    }

    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    match tokens.as_slice() {
        ["GATE", second, rest @ ..] if second.chars().all(|c| c.is_ascii_digit()) => {
            rest.join(" ")
        }
        ["TOB", "HALTE", rest @ ..] => rest.join(" "),
        ["TOB", rest @ ..] => rest.join(" "),
        ["HALTE", rest @ ..] => rest.join(" "),
        _ => normalized,
    }
}

/// True iff both names parse to the same non-empty station. An unknown
/// terminal on either side never matches.
pub fn same_station(a: &str, b: &str) -> bool {
    let station_a = parse_station_name(a);
    if station_a.is_empty() {
        return false;
    }
    station_a == parse_station_name(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_each_channel_prefix() {
        assert_eq!(parse_station_name("GATE 02 DUKUH ATAS"), "DUKUH ATAS");
        assert_eq!(parse_station_name("TOB HALTE DUKUH ATAS"), "DUKUH ATAS");
        assert_eq!(parse_station_name("TOB DUKUH ATAS"), "DUKUH ATAS");
        assert_eq!(parse_station_name("HALTE DUKUH ATAS"), "DUKUH ATAS");
    }

    #[test]
    fn first_matching_rule_wins() {
        // TOB HALTE must not leave a stray HALTE behind.
        assert_eq!(parse_station_name("TOB HALTE BUNDARAN HI"), "BUNDARAN HI");
    }

    #[test]
    fn gate_rule_needs_a_numeric_gate_id() {
        // No gate number: not a recognized prefix, name passes through.
        assert_eq!(parse_station_name("GATE DUKUH ATAS"), "GATE DUKUH ATAS");
    }

    #[test]
    fn unmatched_names_pass_through_normalized() {
        assert_eq!(parse_station_name("  stasiun manggarai "), "STASIUN MANGGARAI");
    }

    #[test]
    fn placeholders_parse_to_empty() {
        assert_eq!(parse_station_name("UNKNOWN"), "");
        assert_eq!(parse_station_name("nan"), "");
        assert_eq!(parse_station_name("  "), "");
    }

    #[test]
    fn same_station_crosses_channels() {
        assert!(same_station("GATE 02 DUKUH ATAS", "TOB HALTE DUKUH ATAS"));
        assert!(same_station("HALTE SENAYAN", "TOB SENAYAN"));
        assert!(!same_station("GATE 02 DUKUH ATAS", "TOB HALTE SENAYAN"));
    }

    #[test]
    fn same_station_is_symmetric_and_reflexive() {
        let a = "GATE 1 SENAYAN";
        let b = "TOB SENAYAN";
        assert!(same_station(a, a));
        assert_eq!(same_station(a, b), same_station(b, a));
    }

    #[test]
    fn unknown_terminal_never_matches_even_itself() {
        assert!(!same_station("UNKNOWN", "UNKNOWN"));
        assert!(!same_station("", "GATE 02 DUKUH ATAS"));
    }

    #[test]
    fn prefix_only_names_parse_to_empty_and_never_match() {
        assert_eq!(parse_station_name("TOB"), "");
        assert!(!same_station("TOB", "TOB"));
    }
}
