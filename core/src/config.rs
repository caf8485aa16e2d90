//! Audit thresholds and tariff values.
//!
//! Defaults match the production tariff rules; a deployment can override
//! individual values from a JSON file. In tests, use `AuditConfig::default()`.

use crate::types::Rupiah;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum duration of one trip, in hours. An open trip older than this
    /// (measured against the queried event's time) is auto-closed.
    pub max_trip_hours: i64,
    /// An open trip older than this many hours counts as still awaiting its
    /// payment when an UNBLOKIR is being justified.
    pub stale_open_trip_hours: i64,
    /// Window in seconds after an UNBLOKIR within which a same-station IN
    /// tap is treated as a collision.
    pub tap_collision_window_secs: i64,
    /// Flat fare outside the morning subsidy window.
    pub regular_fare: Rupiah,
    /// Correct fare inside the morning subsidy window.
    pub subsidy_fare: Rupiah,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_trip_hours: 4,
            stale_open_trip_hours: 1,
            tap_collision_window_secs: 300,
            regular_fare: 3_500,
            subsidy_fare: 2_000,
        }
    }
}

impl AuditConfig {
    /// Load overrides from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Amount overcharged when the regular fare was applied inside the
    /// subsidy window.
    pub fn subsidy_overcharge(&self) -> Rupiah {
        self.regular_fare - self.subsidy_fare
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_tariff() {
        let cfg = AuditConfig::default();
        assert_eq!(cfg.max_trip_hours, 4);
        assert_eq!(cfg.regular_fare, 3_500);
        assert_eq!(cfg.subsidy_fare, 2_000);
        assert_eq!(cfg.subsidy_overcharge(), 1_500);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let cfg: AuditConfig = serde_json::from_str(r#"{"max_trip_hours": 6}"#).unwrap();
        assert_eq!(cfg.max_trip_hours, 6);
        assert_eq!(cfg.regular_fare, 3_500);
    }
}
