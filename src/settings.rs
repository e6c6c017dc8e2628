//! Typed key/value settings store.
//!
//! Every tunable the engine reads lives here as a raw string plus a parse
//! target (Int / Float / Str / Bool / BigInt), parsed on read. Defaults are
//! compiled in; a JSON overrides file can replace or extend them.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What a raw setting value parses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseTo {
    Int,
    Float,
    Str,
    Bool,
    BigInt,
}

/// One settings row: raw string value plus its parse target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub parse_to: ParseTo,
}

/// The settings table. Reads never panic; a missing or unparsable value
/// comes back as `None` and the caller picks its fallback.
#[derive(Debug, Clone)]
pub struct Settings {
    entries: HashMap<String, SettingRow>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Settings {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The compiled-in defaults.
    pub fn seeded() -> Self {
        let mut settings = Self::empty();
        for (key, value, parse_to) in SEED {
            settings.set(key, value, *parse_to);
        }
        settings
    }

    /// Defaults plus overrides from a JSON array of rows.
    pub fn from_overrides_file(path: &Path) -> Result<Self> {
        let mut settings = Self::seeded();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings overrides {}", path.display()))?;
        let rows: Vec<SettingRow> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings overrides {}", path.display()))?;
        for row in rows {
            settings.entries.insert(row.key.clone(), row);
        }
        Ok(settings)
    }

    pub fn set(&mut self, key: &str, value: &str, parse_to: ParseTo) {
        self.entries.insert(
            key.to_string(),
            SettingRow {
                key: key.to_string(),
                value: value.to_string(),
                parse_to,
            },
        );
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|row| row.value.as_str())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        let row = self.entries.get(key)?;
        match row.parse_to {
            ParseTo::Int | ParseTo::BigInt => row.value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        let row = self.entries.get(key)?;
        match row.parse_to {
            ParseTo::Float => row.value.trim().parse().ok(),
            ParseTo::Int | ParseTo::BigInt => row.value.trim().parse::<i64>().ok().map(|v| v as f64),
            _ => None,
        }
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        let row = self.entries.get(key)?;
        if row.parse_to != ParseTo::Bool {
            return None;
        }
        match row.value.trim() {
            "1" | "true" | "TRUE" => Some(true),
            "0" | "false" | "FALSE" => Some(false),
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        let row = self.entries.get(key)?;
        (row.parse_to == ParseTo::Str).then_some(row.value.as_str())
    }

    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        self.int(key).unwrap_or(default)
    }

    pub fn float_or(&self, key: &str, default: f64) -> f64 {
        self.float(key).unwrap_or(default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.bool(key).unwrap_or(default)
    }
}

const SEED: &[(&str, &str, ParseTo)] = &[
    ("CandleDirectionBuff", "0.1", ParseTo::Float),
    ("RiskReward", "2", ParseTo::Int),
    ("SignalStopLossError", "0.005", ParseTo::Float),
    ("SignalTakeProfitError", "0.005", ParseTo::Float),
    ("SignalMinStopDistancePips", "3", ParseTo::Int),
    ("OrderVolume", "0.01", ParseTo::Float),
    ("MSSBigHeightLimit", "11", ParseTo::Int),
    ("COBBodyCount", "3", ParseTo::Int),
    ("COBPostStartCount", "1", ParseTo::Int),
    ("COBStopHeightLimit", "10", ParseTo::Int),
    ("COBFailOnBigHeight", "0", ParseTo::Bool),
    ("LiquidityPullbackPercent", "30", ParseTo::Int),
    ("LiquidityMaxAgeSessionMicro", "5", ParseTo::Int),
    ("LiquidityMaxAgeWorkTimeMicro", "2", ParseTo::Int),
    ("LiquidityMaxUsedCount", "2", ParseTo::Int),
    ("LiquidityMaxStopLossUsedCount", "2", ParseTo::Int),
    ("LiquidityMaxTakeProfitUsedCount", "1", ParseTo::Int),
    ("LiquidityUsedMaxDrivenPattenUsedCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxDrivenPattenStopLossCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxDrivenPattenTakeProfitCount", "1", ParseTo::Int),
    ("LiquidityUsedMaxMSSUsedCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxMSSStopLossCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxMSSTakeProfitCount", "1", ParseTo::Int),
    ("LiquidityUsedMaxCOBUsedCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxCOBStopLossCount", "2", ParseTo::Int),
    ("LiquidityUsedMaxCOBTakeProfitCount", "1", ParseTo::Int),
    ("BotTimezone", "America/New_York", ParseTo::Str),
    ("BackTestChunkSize", "10000", ParseTo::Int),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_defaults_parse() {
        let s = Settings::seeded();
        assert_eq!(s.int("RiskReward"), Some(2));
        assert_eq!(s.float("SignalStopLossError"), Some(0.005));
        assert_eq!(s.bool("COBFailOnBigHeight"), Some(false));
        assert_eq!(s.str("BotTimezone"), Some("America/New_York"));
        // Int rows also read as floats for arithmetic callers.
        assert_eq!(s.float("RiskReward"), Some(2.0));
    }

    #[test]
    fn test_missing_and_mistyped_reads_are_none() {
        let s = Settings::seeded();
        assert_eq!(s.int("NoSuchKey"), None);
        assert_eq!(s.bool("RiskReward"), None);
        assert_eq!(s.str("RiskReward"), None);
        assert_eq!(s.int_or("NoSuchKey", 7), 7);
    }

    #[test]
    fn test_set_overrides_seed() {
        let mut s = Settings::seeded();
        s.set("RiskReward", "3", ParseTo::Int);
        assert_eq!(s.int("RiskReward"), Some(3));
    }

    #[test]
    fn test_bigint_reads_as_int() {
        let mut s = Settings::empty();
        s.set("BackTestStartUTCUnix", "1700000000", ParseTo::BigInt);
        assert_eq!(s.int("BackTestStartUTCUnix"), Some(1_700_000_000));
    }
}
