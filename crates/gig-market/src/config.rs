//! Marketplace configuration.
//!
//! The fee rate and the platform payout account are fixed when a
//! [`Marketplace`](crate::Marketplace) is built and cannot change afterwards.

use std::path::Path;

use gig_core::{FeeSchedule, PrincipalId, DEFAULT_PLATFORM_FEE_PERCENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MarketError;

/// Default capacity of the event broadcast buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Default account that receives platform fees.
pub const DEFAULT_PLATFORM_ACCOUNT: &str = "platform";

/// Process-wide marketplace settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Percentage of each released price kept by the platform.
    pub platform_fee_percent: u8,
    /// Account credited with platform fees.
    pub platform_account: String,
    /// Number of events buffered for slow subscribers.
    pub event_capacity: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: DEFAULT_PLATFORM_FEE_PERCENT,
            platform_account: DEFAULT_PLATFORM_ACCOUNT.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl MarketConfig {
    /// Parses a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MarketError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MarketError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> Result<Self, MarketError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MarketError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&contents)?;
        debug!(path = %path.display(), fee_percent = config.platform_fee_percent, "loaded market config");
        Ok(config)
    }

    /// Checks every field is within range.
    pub fn validate(&self) -> Result<(), MarketError> {
        self.fee_schedule()?;
        self.platform_principal()?;
        if self.event_capacity == 0 {
            return Err(MarketError::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Fee schedule derived from `platform_fee_percent`.
    pub fn fee_schedule(&self) -> Result<FeeSchedule, MarketError> {
        Ok(FeeSchedule::new(self.platform_fee_percent)?)
    }

    /// The platform payout account as a principal.
    pub fn platform_principal(&self) -> Result<PrincipalId, MarketError> {
        PrincipalId::new(self.platform_account.clone())
            .map_err(|_| MarketError::Config("platform_account must not be empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = MarketConfig::default();
        assert_eq!(config.platform_fee_percent, 2);
        assert_eq!(config.platform_account, "platform");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = MarketConfig::from_json(r#"{"platform_account":"treasury"}"#).expect("parse");
        assert_eq!(config.platform_account, "treasury");
        assert_eq!(config.platform_fee_percent, 2);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn rejects_fee_above_hundred() {
        let err = MarketConfig::from_json(r#"{"platform_fee_percent":101}"#).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }

    #[test]
    fn rejects_empty_platform_account() {
        let err = MarketConfig::from_json(r#"{"platform_account":""}"#).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }

    #[test]
    fn rejects_zero_event_capacity() {
        let err = MarketConfig::from_json(r#"{"event_capacity":0}"#).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(MarketConfig::from_json("{not json").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("market.json");
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(br#"{"platform_fee_percent":5,"platform_account":"ops"}"#)
            .expect("write");

        let config = MarketConfig::load(&path).expect("load");
        assert_eq!(config.platform_fee_percent, 5);
        assert_eq!(config.platform_principal().expect("principal").as_str(), "ops");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = MarketConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }
}
