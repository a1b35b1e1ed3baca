//! Marketplace configuration.

use crate::core::{Amount, Error, Result};
use crate::insurance::PayoutTerms;
use crate::monitoring::LoggerConfig;
use crate::oracle::OracleSettings;
use serde::{Deserialize, Serialize};

/// Marketplace configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    /// Maximum stake per policy
    pub policy_cap: Amount,
    /// Payout ratio numerator
    pub payout_numerator: Amount,
    /// Payout ratio denominator
    pub payout_denominator: Amount,
    /// Funding an airline must deposit before participating
    pub airline_funding: Amount,
    /// Registered airlines admitted without a vote
    pub bootstrap_airlines: u32,
    /// Reporter registration fee
    pub reporter_fee: Amount,
    /// Agreeing reporters needed to resolve a request
    pub quorum: usize,
    /// Reporter indices are drawn from `[0, index_range)`
    pub index_range: u8,
    pub indices_per_reporter: usize,
    /// Largest nonce before wrapping
    pub nonce_wrap: u32,
    /// Lookback window of the entropy source
    pub entropy_window: u32,
    /// Buffered events per subscriber
    pub event_capacity: usize,
    pub logging: LoggerConfig,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            policy_cap: 1,
            payout_numerator: 3,
            payout_denominator: 2,
            airline_funding: 10,
            bootstrap_airlines: 4,
            reporter_fee: 1,
            quorum: 3,
            index_range: 10,
            indices_per_reporter: 3,
            nonce_wrap: 250,
            entropy_window: 256,
            event_capacity: 1024,
            logging: LoggerConfig::default(),
        }
    }
}

impl MarketplaceConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Export as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if self.policy_cap == 0 {
            return Err(Error::InvalidConfig("policy_cap must be positive".into()));
        }
        if self.payout_denominator == 0 {
            return Err(Error::InvalidConfig("payout_denominator must be positive".into()));
        }
        if self.policy_cap.checked_mul(self.payout_numerator).is_none() {
            return Err(Error::InvalidConfig(
                "policy_cap * payout_numerator overflows".into(),
            ));
        }
        if self.quorum == 0 {
            return Err(Error::InvalidConfig("quorum must be positive".into()));
        }
        if self.indices_per_reporter == 0 || self.indices_per_reporter > self.index_range as usize {
            return Err(Error::InvalidConfig(format!(
                "indices_per_reporter must be in 1..={}",
                self.index_range
            )));
        }
        if self.nonce_wrap >= self.entropy_window {
            return Err(Error::InvalidConfig(format!(
                "nonce_wrap {} must stay inside the entropy window {}",
                self.nonce_wrap, self.entropy_window
            )));
        }
        Ok(())
    }

    pub fn payout_terms(&self) -> PayoutTerms {
        PayoutTerms {
            cap: self.policy_cap,
            numerator: self.payout_numerator,
            denominator: self.payout_denominator,
        }
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            fee: self.reporter_fee,
            quorum: self.quorum,
            index_range: self.index_range,
            indices_per_reporter: self.indices_per_reporter,
            nonce_wrap: self.nonce_wrap,
        }
    }
}
