//! Route charges and the canonical payment requirement derived from them.
//!
//! A route declares *what it costs* with [`ChargeOptions`]. On every request to a
//! chargeable route the [`RequirementBuilder`] turns those options plus the global
//! [`GateConfig`] into a fresh [`PaymentRequirement`]: the exact terms the caller must
//! pay, stamped with a unique nonce and an expiry.

use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GateConfig;
use crate::error::PaymentError;
use crate::timestamp::UnixTimestamp;
use crate::util::Price;

/// Per-route charge declaration.
///
/// `asset` and `network` fall back to the configured defaults when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeOptions {
    /// Decimal price string, e.g. `"1.00"`.
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChargeOptions {
    pub fn new(price: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            asset: None,
            network: None,
            description: None,
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Canonical description of the payment owed for a single request.
///
/// Never shared between requests and never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    pub amount: String,
    pub asset: String,
    pub network: String,
    /// Payee identity.
    pub seller: String,
    /// Verifier endpoint identity.
    pub facilitator: String,
    /// Unique per-requirement token for replay protection and correlation.
    pub nonce: String,
    pub expires_at: UnixTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentRequirement {
    /// Identifier used to correlate this requirement in logs and hooks.
    pub fn id(&self) -> &str {
        &self.nonce
    }

    pub fn is_expired_at(&self, now: UnixTimestamp) -> bool {
        now >= self.expires_at
    }
}

/// Builds [`PaymentRequirement`]s from route charges and global configuration.
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    config: Arc<GateConfig>,
}

impl RequirementBuilder {
    /// Number of random bytes in a nonce.
    pub const NONCE_BYTES: usize = 32;

    pub fn new(config: Arc<GateConfig>) -> Self {
        Self { config }
    }

    pub fn ttl(&self) -> Duration {
        self.config.requirement_ttl()
    }

    /// Builds a fresh requirement for one request.
    ///
    /// Seller and facilitator always come from configuration; routes cannot override them.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Config`] if `options.price` is not a valid non-negative decimal.
    pub fn build(&self, options: &ChargeOptions) -> Result<PaymentRequirement, PaymentError> {
        let price = Price::parse(&options.price).map_err(|e| {
            PaymentError::config(format!("Invalid route price {:?}: {e}", options.price))
        })?;
        let asset = options
            .asset
            .clone()
            .unwrap_or_else(|| self.config.default_asset().to_string());
        let network = options
            .network
            .clone()
            .unwrap_or_else(|| self.config.default_network().to_string());
        Ok(PaymentRequirement {
            amount: price.as_str().to_string(),
            asset,
            network,
            seller: self.config.seller().to_string(),
            facilitator: self.config.facilitator().to_string(),
            nonce: generate_nonce(),
            expires_at: UnixTimestamp::now() + self.ttl(),
            description: options.description.clone(),
        })
    }
}

fn generate_nonce() -> String {
    let nonce: [u8; RequirementBuilder::NONCE_BYTES] = rng().random();
    hex::encode(nonce)
}
