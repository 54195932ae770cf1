//! Global configuration for the payment gate.
//!
//! Configuration is read once at startup, validated, and then shared read-only
//! (behind an [`Arc`](std::sync::Arc)) by every request.
//!
//! # Example
//!
//! ```json
//! {
//!   "facilitator": "https://facilitator.example.com",
//!   "seller": "$SELLER_WALLET",
//!   "default_asset": "USDC",
//!   "default_network": "base-mainnet",
//!   "fallback_mode": "deny",
//!   "requirement_ttl": 300,
//!   "routes": [
//!     { "method": "GET", "path": "/weather", "price": "0.01", "description": "Weather report" }
//!   ],
//!   "groups": [
//!     { "prefix": "/premium", "price": "1.00" }
//!   ]
//! }
//! ```
//!
//! # Environment Variable Resolution
//!
//! The seller and facilitator identities accept `$VAR` or `${VAR}` references,
//! resolved during deserialization via [`LiteralOrEnv`]. This keeps wallet
//! identities out of configuration files.

use http::{HeaderName, Method};
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::PaymentError;
use crate::requirement::ChargeOptions;
use crate::util::Price;

/// Behavior when the verifier cannot be reached or fails in an unclassified way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Deny the request with a `PaymentNetworkError`.
    #[default]
    Deny,
    /// Admit the request without a verified payment context.
    ///
    /// This weakens the gate: while the verifier is unreachable, chargeable routes
    /// are served for free. Invalid, expired and missing credentials are still
    /// denied. Only opt in when availability matters more than revenue.
    Allow,
}

/// Where the credential extractor looks for a payment credential, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialLocations {
    #[serde(default = "config_defaults::default_credential_header")]
    pub header: String,
    #[serde(default = "config_defaults::default_credential_query")]
    pub query: String,
    #[serde(default = "config_defaults::default_credential_body_field")]
    pub body_field: String,
}

impl Default for CredentialLocations {
    fn default() -> Self {
        Self {
            header: config_defaults::default_credential_header(),
            query: config_defaults::default_credential_query(),
            body_field: config_defaults::default_credential_body_field(),
        }
    }
}

/// A handler-level charge declared in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteCharge {
    pub method: String,
    pub path: String,
    #[serde(flatten)]
    pub charge: ChargeOptions,
}

/// A group-level charge applying to every route under `prefix`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupCharge {
    pub prefix: String,
    #[serde(flatten)]
    pub charge: ChargeOptions,
}

/// Gate configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    facilitator: LiteralOrEnv<String>,
    seller: LiteralOrEnv<String>,
    default_asset: String,
    default_network: String,
    #[serde(default)]
    fallback_mode: FallbackMode,
    #[serde(default = "config_defaults::default_requirement_ttl")]
    requirement_ttl: u64,
    #[serde(default)]
    credential: CredentialLocations,
    #[serde(default)]
    routes: Vec<RouteCharge>,
    #[serde(default)]
    groups: Vec<GroupCharge>,
}

pub mod config_defaults {
    use std::env;

    pub const DEFAULT_REQUIREMENT_TTL_SECS: u64 = 300;
    pub const DEFAULT_CREDENTIAL_HEADER: &str = "x402-payment";
    pub const DEFAULT_CREDENTIAL_QUERY: &str = "x402_payment";
    pub const DEFAULT_CREDENTIAL_BODY_FIELD: &str = "x402Payment";

    /// Returns the requirement TTL with fallback: $X402_REQUIREMENT_TTL env var -> 300 seconds
    pub fn default_requirement_ttl() -> u64 {
        env::var("X402_REQUIREMENT_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUIREMENT_TTL_SECS)
    }

    pub fn default_credential_header() -> String {
        DEFAULT_CREDENTIAL_HEADER.to_string()
    }

    pub fn default_credential_query() -> String {
        DEFAULT_CREDENTIAL_QUERY.to_string()
    }

    pub fn default_credential_body_field() -> String {
        DEFAULT_CREDENTIAL_BODY_FIELD.to_string()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for PaymentError {
    fn from(err: ConfigError) -> Self {
        PaymentError::config(err.to_string())
    }
}

impl GateConfig {
    /// Creates a configuration with the required identities and default settings.
    pub fn new(
        facilitator: impl Into<String>,
        seller: impl Into<String>,
        default_asset: impl Into<String>,
        default_network: impl Into<String>,
    ) -> Self {
        Self {
            facilitator: LiteralOrEnv::from_literal(facilitator.into()),
            seller: LiteralOrEnv::from_literal(seller.into()),
            default_asset: default_asset.into(),
            default_network: default_network.into(),
            fallback_mode: FallbackMode::default(),
            requirement_ttl: config_defaults::default_requirement_ttl(),
            credential: CredentialLocations::default(),
            routes: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Load and validate configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_fallback_mode(mut self, fallback_mode: FallbackMode) -> Self {
        self.fallback_mode = fallback_mode;
        self
    }

    pub fn with_requirement_ttl(mut self, ttl: Duration) -> Self {
        self.requirement_ttl = ttl.as_secs();
        self
    }

    pub fn with_credential_locations(mut self, credential: CredentialLocations) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_route_charge(mut self, method: Method, path: &str, charge: ChargeOptions) -> Self {
        self.routes.push(RouteCharge {
            method: method.to_string(),
            path: path.to_string(),
            charge,
        });
        self
    }

    pub fn with_group_charge(mut self, prefix: &str, charge: ChargeOptions) -> Self {
        self.groups.push(GroupCharge {
            prefix: prefix.to_string(),
            charge,
        });
        self
    }

    pub fn facilitator(&self) -> &str {
        &self.facilitator
    }

    pub fn seller(&self) -> &str {
        &self.seller
    }

    pub fn default_asset(&self) -> &str {
        &self.default_asset
    }

    pub fn default_network(&self) -> &str {
        &self.default_network
    }

    pub fn fallback_mode(&self) -> FallbackMode {
        self.fallback_mode
    }

    pub fn requirement_ttl(&self) -> Duration {
        Duration::from_secs(self.requirement_ttl)
    }

    pub fn credential(&self) -> &CredentialLocations {
        &self.credential
    }

    pub fn routes(&self) -> &[RouteCharge] {
        &self.routes
    }

    pub fn groups(&self) -> &[GroupCharge] {
        &self.groups
    }

    /// Checks the configuration for structural defects.
    ///
    /// Run once at startup; a failing configuration must never reach request handling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seller.trim().is_empty() {
            return Err(ConfigError::Invalid("seller identity is missing".into()));
        }
        if self.facilitator.trim().is_empty() {
            return Err(ConfigError::Invalid("facilitator identity is missing".into()));
        }
        Url::parse(&self.facilitator).map_err(|e| {
            ConfigError::Invalid(format!(
                "facilitator {:?} is not a valid URL: {e}",
                self.facilitator.inner()
            ))
        })?;
        if self.default_asset.trim().is_empty() {
            return Err(ConfigError::Invalid("default asset is missing".into()));
        }
        if self.default_network.trim().is_empty() {
            return Err(ConfigError::Invalid("default network is missing".into()));
        }
        if self.requirement_ttl == 0 {
            return Err(ConfigError::Invalid(
                "requirement_ttl must be greater than zero".into(),
            ));
        }
        HeaderName::from_bytes(self.credential.header.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!(
                "credential header {:?} is not a valid header name",
                self.credential.header
            ))
        })?;
        if self.credential.query.is_empty() || self.credential.body_field.is_empty() {
            return Err(ConfigError::Invalid(
                "credential query and body field names must not be empty".into(),
            ));
        }
        for route in &self.routes {
            Method::from_str(&route.method).map_err(|_| {
                ConfigError::Invalid(format!("route method {:?} is invalid", route.method))
            })?;
            validate_path("route path", &route.path)?;
            validate_charge(&route.path, &route.charge)?;
        }
        for group in &self.groups {
            validate_path("group prefix", &group.prefix)?;
            validate_charge(&group.prefix, &group.charge)?;
        }
        Ok(())
    }
}

fn validate_path(what: &str, path: &str) -> Result<(), ConfigError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{what} {path:?} must start with '/'"
        )))
    }
}

fn validate_charge(location: &str, charge: &ChargeOptions) -> Result<(), ConfigError> {
    Price::parse(&charge.price)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(format!("price for {location:?}: {e}")))
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"0xBAc675C310721717Cd4A37F6cbeA1F081b1C2a07"`
/// - Simple env var: `"$SELLER_WALLET"`
/// - Braced env var: `"${SELLER_WALLET}"`
///
/// The wrapper implements `Deref` to provide transparent access to the inner type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    /// Get a reference to the inner value
    pub fn inner(&self) -> &T {
        &self.0
    }

    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            Some(braced)
        } else if let Some(var_name) = s.strip_prefix('$')
            && !var_name.is_empty()
            && var_name.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            Some(var_name)
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaymentErrorKind;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "facilitator": "https://facilitator.example.com",
            "seller": "wallet-1",
            "default_asset": "USDC",
            "default_network": "base-mainnet"
        })
    }

    #[test]
    fn test_defaults_applied() {
        let config = GateConfig::from_json(&base_json().to_string()).unwrap();
        assert_eq!(config.seller(), "wallet-1");
        assert_eq!(config.fallback_mode(), FallbackMode::Deny);
        assert_eq!(config.credential(), &CredentialLocations::default());
        assert!(config.requirement_ttl() > Duration::ZERO);
        assert!(config.routes().is_empty());
    }

    #[test]
    fn test_env_var_resolution() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("X402_GATE_TEST_SELLER", "wallet-from-env") };
        let mut json = base_json();
        json["seller"] = "${X402_GATE_TEST_SELLER}".into();
        let config = GateConfig::from_json(&json.to_string()).unwrap();
        assert_eq!(config.seller(), "wallet-from-env");
    }

    #[test]
    fn test_missing_env_var_fails_parse() {
        let mut json = base_json();
        json["seller"] = "$X402_GATE_TEST_DOES_NOT_EXIST".into();
        let err = GateConfig::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::JsonParse(_)));
    }

    #[test]
    fn test_empty_seller_is_invalid() {
        let mut json = base_json();
        json["seller"] = "  ".into();
        let err = GateConfig::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err: PaymentError = err.into();
        assert_eq!(err.kind(), PaymentErrorKind::Config);
    }

    #[test]
    fn test_constructed_config_uses_env_aware_ttl_default() {
        let config = GateConfig::new(
            "https://facilitator.example.com",
            "wallet-1",
            "USDC",
            "base-mainnet",
        );
        let from_json = GateConfig::from_json(&base_json().to_string()).unwrap();
        assert_eq!(
            config.requirement_ttl(),
            Duration::from_secs(config_defaults::default_requirement_ttl())
        );
        assert_eq!(config.requirement_ttl(), from_json.requirement_ttl());
    }

    #[test]
    fn test_facilitator_must_be_url() {
        let config = GateConfig::new("not a url", "wallet-1", "USDC", "base-mainnet");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_route_and_group_charges() {
        let mut json = base_json();
        json["fallback_mode"] = "allow".into();
        json["routes"] = serde_json::json!([
            { "method": "GET", "path": "/weather", "price": "0.01", "description": "Weather" }
        ]);
        json["groups"] = serde_json::json!([{ "prefix": "/premium", "price": "1.00", "asset": "EURC" }]);
        let config = GateConfig::from_json(&json.to_string()).unwrap();
        assert_eq!(config.fallback_mode(), FallbackMode::Allow);
        assert_eq!(config.routes()[0].charge.price, "0.01");
        assert_eq!(config.routes()[0].charge.description.as_deref(), Some("Weather"));
        assert_eq!(config.groups()[0].charge.asset.as_deref(), Some("EURC"));
    }

    #[test]
    fn test_malformed_route_price_is_invalid() {
        let config = GateConfig::new(
            "https://facilitator.example.com",
            "wallet-1",
            "USDC",
            "base-mainnet",
        )
        .with_route_charge(Method::GET, "/weather", ChargeOptions::new("one dollar"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_ttl_is_invalid() {
        let config = GateConfig::new(
            "https://facilitator.example.com",
            "wallet-1",
            "USDC",
            "base-mainnet",
        )
        .with_requirement_ttl(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GateConfig::load("/definitely/not/here/x402.json").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(_, _)));
    }
}
