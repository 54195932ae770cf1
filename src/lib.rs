//! Pay-per-request authorization gate for HTTP services, following the
//! [x402 protocol](https://www.x402.org) conventions.
//!
//! Routes are marked chargeable at startup. For each inbound request on a chargeable route
//! the gate extracts a payment credential, builds a fresh [`PaymentRequirement`] describing
//! what must be paid, asks an external [`PaymentVerifier`] to validate the credential and
//! either admits the request (attaching a [`PaymentContext`]) or rejects it with a typed
//! [`PaymentError`].
//!
//! # Modules
//!
//! - [`charge`] - Route and group charge registration and lookup.
//! - [`config`] - Gate configuration, with env-var expansion and startup validation.
//! - [`error`] - The payment error taxonomy.
//! - [`extractor`] - Credential lookup in header, query string and JSON body.
//! - [`guard`] - The [`PaymentGuard`] decision flow.
//! - [`observer`] - Success-path hook.
//! - [`request`] - Framework-neutral request view and context attachment.
//! - [`requirement`] - Charge options and requirement construction.
//! - [`response`] - Boundary translation of errors into status codes and JSON bodies.
//! - [`verifier`] - The [`PaymentVerifier`] trait and verification results.
//!
//! # Example
//!
//! ```rust
//! use http::Method;
//! use x402_gate::{
//!     ChargeOptions, Credential, GateConfig, HttpRequestAdapter, PaymentGuard,
//!     PaymentRequirement, PaymentVerifier, VerificationResult, VerifyError,
//! };
//!
//! struct AcceptAll;
//!
//! impl PaymentVerifier for AcceptAll {
//!     async fn verify(
//!         &self,
//!         _credential: &Credential,
//!         _requirement: &PaymentRequirement,
//!     ) -> Result<VerificationResult, VerifyError> {
//!         Ok(VerificationResult::success())
//!     }
//! }
//!
//! let config = GateConfig::new("https://facilitator.example.com", "wallet-1", "USDC", "base")
//!     .with_route_charge(Method::GET, "/weather", ChargeOptions::new("0.01"));
//! let guard = PaymentGuard::from_config(config, AcceptAll, HttpRequestAdapter).unwrap();
//! # let _ = guard;
//! ```

pub mod charge;
pub mod config;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod observer;
pub mod request;
pub mod requirement;
pub mod response;
pub mod timestamp;
pub mod util;
pub mod verifier;

pub use charge::{ChargeLookup, ChargeRegistry, RouteId};
pub use config::{ConfigError, FallbackMode, GateConfig};
pub use error::{PaymentError, PaymentErrorKind};
pub use extractor::{Credential, CredentialExtractor};
pub use guard::{Admission, PaymentGuard};
pub use observer::PaymentObserver;
#[cfg(feature = "telemetry")]
pub use observer::TracingObserver;
pub use request::{
    AttachPaymentContext, HttpRequestAdapter, JsonBody, NormalizedRequest, PartsAdapter,
    PaymentContext, RequestAdapter,
};
pub use requirement::{ChargeOptions, PaymentRequirement, RequirementBuilder};
pub use response::{ErrorBody, ErrorResponse};
pub use verifier::{PaymentVerifier, VerificationResult, VerificationStatus, VerifyError};
