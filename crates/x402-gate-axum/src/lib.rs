//! Axum middleware and helpers for enforcing [x402-gate](x402_gate) payments.
//!
//! This crate provides an [`X402GateLayer`] for protecting routes with the payment guard,
//! a [`PaygateRejection`] rendering denials as JSON, and a [`Payment`] extractor handing the
//! verified payment to handlers.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use http::Method;
//! use x402_gate::{
//!     ChargeOptions, Credential, GateConfig, PaymentRequirement, PaymentVerifier,
//!     VerificationResult, VerifyError,
//! };
//! use x402_gate_axum::{Payment, X402GateLayer};
//!
//! #[derive(Clone)]
//! struct MyVerifier;
//!
//! impl PaymentVerifier for MyVerifier {
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
//! let gate = X402GateLayer::from_config(config, MyVerifier).unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/weather", get(weather))
//!     .route_layer(gate);
//!
//! async fn weather(Payment(payment): Payment) -> String {
//!     format!("paid with {}", payment.requirement.nonce)
//! }
//! ```

pub mod extract;
pub mod layer;
pub mod rejection;

pub use extract::Payment;
pub use layer::{X402GateLayer, X402GateService};
pub use rejection::PaygateRejection;
