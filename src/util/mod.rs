//! Utility types for x402-gate.
//!
//! - [`price`] - Strict decimal price parsing for route charges

pub mod price;

pub use price::*;
