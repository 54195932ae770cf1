//! Handler access to the verified payment.

use axum_core::extract::{FromRequestParts, OptionalFromRequestParts};
use http::request::Parts;
use std::convert::Infallible;
use std::ops::Deref;
use x402_gate::{ErrorResponse, PaymentContext};

use crate::rejection::PaygateRejection;

/// Extracts the [`PaymentContext`] attached by [`X402GateLayer`](crate::X402GateLayer).
///
/// Use it on handlers behind the gate. A missing context means the handler was reached
/// without a verified payment, which is a wiring error: the request is rejected with
/// `500 internal_error`. Use `Option<Payment>` on routes that may be free or admitted
/// unverified.
#[derive(Debug, Clone)]
pub struct Payment(pub PaymentContext);

impl Deref for Payment {
    type Target = PaymentContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Payment {
    type Rejection = PaygateRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        PaymentContext::from_extensions(&parts.extensions)
            .cloned()
            .map(Payment)
            .ok_or_else(|| ErrorResponse::internal("Payment context is missing").into())
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Payment {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(PaymentContext::from_extensions(&parts.extensions)
            .cloned()
            .map(Payment))
    }
}
