//! JSON rendering of payment denials.

use axum::Json;
use axum_core::response::{IntoResponse, Response};
use x402_gate::{ErrorResponse, PaymentError};

/// A denied request, rendered as `status` plus the JSON error body.
#[derive(Debug, Clone, PartialEq)]
pub struct PaygateRejection(pub ErrorResponse);

impl PaygateRejection {
    pub fn status(&self) -> http::StatusCode {
        self.0.status
    }
}

impl From<ErrorResponse> for PaygateRejection {
    fn from(response: ErrorResponse) -> Self {
        Self(response)
    }
}

impl From<&PaymentError> for PaygateRejection {
    fn from(err: &PaymentError) -> Self {
        Self(ErrorResponse::from(err))
    }
}

impl From<PaymentError> for PaygateRejection {
    fn from(err: PaymentError) -> Self {
        Self::from(&err)
    }
}

impl IntoResponse for PaygateRejection {
    fn into_response(self) -> Response {
        let ErrorResponse { status, body } = self.0;
        (status, Json(body)).into_response()
    }
}
