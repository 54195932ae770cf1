//! Boundary translation of payment errors into transport responses.
//!
//! This is the only place where a [`PaymentError`] becomes a status code. It maps,
//! it never reclassifies:
//!
//! | Kind | Status | `error` |
//! |---|---|---|
//! | `PaymentRequired` | 402 | `payment_required` (+ `payment`) |
//! | `PaymentInvalid` | 402 | `payment_invalid` |
//! | `PaymentExpired` | 402 | `payment_invalid` |
//! | `PaymentNetwork` | 503 | `payment_network_error` |
//! | `Config` | 500 | `configuration_error` |
//! | anything else | 500 | `internal_error` |

use http::StatusCode;
use serde::Serialize;
use std::fmt::Display;

use crate::config::ConfigError;
use crate::error::{PaymentError, PaymentErrorKind};
use crate::requirement::PaymentRequirement;

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRequirement>,
    pub message: String,
}

/// Transport-level rendering of an error: status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ErrorResponse {
    const UNKNOWN_ERROR_MESSAGE: &'static str = "An unknown error occurred";

    /// Response for a failure outside the payment taxonomy.
    pub fn internal(message: impl Display) -> Self {
        let message = message.to_string();
        let message = if message.is_empty() {
            Self::UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: "internal_error",
                payment: None,
                message,
            },
        }
    }

    /// Translates an arbitrary error. Payment and configuration errors keep their
    /// mapping; everything else becomes `internal_error`.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(err) = err.downcast_ref::<PaymentError>() {
            Self::from(err)
        } else if let Some(err) = err.downcast_ref::<ConfigError>() {
            Self::from(&PaymentError::config(err.to_string()))
        } else {
            Self::internal(err)
        }
    }
}

impl From<&PaymentError> for ErrorResponse {
    fn from(err: &PaymentError) -> Self {
        let (status, error, payment) = match err.kind() {
            PaymentErrorKind::PaymentRequired => (
                StatusCode::PAYMENT_REQUIRED,
                "payment_required",
                err.requirement().cloned(),
            ),
            PaymentErrorKind::PaymentInvalid | PaymentErrorKind::PaymentExpired => {
                (StatusCode::PAYMENT_REQUIRED, "payment_invalid", None)
            }
            PaymentErrorKind::PaymentNetwork => (
                StatusCode::SERVICE_UNAVAILABLE,
                "payment_network_error",
                None,
            ),
            PaymentErrorKind::Config => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                None,
            ),
        };
        Self {
            status,
            body: ErrorBody {
                error,
                payment,
                message: err.message().to_string(),
            },
        }
    }
}

impl From<PaymentError> for ErrorResponse {
    fn from(err: PaymentError) -> Self {
        Self::from(&err)
    }
}
