//! Closed taxonomy of payment failures.
//!
//! Every denial the guard produces is a [`PaymentError`]. The set is closed: a
//! verifier failure that is not one of the recognized payment kinds is wrapped into
//! [`PaymentError::PaymentNetwork`] before it leaves the guard, so callers only ever
//! see the five kinds listed in [`PaymentErrorKind`].

use std::fmt::{Display, Formatter};

use crate::requirement::PaymentRequirement;

/// Discriminant of a [`PaymentError`].
///
/// The boundary translator switches on this, never on concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentErrorKind {
    /// No credential was supplied.
    PaymentRequired,
    /// A credential was supplied but failed verification.
    PaymentInvalid,
    /// The credential or requirement validity window elapsed.
    PaymentExpired,
    /// The verifier could not be reached or failed in an unclassified way.
    PaymentNetwork,
    /// Configuration is structurally invalid.
    Config,
}

impl PaymentErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorKind::PaymentRequired => "payment_required",
            PaymentErrorKind::PaymentInvalid => "payment_invalid",
            PaymentErrorKind::PaymentExpired => "payment_expired",
            PaymentErrorKind::PaymentNetwork => "payment_network_error",
            PaymentErrorKind::Config => "configuration_error",
        }
    }
}

impl Display for PaymentErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed payment failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaymentError {
    /// Carries the requirement so the caller can retry with a credential.
    #[error("{message}")]
    PaymentRequired {
        requirement: Box<PaymentRequirement>,
        message: String,
    },
    #[error("{message}")]
    PaymentInvalid { message: String },
    #[error("{message}")]
    PaymentExpired { message: String },
    #[error("{message}")]
    PaymentNetwork { message: String },
    #[error("{message}")]
    Config { message: String },
}

impl PaymentError {
    pub const DEFAULT_REQUIRED_MESSAGE: &'static str = "Payment credential is missing";

    /// A "payment required" error advertising `requirement`.
    pub fn payment_required(requirement: PaymentRequirement) -> Self {
        PaymentError::PaymentRequired {
            requirement: Box::new(requirement),
            message: Self::DEFAULT_REQUIRED_MESSAGE.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        PaymentError::PaymentInvalid {
            message: message.into(),
        }
    }

    pub fn expired(message: impl Into<String>) -> Self {
        PaymentError::PaymentExpired {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        PaymentError::PaymentNetwork {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PaymentError::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> PaymentErrorKind {
        match self {
            PaymentError::PaymentRequired { .. } => PaymentErrorKind::PaymentRequired,
            PaymentError::PaymentInvalid { .. } => PaymentErrorKind::PaymentInvalid,
            PaymentError::PaymentExpired { .. } => PaymentErrorKind::PaymentExpired,
            PaymentError::PaymentNetwork { .. } => PaymentErrorKind::PaymentNetwork,
            PaymentError::Config { .. } => PaymentErrorKind::Config,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PaymentError::PaymentRequired { message, .. }
            | PaymentError::PaymentInvalid { message }
            | PaymentError::PaymentExpired { message }
            | PaymentError::PaymentNetwork { message }
            | PaymentError::Config { message } => message,
        }
    }

    /// The requirement being evaluated, present only on [`PaymentError::PaymentRequired`].
    pub fn requirement(&self) -> Option<&PaymentRequirement> {
        match self {
            PaymentError::PaymentRequired { requirement, .. } => Some(requirement),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::UnixTimestamp;

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            amount: "1".into(),
            asset: "USDC".into(),
            network: "base".into(),
            seller: "s".into(),
            facilitator: "f".into(),
            nonce: "n".into(),
            expires_at: UnixTimestamp::from_secs(0),
            description: None,
        }
    }

    #[test]
    fn test_kind_and_message() {
        let err = PaymentError::network("boom");
        assert_eq!(err.kind(), PaymentErrorKind::PaymentNetwork);
        assert_eq!(err.message(), "boom");
        assert_eq!(err.to_string(), "boom");
        assert!(err.requirement().is_none());
    }

    #[test]
    fn test_payment_required_carries_requirement() {
        let err = PaymentError::payment_required(requirement());
        assert_eq!(err.kind(), PaymentErrorKind::PaymentRequired);
        assert_eq!(err.message(), PaymentError::DEFAULT_REQUIRED_MESSAGE);
        assert_eq!(err.requirement().map(|r| r.amount.as_str()), Some("1"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(PaymentErrorKind::Config.as_str(), "configuration_error");
        assert_eq!(
            PaymentErrorKind::PaymentNetwork.to_string(),
            "payment_network_error"
        );
    }
}
