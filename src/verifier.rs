//! The external payment verification capability.
//!
//! Implementors check a [`Credential`] against a [`PaymentRequirement`], typically by
//! calling a remote facilitator. The guard is the only consumer and owns the
//! classification of every failure a verifier reports.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PaymentError;
use crate::extractor::Credential;
use crate::requirement::PaymentRequirement;

/// Boxed error type for verifier failures outside the payment taxonomy.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome status reported by a verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Success,
    Invalid,
    Expired,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Success => "success",
            VerificationStatus::Invalid => "invalid",
            VerificationStatus::Expired => "expired",
        }
    }
}

/// Result of verifying a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Why verification did not succeed. Logged, never returned to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Settlement reference, when the verifier settled the payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl VerificationResult {
    pub fn success() -> Self {
        Self::with_status(VerificationStatus::Success, None)
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::with_status(VerificationStatus::Invalid, Some(reason.into()))
    }

    pub fn expired(reason: impl Into<String>) -> Self {
        Self::with_status(VerificationStatus::Expired, Some(reason.into()))
    }

    fn with_status(status: VerificationStatus, reason: Option<String>) -> Self {
        Self {
            status,
            reason,
            tx_hash: None,
            payer: None,
            extra: None,
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == VerificationStatus::Success
    }
}

/// Error returned by a [`PaymentVerifier`].
///
/// Verifiers that already know the payment outcome return [`VerifyError::Payment`];
/// those kinds pass through the guard unchanged. Anything else (transport failures,
/// decoding errors) goes into [`VerifyError::Other`] and is reported as a network error.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Other(BoxError),
}

impl VerifyError {
    pub fn other<E: Into<BoxError>>(err: E) -> Self {
        VerifyError::Other(err.into())
    }
}

/// Asynchronous interface for checking payment credentials.
///
/// Timeouts and retries belong to the implementation. The returned future is dropped
/// when the surrounding request is cancelled; implementations must tolerate that.
pub trait PaymentVerifier {
    /// Verifies `credential` against `requirement`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] if the verifier fails to produce a result.
    fn verify(
        &self,
        credential: &Credential,
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<VerificationResult, VerifyError>> + Send;
}

impl<T: PaymentVerifier> PaymentVerifier for Arc<T> {
    fn verify(
        &self,
        credential: &Credential,
        requirement: &PaymentRequirement,
    ) -> impl Future<Output = Result<VerificationResult, VerifyError>> + Send {
        self.as_ref().verify(credential, requirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_wire_format() {
        let result = VerificationResult::success().with_tx_hash("0x123");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, json!({ "status": "success", "txHash": "0x123" }));
        let back: VerificationResult = serde_json::from_value(json).unwrap();
        assert!(back.is_success());
    }

    #[test]
    fn test_other_error_keeps_message() {
        let err = VerifyError::other("boom");
        assert_eq!(err.to_string(), "boom");
        let err = VerifyError::from(PaymentError::invalid("bad signature"));
        assert!(matches!(err, VerifyError::Payment(_)));
    }
}
