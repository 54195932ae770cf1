//! The enforcement decision flow.
//!
//! [`PaymentGuard::decide`] runs once per inbound request, before the handler:
//!
//! 1. Resolve the route's charge. No charge: admit as [`Admission::Free`] without
//!    touching the extractor, builder or verifier.
//! 2. Normalize the request through the [`RequestAdapter`] and extract a credential.
//! 3. Build a fresh [`PaymentRequirement`]. Without a credential, fail with
//!    `PaymentRequired` carrying it so the caller learns the price.
//! 4. Verify the credential. On success attach a [`PaymentContext`] to the original
//!    request and admit as [`Admission::Paid`]. Otherwise classify the failure.
//!
//! Every denial is a typed [`PaymentError`]. The only suspension point is the verifier
//! call; dropping the returned future drops it too, and attachment happens strictly
//! after it resolves, so a cancelled request never carries a context.

use std::sync::Arc;

use crate::charge::{ChargeLookup, ChargeRegistry, RouteId};
use crate::config::{ConfigError, FallbackMode, GateConfig};
use crate::error::{PaymentError, PaymentErrorKind};
use crate::extractor::{Credential, CredentialExtractor};
use crate::observer::PaymentObserver;
use crate::request::{AttachPaymentContext, PaymentContext, RequestAdapter};
use crate::requirement::{PaymentRequirement, RequirementBuilder};
use crate::verifier::{PaymentVerifier, VerificationResult, VerificationStatus, VerifyError};

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Outcome of an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The route is not chargeable.
    Free,
    /// Payment verified; a [`PaymentContext`] is attached to the request.
    Paid,
    /// The verifier was unreachable and [`FallbackMode::Allow`] admitted the request
    /// anyway. No context is attached.
    Unverified,
}

impl Admission {
    pub fn is_paid(&self) -> bool {
        matches!(self, Admission::Paid)
    }
}

/// Decides whether a request may reach its handler.
///
/// Composes a charge lookup, a [`RequirementBuilder`], a [`CredentialExtractor`], a
/// [`PaymentVerifier`] and a [`RequestAdapter`]. All state is immutable after
/// construction; one guard serves every request concurrently.
pub struct PaymentGuard<V, A, L = ChargeRegistry> {
    lookup: L,
    builder: RequirementBuilder,
    extractor: CredentialExtractor,
    verifier: V,
    adapter: A,
    fallback_mode: FallbackMode,
    observer: Option<Arc<dyn PaymentObserver>>,
}

impl<V: Clone, A: Clone, L: Clone> Clone for PaymentGuard<V, A, L> {
    fn clone(&self) -> Self {
        Self {
            lookup: self.lookup.clone(),
            builder: self.builder.clone(),
            extractor: self.extractor.clone(),
            verifier: self.verifier.clone(),
            adapter: self.adapter.clone(),
            fallback_mode: self.fallback_mode,
            observer: self.observer.clone(),
        }
    }
}

impl<V, A, L> PaymentGuard<V, A, L> {
    /// Composes a guard from its collaborators. Fallback mode defaults to `deny`.
    pub fn new(
        lookup: L,
        builder: RequirementBuilder,
        extractor: CredentialExtractor,
        verifier: V,
        adapter: A,
    ) -> Self {
        Self {
            lookup,
            builder,
            extractor,
            verifier,
            adapter,
            fallback_mode: FallbackMode::Deny,
            observer: None,
        }
    }

    pub fn with_fallback_mode(mut self, fallback_mode: FallbackMode) -> Self {
        self.fallback_mode = fallback_mode;
        self
    }

    /// Installs a hook invoked after every successful verification.
    pub fn with_observer(mut self, observer: Arc<dyn PaymentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replaces the charge lookup, keeping every other collaborator.
    pub fn with_lookup<L2>(self, lookup: L2) -> PaymentGuard<V, A, L2> {
        PaymentGuard {
            lookup,
            builder: self.builder,
            extractor: self.extractor,
            verifier: self.verifier,
            adapter: self.adapter,
            fallback_mode: self.fallback_mode,
            observer: self.observer,
        }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    pub fn fallback_mode(&self) -> FallbackMode {
        self.fallback_mode
    }
}

impl<V, A, L: ChargeLookup> PaymentGuard<V, A, L> {
    /// Whether requests to `route` must pay.
    pub fn is_chargeable(&self, route: &RouteId) -> bool {
        self.lookup.lookup(route).is_some()
    }
}

impl<V, A> PaymentGuard<V, A, ChargeRegistry> {
    /// Wires a guard from validated configuration.
    ///
    /// Route and group charges come from the configuration; the verifier and the
    /// request adapter are supplied by the host.
    pub fn from_config(config: GateConfig, verifier: V, adapter: A) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = ChargeRegistry::from_config(&config)?;
        let extractor = CredentialExtractor::from_locations(config.credential())?;
        let fallback_mode = config.fallback_mode();
        let builder = RequirementBuilder::new(Arc::new(config));
        Ok(Self::new(registry, builder, extractor, verifier, adapter)
            .with_fallback_mode(fallback_mode))
    }
}

impl<V, A, L> PaymentGuard<V, A, L>
where
    V: PaymentVerifier,
    L: ChargeLookup,
{
    /// Admits or denies `request` for `route`.
    ///
    /// # Errors
    ///
    /// Every denial is one of the five [`PaymentError`] kinds.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "x402.guard.decide", skip_all, fields(method = %route.method, path = %route.path))
    )]
    pub async fn decide<R>(&self, route: &RouteId, request: &mut R) -> Result<Admission, PaymentError>
    where
        A: RequestAdapter<R>,
        R: AttachPaymentContext,
    {
        let Some(options) = self.lookup.lookup(route) else {
            return Ok(Admission::Free);
        };

        let credential = {
            let normalized = self.adapter.adapt(request);
            self.extractor.extract(&normalized)
        };
        let requirement = self.builder.build(options)?;

        let Some(credential) = credential else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(requirement = requirement.id(), "Payment credential is missing");
            return Err(PaymentError::payment_required(requirement));
        };

        match self.verify(&credential, &requirement).await {
            Ok(verification) => {
                let status = verification.status;
                let requirement_id = requirement.id().to_string();
                request.attach_payment_context(PaymentContext {
                    verification,
                    requirement,
                });
                if let Some(observer) = &self.observer {
                    observer.on_verified(status, &requirement_id);
                }
                Ok(Admission::Paid)
            }
            Err(err)
                if err.kind() == PaymentErrorKind::PaymentNetwork
                    && self.fallback_mode == FallbackMode::Allow =>
            {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %err, "Verifier unavailable, admitting unverified request");
                Ok(Admission::Unverified)
            }
            Err(err) => Err(err),
        }
    }

    /// Calls the verifier and classifies its outcome.
    async fn verify(
        &self,
        credential: &Credential,
        requirement: &PaymentRequirement,
    ) -> Result<VerificationResult, PaymentError> {
        let result = self
            .verifier
            .verify(credential, requirement)
            .await
            .map_err(classify_verify_error)?;
        match result.status {
            VerificationStatus::Success => Ok(result),
            VerificationStatus::Invalid => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(reason = ?result.reason, "Payment credential rejected");
                Err(PaymentError::invalid("Payment credential is invalid"))
            }
            VerificationStatus::Expired => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(reason = ?result.reason, "Payment credential expired");
                Err(PaymentError::expired("Payment credential has expired"))
            }
        }
    }
}

/// Recognized payment kinds pass through unchanged; anything else is a network error
/// carrying the original message.
fn classify_verify_error(err: VerifyError) -> PaymentError {
    match err {
        VerifyError::Payment(
            err @ (PaymentError::PaymentRequired { .. }
            | PaymentError::PaymentInvalid { .. }
            | PaymentError::PaymentExpired { .. }
            | PaymentError::PaymentNetwork { .. }),
        ) => err,
        VerifyError::Payment(err @ PaymentError::Config { .. }) => {
            PaymentError::network(err.message())
        }
        VerifyError::Other(err) => {
            #[cfg(feature = "telemetry")]
            tracing::error!(error = %err, "Payment verifier failed");
            PaymentError::network(err.to_string())
        }
    }
}
