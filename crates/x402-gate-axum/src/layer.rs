//! Axum middleware running the payment guard before protected handlers.
//!
//! [`X402GateLayer`] wraps a [`PaymentGuard`] and calls
//! [`decide`](PaymentGuard::decide) once per request. Admitted requests reach the inner
//! service (with a [`PaymentContext`](x402_gate::PaymentContext) attached when paid),
//! denied ones are answered with a [`PaygateRejection`].
//!
//! Routes are identified by their matched route template when axum provides one,
//! otherwise by the request path. Apply the layer with `Router::route_layer` so
//! unmatched paths keep their 404.

use axum::extract::MatchedPath;
use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::StatusCode;
use http_body_util::LengthLimitError;
use http::header::CONTENT_TYPE;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use x402_gate::response::ErrorBody;
use x402_gate::{
    ChargeLookup, ChargeOptions, ChargeRegistry, ConfigError, ErrorResponse, GateConfig,
    HttpRequestAdapter, JsonBody, PaymentGuard, PaymentVerifier, RequestAdapter, RouteId,
};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::rejection::PaygateRejection;

/// Layer enforcing payments on the routes it wraps.
///
/// Create one per application and apply it with `Router::route_layer`, or derive
/// per-route layers with [`X402GateLayer::charge`].
pub struct X402GateLayer<V, A = HttpRequestAdapter, L = ChargeRegistry> {
    guard: Arc<PaymentGuard<V, A, L>>,
    json_body_limit: Option<usize>,
}

impl<V, A, L> Clone for X402GateLayer<V, A, L> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            json_body_limit: self.json_body_limit,
        }
    }
}

impl<V, A, L> X402GateLayer<V, A, L> {
    pub fn new(guard: PaymentGuard<V, A, L>) -> Self {
        Self {
            guard: Arc::new(guard),
            json_body_limit: None,
        }
    }

    pub fn guard(&self) -> &PaymentGuard<V, A, L> {
        &self.guard
    }

    /// Buffers JSON bodies of chargeable requests, up to `limit` bytes, so the
    /// credential can be read from a body field.
    ///
    /// Off by default. The buffered body is handed on to the handler unchanged.
    pub fn with_json_body(mut self, limit: usize) -> Self {
        self.json_body_limit = Some(limit);
        self
    }
}

impl<V> X402GateLayer<V> {
    /// Builds the layer from validated configuration and a verifier.
    pub fn from_config(config: GateConfig, verifier: V) -> Result<Self, ConfigError> {
        PaymentGuard::from_config(config, verifier, HttpRequestAdapter).map(Self::new)
    }
}

impl<V: Clone, A: Clone> X402GateLayer<V, A, ChargeRegistry> {
    /// Per-route layer charging every request it guards with `options`, sharing this
    /// layer's verifier, defaults and fallback mode.
    pub fn charge(&self, options: ChargeOptions) -> X402GateLayer<V, A, ChargeOptions> {
        X402GateLayer {
            guard: Arc::new(self.guard.as_ref().clone().with_lookup(options)),
            json_body_limit: self.json_body_limit,
        }
    }
}

impl<S, V, A, L> Layer<S> for X402GateLayer<V, A, L>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = X402GateService<V, A, L>;

    fn layer(&self, inner: S) -> Self::Service {
        X402GateService {
            guard: self.guard.clone(),
            json_body_limit: self.json_body_limit,
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that runs the payment guard ahead of the wrapped service.
pub struct X402GateService<V, A, L> {
    guard: Arc<PaymentGuard<V, A, L>>,
    json_body_limit: Option<usize>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<V, A, L> Clone for X402GateService<V, A, L> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            json_body_limit: self.json_body_limit,
            inner: self.inner.clone(),
        }
    }
}

impl<V, A, L> Service<Request> for X402GateService<V, A, L>
where
    V: PaymentVerifier + Send + Sync + 'static,
    A: RequestAdapter<Request> + 'static,
    L: ChargeLookup + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        Box::pin(handle_request(
            self.guard.clone(),
            self.json_body_limit,
            self.inner.clone(),
            req,
        ))
    }
}

/// Runs the guard and either forwards the request or answers with the rejection.
#[cfg_attr(
    feature = "telemetry",
    instrument(name = "x402.gate.handle_request", skip_all)
)]
async fn handle_request<V, A, L>(
    guard: Arc<PaymentGuard<V, A, L>>,
    json_body_limit: Option<usize>,
    mut inner: BoxCloneSyncService<Request, Response, Infallible>,
    req: Request,
) -> Result<Response, Infallible>
where
    V: PaymentVerifier + Send + Sync + 'static,
    A: RequestAdapter<Request> + 'static,
    L: ChargeLookup + 'static,
{
    let route = route_id(&req);
    let mut req = match json_body_limit {
        Some(limit) if guard.is_chargeable(&route) => match buffer_json_body(req, limit).await {
            Ok(req) => req,
            Err(rejection) => return Ok(rejection.into_response()),
        },
        _ => req,
    };

    match guard.decide(&route, &mut req).await {
        Ok(_admission) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(admission = ?_admission, "Request admitted");
            inner.call(req).await
        }
        Err(err) => {
            #[cfg(feature = "telemetry")]
            tracing::debug!(kind = %err.kind(), "Request denied");
            Ok(PaygateRejection::from(err).into_response())
        }
    }
}

/// Route template matched by the router, falling back to the request path.
fn route_id(req: &Request) -> RouteId {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    RouteId::new(req.method().clone(), path)
}

/// Reads a JSON body into a [`JsonBody`] extension and puts the bytes back.
///
/// Non-JSON requests pass untouched. Bodies that fail to parse are handed on without
/// the extension.
async fn buffer_json_body(req: Request, limit: usize) -> Result<Request, PaygateRejection> {
    let is_json = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if !is_json {
        return Ok(req);
    }
    let (mut parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(body_read_rejection)?;
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        parts.extensions.insert(JsonBody(value));
    }
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Only a body over the configured limit is the client's fault; any other read failure
/// is an internal error.
fn body_read_rejection(err: axum_core::Error) -> PaygateRejection {
    if is_length_limit_error(&err) {
        PaygateRejection(ErrorResponse {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            body: ErrorBody {
                error: "payload_too_large",
                payment: None,
                message: format!("Failed to read request body: {err}"),
            },
        })
    } else {
        #[cfg(feature = "telemetry")]
        tracing::warn!(error = %err, "Failed to read request body");
        ErrorResponse::internal(format!("Failed to read request body: {err}")).into()
    }
}

fn is_length_limit_error(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |err| err.source()).any(|err| err.is::<LengthLimitError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Payment;
    use axum::Router;
    use axum::routing::{get, post};
    use http::Method;
    use tower::ServiceExt;
    use x402_gate::{
        Credential, FallbackMode, PaymentError, PaymentRequirement, VerificationResult,
        VerifyError,
    };

    #[derive(Clone)]
    enum TestVerifier {
        AcceptToken,
        Unreachable,
    }

    impl PaymentVerifier for TestVerifier {
        async fn verify(
            &self,
            credential: &Credential,
            _requirement: &PaymentRequirement,
        ) -> Result<VerificationResult, VerifyError> {
            match self {
                TestVerifier::AcceptToken if credential.as_bytes() == b"token" => {
                    Ok(VerificationResult::success().with_tx_hash("0x123"))
                }
                TestVerifier::AcceptToken => {
                    Err(PaymentError::invalid("Payment credential is invalid").into())
                }
                TestVerifier::Unreachable => Err(VerifyError::other("connection refused")),
            }
        }
    }

    fn config() -> GateConfig {
        GateConfig::new(
            "https://facilitator.example.com",
            "wallet-1",
            "USDC",
            "base-mainnet",
        )
        .with_route_charge(Method::GET, "/paid/{id}", ChargeOptions::new("1.00"))
        .with_route_charge(Method::POST, "/submit", ChargeOptions::new("0.50"))
    }

    async fn paid_handler(Payment(context): Payment) -> String {
        context.verification.tx_hash.unwrap_or_default()
    }

    async fn submit_handler(
        payment: Option<Payment>,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> String {
        format!("{}:{}", payment.is_some(), body["data"])
    }

    fn app(layer: X402GateLayer<TestVerifier>) -> Router {
        Router::new()
            .route("/paid/{id}", get(paid_handler))
            .route("/submit", post(submit_handler))
            .route("/free", get(|| async { "free" }))
            .route_layer(layer)
    }

    fn get_request(uri: &str, credential: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(credential) = credential {
            builder = builder.header("x402-payment", credential);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_free_route_reaches_handler() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken).unwrap();
        let response = app(layer)
            .oneshot(get_request("/free", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "free");
    }

    #[tokio::test]
    async fn test_missing_credential_gets_402_with_terms() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken).unwrap();
        let response = app(layer)
            .oneshot(get_request("/paid/42", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "payment_required");
        assert_eq!(body["message"], "Payment credential is missing");
        assert_eq!(body["payment"]["amount"], "1.00");
        assert_eq!(body["payment"]["asset"], "USDC");
        assert_eq!(body["payment"]["seller"], "wallet-1");
    }

    #[tokio::test]
    async fn test_verified_request_reaches_handler_with_context() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken).unwrap();
        let response = app(layer)
            .oneshot(get_request("/paid/42", Some("token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "0x123");
    }

    #[tokio::test]
    async fn test_invalid_credential_is_rejected() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken).unwrap();
        let response = app(layer)
            .oneshot(get_request("/paid/42", Some("forged")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = body_json(response).await;
        assert_eq!(body["error"], "payment_invalid");
        assert!(body.get("payment").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_verifier_is_503() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::Unreachable).unwrap();
        let response = app(layer)
            .oneshot(get_request("/paid/42", Some("token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "payment_network_error");
        assert_eq!(body["message"], "connection refused");
    }

    #[tokio::test]
    async fn test_fallback_allow_reaches_handler_without_context() {
        let config = config().with_fallback_mode(FallbackMode::Allow);
        let layer = X402GateLayer::from_config(config, TestVerifier::Unreachable)
            .unwrap()
            .with_json_body(1024);
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"x402Payment":"token","data":7}"#))
            .unwrap();
        let response = app(layer).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "false:7");
    }

    #[tokio::test]
    async fn test_credential_from_json_body() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken)
            .unwrap()
            .with_json_body(1024);
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"x402Payment":"token","data":7}"#))
            .unwrap();
        let response = app(layer).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "true:7");
    }

    #[tokio::test]
    async fn test_oversized_json_body_is_rejected() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken)
            .unwrap()
            .with_json_body(8);
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"x402Payment":"token","data":7}"#))
            .unwrap();
        let response = app(layer).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn test_interrupted_json_body_is_internal_error() {
        let layer = X402GateLayer::from_config(config(), TestVerifier::AcceptToken)
            .unwrap()
            .with_json_body(1 << 20);
        let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
            Ok(r#"{"a":"#),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
        ];
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/submit")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();
        let response = app(layer).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("connection reset by peer")
        );
    }

    #[tokio::test]
    async fn test_per_route_charge_layer() {
        let gate = X402GateLayer::from_config(config(), TestVerifier::AcceptToken).unwrap();
        let app = Router::new().route(
            "/report",
            get(paid_handler).layer(gate.charge(ChargeOptions::new("0.05"))),
        );

        let response = app
            .clone()
            .oneshot(get_request("/report", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body_json(response).await["payment"]["amount"], "0.05");

        let response = app
            .oneshot(get_request("/report", Some("token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_payment_extractor_without_gate_is_internal_error() {
        let app: Router = Router::new().route("/paid", get(paid_handler));
        let response = app.oneshot(get_request("/paid", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "internal_error");
    }
}
