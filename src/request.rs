//! Request normalization and payment context attachment.
//!
//! The guard never inspects a raw request directly. A [`RequestAdapter`] turns
//! whatever shape the host pipeline hands over into a borrowed [`NormalizedRequest`]
//! exposing headers, query and (optionally) a parsed body. Adapters are chosen at
//! wiring time through the guard's type parameter, one per request shape:
//!
//! - [`HttpRequestAdapter`] for a full [`http::Request<B>`]
//! - [`PartsAdapter`] for the split [`http::request::Parts`]
//!
//! Once a payment is verified, the guard stores a [`PaymentContext`] on the *original*
//! request through [`AttachPaymentContext`].

use http::{Extensions, HeaderMap};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::requirement::PaymentRequirement;
use crate::verifier::VerificationResult;

/// A parsed JSON request body, placed in the request extensions by an upstream layer.
///
/// Request bodies are streams; the gate never consumes them itself. When a body-parsing
/// layer runs first and stores a `JsonBody`, adapters expose it to the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub serde_json::Value);

/// Borrowed, transport-neutral view of an inbound request.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedRequest<'a> {
    headers: &'a HeaderMap,
    query: Option<&'a str>,
    body: Option<&'a serde_json::Value>,
}

impl<'a> NormalizedRequest<'a> {
    pub fn new(headers: &'a HeaderMap) -> Self {
        Self {
            headers,
            query: None,
            body: None,
        }
    }

    /// Sets the raw (still percent-encoded) query string.
    pub fn with_query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Option<&'a serde_json::Value>) -> Self {
        self.body = body;
        self
    }

    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    pub fn query(&self) -> Option<&'a str> {
        self.query
    }

    pub fn body(&self) -> Option<&'a serde_json::Value> {
        self.body
    }

    /// Returns the first decoded value of query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<Cow<'a, str>> {
        let query = self.query?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Normalizes a raw request of shape `R`.
pub trait RequestAdapter<R: ?Sized>: Send + Sync {
    fn adapt<'a>(&self, raw: &'a R) -> NormalizedRequest<'a>;
}

/// Adapter for a full transport-level [`http::Request`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRequestAdapter;

impl<B> RequestAdapter<http::Request<B>> for HttpRequestAdapter {
    fn adapt<'a>(&self, raw: &'a http::Request<B>) -> NormalizedRequest<'a> {
        NormalizedRequest::new(raw.headers())
            .with_query(raw.uri().query())
            .with_body(raw.extensions().get::<JsonBody>().map(|b| &b.0))
    }
}

/// Adapter for request [`Parts`](http::request::Parts), as handed to middleware that
/// split the request from its body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartsAdapter;

impl RequestAdapter<http::request::Parts> for PartsAdapter {
    fn adapt<'a>(&self, raw: &'a http::request::Parts) -> NormalizedRequest<'a> {
        NormalizedRequest::new(&raw.headers)
            .with_query(raw.uri.query())
            .with_body(raw.extensions.get::<JsonBody>().map(|b| &b.0))
    }
}

/// Verified payment details made available to downstream handlers.
///
/// Present on a request if and only if its payment was verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentContext {
    pub verification: VerificationResult,
    pub requirement: PaymentRequirement,
}

impl PaymentContext {
    pub fn from_extensions(extensions: &Extensions) -> Option<&PaymentContext> {
        extensions.get::<PaymentContext>()
    }
}

/// Request shapes that can carry a [`PaymentContext`].
pub trait AttachPaymentContext {
    fn attach_payment_context(&mut self, context: PaymentContext);
}

impl AttachPaymentContext for Extensions {
    fn attach_payment_context(&mut self, context: PaymentContext) {
        self.insert(context);
    }
}

impl<B> AttachPaymentContext for http::Request<B> {
    fn attach_payment_context(&mut self, context: PaymentContext) {
        self.extensions_mut().attach_payment_context(context);
    }
}

impl AttachPaymentContext for http::request::Parts {
    fn attach_payment_context(&mut self, context: PaymentContext) {
        self.extensions.attach_payment_context(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_request_adapter_reads_headers_and_query() {
        let req = http::Request::builder()
            .uri("/report?x402_payment=abc%3D&other=1")
            .header("x402-payment", "token")
            .body(())
            .unwrap();
        let normalized = HttpRequestAdapter.adapt(&req);
        assert_eq!(normalized.headers().get("x402-payment").unwrap(), "token");
        assert_eq!(normalized.query_param("x402_payment").as_deref(), Some("abc="));
        assert_eq!(normalized.query_param("missing"), None);
        assert!(normalized.body().is_none());
    }

    #[test]
    fn test_http_request_adapter_exposes_parsed_body() {
        let mut req = http::Request::builder().uri("/").body(()).unwrap();
        req.extensions_mut()
            .insert(JsonBody(json!({ "x402Payment": "from-body" })));
        let normalized = HttpRequestAdapter.adapt(&req);
        assert_eq!(normalized.body().unwrap()["x402Payment"], "from-body");
    }

    #[test]
    fn test_parts_adapter_matches_request_adapter() {
        let req = http::Request::builder()
            .uri("/report?q=1")
            .header("a", "1")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        let normalized = PartsAdapter.adapt(&parts);
        assert_eq!(normalized.headers().get("a").unwrap(), "1");
        assert_eq!(normalized.query(), Some("q=1"));
    }

    #[test]
    fn test_attach_context_on_parts() {
        let (mut parts, _) = http::Request::new(()).into_parts();
        assert!(PaymentContext::from_extensions(&parts.extensions).is_none());
        let context = PaymentContext {
            verification: VerificationResult::success(),
            requirement: crate::requirement::PaymentRequirement {
                amount: "1".into(),
                asset: "USDC".into(),
                network: "base".into(),
                seller: "s".into(),
                facilitator: "f".into(),
                nonce: "n".into(),
                expires_at: crate::timestamp::UnixTimestamp::from_secs(0),
                description: None,
            },
        };
        parts.attach_payment_context(context.clone());
        assert_eq!(
            PaymentContext::from_extensions(&parts.extensions),
            Some(&context)
        );
    }
}
