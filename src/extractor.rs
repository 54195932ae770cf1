//! Credential extraction.
//!
//! The extractor looks in a fixed order: header, then query parameter, then a
//! top-level string field of a parsed JSON body. The first non-empty value wins.
//! Absence is a normal outcome (`None`), not an error. Surrounding whitespace only
//! decides emptiness; the value is forwarded byte for byte. A malformed value still
//! counts as present and reaches the verifier, which owns validation.

use http::HeaderName;
use std::fmt::{Debug, Formatter};
use std::str::Utf8Error;

use crate::config::{ConfigError, CredentialLocations, config_defaults};
use crate::request::NormalizedRequest;

/// Opaque proof-of-payment token presented by a caller.
///
/// Kept as the raw bytes the caller sent, since header values need not be UTF-8.
/// Its contents are never logged: `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Vec<u8>);

impl Credential {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self(token.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The token as text.
    ///
    /// # Errors
    ///
    /// Returns [`Utf8Error`] if the caller sent a non-UTF-8 header value.
    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Pulls a [`Credential`] out of a [`NormalizedRequest`].
#[derive(Debug, Clone)]
pub struct CredentialExtractor {
    header: HeaderName,
    query_param: String,
    body_field: String,
}

impl Default for CredentialExtractor {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(config_defaults::DEFAULT_CREDENTIAL_HEADER),
            query_param: config_defaults::DEFAULT_CREDENTIAL_QUERY.to_string(),
            body_field: config_defaults::DEFAULT_CREDENTIAL_BODY_FIELD.to_string(),
        }
    }
}

impl CredentialExtractor {
    pub fn from_locations(locations: &CredentialLocations) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(locations.header.as_bytes()).map_err(|_| {
            ConfigError::Invalid(format!(
                "credential header {:?} is not a valid header name",
                locations.header
            ))
        })?;
        Ok(Self {
            header,
            query_param: locations.query.clone(),
            body_field: locations.body_field.clone(),
        })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn extract(&self, request: &NormalizedRequest<'_>) -> Option<Credential> {
        self.in_header(request)
            .or_else(|| self.in_query(request))
            .or_else(|| self.in_body(request))
    }

    fn in_header(&self, request: &NormalizedRequest<'_>) -> Option<Credential> {
        let value = request.headers().get(&self.header)?;
        non_empty(value.as_bytes())
    }

    fn in_query(&self, request: &NormalizedRequest<'_>) -> Option<Credential> {
        let value = request.query_param(&self.query_param)?;
        non_empty(value.as_bytes())
    }

    fn in_body(&self, request: &NormalizedRequest<'_>) -> Option<Credential> {
        let value = request.body()?.get(&self.body_field)?.as_str()?;
        non_empty(value.as_bytes())
    }
}

fn non_empty(token: &[u8]) -> Option<Credential> {
    if token.trim_ascii().is_empty() {
        None
    } else {
        Some(Credential::new(token))
    }
}
