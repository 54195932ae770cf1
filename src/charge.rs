//! Route charge registry.
//!
//! Routes are marked chargeable by explicit registration at startup rather than by
//! annotations. A charge can be declared for a single handler (method + route path)
//! or for a whole group of handlers sharing a path prefix. Handler-level charges
//! override group-level ones; among groups the longest matching prefix wins.

use http::Method;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::{ConfigError, GateConfig};
use crate::requirement::ChargeOptions;
use crate::util::Price;

/// Identifies a route: HTTP method plus the route path (template or concrete path).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId {
    pub method: Method,
    pub path: String,
}

impl RouteId {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

/// Resolves the charge declared for a route, if any.
pub trait ChargeLookup: Send + Sync {
    fn lookup(&self, route: &RouteId) -> Option<&ChargeOptions>;
}

/// A bare [`ChargeOptions`] charges every route it guards.
impl ChargeLookup for ChargeOptions {
    fn lookup(&self, _route: &RouteId) -> Option<&ChargeOptions> {
        Some(self)
    }
}

/// Startup-populated map from routes and route groups to their charges.
#[derive(Debug, Clone, Default)]
pub struct ChargeRegistry {
    routes: HashMap<RouteId, ChargeOptions>,
    groups: Vec<(String, ChargeOptions)>,
}

impl ChargeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from the `routes` and `groups` entries of the configuration.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for route in config.routes() {
            let method = Method::from_str(&route.method).map_err(|_| {
                ConfigError::Invalid(format!("route method {:?} is invalid", route.method))
            })?;
            registry = registry.charge_route(method, &route.path, route.charge.clone());
        }
        for group in config.groups() {
            registry = registry.charge_group(&group.prefix, group.charge.clone());
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Declares a handler-level charge.
    pub fn charge_route(mut self, method: Method, path: &str, options: ChargeOptions) -> Self {
        self.routes.insert(RouteId::new(method, path), options);
        self
    }

    /// Declares a group-level charge for every route under `prefix`.
    pub fn charge_group(mut self, prefix: &str, options: ChargeOptions) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        self.groups.retain(|(existing, _)| *existing != prefix);
        self.groups.push((prefix, options));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.groups.is_empty()
    }

    /// Checks every declared price so a malformed charge fails at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let declared = self
            .routes
            .iter()
            .map(|(route, options)| (route.path.as_str(), options))
            .chain(self.groups.iter().map(|(p, options)| (p.as_str(), options)));
        for (location, options) in declared {
            Price::parse(&options.price).map_err(|e| {
                ConfigError::Invalid(format!("price for {location:?}: {e}"))
            })?;
        }
        Ok(())
    }

    fn lookup_group(&self, path: &str) -> Option<&ChargeOptions> {
        self.groups
            .iter()
            .filter(|(prefix, _)| prefix_matches(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, options)| options)
    }
}

impl ChargeLookup for ChargeRegistry {
    fn lookup(&self, route: &RouteId) -> Option<&ChargeOptions> {
        self.routes
            .get(route)
            .or_else(|| self.lookup_group(&route.path))
    }
}

/// Segment-aligned prefix match: `/premium` matches `/premium` and `/premium/x`,
/// but not `/premiumx`. An empty prefix (registered as `/`) matches everything.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => prefix.is_empty() || rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
