//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching target for a request
//! - Return matched target or explicit no-match
//! - Log match decisions for traced requests
//!
//! # Design Decisions
//! - Compiled route list is immutable; reloads swap in a new list atomically
//! - Sorted by priority, highest first; ties keep config order
//! - First match wins

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;

use crate::config::validation::{parse_target, ValidationError};
use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::routing::target::Target;

/// Resolves a request to the backend that should serve it.
pub trait RouteResolver: Send + Sync {
    /// `trace` is the value of the request's `trace` header, if any.
    fn lookup(&self, req: &Request<Body>, trace: Option<&str>) -> Option<Arc<Target>>;
}

/// A compiled route.
#[derive(Debug)]
struct Route {
    name: String,
    priority: u32,
    matcher: AndMatcher,
    target: Arc<Target>,
}

impl Route {
    fn compile(config: &RouteConfig) -> Result<Self, ValidationError> {
        let url = parse_target(config)?;

        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &config.path_prefix {
            matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
        }

        Ok(Self {
            name: config.name.clone(),
            priority: config.priority,
            matcher: AndMatcher::new(matchers),
            target: Arc::new(Target::new(config.name.clone(), url)),
        })
    }
}

fn compile(configs: &[RouteConfig]) -> Result<Vec<Route>, ValidationError> {
    let mut routes = configs
        .iter()
        .map(Route::compile)
        .collect::<Result<Vec<_>, _>>()?;
    routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    Ok(routes)
}

/// Routing table shared by all request handlers.
pub struct RoutingTable {
    routes: ArcSwap<Vec<Route>>,
}

impl RoutingTable {
    /// Build a table from route configuration.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ValidationError> {
        Ok(Self {
            routes: ArcSwap::from_pointee(compile(configs)?),
        })
    }

    /// Replace the routes. Lookups already running keep the old table.
    pub fn update(&self, configs: &[RouteConfig]) -> Result<(), ValidationError> {
        let routes = compile(configs)?;
        tracing::info!(routes = routes.len(), "Routing table updated");
        self.routes.store(Arc::new(routes));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RouteResolver for RoutingTable {
    fn lookup(&self, req: &Request<Body>, trace: Option<&str>) -> Option<Arc<Target>> {
        let routes = self.routes.load();

        if let Some(trace) = trace {
            tracing::info!(trace, uri = %req.uri(), "Tracing route lookup");
        }

        for route in routes.iter() {
            if route.matcher.matches(req) {
                if let Some(trace) = trace {
                    tracing::info!(trace, route = %route.name, target_url = %route.target.url(), "Match");
                }
                return Some(Arc::clone(&route.target));
            }
            if let Some(trace) = trace {
                tracing::info!(trace, route = %route.name, "No match");
            }
        }

        if let Some(trace) = trace {
            tracing::info!(trace, "No route matched");
        }
        None
    }
}
