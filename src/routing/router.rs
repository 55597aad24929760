//! Route table and lookup.
//!
//! # Responsibilities
//! - Compile route configs into immutable definitions
//! - Look up the matching route for a request
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(routes × predicates) scan, acceptable for tens to hundreds of routes
//! - First match wins in DECLARATION order, not most-specific match:
//!   `/api/**` declared before `/api/auth/**` shadows the latter entirely
//! - Explicit NoRouteMatch rather than a silent default

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::RouteConfig;
use crate::error::GatewayError;
use crate::filters::FilterSpec;
use crate::http::context::RequestContext;
use crate::routing::matcher::{
    AllOf, HeaderPredicate, MethodPredicate, PathPattern, PathPredicate, Predicate,
};
use crate::upstream::UpstreamTarget;

#[derive(Debug, Error)]
#[error("route '{route}': {message}")]
pub struct RouteBuildError {
    pub route: String,
    pub message: String,
}

/// A compiled, immutable route.
#[derive(Debug)]
pub struct RouteDefinition {
    pub id: String,
    /// Position in the table; declaration order.
    pub index: usize,
    pub path_patterns: Vec<String>,
    pub methods: Vec<String>,
    predicate: AllOf,
    pub filters: Vec<FilterSpec>,
    pub target: UpstreamTarget,
    pub public: bool,
    pub forward_principal: bool,
}

impl RouteDefinition {
    pub fn from_config(index: usize, config: &RouteConfig) -> Result<Self, RouteBuildError> {
        let err = |message: String| RouteBuildError {
            route: config.id.clone(),
            message,
        };

        let patterns = config
            .path_patterns
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| err(e.to_string()))?;
        if patterns.is_empty() {
            return Err(err("no path patterns".to_string()));
        }

        let mut predicates: Vec<Box<dyn Predicate>> = vec![Box::new(PathPredicate::new(patterns))];
        if !config.methods.is_empty() {
            predicates.push(Box::new(MethodPredicate::parse(&config.methods).map_err(err)?));
        }
        for header in &config.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| err(format!("header '{}': {e}", header.name)))?;
            let value = header
                .value
                .as_deref()
                .map(HeaderValue::from_str)
                .transpose()
                .map_err(|e| err(format!("header '{}' value: {e}", header.name)))?;
            predicates.push(Box::new(HeaderPredicate::new(name, value)));
        }

        let filters = config
            .filters
            .iter()
            .map(|f| f.parse::<FilterSpec>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| err(e.to_string()))?;

        let target = UpstreamTarget::from_config(&config.target).map_err(|e| err(e.to_string()))?;

        Ok(Self {
            id: config.id.clone(),
            index,
            path_patterns: config.path_patterns.clone(),
            methods: config.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            predicate: AllOf::new(predicates),
            filters,
            target,
            public: config.public,
            forward_principal: config.forward_principal,
        })
    }

    pub fn matches(&self, ctx: &RequestContext) -> bool {
        self.predicate.matches(ctx)
    }
}

/// Outcome of [`RouteTable::explain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    /// (index, id) of the route that wins.
    pub winner: (usize, String),
    /// Later routes that also match but can never be selected for this request.
    pub shadowed: Vec<(usize, String)>,
}

/// Ordered, immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDefinition>>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteBuildError> {
        let routes = configs
            .iter()
            .enumerate()
            .map(|(i, c)| RouteDefinition::from_config(i, c).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(routes = routes.len(), "Route table compiled");
        Ok(Self { routes })
    }

    /// Find the first route, in declaration order, whose predicates all match.
    pub fn match_request(&self, ctx: &RequestContext) -> Result<Arc<RouteDefinition>, GatewayError> {
        self.routes
            .iter()
            .find(|r| r.matches(ctx))
            .cloned()
            .ok_or_else(|| GatewayError::NoRouteMatch {
                method: ctx.method.to_string(),
                path: ctx.path.clone(),
            })
    }

    /// Report the winning route and every later route it shadows.
    pub fn explain(&self, ctx: &RequestContext) -> Option<Explanation> {
        let mut matching = self
            .routes
            .iter()
            .filter(|r| r.matches(ctx))
            .map(|r| (r.index, r.id.clone()));
        let winner = matching.next()?;
        Some(Explanation {
            winner,
            shadowed: matching.collect(),
        })
    }

    pub fn routes(&self) -> &[Arc<RouteDefinition>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};

    fn table(src: &str) -> RouteTable {
        let config: GatewayConfig = toml::from_str(src).unwrap();
        RouteTable::from_config(&config.routes).unwrap()
    }

    fn ctx(method: Method, path: &str) -> RequestContext {
        RequestContext::new(method, &path.parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    const OVERLAPPING: &str = r#"
        [[routes]]
        id = "api"
        path_patterns = ["/api/**"]
        target = "http://127.0.0.1:9001"

        [[routes]]
        id = "auth"
        path_patterns = ["/api/auth/**"]
        target = "http://127.0.0.1:9002"

        [[routes]]
        id = "docs"
        path_patterns = ["/test/**", "/swagger-ui/**", "/v3/api-docs/**"]
        methods = ["GET"]
        target = "http://127.0.0.1:9003"
    "#;

    #[test]
    fn first_declared_route_wins() {
        let table = table(OVERLAPPING);
        let route = table.match_request(&ctx(Method::POST, "/api/auth/login")).unwrap();
        assert_eq!(route.id, "api");
    }

    #[test]
    fn declaration_order_not_specificity() {
        let reversed = table(
            r#"
            [[routes]]
            id = "auth"
            path_patterns = ["/api/auth/**"]
            target = "http://127.0.0.1:9002"

            [[routes]]
            id = "api"
            path_patterns = ["/api/**"]
            target = "http://127.0.0.1:9001"
            "#,
        );
        assert_eq!(reversed.match_request(&ctx(Method::GET, "/api/auth/x")).unwrap().id, "auth");
        assert_eq!(reversed.match_request(&ctx(Method::GET, "/api/users")).unwrap().id, "api");
    }

    #[test]
    fn any_pattern_and_method_predicate() {
        let table = table(OVERLAPPING);
        assert_eq!(table.match_request(&ctx(Method::GET, "/swagger-ui/index.html")).unwrap().id, "docs");
        assert_eq!(table.match_request(&ctx(Method::GET, "/v3/api-docs")).unwrap().id, "docs");
        // Method predicate is ANDed with the path set.
        assert!(table.match_request(&ctx(Method::DELETE, "/test/a")).is_err());
    }

    #[test]
    fn unmatched_request_is_not_found() {
        let table = table(OVERLAPPING);
        let err = table.match_request(&ctx(Method::GET, "/nothing")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn explain_reports_shadowed_routes() {
        let table = table(OVERLAPPING);
        let explanation = table.explain(&ctx(Method::GET, "/api/auth/login")).unwrap();
        assert_eq!(explanation.winner, (0, "api".to_string()));
        assert_eq!(explanation.shadowed, vec![(1, "auth".to_string())]);
        assert!(table.explain(&ctx(Method::GET, "/nothing")).is_none());
    }

    #[test]
    fn matched_route_is_assigned_once() {
        let table = table(OVERLAPPING);
        let mut request = ctx(Method::GET, "/api/x");
        let route = table.match_request(&request).unwrap();
        request.set_route(route.clone()).unwrap();
        assert!(request.set_route(table.routes()[1].clone()).is_err());
        assert_eq!(request.route().unwrap().id, "api");
    }
}
