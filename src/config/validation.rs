//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (discovered targets reference known services)
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Check that the request deadline outlasts the worst-case dispatch
//! - Check that every glob, method, header name and filter parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::{HeaderName, Method};
use thiserror::Error;

use crate::config::schema::{AuthMode, DiscoveryMode, GatewayConfig, RouteConfig};
use crate::filters::FilterSpec;
use crate::routing::matcher::PathPattern;
use crate::upstream::UpstreamTarget;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `routes[2].filters[0]`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    if config.timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be > 0"));
    }
    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }
    if config.timeouts.request_secs > 0 {
        let budget = dispatch_budget_ms(config);
        if config.timeouts.request_secs.saturating_mul(1000) <= budget {
            errors.push(ValidationError::new(
                "timeouts.request_secs",
                format!(
                    "{}s does not exceed the worst-case upstream time of {budget}ms",
                    config.timeouts.request_secs
                ),
            ));
        }
    }

    validate_auth(config, &mut errors);
    validate_forwarding(config, &mut errors);
    validate_services(config, &mut errors);

    let mut seen_ids = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        if !route.id.is_empty() && !seen_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{index}].id"),
                format!("duplicate route id '{}'", route.id),
            ));
        }
        validate_route(config, index, route, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Longest a request can spend waiting on collaborators: introspection plus
/// every dispatch attempt and the backoff between them.
fn dispatch_budget_ms(config: &GatewayConfig) -> u64 {
    let attempts = if config.retries.enabled {
        u64::from(config.retries.max_attempts.max(1))
    } else {
        1
    };
    let introspection = match (&config.auth.mode, &config.auth.introspection) {
        (AuthMode::Introspection, Some(introspection)) => introspection.timeout_ms,
        _ => 0,
    };
    config
        .timeouts
        .upstream_ms
        .saturating_mul(attempts)
        .saturating_add(config.retries.max_delay_ms.saturating_mul(attempts - 1))
        .saturating_add(introspection)
}

fn validate_auth(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    if config.auth.session_cookie.trim().is_empty() {
        errors.push(ValidationError::new("auth.session_cookie", "must not be empty"));
    }
    match config.auth.mode {
        AuthMode::Static => {
            let mut tokens = HashSet::new();
            for (i, token) in config.auth.tokens.iter().enumerate() {
                if token.token.is_empty() {
                    errors.push(ValidationError::new(
                        format!("auth.tokens[{i}].token"),
                        "must not be empty",
                    ));
                } else if !tokens.insert(token.token.as_str()) {
                    errors.push(ValidationError::new(
                        format!("auth.tokens[{i}].token"),
                        "duplicate token",
                    ));
                }
            }
        }
        AuthMode::Introspection => match &config.auth.introspection {
            None => errors.push(ValidationError::new(
                "auth.introspection",
                "required when auth.mode = \"introspection\"",
            )),
            Some(introspection) => {
                match url::Url::parse(&introspection.url) {
                    Err(_) => errors.push(ValidationError::new(
                        "auth.introspection.url",
                        format!("'{}' is not a valid URL", introspection.url),
                    )),
                    Ok(url) if url.scheme() != "http" => errors.push(ValidationError::new(
                        "auth.introspection.url",
                        format!("scheme '{}' is not supported, expected http", url.scheme()),
                    )),
                    Ok(_) => {}
                }
                if introspection.timeout_ms == 0 {
                    errors.push(ValidationError::new(
                        "auth.introspection.timeout_ms",
                        "must be > 0",
                    ));
                }
            }
        },
    }
}

fn validate_forwarding(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let forwarding = &config.forwarding;
    for (field, name) in [
        ("forwarding.principal_header", &forwarding.principal_header),
        ("forwarding.claims_header", &forwarding.claims_header),
    ] {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("'{name}' is not a header name")));
        }
    }
    for (i, name) in forwarding.strip_headers.iter().enumerate() {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("forwarding.strip_headers[{i}]"),
                format!("'{name}' is not a header name"),
            ));
        }
    }
}

fn validate_services(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if service.name.is_empty() {
            errors.push(ValidationError::new(format!("services[{i}].name"), "must not be empty"));
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{i}].name"),
                format!("duplicate service '{}'", service.name),
            ));
        }
        if service.instances.is_empty() {
            errors.push(ValidationError::new(
                format!("services[{i}].instances"),
                "at least one instance is required",
            ));
        }
        for (j, instance) in service.instances.iter().enumerate() {
            if instance.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::new(
                    format!("services[{i}].instances[{j}]"),
                    format!("'{instance}' is not a socket address"),
                ));
            }
        }
        if service.max_connections == 0 {
            errors.push(ValidationError::new(
                format!("services[{i}].max_connections"),
                "must be > 0",
            ));
        }
    }
}

fn validate_route(
    config: &GatewayConfig,
    index: usize,
    route: &RouteConfig,
    errors: &mut Vec<ValidationError>,
) {
    let prefix = format!("routes[{index}]");

    if route.id.trim().is_empty() {
        errors.push(ValidationError::new(format!("{prefix}.id"), "must not be empty"));
    }
    if route.path_patterns.is_empty() {
        errors.push(ValidationError::new(
            format!("{prefix}.path_patterns"),
            "at least one pattern is required",
        ));
    }
    for (i, pattern) in route.path_patterns.iter().enumerate() {
        if let Err(e) = PathPattern::parse(pattern) {
            errors.push(ValidationError::new(
                format!("{prefix}.path_patterns[{i}]"),
                e.to_string(),
            ));
        }
    }
    for (i, method) in route.methods.iter().enumerate() {
        if method.is_empty() || Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err()
        {
            errors.push(ValidationError::new(
                format!("{prefix}.methods[{i}]"),
                format!("'{method}' is not an HTTP method"),
            ));
        }
    }
    for (i, header) in route.headers.iter().enumerate() {
        if HeaderName::from_bytes(header.name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                format!("{prefix}.headers[{i}].name"),
                format!("'{}' is not a header name", header.name),
            ));
        }
    }
    for (i, filter) in route.filters.iter().enumerate() {
        if let Err(e) = filter.parse::<FilterSpec>() {
            errors.push(ValidationError::new(
                format!("{prefix}.filters[{i}]"),
                e.to_string(),
            ));
        }
    }

    match UpstreamTarget::from_config(&route.target) {
        Err(e) => errors.push(ValidationError::new(format!("{prefix}.target"), e.to_string())),
        Ok(UpstreamTarget::Discovered(service)) => {
            if config.discovery.mode == DiscoveryMode::Registry && config.service(&service).is_none()
            {
                errors.push(ValidationError::new(
                    format!("{prefix}.target"),
                    format!("service '{service}' is not declared under [[services]]"),
                ));
            }
        }
        Ok(UpstreamTarget::Static(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> GatewayConfig {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = parse(
            r#"
            [[services]]
            name = "user-service"
            instances = ["127.0.0.1:9090"]

            [[routes]]
            id = "register"
            path_patterns = ["/api/auth/register"]
            methods = ["post"]
            filters = ["rewrite-prefix=/api/auth,/api/users"]
            target = "lb://user-service"
            public = true

            [[routes]]
            id = "users"
            path_patterns = ["/api/users/**"]
            filters = ["token-relay"]
            target = { static = "http://localhost:9090" }
            "#,
        );
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let config = parse(
            r#"
            [timeouts]
            upstream_ms = 0

            [[routes]]
            id = "bad"
            path_patterns = ["/a/**/b**"]
            methods = ["FETCH ME"]
            filters = ["no-such-filter"]
            target = { discover = "ghost" }

            [[routes]]
            id = "bad"
            path_patterns = []
            target = "ftp://example.com"
            "#,
        );
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"timeouts.upstream_ms"));
        assert!(fields.contains(&"routes[0].path_patterns[0]"));
        assert!(fields.contains(&"routes[0].methods[0]"));
        assert!(fields.contains(&"routes[0].filters[0]"));
        assert!(fields.contains(&"routes[0].target"));
        assert!(fields.contains(&"routes[1].id"));
        assert!(fields.contains(&"routes[1].path_patterns"));
        assert!(fields.contains(&"routes[1].target"));
    }

    #[test]
    fn introspection_mode_requires_endpoint() {
        let config = parse(
            r#"
            [auth]
            mode = "introspection"
            "#,
        );
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "auth.introspection");
    }

    #[test]
    fn request_deadline_must_outlast_upstream_attempts() {
        let tight = parse(
            r#"
            [timeouts]
            upstream_ms = 3000
            request_secs = 1
            "#,
        );
        let errors = validate_config(&tight).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "timeouts.request_secs");

        // 2 attempts of 2s plus 500ms backoff plus 1s introspection = 5.5s
        let retried = parse(
            r#"
            [timeouts]
            upstream_ms = 2000
            request_secs = 5

            [retries]
            enabled = true
            max_attempts = 2
            max_delay_ms = 500

            [auth]
            mode = "introspection"
            introspection = { url = "http://127.0.0.1:9/introspect", timeout_ms = 1000 }
            "#,
        );
        let errors = validate_config(&retried).unwrap_err();
        assert_eq!(errors[0].field, "timeouts.request_secs");

        let mut roomy = retried;
        roomy.timeouts.request_secs = 6;
        assert_eq!(validate_config(&roomy), Ok(()));
    }

    #[test]
    fn dns_mode_accepts_undeclared_services() {
        let config = parse(
            r#"
            [discovery]
            mode = "dns"

            [[routes]]
            id = "r"
            path_patterns = ["/**"]
            target = "lb://users.internal:8080"
            "#,
        );
        assert_eq!(validate_config(&config), Ok(()));
    }
}
