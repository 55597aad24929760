//! Route predicates.
//!
//! # Responsibilities
//! - Match the request path against glob patterns
//! - Match the method against an allowed set
//! - Match header presence or exact value
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive, segment based
//! - `*` matches exactly one segment, `**` zero or more segments
//! - Wildcards must span a whole segment (`/static/*.js` is rejected)
//! - Empty segments are ignored, so `/a//b/` and `/a/b` are the same path
//! - Header names are case-insensitive (per HTTP spec), values are exact
//! - No regex to keep matching linear in pattern length for literal routes

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;

use crate::http::context::RequestContext;

/// Trait for matching requests against conditions.
pub trait Predicate: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, ctx: &RequestContext) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern '{0}' must start with '/'")]
    NotAbsolute(String),
    #[error("pattern '{pattern}': wildcard in segment '{segment}' must span the whole segment")]
    PartialWildcard { pattern: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    One,
    /// `**`
    Rest,
}

/// A compiled glob such as `/api/auth/**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if !raw.starts_with('/') {
            return Err(PatternError::NotAbsolute(raw.to_string()));
        }
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "**" => Ok(Segment::Rest),
                "*" => Ok(Segment::One),
                s if s.contains('*') => Err(PatternError::PartialWildcard {
                    pattern: raw.to_string(),
                    segment: s.to_string(),
                }),
                s => Ok(Segment::Literal(s.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Rest, rest)) => {
            // A trailing `**` swallows everything left.
            if rest.is_empty() {
                return true;
            }
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((Segment::One, rest)) => !path.is_empty() && match_segments(rest, &path[1..]),
        Some((Segment::Literal(literal), rest)) => {
            path.first().is_some_and(|p| p == literal) && match_segments(rest, &path[1..])
        }
    }
}

/// Matches when ANY of the route's path patterns matches.
#[derive(Debug, Clone)]
pub struct PathPredicate {
    patterns: Vec<PathPattern>,
}

impl PathPredicate {
    pub fn new(patterns: Vec<PathPattern>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }
}

impl Predicate for PathPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.patterns.iter().any(|p| p.matches(&ctx.path))
    }
}

/// Matches when the request method is in the set.
#[derive(Debug, Clone)]
pub struct MethodPredicate {
    methods: Vec<Method>,
}

impl MethodPredicate {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }

    /// Parse method names case-insensitively.
    pub fn parse(names: &[String]) -> Result<Self, String> {
        names
            .iter()
            .map(|n| {
                Method::from_bytes(n.to_ascii_uppercase().as_bytes())
                    .map_err(|_| format!("'{n}' is not an HTTP method"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl Predicate for MethodPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.methods.contains(&ctx.method)
    }
}

/// Matches header presence, or an exact value among a multi-valued header.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: HeaderName,
    value: Option<HeaderValue>,
}

impl HeaderPredicate {
    pub fn new(name: HeaderName, value: Option<HeaderValue>) -> Self {
        Self { name, value }
    }
}

impl Predicate for HeaderPredicate {
    fn matches(&self, ctx: &RequestContext) -> bool {
        match &self.value {
            None => ctx.headers.contains_key(&self.name),
            Some(expected) => ctx.headers.get_all(&self.name).iter().any(|v| v == expected),
        }
    }
}

/// Combines multiple predicates with AND semantics.
#[derive(Debug, Default)]
pub struct AllOf {
    predicates: Vec<Box<dyn Predicate>>,
}

impl AllOf {
    pub fn new(predicates: Vec<Box<dyn Predicate>>) -> Self {
        Self { predicates }
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl Predicate for AllOf {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.predicates.iter().all(|p| p.matches(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::HeaderMap;

    fn ctx(method: Method, path: &str, headers: &[(&str, &str)]) -> RequestContext {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        RequestContext::new(method, &path.parse().unwrap(), map, Bytes::new())
    }

    fn glob(p: &str) -> PathPattern {
        PathPattern::parse(p).unwrap()
    }

    #[test]
    fn double_star_matches_any_remaining_segments() {
        let p = glob("/api/auth/**");
        assert!(p.matches("/api/auth"));
        assert!(p.matches("/api/auth/login"));
        assert!(p.matches("/api/auth/a/b/c"));
        assert!(!p.matches("/api/authx/login"));
        assert!(!p.matches("/api"));
    }

    #[test]
    fn single_star_matches_exactly_one_segment() {
        let p = glob("/api/*/profile");
        assert!(p.matches("/api/u1/profile"));
        assert!(!p.matches("/api/profile"));
        assert!(!p.matches("/api/a/b/profile"));
    }

    #[test]
    fn double_star_in_the_middle() {
        let p = glob("/static/**/index.html");
        assert!(p.matches("/static/index.html"));
        assert!(p.matches("/static/a/b/index.html"));
        assert!(!p.matches("/static/a/b/main.js"));
    }

    #[test]
    fn literal_paths_are_case_sensitive_and_slash_tolerant() {
        let p = glob("/api/auth/register");
        assert!(p.matches("/api/auth/register"));
        assert!(p.matches("/api//auth/register/"));
        assert!(!p.matches("/API/auth/register"));
        assert!(!p.matches("/api/auth/register/extra"));
    }

    #[test]
    fn root_pattern() {
        assert!(glob("/").matches("/"));
        assert!(!glob("/").matches("/a"));
        assert!(glob("/**").matches("/"));
        assert!(glob("/**").matches("/anything/at/all"));
    }

    #[test]
    fn rejects_bad_patterns() {
        assert_eq!(
            PathPattern::parse("api/**"),
            Err(PatternError::NotAbsolute("api/**".into()))
        );
        assert!(matches!(
            PathPattern::parse("/static/*.js"),
            Err(PatternError::PartialWildcard { .. })
        ));
    }

    #[test]
    fn method_and_header_predicates() {
        let methods = MethodPredicate::parse(&["get".into(), "HEAD".into()]).unwrap();
        assert!(methods.matches(&ctx(Method::GET, "/", &[])));
        assert!(!methods.matches(&ctx(Method::POST, "/", &[])));

        let presence = HeaderPredicate::new(HeaderName::from_static("x-tenant"), None);
        assert!(presence.matches(&ctx(Method::GET, "/", &[("X-Tenant", "acme")])));
        assert!(!presence.matches(&ctx(Method::GET, "/", &[])));

        let exact = HeaderPredicate::new(
            HeaderName::from_static("x-tenant"),
            Some(HeaderValue::from_static("acme")),
        );
        assert!(exact.matches(&ctx(
            Method::GET,
            "/",
            &[("x-tenant", "other"), ("x-tenant", "acme")]
        )));
        assert!(!exact.matches(&ctx(Method::GET, "/", &[("x-tenant", "ACME")])));
    }

    #[test]
    fn all_of_requires_every_predicate() {
        let all = AllOf::new(vec![
            Box::new(PathPredicate::new(vec![glob("/api/**")])),
            Box::new(MethodPredicate::new(vec![Method::POST])),
        ]);
        assert!(all.matches(&ctx(Method::POST, "/api/x", &[])));
        assert!(!all.matches(&ctx(Method::GET, "/api/x", &[])));
        assert!(!all.matches(&ctx(Method::POST, "/other", &[])));
    }
}
