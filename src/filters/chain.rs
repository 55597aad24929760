//! Ordered filter execution around the upstream call.
//!
//! # Responsibilities
//! - Run request phases strictly in declared order
//! - Stop at the first ShortCircuit or Fail
//! - Run response phases in reverse, for filters whose request phase continued
//! - Contain panics from any filter or the dispatcher
//!
//! # Design Decisions
//! - The chain owns no per-request state; everything lives in RequestContext
//! - A post-action error replaces the response with a gateway error response,
//!   and the remaining (outer) post-actions still run on the replacement

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use futures_util::FutureExt;

use crate::error::GatewayError;
use crate::filters::{Filter, FilterOutcome};
use crate::http::context::RequestContext;
use crate::http::response::error_response;

/// Performs the upstream call once the request phase has completed.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn forward(&self, ctx: &RequestContext) -> Result<Response<Body>, GatewayError>;
}

/// Result of [`FilterChain::apply`].
#[derive(Debug)]
pub struct PreFilterOutcome {
    pub outcome: FilterOutcome,
    /// Number of leading filters whose request phase returned Continue.
    pub entered: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run the request phase of every filter in order.
    pub async fn apply(&self, ctx: &mut RequestContext) -> PreFilterOutcome {
        for (entered, filter) in self.filters.iter().enumerate() {
            let outcome = match AssertUnwindSafe(filter.on_request(ctx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => FilterOutcome::Fail(GatewayError::InternalFault(format!(
                    "filter '{}' panicked: {}",
                    filter.name(),
                    panic_message(&*panic)
                ))),
            };

            if !outcome.is_continue() {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    filter = filter.name(),
                    short_circuit = matches!(outcome, FilterOutcome::ShortCircuit(_)),
                    "Filter chain stopped"
                );
                return PreFilterOutcome { outcome, entered };
            }
        }

        PreFilterOutcome {
            outcome: FilterOutcome::Continue,
            entered: self.filters.len(),
        }
    }

    /// Run response phases, innermost first, for the first `entered` filters.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        entered: usize,
        mut response: Response<Body>,
    ) -> Response<Body> {
        let entered = entered.min(self.filters.len());
        for filter in self.filters[..entered].iter().rev() {
            let result = match AssertUnwindSafe(filter.on_response(ctx, &mut response))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(GatewayError::InternalFault(format!(
                    "filter '{}' panicked in response phase: {}",
                    filter.name(),
                    panic_message(&*panic)
                ))),
            };
            if let Err(err) = result {
                response = error_response(Some(ctx.request_id()), &err);
            }
        }
        response
    }

    /// Request phase, then dispatch, then response phase.
    pub async fn execute(&self, ctx: &mut RequestContext, dispatch: &dyn Dispatch) -> Response<Body> {
        let PreFilterOutcome { outcome, entered } = self.apply(ctx).await;

        let response = match outcome {
            FilterOutcome::Continue => {
                match AssertUnwindSafe(dispatch.forward(ctx)).catch_unwind().await {
                    Ok(Ok(response)) => response,
                    Ok(Err(err)) => error_response(Some(ctx.request_id()), &err),
                    Err(panic) => error_response(
                        Some(ctx.request_id()),
                        &GatewayError::InternalFault(format!(
                            "dispatcher panicked: {}",
                            panic_message(&*panic)
                        )),
                    ),
                }
            }
            FilterOutcome::ShortCircuit(response) => response,
            FilterOutcome::Fail(err) => error_response(Some(ctx.request_id()), &err),
        };

        self.complete(ctx, entered, response).await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Appends its tag to a shared journal in both phases.
    #[derive(Debug)]
    struct Journal {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        outcome: fn() -> FilterOutcome,
    }

    #[async_trait]
    impl Filter for Journal {
        fn name(&self) -> &'static str {
            self.tag
        }

        async fn on_request(&self, _ctx: &mut RequestContext) -> FilterOutcome {
            self.log.lock().unwrap().push(format!("pre:{}", self.tag));
            (self.outcome)()
        }

        async fn on_response(
            &self,
            _ctx: &RequestContext,
            response: &mut Response<Body>,
        ) -> Result<(), GatewayError> {
            self.log.lock().unwrap().push(format!("post:{}", self.tag));
            response
                .headers_mut()
                .append("x-trail", HeaderValue::from_static(self.tag));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Panics;

    #[async_trait]
    impl Filter for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn on_request(&self, _ctx: &mut RequestContext) -> FilterOutcome {
            panic!("filter bug")
        }
    }

    #[derive(Default)]
    struct CountingDispatch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dispatch for CountingDispatch {
        async fn forward(&self, _ctx: &RequestContext) -> Result<Response<Body>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(Body::from("upstream")))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::GET, &"/x".parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    fn journal(tag: &'static str, log: &Arc<Mutex<Vec<String>>>, outcome: fn() -> FilterOutcome) -> Arc<dyn Filter> {
        Arc::new(Journal {
            tag,
            log: log.clone(),
            outcome,
        })
    }

    fn cont() -> FilterOutcome {
        FilterOutcome::Continue
    }

    fn teapot() -> FilterOutcome {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::IM_A_TEAPOT;
        FilterOutcome::ShortCircuit(response)
    }

    #[tokio::test]
    async fn onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(vec![
            journal("a", &log, cont),
            journal("b", &log, cont),
            journal("c", &log, cont),
        ]);
        let dispatch = CountingDispatch::default();

        let response = chain.execute(&mut ctx(), &dispatch).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["pre:a", "pre:b", "pre:c", "post:c", "post:b", "post:a"]
        );
        let trail: Vec<_> = response.headers().get_all("x-trail").iter().collect();
        assert_eq!(trail, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_downstream_and_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(vec![
            journal("a", &log, cont),
            journal("b", &log, teapot),
            journal("c", &log, cont),
        ]);
        let dispatch = CountingDispatch::default();

        let response = chain.execute(&mut ctx(), &dispatch).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), vec!["pre:a", "pre:b", "post:a"]);
    }

    #[tokio::test]
    async fn panicking_filter_becomes_internal_fault() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(vec![
            journal("a", &log, cont),
            Arc::new(Panics),
            journal("c", &log, cont),
        ]);
        let dispatch = CountingDispatch::default();

        let response = chain.execute(&mut ctx(), &dispatch).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock().unwrap(), vec!["pre:a", "post:a"]);
    }

    #[tokio::test]
    async fn failed_filter_maps_to_its_status() {
        let chain = FilterChain::new(vec![journal("a", &Arc::default(), || {
            FilterOutcome::Fail(GatewayError::Forbidden("scope".into()))
        })]);
        let mut request = ctx();
        let pre = chain.apply(&mut request).await;
        assert_eq!(pre.entered, 0);
        assert!(matches!(pre.outcome, FilterOutcome::Fail(GatewayError::Forbidden(_))));
    }
}
