//! Authentication gate: first filter of every route chain.
//!
//! # Responsibilities
//! - Public routes: mark the request Public and continue
//! - Protected routes: extract a credential, delegate validation, attach the principal
//! - Reject with 401 (or 403 when the collaborator says so) before dispatch
//!
//! # Design Decisions
//! - A missing credential is rejected without calling the collaborator
//! - No retries here; retrying belongs to the collaborator's own client

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{extract_credential, AuthRejection, AuthState, Authenticator};
use crate::error::GatewayError;
use crate::filters::{Filter, FilterOutcome};
use crate::http::context::RequestContext;
use crate::http::response::error_response;
use crate::observability::metrics;

pub struct AuthenticationGate {
    authenticator: Arc<dyn Authenticator>,
    session_cookie: String,
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("session_cookie", &self.session_cookie)
            .finish_non_exhaustive()
    }
}

impl AuthenticationGate {
    pub fn new(authenticator: Arc<dyn Authenticator>, session_cookie: impl Into<String>) -> Self {
        Self {
            authenticator,
            session_cookie: session_cookie.into(),
        }
    }

    fn reject(&self, ctx: &mut RequestContext, err: GatewayError) -> FilterOutcome {
        ctx.advance_auth(AuthState::Rejected);
        metrics::record_auth_decision(if matches!(err, GatewayError::Forbidden(_)) {
            "forbidden"
        } else {
            "rejected"
        });
        tracing::info!(
            request_id = %ctx.request_id(),
            path = %ctx.original_path(),
            reason = %err,
            "Request rejected by authentication gate"
        );
        FilterOutcome::ShortCircuit(error_response(Some(ctx.request_id()), &err))
    }
}

#[async_trait]
impl Filter for AuthenticationGate {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn on_request(&self, ctx: &mut RequestContext) -> FilterOutcome {
        let public = ctx.route().map(|r| r.public).unwrap_or(false);
        if public {
            ctx.advance_auth(AuthState::Public);
            metrics::record_auth_decision("public");
            return FilterOutcome::Continue;
        }

        let Some(credential) = extract_credential(&ctx.headers, &self.session_cookie) else {
            return self.reject(ctx, GatewayError::AuthRejected("missing credential".into()));
        };

        ctx.advance_auth(AuthState::Authenticating);
        match self.authenticator.validate(&credential).await {
            Ok(principal) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    subject = %principal.subject,
                    credential = credential.kind(),
                    "Request authenticated"
                );
                ctx.attach_principal(principal);
                metrics::record_auth_decision("authenticated");
                FilterOutcome::Continue
            }
            Err(AuthRejection::Forbidden(reason)) => self.reject(ctx, GatewayError::Forbidden(reason)),
            Err(AuthRejection::Unavailable(reason)) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    error = %reason,
                    "Authorization collaborator unavailable, failing closed"
                );
                self.reject(ctx, GatewayError::AuthRejected("credential could not be verified".into()))
            }
            Err(AuthRejection::Invalid(reason)) => self.reject(ctx, GatewayError::AuthRejected(reason)),
        }
    }
}
