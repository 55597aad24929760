//! Token table collaborator for deployments without an authorization server.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::auth::{AuthRejection, Authenticator, Credential, Principal};
use crate::config::StaticTokenConfig;

#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, StaticTokenConfig>,
}

impl StaticTokenAuthenticator {
    pub fn from_config(tokens: &[StaticTokenConfig]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| (t.token.clone(), t.clone())).collect(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn validate(&self, credential: &Credential) -> Result<Principal, AuthRejection> {
        let entry = self
            .tokens
            .get(credential.token())
            .ok_or_else(|| AuthRejection::Invalid("unknown token".to_string()))?;
        Ok(Principal::new(entry.subject.clone(), credential.clone()).with_claims(entry.claims.clone()))
    }
}
