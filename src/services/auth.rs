//! Credential verification for the chunk upload entry point.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token provided")]
    MissingCredential,
    #[error("invalid token")]
    InvalidCredential,
}

/// The principal a credential resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub principal: String,
}

#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}

/// Strip an optional `Bearer ` scheme from an `Authorization` header value.
pub fn credential_from_header(value: &str) -> &str {
    let value = value.trim();
    match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => value[7..].trim_start(),
        _ => value,
    }
}

/// Tokens fixed at startup. Only SHA-256 digests are kept in memory.
#[derive(Debug, Default)]
pub struct StaticTokenAuthorizer {
    principals: HashMap<String, String>,
}

impl StaticTokenAuthorizer {
    pub fn new<I, P, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: AsRef<str>,
    {
        let principals = entries
            .into_iter()
            .map(|(principal, token)| (token_digest(token.as_ref()), principal.into()))
            .collect();
        Self { principals }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn verify(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.principals
            .get(&token_digest(credential))
            .map(|principal| Identity {
                principal: principal.clone(),
            })
            .ok_or(AuthError::InvalidCredential)
    }
}

/// Accepts every caller as `anonymous`.
#[derive(Debug, Default)]
pub struct OpenAuthorizer;

#[async_trait]
impl Authorizer for OpenAuthorizer {
    async fn verify(&self, _credential: &str) -> Result<Identity, AuthError> {
        Ok(Identity {
            principal: "anonymous".into(),
        })
    }
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_tokens_resolve_to_principals() {
        let auth = StaticTokenAuthorizer::new([("alice", "s3cret"), ("bob", "hunter2")]);
        assert_eq!(auth.verify("s3cret").await.unwrap().principal, "alice");
        assert_eq!(auth.verify("hunter2").await.unwrap().principal, "bob");
        assert_eq!(auth.verify("nope").await, Err(AuthError::InvalidCredential));
        assert_eq!(auth.verify("").await, Err(AuthError::MissingCredential));
    }

    #[tokio::test]
    async fn open_authorizer_accepts_anything() {
        assert_eq!(OpenAuthorizer.verify("").await.unwrap().principal, "anonymous");
    }

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(credential_from_header("Bearer abc"), "abc");
        assert_eq!(credential_from_header("bearer   abc"), "abc");
        assert_eq!(credential_from_header("abc"), "abc");
        assert_eq!(credential_from_header("  "), "");
    }
}
