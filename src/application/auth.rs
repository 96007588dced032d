//! Authentication boundary.
//!
//! Token verification is delegated to an external identity provider:
//! a bearer token goes in, an [`Identity`] with a role set comes out.
//! Authorization decisions (ownership, role gates) stay local.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::domain::types::Role;

/// The authenticated caller as reported by the identity provider.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Provider-issued stable subject; profiles reference it as
    /// `user_id`.
    pub subject: String,
    pub name: Option<String>,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    /// Moderators and admins may act on any profile; users only on
    /// their own.
    pub fn can_manage(&self, owner_user_id: &str) -> bool {
        self.subject == owner_user_id || self.has_role(Role::Moderator) || self.has_role(Role::Admin)
    }

    /// Highest role, for rate-limit tiering.
    pub fn tier(&self) -> Role {
        if self.has_role(Role::Admin) {
            Role::Admin
        } else if self.has_role(Role::Moderator) {
            Role::Moderator
        } else {
            Role::User
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected by identity provider")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    subject: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: Vec<Role>,
}

/// Verifies tokens against the provider's HTTP verify endpoint.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpIdentityProvider {
    pub fn new(verify_url: String, timeout: std::time::Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Provider(err.to_string()))?;
        Ok(Self { client, verify_url })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .get(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| {
                warn!(target = "folio::auth", error = %err, "identity provider call failed");
                AuthError::Provider(err.to_string())
            })?;

        match response.status().as_u16() {
            200 => {
                let body: VerifyResponse = response
                    .json()
                    .await
                    .map_err(|err| AuthError::Provider(err.to_string()))?;
                Ok(Identity {
                    subject: body.subject,
                    name: body.name,
                    roles: body.roles,
                })
            }
            401 => Err(AuthError::InvalidToken),
            403 => Err(AuthError::Expired),
            status => Err(AuthError::Provider(format!(
                "unexpected verify status {status}"
            ))),
        }
    }
}

/// Fixed token table, for tests and local development.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: DashMap<String, Identity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(subject: &str, roles: Vec<Role>) -> Identity {
        Identity {
            subject: subject.to_string(),
            name: None,
            roles,
        }
    }

    #[test]
    fn owners_and_moderators_can_manage() {
        let owner = identity("alice", vec![Role::User]);
        assert!(owner.can_manage("alice"));
        assert!(!owner.can_manage("bob"));

        let moderator = identity("mod", vec![Role::User, Role::Moderator]);
        assert!(moderator.can_manage("bob"));

        let admin = identity("root", vec![Role::Admin]);
        assert!(admin.can_manage("bob"));
        assert!(admin.is_admin());
    }

    #[test]
    fn tier_picks_highest_role() {
        assert_eq!(identity("a", vec![Role::User]).tier(), Role::User);
        assert_eq!(
            identity("a", vec![Role::User, Role::Moderator]).tier(),
            Role::Moderator
        );
        assert_eq!(
            identity("a", vec![Role::Moderator, Role::Admin]).tier(),
            Role::Admin
        );
    }

    #[tokio::test]
    async fn static_provider_verifies_known_tokens_only() {
        let provider = StaticIdentityProvider::new();
        provider.insert("tok", identity("alice", vec![Role::User]));

        let verified = provider.verify("tok").await.expect("known token");
        assert_eq!(verified.subject, "alice");

        assert!(matches!(
            provider.verify("other").await,
            Err(AuthError::InvalidToken)
        ));
    }
}
