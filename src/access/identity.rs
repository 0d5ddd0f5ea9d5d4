//! Caller identity as seen by the cache gate.
//!
//! Token verification and session loading belong to the authentication
//! subsystem; the gate only consumes their results through
//! [`IdentityProvider`].

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::policy::RoutePolicy;

/// Result of verifying a bearer token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCheck {
    pub valid: bool,
    pub expired: bool,
    pub errored: bool,
}

impl TokenCheck {
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    pub fn is_acceptable(&self) -> bool {
        self.valid && !self.expired && !self.errored
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Anonymous,
    Authenticated,
}

/// Identity claims carried by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenIdentity {
    pub kind: SubjectKind,
    pub subject_id: u64,
}

impl TokenIdentity {
    /// An authenticated subject with a positive id.
    pub fn is_authenticated(&self) -> bool {
        self.kind == SubjectKind::Authenticated && self.subject_id > 0
    }
}

/// A loaded subject with its grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub active: bool,
    pub permissions: BTreeSet<String>,
    pub roles: BTreeSet<String>,
}

impl Subject {
    /// Every permission and every role the route requires is held.
    pub fn satisfies(&self, policy: &RoutePolicy) -> bool {
        policy.permissions.is_subset(&self.permissions) && policy.roles.is_subset(&self.roles)
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn verify_token(&self, token: &str) -> TokenCheck;

    /// `None` when the token payload is malformed.
    async fn identity_from_token(&self, token: &str) -> Option<TokenIdentity>;

    async fn load_subject(&self, token: &str) -> Option<Subject>;
}

/// Rejects every token. Suitable when no protected route is ever cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl IdentityProvider for DenyAll {
    async fn verify_token(&self, _token: &str) -> TokenCheck {
        TokenCheck::default()
    }

    async fn identity_from_token(&self, _token: &str) -> Option<TokenIdentity> {
        None
    }

    async fn load_subject(&self, _token: &str) -> Option<Subject> {
        None
    }
}
