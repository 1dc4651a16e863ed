//! Pluggable login policy.
//!
//! Hooks are plain functions injected through [`CallbackPolicy`]. Their
//! signatures carry the contract: `pre_validate` returns a `bool`,
//! `pre_create` returns a map of creation defaults, `pre_login` mutates
//! the user before it is saved.

use crate::claims::IdentityClaims;
use crate::request::SsoRequest;
use crate::user::LocalUser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub type PreValidateHook = Arc<dyn Fn(&IdentityClaims, &SsoRequest) -> bool + Send + Sync>;
pub type PreCreateHook =
    Arc<dyn Fn(&IdentityClaims, &SsoRequest) -> Map<String, Value> + Send + Sync>;
pub type PreLoginHook = Arc<dyn Fn(&mut LocalUser, &SsoRequest) + Send + Sync>;

/// Hooks run during the callback.
#[derive(Clone, Default)]
pub struct CallbackPolicy {
    pre_validate: Option<PreValidateHook>,
    pre_create: Option<PreCreateHook>,
    pre_login: Option<PreLoginHook>,
}

impl fmt::Debug for CallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPolicy")
            .field("pre_validate", &self.pre_validate.is_some())
            .field("pre_create", &self.pre_create.is_some())
            .field("pre_login", &self.pre_login.is_some())
            .finish()
    }
}

impl CallbackPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate run on the fetched claims. Returning false rejects the login.
    #[must_use]
    pub fn with_pre_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&IdentityClaims, &SsoRequest) -> bool + Send + Sync + 'static,
    {
        self.pre_validate = Some(Arc::new(hook));
        self
    }

    /// Supplies creation defaults for new users.
    #[must_use]
    pub fn with_pre_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&IdentityClaims, &SsoRequest) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.pre_create = Some(Arc::new(hook));
        self
    }

    /// Runs on the resolved user right before the session is established.
    #[must_use]
    pub fn with_pre_login<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut LocalUser, &SsoRequest) + Send + Sync + 'static,
    {
        self.pre_login = Some(Arc::new(hook));
        self
    }

    /// Runs `pre_validate`. Without a hook every identity passes.
    #[must_use]
    pub fn validate(&self, claims: &IdentityClaims, request: &SsoRequest) -> bool {
        self.pre_validate
            .as_ref()
            .is_none_or(|hook| hook(claims, request))
    }

    /// Runs `pre_create`, if set.
    #[must_use]
    pub fn creation_defaults(
        &self,
        claims: &IdentityClaims,
        request: &SsoRequest,
    ) -> Option<Map<String, Value>> {
        self.pre_create.as_ref().map(|hook| hook(claims, request))
    }

    /// Runs `pre_login`, if set.
    pub fn before_login(&self, user: &mut LocalUser, request: &SsoRequest) {
        if let Some(hook) = &self.pre_login {
            hook(user, request);
        }
    }
}

/// Rule for the username of users created at first login.
///
/// A `pre_create` hook returning a `username` always wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsernameStrategy {
    /// The full email address.
    #[default]
    Email,
    /// The part before `@`. Collides across domains.
    LocalPart,
    /// `<local part>_<provider id>`.
    LocalPartWithId,
}

impl UsernameStrategy {
    #[must_use]
    pub fn username_for(self, claims: &IdentityClaims) -> String {
        match self {
            Self::Email => claims.email.clone(),
            Self::LocalPart => claims.email_local_part().to_string(),
            Self::LocalPartWithId => format!("{}_{}", claims.email_local_part(), claims.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> IdentityClaims {
        IdentityClaims::new("42", "a@example.com")
    }

    #[test]
    fn empty_policy_allows_everything() {
        let policy = CallbackPolicy::new();
        assert!(policy.validate(&claims(), &SsoRequest::default()));
        assert!(policy
            .creation_defaults(&claims(), &SsoRequest::default())
            .is_none());
    }

    #[test]
    fn pre_validate_can_reject() {
        let policy = CallbackPolicy::new()
            .with_pre_validate(|claims, _| claims.email.ends_with("@corp.test"));
        assert!(!policy.validate(&claims(), &SsoRequest::default()));
    }

    #[test]
    fn pre_create_returns_defaults() {
        let policy = CallbackPolicy::new().with_pre_create(|claims, _| {
            let mut defaults = Map::new();
            defaults.insert(
                "username".to_string(),
                json!(format!("{}_{}", claims.email_local_part(), claims.id)),
            );
            defaults
        });

        let defaults = policy
            .creation_defaults(&claims(), &SsoRequest::default())
            .expect("defaults");
        assert_eq!(defaults["username"], "a_42");
    }

    #[test]
    fn username_strategies() {
        let claims = claims();
        assert_eq!(UsernameStrategy::Email.username_for(&claims), "a@example.com");
        assert_eq!(UsernameStrategy::LocalPart.username_for(&claims), "a");
        assert_eq!(
            UsernameStrategy::LocalPartWithId.username_for(&claims),
            "a_42"
        );
    }

    #[test]
    fn debug_output_hides_closures() {
        let policy = CallbackPolicy::new().with_pre_login(|_, _| {});
        let debug = format!("{policy:?}");
        assert!(debug.contains("pre_login: true"));
        assert!(debug.contains("pre_create: false"));
    }
}
