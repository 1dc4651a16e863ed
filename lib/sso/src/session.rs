//! Session storage contract.
//!
//! The host owns session persistence. The SSO layer only needs a small
//! key-value view plus the ability to log a user in and to end the
//! session.

use crate::claims::ProviderToken;
use crate::notify::Severity;
use google_sso_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Session key of the provider access token.
pub const TOKEN_KEY: &str = "google_sso_access_token";

/// Session key of the in-flight login record.
pub const PENDING_LOGIN_KEY: &str = "google_sso_pending_login";

/// Session key of queued flash messages.
pub const MESSAGES_KEY: &str = "google_sso_messages";

/// State stored between the redirect to the provider and the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Anti-forgery token echoed back by the provider.
    pub state: String,
    /// PKCE verifier for the token exchange.
    pub pkce_verifier: String,
    /// Local redirect target after login.
    pub next: Option<String>,
}

/// A message shown to the browser user on the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub severity: Severity,
    pub message: String,
}

/// Per-browser session storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value);

    fn remove(&mut self, key: &str) -> Option<Value>;

    /// Binds the session to `user_id`.
    fn login(&mut self, user_id: UserId);

    /// The logged-in user, if any.
    fn user_id(&self) -> Option<UserId>;

    /// Logs out and clears all session data.
    fn end_session(&mut self);

    fn provider_token(&self) -> Option<ProviderToken> {
        self.get(TOKEN_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    fn set_provider_token(&mut self, token: &ProviderToken) {
        self.set(TOKEN_KEY, Value::String(token.secret().to_string()));
    }

    fn set_pending_login(&mut self, pending: &PendingLogin) {
        if let Ok(value) = serde_json::to_value(pending) {
            self.set(PENDING_LOGIN_KEY, value);
        }
    }

    /// Removes and returns the pending login. A second call returns `None`.
    fn take_pending_login(&mut self) -> Option<PendingLogin> {
        self.remove(PENDING_LOGIN_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    fn push_message(&mut self, message: FlashMessage) {
        let mut queued = self.peek_messages();
        queued.push(message);
        if let Ok(value) = serde_json::to_value(queued) {
            self.set(MESSAGES_KEY, value);
        }
    }

    fn peek_messages(&self) -> Vec<FlashMessage> {
        self.get(MESSAGES_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Removes and returns queued flash messages.
    fn take_messages(&mut self) -> Vec<FlashMessage> {
        self.remove(MESSAGES_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

/// A session held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    values: HashMap<String, Value>,
    user_id: Option<UserId>,
}

impl SessionData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the session holds nothing worth persisting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.user_id.is_none()
    }
}

impl SessionStore for SessionData {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    fn login(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
    }

    fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    fn end_session(&mut self) {
        self.values.clear();
        self.user_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_login_is_single_use() {
        let mut session = SessionData::new();
        session.set_pending_login(&PendingLogin {
            state: "abc".to_string(),
            pkce_verifier: "verifier".to_string(),
            next: Some("/admin/".to_string()),
        });

        let pending = session.take_pending_login().expect("pending login");
        assert_eq!(pending.state, "abc");
        assert!(session.take_pending_login().is_none());
    }

    #[test]
    fn provider_token_round_trips_through_the_session() {
        let mut session = SessionData::new();
        assert!(session.provider_token().is_none());

        session.set_provider_token(&ProviderToken::new("ya29.token-value"));
        assert_eq!(
            session.provider_token().map(|t| t.secret().to_string()),
            Some("ya29.token-value".to_string())
        );
    }

    #[test]
    fn end_session_clears_everything() {
        let mut session = SessionData::new();
        let user_id = UserId::new();
        session.login(user_id);
        session.set_provider_token(&ProviderToken::new("token"));
        assert_eq!(session.user_id(), Some(user_id));

        session.end_session();

        assert!(session.is_empty());
        assert!(session.provider_token().is_none());
    }

    #[test]
    fn flash_messages_queue_and_drain() {
        let mut session = SessionData::new();
        session.push_message(FlashMessage {
            severity: Severity::Info,
            message: "first".to_string(),
        });
        session.push_message(FlashMessage {
            severity: Severity::Error,
            message: "second".to_string(),
        });

        let messages = session.take_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].message, "second");
        assert!(session.take_messages().is_empty());
    }
}
