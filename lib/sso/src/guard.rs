//! Session guard.
//!
//! Checks the provider token stored at login on every request and ends
//! the session once the provider stops accepting it. Sessions without a
//! token are left alone.

use crate::adapter::{Adapted, Callable, ExecutionAdapter};
use crate::claims::ProviderToken;
use crate::error::CapabilityError;
use crate::session::SessionStore;
use rootcause::prelude::Report;
use std::fmt;

/// What the guard did to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Exempt path or no provider token: nothing checked.
    Skipped,
    /// Token still accepted.
    Valid,
    /// Token refused: the session was ended.
    Ended,
}

pub struct SessionGuard {
    validator: Adapted<ProviderToken, bool>,
    exempt_paths: Vec<String>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("exempt_paths", &self.exempt_paths)
            .finish_non_exhaustive()
    }
}

impl SessionGuard {
    /// Creates a guard around `validator`, adapted to the host's
    /// execution mode.
    pub fn new(adapter: &ExecutionAdapter, validator: Callable<ProviderToken, bool>) -> Self {
        Self {
            validator: adapter.adapt(validator),
            exempt_paths: Vec::new(),
        }
    }

    /// Paths that are never checked, typically the login and callback
    /// routes.
    #[must_use]
    pub fn with_exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.exempt_paths = paths;
        self
    }

    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| exempt == path)
    }

    /// Checks `session` from an async caller.
    ///
    /// # Errors
    ///
    /// Fails if the validator is synchronous and the host cannot offload
    /// it.
    pub async fn enforce(
        &self,
        path: &str,
        session: &mut dyn SessionStore,
    ) -> Result<GuardOutcome, Report<CapabilityError>> {
        let Some(token) = self.token_to_check(path, session) else {
            return Ok(GuardOutcome::Skipped);
        };
        let valid = self.validator.call(token).await?;
        Ok(Self::apply(valid, session))
    }

    /// Checks `session` from a synchronous caller.
    ///
    /// # Errors
    ///
    /// Fails if an async validator needs a runtime and none can be
    /// started.
    pub fn enforce_blocking(
        &self,
        path: &str,
        session: &mut dyn SessionStore,
    ) -> Result<GuardOutcome, Report<CapabilityError>> {
        let Some(token) = self.token_to_check(path, session) else {
            return Ok(GuardOutcome::Skipped);
        };
        let valid = self.validator.call_blocking(token)?;
        Ok(Self::apply(valid, session))
    }

    fn token_to_check(&self, path: &str, session: &dyn SessionStore) -> Option<ProviderToken> {
        if self.is_exempt(path) {
            return None;
        }
        session.provider_token()
    }

    fn apply(valid: bool, session: &mut dyn SessionStore) -> GuardOutcome {
        if valid {
            return GuardOutcome::Valid;
        }

        tracing::info!(user_id = ?session.user_id(), "provider token refused, ending session");
        session.end_session();
        GuardOutcome::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::{Capabilities, FrameworkVersion, HostFramework};
    use crate::session::SessionData;
    use google_sso_core::UserId;

    fn adapter(major: u16) -> ExecutionAdapter {
        let host = HostFramework::new(FrameworkVersion::new(major, 0, 0));
        ExecutionAdapter::new(&Capabilities::resolve(host).expect("resolve"))
    }

    fn logged_in(token: &str) -> SessionData {
        let mut session = SessionData::new();
        session.login(UserId::new());
        session.set_provider_token(&ProviderToken::new(token));
        session
    }

    fn accepts_only(good: &'static str) -> Callable<ProviderToken, bool> {
        Callable::from_async(move |token: ProviderToken| async move { token.secret() == good })
    }

    #[tokio::test]
    async fn valid_token_keeps_the_session() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"));
        let mut session = logged_in("good");

        let outcome = guard.enforce("/", &mut session).await.expect("enforce");
        assert_eq!(outcome, GuardOutcome::Valid);
        assert!(session.user_id().is_some());
    }

    #[tokio::test]
    async fn refused_token_ends_the_session() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"));
        let mut session = logged_in("revoked");

        let outcome = guard.enforce("/", &mut session).await.expect("enforce");
        assert_eq!(outcome, GuardOutcome::Ended);
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn sessions_without_token_are_skipped() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"));
        let mut session = SessionData::new();
        session.login(UserId::new());

        let outcome = guard.enforce("/", &mut session).await.expect("enforce");
        assert_eq!(outcome, GuardOutcome::Skipped);
        assert!(session.user_id().is_some());
    }

    #[tokio::test]
    async fn exempt_paths_are_not_checked() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"))
            .with_exempt_paths(vec!["/google_sso/callback/".to_string()]);
        let mut session = logged_in("revoked");

        let outcome = guard
            .enforce("/google_sso/callback/", &mut session)
            .await
            .expect("enforce");
        assert_eq!(outcome, GuardOutcome::Skipped);
        assert!(!session.is_empty());
    }

    #[tokio::test]
    async fn sync_validator_is_offloaded() {
        let guard = SessionGuard::new(
            &adapter(5),
            Callable::sync(|token: ProviderToken| token.secret() == "good"),
        );
        let mut session = logged_in("revoked");

        let outcome = guard.enforce("/", &mut session).await.expect("enforce");
        assert_eq!(outcome, GuardOutcome::Ended);
    }

    #[tokio::test]
    async fn sync_validator_on_legacy_host_fails_when_awaited() {
        let guard = SessionGuard::new(
            &adapter(2),
            Callable::sync(|token: ProviderToken| token.secret() == "good"),
        );
        let mut session = logged_in("good");

        let err = guard.enforce("/", &mut session).await.unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::AsyncUnsupported { .. }
        ));
        assert!(session.user_id().is_some());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blocking_enforcement_inside_a_current_thread_runtime_fails_cleanly() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"));
        let mut session = logged_in("revoked");

        let err = guard.enforce_blocking("/", &mut session).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::RuntimeBridgeUnavailable { .. }
        ));
        assert!(session.user_id().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocking_enforcement_on_a_worker_thread_ends_the_session() {
        let guard = SessionGuard::new(&adapter(5), accepts_only("good"));
        let mut session = logged_in("revoked");

        let outcome = guard.enforce_blocking("/", &mut session).expect("enforce");
        assert_eq!(outcome, GuardOutcome::Ended);
    }

    #[test]
    fn blocking_enforcement_runs_async_validators() {
        let guard = SessionGuard::new(&adapter(2), accepts_only("good"));
        let mut session = logged_in("revoked");

        let outcome = guard
            .enforce_blocking("/", &mut session)
            .expect("enforce");
        assert_eq!(outcome, GuardOutcome::Ended);
    }
}
