//! OAuth login state machine.
//!
//! ```text
//! Anonymous -> LoginStarted -> CallbackReceived -> TokenExchanged
//!           -> ClaimsFetched -> UserResolved -> Authenticated
//! ```
//!
//! Any step may end in `Rejected`. Rejections redirect to the configured
//! failure URL with a flash message; store failures fail the request.

use crate::claims::IdentityClaims;
use crate::compat::Capabilities;
use crate::config::SsoConfig;
use crate::error::{LoginError, ProviderError, StoreError};
use crate::notify::{Notifier, SessionMessages, Severity};
use crate::policy::CallbackPolicy;
use crate::provider::IdentityProvider;
use crate::request::SsoRequest;
use crate::session::{PendingLogin, SessionStore};
use crate::user::{LocalUser, NewUser, UserStore};
use chrono::Utc;
use rootcause::prelude::Report;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Where a login attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Anonymous,
    LoginStarted,
    CallbackReceived,
    TokenExchanged,
    ClaimsFetched,
    UserResolved,
    Authenticated,
    Rejected,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Anonymous => "anonymous",
            Self::LoginStarted => "login_started",
            Self::CallbackReceived => "callback_received",
            Self::TokenExchanged => "token_exchanged",
            Self::ClaimsFetched => "claims_fetched",
            Self::UserResolved => "user_resolved",
            Self::Authenticated => "authenticated",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Query parameters of the provider callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// A finished login.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: LocalUser,
    pub created: bool,
    pub redirect_to: String,
}

/// Result of handling a callback.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    Authenticated(Authenticated),
    Rejected {
        error: LoginError,
        /// Last state reached before the rejection.
        at: LoginState,
        redirect_to: String,
    },
}

impl CallbackOutcome {
    /// Final state of the attempt.
    #[must_use]
    pub fn state(&self) -> LoginState {
        match self {
            Self::Authenticated(_) => LoginState::Authenticated,
            Self::Rejected { .. } => LoginState::Rejected,
        }
    }

    #[must_use]
    pub fn redirect_to(&self) -> &str {
        match self {
            Self::Authenticated(done) => &done.redirect_to,
            Self::Rejected { redirect_to, .. } => redirect_to,
        }
    }
}

/// Returns `next` if it is a local path.
fn safe_next(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    let local = next.starts_with('/')
        && !next.starts_with("//")
        && !next.starts_with("/\\")
        && !next.chars().any(char::is_control);
    local.then(|| next.to_string())
}

/// Drives the login and callback steps.
pub struct LoginFlow {
    config: Arc<SsoConfig>,
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
    policy: CallbackPolicy,
    notifier: Arc<dyn Notifier>,
    email_field: String,
}

impl fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginFlow")
            .field("policy", &self.policy)
            .field("email_field", &self.email_field)
            .finish_non_exhaustive()
    }
}

impl LoginFlow {
    /// Creates a flow. The email field is resolved once, here.
    pub fn new(
        config: Arc<SsoConfig>,
        capabilities: &Capabilities,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let email_field = capabilities.email_field_name(users.model());
        let notifier = Arc::new(SessionMessages::new(config.enable_messages()));
        Self {
            config,
            provider,
            users,
            policy: CallbackPolicy::default(),
            notifier,
            email_field,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    #[must_use]
    pub fn email_field(&self) -> &str {
        &self.email_field
    }

    /// Starts a login: stores the pending record and returns the provider
    /// redirect URL.
    ///
    /// A previous pending login in the same session is replaced.
    pub fn start_login(&self, request: &SsoRequest, session: &mut dyn SessionStore) -> String {
        let authorization = self.provider.authorization_request();
        session.set_pending_login(&PendingLogin {
            state: authorization.state,
            pkce_verifier: authorization.pkce_verifier,
            next: safe_next(request.query("next")),
        });
        tracing::debug!(state = %LoginState::LoginStarted, "redirecting to provider");
        authorization.url
    }

    /// Handles the provider callback.
    ///
    /// # Errors
    ///
    /// Only store failures are returned. Every other failure becomes
    /// `CallbackOutcome::Rejected`.
    pub async fn handle_callback(
        &self,
        request: &SsoRequest,
        params: &CallbackParams,
        session: &mut dyn SessionStore,
    ) -> Result<CallbackOutcome, Report<LoginError>> {
        let mut state = LoginState::Anonymous;
        match self.authenticate(request, params, session, &mut state).await {
            Ok(authenticated) => {
                self.notifier.notify(
                    request,
                    session,
                    &format!("Welcome, {}!", authenticated.user.email),
                    Severity::Success,
                );
                Ok(CallbackOutcome::Authenticated(authenticated))
            }
            Err(report) if report.current_context().is_rejection() => {
                let error = report.current_context().clone();
                tracing::warn!(
                    at = %state,
                    kind = error.kind(),
                    error = %error,
                    "login rejected"
                );
                self.notifier
                    .notify(request, session, &error.user_message(), Severity::Error);
                Ok(CallbackOutcome::Rejected {
                    error,
                    at: state,
                    redirect_to: self.config.login_failed_url().to_string(),
                })
            }
            Err(report) => {
                tracing::error!(at = %state, error = %report.current_context(), "login failed");
                Err(report)
            }
        }
    }

    async fn authenticate(
        &self,
        request: &SsoRequest,
        params: &CallbackParams,
        session: &mut dyn SessionStore,
        state: &mut LoginState,
    ) -> Result<Authenticated, Report<LoginError>> {
        let Some(pending) = session.take_pending_login() else {
            return Err(LoginError::CsrfMismatch.into());
        };
        *state = LoginState::LoginStarted;

        if params.state.as_deref() != Some(pending.state.as_str()) {
            return Err(LoginError::CsrfMismatch.into());
        }
        *state = LoginState::CallbackReceived;

        if let Some(error) = &params.error {
            return Err(provider_failure(ProviderError::Denied {
                error: error.clone(),
            }));
        }
        let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) else {
            return Err(provider_failure(ProviderError::MissingCode));
        };

        let token = self
            .provider
            .exchange_code(code, &pending.pkce_verifier)
            .await
            .map_err(|report| provider_failure(report.current_context().clone()))?;
        *state = LoginState::TokenExchanged;

        let claims = self
            .provider
            .fetch_claims(&token)
            .await
            .map_err(|report| provider_failure(report.current_context().clone()))?;
        *state = LoginState::ClaimsFetched;

        self.check_identity(&claims, request)?;

        let (mut user, created) = self.resolve_user(&claims, request).await?;
        *state = LoginState::UserResolved;

        if self.config.is_superuser_email(&user.email) {
            user.is_superuser = true;
            user.is_staff = true;
        } else if self.config.is_staff_email(&user.email) {
            user.is_staff = true;
        }
        self.policy.before_login(&mut user, request);
        user.last_login = Some(Utc::now());
        self.users.save(&user).await.map_err(store_failure)?;

        session.login(user.id);
        session.set_provider_token(&token);
        *state = LoginState::Authenticated;

        tracing::info!(user_id = %user.id, email = %user.email, created, "user logged in");

        Ok(Authenticated {
            user,
            created,
            redirect_to: pending
                .next
                .unwrap_or_else(|| self.config.next_url().to_string()),
        })
    }

    fn check_identity(
        &self,
        claims: &IdentityClaims,
        request: &SsoRequest,
    ) -> Result<(), Report<LoginError>> {
        let domain = claims.email_domain().unwrap_or_default();
        if !self.config.domain_allowed(&domain) {
            return Err(LoginError::ValidationDenied {
                email: claims.email.clone(),
                reason: format!("domain '{domain}' is not allowed"),
            }
            .into());
        }

        if !self.policy.validate(claims, request) {
            return Err(LoginError::ValidationDenied {
                email: claims.email.clone(),
                reason: "refused by pre-validation hook".to_string(),
            }
            .into());
        }

        Ok(())
    }

    async fn resolve_user(
        &self,
        claims: &IdentityClaims,
        request: &SsoRequest,
    ) -> Result<(LocalUser, bool), Report<LoginError>> {
        if let Some(mut user) = self.find_user(&claims.email).await? {
            if self.config.always_update_user_data() {
                user.apply_names(claims);
            }
            return Ok((user, false));
        }

        if !self.config.allow_creation() {
            return Err(LoginError::UserNotFound {
                email: claims.email.clone(),
            }
            .into());
        }

        let mut new_user =
            NewUser::new(self.config.username_strategy().username_for(claims), claims.email.clone())
                .with_names(claims);
        if let Some(defaults) = self.policy.creation_defaults(claims, request) {
            new_user.merge_defaults(defaults);
        }

        match self.users.create(new_user).await {
            Ok(user) => Ok((user, true)),
            Err(report) if matches!(report.current_context(), StoreError::UniqueViolation { .. }) => {
                tracing::warn!(
                    email = %claims.email,
                    error = %report.current_context(),
                    "concurrent user creation, retrying lookup"
                );
                match self.find_user(&claims.email).await? {
                    Some(user) => Ok((user, false)),
                    None => Err(store_failure(report)),
                }
            }
            Err(report) => Err(store_failure(report)),
        }
    }

    async fn find_user(&self, email: &str) -> Result<Option<LocalUser>, Report<LoginError>> {
        self.users
            .find_by_email(&self.email_field, email)
            .await
            .map_err(store_failure)
    }
}

fn provider_failure(err: ProviderError) -> Report<LoginError> {
    LoginError::Provider(err).into()
}

fn store_failure(report: Report<StoreError>) -> Report<LoginError> {
    LoginError::Store(report.current_context().clone()).into()
}
