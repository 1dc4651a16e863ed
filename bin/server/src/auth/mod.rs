//! Authentication module for the google-sso server.
//!
//! This module provides:
//! - Google sign-in routes backed by [`LoginFlow`]
//! - An in-process session registry with a cookie-carried session id
//! - The session guard middleware that ends sessions whose Google token
//!   was revoked
//! - A PostgreSQL user store

pub mod db;
pub mod middleware;
pub mod routes;
pub mod session;

use crate::config::ServerConfig;
use google_sso::compat::{self, Endpoint};
use google_sso::{
    ConfigurationError, ExecutionAdapter, GoogleProvider, IdentityProvider, LoginContext,
    LoginFlow, SessionGuard, SsoConfig, UserStore, token_validator,
};
use rootcause::prelude::Report;
use session::SessionRegistry;
use std::sync::Arc;

pub use middleware::session_guard;
pub use routes::{callback, index, login, logout};

/// Mount point of the SSO routes.
pub const SSO_PREFIX: &str = "/google_sso";

/// Default login path, used for buttons when SSO routes are not mounted.
const DEFAULT_LOGIN_PATH: &str = "/google_sso/login/";

/// Router paths of the mounted SSO routes.
#[derive(Debug, Clone, Default)]
pub struct SsoPaths {
    pub login: Option<String>,
    pub callback: Option<String>,
}

impl SsoPaths {
    /// Paths the session guard must not check.
    pub fn exempt(&self) -> Vec<String> {
        self.login.iter().chain(self.callback.iter()).cloned().collect()
    }
}

/// Shared application state.
pub struct AppState {
    /// Login and callback handling.
    pub flow: LoginFlow,
    /// Per-request token check.
    pub guard: SessionGuard,
    /// Login page helpers.
    pub context: Arc<LoginContext>,
    /// Runs sync helpers off the request task.
    pub adapter: ExecutionAdapter,
    /// Browser sessions.
    pub sessions: SessionRegistry,
    /// Where the SSO routes are mounted.
    pub paths: SsoPaths,
    /// Whether session cookies carry the Secure flag.
    pub secure_cookies: bool,
}

impl AppState {
    /// Resolves host capabilities and wires the SSO components.
    ///
    /// # Errors
    ///
    /// Fails if the host framework is unsupported or the SSO settings are
    /// malformed.
    pub fn new(
        config: &ServerConfig,
        users: Arc<dyn UserStore>,
    ) -> Result<Self, Report<ConfigurationError>> {
        let provider: Arc<dyn IdentityProvider> = Arc::new(GoogleProvider::new(&config.sso)?);
        Self::with_provider(config, users, provider)
    }

    /// Like [`AppState::new`] with a caller-supplied provider.
    ///
    /// # Errors
    ///
    /// Fails if the host framework is unsupported.
    pub fn with_provider(
        config: &ServerConfig,
        users: Arc<dyn UserStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, Report<ConfigurationError>> {
        let capabilities = compat::init(config.framework)?;
        let (registrar, legacy) = capabilities.url_registrar();
        tracing::info!(
            host = %capabilities.host().version(),
            legacy_routing = legacy,
            async_capable = capabilities.async_capable(),
            "resolved host capabilities"
        );

        let sso: Arc<SsoConfig> = Arc::new(config.sso.clone());
        let mut paths = SsoPaths::default();
        for route in compat::sso_routes(registrar, sso.enabled()) {
            let path = registrar.router_path(SSO_PREFIX, &route.declaration);
            tracing::debug!(name = route.name, path = %path, "mounting sso route");
            match route.endpoint {
                Endpoint::StartLogin => paths.login = Some(path),
                Endpoint::Callback => paths.callback = Some(path),
            }
        }

        let adapter = ExecutionAdapter::new(capabilities);
        let guard = SessionGuard::new(&adapter, token_validator(Arc::clone(&provider)))
            .with_exempt_paths(paths.exempt());
        let context = Arc::new(LoginContext::new(
            Arc::clone(&sso),
            paths.login.as_deref().unwrap_or(DEFAULT_LOGIN_PATH),
        ));
        let flow = LoginFlow::new(sso, capabilities, provider, users);

        Ok(Self {
            flow,
            guard,
            context,
            adapter,
            sessions: SessionRegistry::new(
                config.session.duration_minutes,
                config.session.anonymous_duration_minutes,
            ),
            paths,
            secure_cookies: config.session.secure_cookies,
        })
    }
}
