//! Login page context.
//!
//! Supplies the data a login template needs: the SSO buttons to render
//! and whether the username/password form stays visible. Both helpers
//! have async variants routed through the [`ExecutionAdapter`].

use crate::adapter::{Callable, ExecutionAdapter};
use crate::config::SsoConfig;
use crate::error::CapabilityError;
use crate::request::SsoRequest;
use oauth2::url::form_urlencoded;
use rootcause::prelude::Report;
use serde::Serialize;
use std::sync::Arc;

/// A login button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderButton {
    pub name: String,
    pub login_url: String,
    pub text: String,
    pub logo_url: String,
    pub css_class: String,
}

#[derive(Debug, Clone)]
pub struct LoginContext {
    config: Arc<SsoConfig>,
    login_path: String,
}

impl LoginContext {
    /// `login_path` is the mounted path of the start-login route.
    #[must_use]
    pub fn new(config: Arc<SsoConfig>, login_path: impl Into<String>) -> Self {
        Self {
            config,
            login_path: login_path.into(),
        }
    }

    /// Buttons to render. Empty when SSO is disabled.
    ///
    /// A `next` query parameter on the current request is forwarded to
    /// the login route.
    #[must_use]
    pub fn sso_providers(&self, request: &SsoRequest) -> Vec<ProviderButton> {
        if !self.config.enabled() {
            return Vec::new();
        }

        let login_url = match request.query("next") {
            Some(next) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("next", next)
                    .finish();
                format!("{}?{query}", self.login_path)
            }
            None => self.login_path.clone(),
        };

        vec![ProviderButton {
            name: "google".to_string(),
            login_url,
            text: self.config.button_text().to_string(),
            logo_url: self.config.button_logo_url().to_string(),
            css_class: "google-sso-button".to_string(),
        }]
    }

    /// Whether the username/password form is shown. Always true when SSO
    /// is disabled.
    #[must_use]
    pub fn show_form(&self, _request: &SsoRequest) -> bool {
        !self.config.enabled() || self.config.show_form()
    }

    /// Async variant of [`Self::sso_providers`].
    ///
    /// # Errors
    ///
    /// Fails if the host cannot run async code.
    pub async fn asso_providers(
        self: &Arc<Self>,
        adapter: &ExecutionAdapter,
        request: SsoRequest,
    ) -> Result<Vec<ProviderButton>, Report<CapabilityError>> {
        let context = Arc::clone(self);
        adapter
            .adapt(Callable::sync(move |request: SsoRequest| {
                context.sso_providers(&request)
            }))
            .call(request)
            .await
    }

    /// Async variant of [`Self::show_form`].
    ///
    /// # Errors
    ///
    /// Fails if the host cannot run async code.
    pub async fn ashow_form(
        self: &Arc<Self>,
        adapter: &ExecutionAdapter,
        request: SsoRequest,
    ) -> Result<bool, Report<CapabilityError>> {
        let context = Arc::clone(self);
        adapter
            .adapt(Callable::sync(move |request: SsoRequest| {
                context.show_form(&request)
            }))
            .call(request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::{Capabilities, FrameworkVersion, HostFramework};

    fn config(enabled: bool, show_form: bool) -> Arc<SsoConfig> {
        Arc::new(
            SsoConfig::builder(
                "id".to_string(),
                "secret".to_string(),
                "https://app.example.com/callback/".to_string(),
            )
            .enabled(enabled)
            .show_form(show_form)
            .build(),
        )
    }

    fn adapter(major: u16) -> ExecutionAdapter {
        let host = HostFramework::new(FrameworkVersion::new(major, 0, 0));
        ExecutionAdapter::new(&Capabilities::resolve(host).expect("resolve"))
    }

    #[test]
    fn buttons_forward_next() {
        let context = LoginContext::new(config(true, true), "/google_sso/login/");
        let request = SsoRequest::new("/login/").with_query("next", "/admin/?tab=users");

        let buttons = context.sso_providers(&request);
        assert_eq!(buttons.len(), 1);
        assert_eq!(
            buttons[0].login_url,
            "/google_sso/login/?next=%2Fadmin%2F%3Ftab%3Dusers"
        );
        assert_eq!(buttons[0].text, "Sign in with Google");
    }

    #[test]
    fn disabled_sso_shows_only_the_form() {
        let context = LoginContext::new(config(false, false), "/google_sso/login/");
        let request = SsoRequest::new("/login/");
        assert!(context.sso_providers(&request).is_empty());
        assert!(context.show_form(&request));
    }

    #[test]
    fn form_can_be_hidden() {
        let context = LoginContext::new(config(true, false), "/google_sso/login/");
        assert!(!context.show_form(&SsoRequest::default()));
    }

    #[tokio::test]
    async fn async_variants_match_sync_ones() {
        let context = Arc::new(LoginContext::new(config(true, false), "/google_sso/login/"));
        let request = SsoRequest::new("/login/");

        let buttons = context
            .asso_providers(&adapter(5), request.clone())
            .await
            .expect("buttons");
        assert_eq!(buttons, context.sso_providers(&request));
        assert!(!context.ashow_form(&adapter(5), request).await.expect("flag"));
    }

    #[tokio::test]
    async fn async_variants_need_async_support() {
        let context = Arc::new(LoginContext::new(config(true, true), "/google_sso/login/"));
        let err = context
            .ashow_form(&adapter(2), SsoRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            CapabilityError::AsyncUnsupported { .. }
        ));
    }
}
