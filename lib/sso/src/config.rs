//! Google SSO configuration.
//!
//! Loaded by the host (the server reads it from `SSO__*` environment
//! variables). Fields with defaults can be omitted. List-valued settings
//! are comma-separated strings so they map cleanly onto environment
//! variables.

use crate::policy::UsernameStrategy;
use serde::{Deserialize, Serialize};

/// Google's production authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's production token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google's userinfo endpoint. Returns `id`, `email`, `given_name`, `family_name`.
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Configuration for Google single sign-on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Whether the login and callback routes are registered at all.
    #[serde(default = "default_true")]
    enabled: bool,
    /// OAuth2 client ID from the Google Cloud console.
    client_id: String,
    /// OAuth2 client secret.
    client_secret: String,
    /// Absolute callback URL registered with Google.
    redirect_uri: String,
    /// Scopes to request, comma-separated.
    /// Default: "openid,email,profile"
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Whether login feedback is stored as flash messages.
    #[serde(default = "default_true")]
    enable_messages: bool,
    /// Whether unknown identities get a local user on first login.
    #[serde(default = "default_true")]
    allow_creation: bool,
    /// Where to go after a successful login.
    #[serde(default = "default_root")]
    next_url: String,
    /// Where to go after a rejected login.
    #[serde(default = "default_root")]
    login_failed_url: String,
    /// Email domains allowed to log in, comma-separated. Empty allows all.
    #[serde(default)]
    allowable_domains: String,
    /// Emails granted staff status on login. `*` grants everyone.
    #[serde(default)]
    staff_list: String,
    /// Emails granted superuser status on login. `*` grants everyone.
    #[serde(default)]
    superuser_list: String,
    /// Refresh names from the claims on every login, not only on creation.
    #[serde(default)]
    always_update_user_data: bool,
    /// How usernames are generated for new users.
    #[serde(default)]
    username_strategy: UsernameStrategy,
    /// Whether the username/password form is shown next to the SSO button.
    #[serde(default = "default_true")]
    show_form: bool,
    /// Label of the login button.
    #[serde(default = "default_button_text")]
    button_text: String,
    /// Logo shown on the login button.
    #[serde(default = "default_button_logo_url")]
    button_logo_url: String,
    /// Optional `prompt` parameter, e.g. "select_account".
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default = "default_auth_url")]
    auth_url: String,
    #[serde(default = "default_token_url")]
    token_url: String,
    #[serde(default = "default_userinfo_url")]
    userinfo_url: String,
}

fn default_true() -> bool {
    true
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

fn default_root() -> String {
    "/".to_string()
}

fn default_button_text() -> String {
    "Sign in with Google".to_string()
}

fn default_button_logo_url() -> String {
    "https://developers.google.com/identity/images/g-logo.png".to_string()
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn list_matches(raw: &str, email: &str) -> bool {
    split_list(raw)
        .iter()
        .any(|entry| *entry == "*" || entry.eq_ignore_ascii_case(email))
}

impl SsoConfig {
    /// Creates a configuration with defaults for optional fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        SsoConfigBuilder::new(client_id, client_secret, redirect_uri).build()
    }

    #[must_use]
    pub fn builder(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> SsoConfigBuilder {
        SsoConfigBuilder::new(client_id, client_secret, redirect_uri)
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes to request.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        split_list(&self.scopes)
    }

    #[must_use]
    pub fn enable_messages(&self) -> bool {
        self.enable_messages
    }

    #[must_use]
    pub fn allow_creation(&self) -> bool {
        self.allow_creation
    }

    #[must_use]
    pub fn next_url(&self) -> &str {
        &self.next_url
    }

    #[must_use]
    pub fn login_failed_url(&self) -> &str {
        &self.login_failed_url
    }

    #[must_use]
    pub fn allowable_domains(&self) -> Vec<&str> {
        split_list(&self.allowable_domains)
    }

    /// Returns true if `domain` may log in.
    #[must_use]
    pub fn domain_allowed(&self, domain: &str) -> bool {
        let allowed = self.allowable_domains();
        allowed.is_empty()
            || allowed
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(domain))
    }

    #[must_use]
    pub fn is_staff_email(&self, email: &str) -> bool {
        list_matches(&self.staff_list, email)
    }

    #[must_use]
    pub fn is_superuser_email(&self, email: &str) -> bool {
        list_matches(&self.superuser_list, email)
    }

    #[must_use]
    pub fn always_update_user_data(&self) -> bool {
        self.always_update_user_data
    }

    #[must_use]
    pub fn username_strategy(&self) -> UsernameStrategy {
        self.username_strategy
    }

    #[must_use]
    pub fn show_form(&self) -> bool {
        self.show_form
    }

    #[must_use]
    pub fn button_text(&self) -> &str {
        &self.button_text
    }

    #[must_use]
    pub fn button_logo_url(&self) -> &str {
        &self.button_logo_url
    }

    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    #[must_use]
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    #[must_use]
    pub fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }
}

/// Builder for `SsoConfig`.
#[derive(Debug)]
pub struct SsoConfigBuilder {
    config: SsoConfig,
}

impl SsoConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            config: SsoConfig {
                enabled: true,
                client_id,
                client_secret,
                redirect_uri,
                scopes: default_scopes(),
                enable_messages: true,
                allow_creation: true,
                next_url: default_root(),
                login_failed_url: default_root(),
                allowable_domains: String::new(),
                staff_list: String::new(),
                superuser_list: String::new(),
                always_update_user_data: false,
                username_strategy: UsernameStrategy::default(),
                show_form: true,
                button_text: default_button_text(),
                button_logo_url: default_button_logo_url(),
                prompt: None,
                auth_url: default_auth_url(),
                token_url: default_token_url(),
                userinfo_url: default_userinfo_url(),
            },
        }
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Replaces the requested scopes.
    #[must_use]
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.config.scopes = scopes.join(",");
        self
    }

    #[must_use]
    pub fn enable_messages(mut self, enabled: bool) -> Self {
        self.config.enable_messages = enabled;
        self
    }

    #[must_use]
    pub fn allow_creation(mut self, allowed: bool) -> Self {
        self.config.allow_creation = allowed;
        self
    }

    #[must_use]
    pub fn next_url(mut self, url: String) -> Self {
        self.config.next_url = url;
        self
    }

    #[must_use]
    pub fn login_failed_url(mut self, url: String) -> Self {
        self.config.login_failed_url = url;
        self
    }

    #[must_use]
    pub fn allowable_domains(mut self, domains: Vec<String>) -> Self {
        self.config.allowable_domains = domains.join(",");
        self
    }

    #[must_use]
    pub fn staff_list(mut self, emails: Vec<String>) -> Self {
        self.config.staff_list = emails.join(",");
        self
    }

    #[must_use]
    pub fn superuser_list(mut self, emails: Vec<String>) -> Self {
        self.config.superuser_list = emails.join(",");
        self
    }

    #[must_use]
    pub fn always_update_user_data(mut self, enabled: bool) -> Self {
        self.config.always_update_user_data = enabled;
        self
    }

    #[must_use]
    pub fn username_strategy(mut self, strategy: UsernameStrategy) -> Self {
        self.config.username_strategy = strategy;
        self
    }

    #[must_use]
    pub fn show_form(mut self, show: bool) -> Self {
        self.config.show_form = show;
        self
    }

    #[must_use]
    pub fn prompt(mut self, prompt: Option<String>) -> Self {
        self.config.prompt = prompt;
        self
    }

    /// Points every provider endpoint at `base`, e.g. a local mock server.
    #[must_use]
    pub fn endpoints_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.auth_url = format!("{base}/o/oauth2/v2/auth");
        self.config.token_url = format!("{base}/token");
        self.config.userinfo_url = format!("{base}/oauth2/v2/userinfo");
        self
    }

    #[must_use]
    pub fn build(self) -> SsoConfig {
        self.config
    }
}
