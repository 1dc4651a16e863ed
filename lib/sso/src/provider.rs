//! Identity provider client.
//!
//! [`GoogleProvider`] talks to Google's OAuth2 endpoints with the `oauth2`
//! crate for the authorization-code flow (with PKCE) and plain `reqwest`
//! for the userinfo endpoint.

use crate::adapter::Callable;
use crate::claims::{IdentityClaims, ProviderToken};
use crate::config::SsoConfig;
use crate::error::{ConfigurationError, ProviderError, ProviderStage};
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::url::Url;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use rootcause::prelude::Report;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect to the provider plus the values to remember until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce_verifier: String,
}

/// An OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the authorization redirect with a fresh state and PKCE pair.
    fn authorization_request(&self) -> AuthorizationRequest;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderToken, Report<ProviderError>>;

    /// Fetches the identity behind `token`.
    async fn fetch_claims(
        &self,
        token: &ProviderToken,
    ) -> Result<IdentityClaims, Report<ProviderError>>;

    /// Asks the provider whether `token` is still accepted.
    ///
    /// `Ok(false)` means the provider refused it. `Err` means no answer
    /// was obtained.
    async fn validate_token(&self, token: &ProviderToken) -> Result<bool, Report<ProviderError>>;
}

/// Wraps `provider` as a session-guard validator.
///
/// Tokens the provider cannot be asked about count as invalid.
pub fn token_validator(provider: Arc<dyn IdentityProvider>) -> Callable<ProviderToken, bool> {
    Callable::from_async(move |token: ProviderToken| {
        let provider = Arc::clone(&provider);
        async move {
            match provider.validate_token(&token).await {
                Ok(valid) => valid,
                Err(report) => {
                    tracing::warn!(
                        token = %token,
                        error = %report.current_context(),
                        "token validation failed, treating token as invalid"
                    );
                    false
                }
            }
        }
    })
}

/// Google OAuth2 client.
pub struct GoogleProvider {
    client_id: ClientId,
    client_secret: ClientSecret,
    auth_url: AuthUrl,
    token_url: TokenUrl,
    redirect_url: RedirectUrl,
    userinfo_url: Url,
    scopes: Vec<String>,
    prompt: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("client_id", &self.client_id.as_str())
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("userinfo_url", &self.userinfo_url.as_str())
            .finish_non_exhaustive()
    }
}

fn invalid(name: &'static str, reason: impl std::fmt::Display) -> Report<ConfigurationError> {
    ConfigurationError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
    .into()
}

impl GoogleProvider {
    /// Creates a client from `config`.
    ///
    /// # Errors
    ///
    /// Fails if an endpoint URL is malformed or the HTTP client cannot be
    /// built.
    pub fn new(config: &SsoConfig) -> Result<Self, Report<ConfigurationError>> {
        if config.client_id().is_empty() {
            return Err(invalid("sso.client_id", "must not be empty"));
        }

        let auth_url = AuthUrl::new(config.auth_url().to_string())
            .map_err(|e| invalid("sso.auth_url", e))?;
        let token_url = TokenUrl::new(config.token_url().to_string())
            .map_err(|e| invalid("sso.token_url", e))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| invalid("sso.redirect_uri", e))?;
        let userinfo_url =
            Url::parse(config.userinfo_url()).map_err(|e| invalid("sso.userinfo_url", e))?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| invalid("sso.http_client", e))?;

        Ok(Self {
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            auth_url,
            token_url,
            redirect_url,
            userinfo_url,
            scopes: config.scopes().into_iter().map(str::to_string).collect(),
            prompt: config.prompt().map(str::to_string),
            http,
        })
    }

    async fn get_userinfo(
        &self,
        token: &ProviderToken,
        stage: ProviderStage,
    ) -> Result<reqwest::Response, Report<ProviderError>> {
        self.http
            .get(self.userinfo_url.as_str())
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| {
                ProviderError::Transport {
                    stage,
                    details: e.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_request(&self) -> AuthorizationRequest {
        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut request = client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge)
            .add_extra_param("access_type", "online");

        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if let Some(prompt) = &self.prompt {
            request = request.add_extra_param("prompt", prompt.clone());
        }

        let (url, csrf_token) = request.url();

        AuthorizationRequest {
            url: url.to_string(),
            state: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    #[instrument(skip(self, code, pkce_verifier))]
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderToken, Report<ProviderError>> {
        const STAGE: ProviderStage = ProviderStage::TokenExchange;

        let client = BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(self.token_url.clone())
            .set_redirect_uri(self.redirect_url.clone());

        let response = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| {
                let err = match e {
                    RequestTokenError::ServerResponse(response) => ProviderError::ErrorResponse {
                        stage: STAGE,
                        error: response.to_string(),
                    },
                    RequestTokenError::Request(e) => ProviderError::Transport {
                        stage: STAGE,
                        details: e.to_string(),
                    },
                    RequestTokenError::Parse(e, _) => ProviderError::Decode {
                        stage: STAGE,
                        details: e.to_string(),
                    },
                    RequestTokenError::Other(details) => ProviderError::ErrorResponse {
                        stage: STAGE,
                        error: details,
                    },
                };
                Report::from(err)
            })?;

        let token = ProviderToken::new(response.access_token().secret().clone());
        tracing::debug!(token = %token, "exchanged authorization code");
        Ok(token)
    }

    #[instrument(skip(self, token))]
    async fn fetch_claims(
        &self,
        token: &ProviderToken,
    ) -> Result<IdentityClaims, Report<ProviderError>> {
        const STAGE: ProviderStage = ProviderStage::ClaimsFetch;

        let response = self.get_userinfo(token, STAGE).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                stage: STAGE,
                status: status.as_u16(),
            }
            .into());
        }

        response.json::<IdentityClaims>().await.map_err(|e| {
            ProviderError::Decode {
                stage: STAGE,
                details: e.to_string(),
            }
            .into()
        })
    }

    #[instrument(skip(self, token))]
    async fn validate_token(&self, token: &ProviderToken) -> Result<bool, Report<ProviderError>> {
        let response = self
            .get_userinfo(token, ProviderStage::TokenValidation)
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "provider refused token");
        }
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SsoConfig {
        SsoConfig::builder(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/google_sso/callback/".to_string(),
        )
        .prompt(Some("select_account".to_string()))
        .build()
    }

    #[test]
    fn authorization_url_carries_state_pkce_and_scopes() {
        let provider = GoogleProvider::new(&config()).expect("provider");
        let request = provider.authorization_request();

        let url = Url::parse(&request.url).expect("url");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert!(request.url.starts_with(crate::config::GOOGLE_AUTH_URL));
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(
            params["redirect_uri"],
            "https://app.example.com/google_sso/callback/"
        );
        assert!(!request.pkce_verifier.is_empty());
    }

    #[test]
    fn every_request_gets_a_fresh_state() {
        let provider = GoogleProvider::new(&config()).expect("provider");
        let first = provider.authorization_request();
        let second = provider.authorization_request();
        assert_ne!(first.state, second.state);
        assert_ne!(first.pkce_verifier, second.pkce_verifier);
    }

    #[test]
    fn malformed_redirect_uri_is_a_configuration_error() {
        let config = SsoConfig::new(
            "client-id".to_string(),
            "secret".to_string(),
            "not a url".to_string(),
        );
        let err = GoogleProvider::new(&config).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConfigurationError::InvalidSetting { name: "sso.redirect_uri", .. }
        ));
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let config = SsoConfig::new(
            String::new(),
            "secret".to_string(),
            "https://app.example.com/callback/".to_string(),
        );
        assert!(GoogleProvider::new(&config).is_err());
    }
}
