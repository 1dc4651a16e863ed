#![allow(dead_code)]

use google_sso::SsoConfig;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCESS_TOKEN: &str = "ya29.mock-access-token";

/// Google's token and userinfo endpoints on a local mock server.
pub struct MockGoogle {
    server: MockServer,
}

impl MockGoogle {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn config(&self) -> google_sso::config::SsoConfigBuilder {
        SsoConfig::builder(
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/google_sso/callback/".to_string(),
        )
        .endpoints_base(&self.server.uri())
    }

    pub async fn token_success(&self) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ACCESS_TOKEN,
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "openid email profile"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn token_error(&self, error: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": error,
                "error_description": "Bad Request"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn userinfo(&self, id: &str, email: &str) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v2/userinfo"))
            .and(header("authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "email": email,
                "verified_email": true,
                "given_name": "Ada",
                "family_name": "Lovelace",
                "picture": "https://example.com/ada.png"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn userinfo_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v2/userinfo"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the mock has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .len()
    }

    /// Form parameters of the last request to the token endpoint.
    pub async fn last_token_request(&self) -> Vec<(String, String)> {
        let requests = self
            .server
            .received_requests()
            .await
            .expect("request recording enabled");
        let last = requests
            .iter()
            .rev()
            .find(|request| request.url.path() == "/token")
            .expect("expected a token request");
        oauth2::url::form_urlencoded::parse(&last.body)
            .into_owned()
            .collect()
    }
}
