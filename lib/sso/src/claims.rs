//! Provider credentials and identity claims.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Bearer token issued by the provider.
///
/// `Debug` and `Display` only show a masked form so the token can be
/// logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderToken(String);

impl ProviderToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for use in an `Authorization` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }

    /// Returns `first5...last5`, or `***` for short tokens.
    #[must_use]
    pub fn masked(&self) -> String {
        mask_credential(&self.0)
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProviderToken({})", self.masked())
    }
}

impl fmt::Display for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Masks a credential for logging.
#[must_use]
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 10 {
        return "***".to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

/// Identity attributes returned by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Provider account id. Older endpoints call it `id`, newer ones `sub`.
    #[serde(alias = "sub")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    /// Every other attribute the provider returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdentityClaims {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            given_name: None,
            family_name: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_names(mut self, given_name: Option<String>, family_name: Option<String>) -> Self {
        self.given_name = given_name;
        self.family_name = family_name;
        self
    }

    /// Part of the email before `@`.
    #[must_use]
    pub fn email_local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or_default()
    }

    /// Part of the email after `@`, lowercased.
    #[must_use]
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_masked_in_debug_output() {
        let token = ProviderToken::new("ya29.a0AfH6SMBxLongSecretValue1234");
        let debug = format!("{token:?}");
        assert!(!debug.contains("LongSecret"));
        assert!(debug.contains("ya29."));
        assert!(debug.contains("e1234"));
    }

    #[test]
    fn short_credentials_are_fully_masked() {
        assert_eq!(mask_credential("abc"), "***");
    }

    #[test]
    fn claims_accept_sub_and_keep_extra_fields() {
        let claims: IdentityClaims = serde_json::from_str(
            r#"{
                "sub": "1234",
                "email": "Alice@Example.com",
                "given_name": "Alice",
                "picture": "https://example.com/a.png",
                "hd": "example.com"
            }"#,
        )
        .expect("deserialize");

        assert_eq!(claims.id, "1234");
        assert_eq!(claims.given_name.as_deref(), Some("Alice"));
        assert_eq!(claims.family_name, None);
        assert_eq!(claims.extra["hd"], "example.com");
        assert_eq!(claims.email_local_part(), "Alice");
        assert_eq!(claims.email_domain().as_deref(), Some("example.com"));
    }

    #[test]
    fn claims_with_legacy_id_field() {
        let claims: IdentityClaims =
            serde_json::from_str(r#"{"id": "42", "email": "a@example.com", "verified_email": true}"#)
                .expect("deserialize");
        assert_eq!(claims.id, "42");
        assert_eq!(claims.extra["verified_email"], true);
    }
}
