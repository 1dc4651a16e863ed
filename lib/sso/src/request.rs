//! Host-agnostic view of the incoming request.
//!
//! Hooks and notification predicates receive this instead of the host's
//! own request type.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsoRequest {
    path: String,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl SsoRequest {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a header. Names are case-insensitive.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let request = SsoRequest::new("/").with_header("User-Agent", "curl/8");
        assert_eq!(request.header("user-agent"), Some("curl/8"));
        assert_eq!(request.header("USER-AGENT"), Some("curl/8"));
    }

    #[test]
    fn query_lookup() {
        let request = SsoRequest::new("/google_sso/login/").with_query("next", "/admin/");
        assert_eq!(request.query("next"), Some("/admin/"));
        assert_eq!(request.query("missing"), None);
        assert_eq!(request.path(), "/google_sso/login/");
    }
}
