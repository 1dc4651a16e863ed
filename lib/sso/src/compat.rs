//! Host framework compatibility resolution.
//!
//! The login flow runs on hosts exposing different API levels. Instead of
//! comparing versions at every call site, the host is probed once and the
//! answers are frozen into a [`Capabilities`] value:
//!
//! - how to find the email field of the user model,
//! - how routes are declared (path style or anchored pattern style),
//! - whether asynchronous execution is available.
//!
//! The process-wide instance is created on first use by [`init`] or
//! [`capabilities`] and lives for the rest of the process.

use crate::error::ConfigurationError;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// First API level with path-style route registration.
pub const PATH_ROUTING_SINCE: FrameworkVersion = FrameworkVersion::new(2, 0, 0);

/// First API level able to run handlers asynchronously.
pub const ASYNC_SINCE: FrameworkVersion = FrameworkVersion::new(3, 0, 0);

/// First API level whose user models expose a native email-field accessor.
pub const NATIVE_EMAIL_FIELD_SINCE: FrameworkVersion = FrameworkVersion::new(3, 1, 0);

/// API level implemented by the bundled axum host.
pub const HOST_API_VERSION: FrameworkVersion = FrameworkVersion::new(5, 0, 0);

const FALLBACK_EMAIL_FIELD: &str = "email";

/// A `major.minor.patch` host API level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameworkVersion {
    major: u16,
    minor: u16,
    patch: u16,
}

impl FrameworkVersion {
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    #[must_use]
    pub const fn major(&self) -> u16 {
        self.major
    }

    #[must_use]
    pub const fn minor(&self) -> u16 {
        self.minor
    }

    #[must_use]
    pub const fn patch(&self) -> u16 {
        self.patch
    }
}

impl fmt::Display for FrameworkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FrameworkVersion {
    type Err = ConfigurationError;

    /// Parses `"3"`, `"3.1"` or `"3.1.2"`. Missing parts default to zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigurationError::InvalidSetting {
            name: "framework.version",
            reason,
        };

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() > 3 {
            return Err(invalid(format!("'{s}' is not a major.minor.patch version")));
        }

        let mut numbers = [0u16; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|e| invalid(format!("'{s}' has a bad component '{part}': {e}")))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl TryFrom<String> for FrameworkVersion {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameworkVersion> for String {
    fn from(version: FrameworkVersion) -> Self {
        version.to_string()
    }
}

/// What the host framework reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFramework {
    version: FrameworkVersion,
    /// Whether path-style route registration exists.
    #[serde(default = "enabled")]
    path_routing: bool,
    /// Whether pattern-style route registration exists.
    #[serde(default = "enabled")]
    pattern_routing: bool,
    /// Whether an async runtime bridge is installed.
    #[serde(default = "enabled")]
    async_bridge: bool,
}

fn enabled() -> bool {
    true
}

impl Default for HostFramework {
    fn default() -> Self {
        Self::current()
    }
}

impl HostFramework {
    /// A host at the given API level with every mechanism available.
    #[must_use]
    pub fn new(version: FrameworkVersion) -> Self {
        Self {
            version,
            path_routing: true,
            pattern_routing: true,
            async_bridge: true,
        }
    }

    /// The bundled axum host.
    #[must_use]
    pub fn current() -> Self {
        Self::new(HOST_API_VERSION)
    }

    #[must_use]
    pub fn with_path_routing(mut self, available: bool) -> Self {
        self.path_routing = available;
        self
    }

    #[must_use]
    pub fn with_pattern_routing(mut self, available: bool) -> Self {
        self.pattern_routing = available;
        self
    }

    #[must_use]
    pub fn with_async_bridge(mut self, available: bool) -> Self {
        self.async_bridge = available;
        self
    }

    #[must_use]
    pub fn version(&self) -> FrameworkVersion {
        self.version
    }
}

/// Failure while introspecting a user model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelError(pub String);

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user model introspection failed: {}", self.0)
    }
}

impl std::error::Error for ModelError {}

/// Introspection hooks a user model may offer.
///
/// Every method is optional in spirit: models implement only what their
/// host API level provides.
pub trait UserModel {
    /// The host's own email-field accessor. `None` when the model has none.
    fn native_email_field(&self) -> Option<Result<String, ModelError>> {
        None
    }

    /// An explicitly declared email field.
    fn declared_email_field(&self) -> Option<&str> {
        None
    }

    /// Names of all fields on the model.
    fn field_names(&self) -> Result<Vec<String>, ModelError> {
        Ok(Vec::new())
    }
}

/// How SSO routes are declared on the host router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlRegistrar {
    /// Plain path declarations such as `login/`.
    Path,
    /// Anchored pattern declarations such as `^login/$`.
    Pattern,
}

impl UrlRegistrar {
    /// Returns true for the pattern-style fallback.
    #[must_use]
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Pattern)
    }

    /// Builds the declaration for a route segment like `login/`.
    #[must_use]
    pub fn declare(self, segment: &str) -> String {
        match self {
            Self::Path => segment.to_string(),
            Self::Pattern => format!("^{segment}$"),
        }
    }

    /// Translates a declaration into a concrete router path under `prefix`.
    #[must_use]
    pub fn router_path(self, prefix: &str, declaration: &str) -> String {
        let relative = match self {
            Self::Path => declaration,
            Self::Pattern => declaration.trim_start_matches('^').trim_end_matches('$'),
        };
        format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

/// Entry points exposed by the SSO layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    StartLogin,
    Callback,
}

/// A route declaration ready to be mounted by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub name: &'static str,
    pub declaration: String,
    pub endpoint: Endpoint,
}

/// Declares the SSO routes, or nothing when SSO is disabled.
#[must_use]
pub fn sso_routes(registrar: UrlRegistrar, enabled: bool) -> Vec<RouteDef> {
    if !enabled {
        return Vec::new();
    }

    vec![
        RouteDef {
            name: "oauth_start_login",
            declaration: registrar.declare("login/"),
            endpoint: Endpoint::StartLogin,
        },
        RouteDef {
            name: "oauth_callback",
            declaration: registrar.declare("callback/"),
            endpoint: Endpoint::Callback,
        },
    ]
}

/// Capabilities resolved for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    host: HostFramework,
    url_registrar: UrlRegistrar,
    async_capable: bool,
}

impl Capabilities {
    /// Probes `host` and freezes the answers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::UnsupportedFramework` when the host has
    /// no route registration mechanism at all.
    pub fn resolve(host: HostFramework) -> Result<Self, Report<ConfigurationError>> {
        let url_registrar = if host.version >= PATH_ROUTING_SINCE && host.path_routing {
            UrlRegistrar::Path
        } else if host.pattern_routing {
            UrlRegistrar::Pattern
        } else {
            return Err(ConfigurationError::UnsupportedFramework {
                version: host.version,
            }
            .into());
        };

        let async_capable = host.version >= ASYNC_SINCE && host.async_bridge;

        tracing::debug!(
            version = %host.version,
            legacy_routes = url_registrar.is_legacy(),
            async_capable,
            "resolved host capabilities"
        );

        Ok(Self {
            host,
            url_registrar,
            async_capable,
        })
    }

    #[must_use]
    pub fn host(&self) -> &HostFramework {
        &self.host
    }

    /// Returns the name of the email field on `model`. Never fails.
    #[must_use]
    pub fn email_field_name(&self, model: &dyn UserModel) -> String {
        if self.host.version >= NATIVE_EMAIL_FIELD_SINCE {
            match model.native_email_field() {
                Some(Ok(name)) if !name.is_empty() => return name,
                Some(Err(e)) => tracing::debug!(error = %e, "native email accessor failed"),
                _ => {}
            }
        }

        if let Some(declared) = model.declared_email_field().filter(|name| !name.is_empty()) {
            return declared.to_string();
        }

        match model.field_names() {
            Ok(fields) if fields.iter().any(|field| field == FALLBACK_EMAIL_FIELD) => {
                return FALLBACK_EMAIL_FIELD.to_string();
            }
            Err(e) => tracing::debug!(error = %e, "user model field scan failed"),
            _ => {}
        }

        FALLBACK_EMAIL_FIELD.to_string()
    }

    /// Returns the route registrar and whether it is the legacy one.
    #[must_use]
    pub fn url_registrar(&self) -> (UrlRegistrar, bool) {
        (self.url_registrar, self.url_registrar.is_legacy())
    }

    #[must_use]
    pub fn async_capable(&self) -> bool {
        self.async_capable
    }
}

static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Resolves the process-wide capabilities for `host`.
///
/// Repeated calls with the same host return the memoized value.
///
/// # Errors
///
/// Fails if `host` is unsupported, or if the capabilities were already
/// resolved for a different host.
pub fn init(host: HostFramework) -> Result<&'static Capabilities, Report<ConfigurationError>> {
    let resolved = match CAPABILITIES.get() {
        Some(resolved) => resolved,
        None => {
            let probed = Capabilities::resolve(host)?;
            CAPABILITIES.get_or_init(|| probed)
        }
    };

    // A racing first caller may have won with another host.
    if resolved.host != host {
        return Err(ConfigurationError::HostMismatch {
            resolved: resolved.host.version,
            requested: host.version,
        }
        .into());
    }
    Ok(resolved)
}

/// Returns the process-wide capabilities, probing the bundled host on
/// first use.
///
/// # Errors
///
/// Fails only if the bundled host were unsupported.
pub fn capabilities() -> Result<&'static Capabilities, Report<ConfigurationError>> {
    match CAPABILITIES.get() {
        Some(resolved) => Ok(resolved),
        None => init(HostFramework::current()),
    }
}
