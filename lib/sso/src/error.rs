//! Error types for the google-sso crate.
//!
//! Errors fall in two classes:
//! - Deployment defects (`ConfigurationError`, `CapabilityError`) are never
//!   caught. They surface at startup or on the first mis-invocation.
//! - Login failures (`LoginError`) are caught at the state machine boundary
//!   and turned into a user-visible message plus a redirect. The one
//!   exception is `LoginError::Store`, which is fatal for the request.
//!
//! All of them travel inside a rootcause `Report` at API boundaries.

use crate::compat::FrameworkVersion;
use std::fmt;

/// Fatal setup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The host framework offers no usable URL registration mechanism.
    UnsupportedFramework { version: FrameworkVersion },
    /// A configuration value is malformed.
    InvalidSetting { name: &'static str, reason: String },
    /// The process-wide capabilities were already resolved for another host.
    HostMismatch {
        resolved: FrameworkVersion,
        requested: FrameworkVersion,
    },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFramework { version } => write!(
                f,
                "unsupported host framework {version}: no URL registration mechanism available"
            ),
            Self::InvalidSetting { name, reason } => {
                write!(f, "invalid setting '{name}': {reason}")
            }
            Self::HostMismatch {
                resolved,
                requested,
            } => write!(
                f,
                "capabilities already resolved for host {resolved}, cannot re-resolve for {requested}"
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Raised when asynchronous execution is requested but unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// The host API level is below the async threshold.
    AsyncUnsupported {
        detected: FrameworkVersion,
        minimum: FrameworkVersion,
    },
    /// The host reports no async runtime bridge.
    RuntimeBridgeUnavailable { reason: String },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncUnsupported { detected, minimum } => write!(
                f,
                "async support is not available: host framework {detected} detected, {minimum} or newer required"
            ),
            Self::RuntimeBridgeUnavailable { reason } => {
                write!(f, "async support is not available: {reason}")
            }
        }
    }
}

impl std::error::Error for CapabilityError {}

/// Which provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStage {
    Authorization,
    TokenExchange,
    ClaimsFetch,
    TokenValidation,
}

impl fmt::Display for ProviderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authorization => "authorization",
            Self::TokenExchange => "token exchange",
            Self::ClaimsFetch => "claims fetch",
            Self::TokenValidation => "token validation",
        };
        f.write_str(name)
    }
}

/// Failures talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The request never produced a response.
    Transport {
        stage: ProviderStage,
        details: String,
    },
    /// The provider answered with a non-success status.
    Status { stage: ProviderStage, status: u16 },
    /// The provider answered with an OAuth error body.
    ErrorResponse {
        stage: ProviderStage,
        error: String,
    },
    /// The response body could not be decoded.
    Decode {
        stage: ProviderStage,
        details: String,
    },
    /// The provider redirected back with an `error` parameter.
    Denied { error: String },
    /// The callback carried no authorization code.
    MissingCode,
}

impl ProviderError {
    /// Returns the stage the failure happened in.
    #[must_use]
    pub fn stage(&self) -> ProviderStage {
        match self {
            Self::Transport { stage, .. }
            | Self::Status { stage, .. }
            | Self::ErrorResponse { stage, .. }
            | Self::Decode { stage, .. } => *stage,
            Self::Denied { .. } | Self::MissingCode => ProviderStage::Authorization,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { stage, details } => {
                write!(f, "provider {stage} request failed: {details}")
            }
            Self::Status { stage, status } => {
                write!(f, "provider {stage} returned status {status}")
            }
            Self::ErrorResponse { stage, error } => {
                write!(f, "provider {stage} returned an error: {error}")
            }
            Self::Decode { stage, details } => {
                write!(f, "provider {stage} response could not be decoded: {details}")
            }
            Self::Denied { error } => write!(f, "provider denied authorization: {error}"),
            Self::MissingCode => write!(f, "callback is missing the authorization code"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Failures from the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    UniqueViolation { field: String, value: String },
    /// Any other backend failure.
    Backend { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation { field, value } => {
                write!(f, "a user with {field} '{value}' already exists")
            }
            Self::Backend { details } => write!(f, "user store error: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Why a login attempt ended without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The echoed anti-forgery token did not match the stored one.
    CsrfMismatch,
    /// A provider call failed.
    Provider(ProviderError),
    /// A policy check refused the identity.
    ValidationDenied { email: String, reason: String },
    /// No local user matches and creation is disabled.
    UserNotFound { email: String },
    /// The user store failed. Not a rejection: the request fails.
    Store(StoreError),
}

impl LoginError {
    /// Returns true for failures that end the flow with a redirect.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Stable classification used in logs and flash messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CsrfMismatch => "csrf_mismatch",
            Self::Provider(_) => "provider_error",
            Self::ValidationDenied { .. } => "validation_denied",
            Self::UserNotFound { .. } => "user_not_found",
            Self::Store(_) => "store_error",
        }
    }

    /// Message safe to show to the browser user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::CsrfMismatch => "Login failed. Please try again.".to_string(),
            Self::Provider(_) => "Google login failed. Please try again.".to_string(),
            Self::ValidationDenied { email, .. } => {
                format!("Login is not allowed for {email}.")
            }
            Self::UserNotFound { email } => format!("User not found: {email}."),
            Self::Store(_) => "Internal error.".to_string(),
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CsrfMismatch => write!(f, "anti-forgery state mismatch"),
            Self::Provider(err) => write!(f, "{err}"),
            Self::ValidationDenied { email, reason } => {
                write!(f, "validation denied for '{email}': {reason}")
            }
            Self::UserNotFound { email } => write!(f, "user not found for email '{email}'"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LoginError {}

impl From<ProviderError> for LoginError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<StoreError> for LoginError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_framework_names_version() {
        let err = ConfigurationError::UnsupportedFramework {
            version: FrameworkVersion::new(1, 4, 0),
        };
        assert!(err.to_string().contains("1.4.0"));
    }

    #[test]
    fn capability_error_names_minimum_version() {
        let err = CapabilityError::AsyncUnsupported {
            detected: FrameworkVersion::new(2, 2, 0),
            minimum: FrameworkVersion::new(3, 0, 0),
        };
        let message = err.to_string();
        assert!(message.contains("2.2.0"));
        assert!(message.contains("3.0.0"));
    }

    #[test]
    fn provider_status_display() {
        let err = ProviderError::Status {
            stage: ProviderStage::TokenExchange,
            status: 400,
        };
        assert_eq!(err.to_string(), "provider token exchange returned status 400");
        assert_eq!(err.stage(), ProviderStage::TokenExchange);
    }

    #[test]
    fn store_failures_are_not_rejections() {
        let err = LoginError::Store(StoreError::Backend {
            details: "connection reset".to_string(),
        });
        assert!(!err.is_rejection());
        assert!(LoginError::CsrfMismatch.is_rejection());
    }

    #[test]
    fn csrf_message_stays_generic() {
        let message = LoginError::CsrfMismatch.user_message();
        assert!(!message.to_lowercase().contains("csrf"));
        assert!(!message.contains("state"));
    }

    #[test]
    fn user_not_found_classification() {
        let err = LoginError::UserNotFound {
            email: "a@example.com".to_string(),
        };
        assert_eq!(err.kind(), "user_not_found");
        assert!(err.user_message().contains("a@example.com"));
    }
}
