//! Server error types.

use google_sso::{CapabilityError, LoginError};
use std::fmt;

/// Startup failures.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The SSO layer refused the configuration.
    Sso { details: String },
    /// Database connection or migration failed.
    Database { details: String },
    /// The listener could not be bound or the server stopped.
    Serve { details: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {}", details),
            Self::Sso { details } => write!(f, "sso setup error: {}", details),
            Self::Database { details } => write!(f, "database error: {}", details),
            Self::Serve { details } => write!(f, "server error: {}", details),
        }
    }
}

impl std::error::Error for ServerError {}

/// Request failures that are not login rejections.
#[derive(Debug)]
pub enum AuthError {
    /// The user store failed during the callback.
    Login(LoginError),
    /// A sync hook was awaited on a host without async support.
    Capability(CapabilityError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login(err) => write!(f, "{}", err),
            Self::Capability(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AuthError {}
