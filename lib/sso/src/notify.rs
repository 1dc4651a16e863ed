//! User-facing login feedback.

use crate::request::SsoRequest;
use crate::session::{FlashMessage, SessionStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Delivers login feedback to the user.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        request: &SsoRequest,
        session: &mut dyn SessionStore,
        message: &str,
        severity: Severity,
    );
}

pub type MessagesPredicate = Arc<dyn Fn(&SsoRequest) -> bool + Send + Sync>;

/// Whether flash messages are recorded.
#[derive(Clone)]
pub enum MessagesSetting {
    Flag(bool),
    Predicate(MessagesPredicate),
}

impl MessagesSetting {
    #[must_use]
    pub fn enabled_for(&self, request: &SsoRequest) -> bool {
        match self {
            Self::Flag(enabled) => *enabled,
            Self::Predicate(predicate) => predicate(request),
        }
    }
}

impl fmt::Debug for MessagesSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(enabled) => write!(f, "Flag({enabled})"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Logs every message and queues it as a flash message when enabled.
#[derive(Debug, Clone)]
pub struct SessionMessages {
    setting: MessagesSetting,
}

impl SessionMessages {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            setting: MessagesSetting::Flag(enabled),
        }
    }

    #[must_use]
    pub fn with_predicate<F>(predicate: F) -> Self
    where
        F: Fn(&SsoRequest) -> bool + Send + Sync + 'static,
    {
        Self {
            setting: MessagesSetting::Predicate(Arc::new(predicate)),
        }
    }
}

impl Notifier for SessionMessages {
    fn notify(
        &self,
        request: &SsoRequest,
        session: &mut dyn SessionStore,
        message: &str,
        severity: Severity,
    ) {
        match severity {
            Severity::Debug => tracing::debug!(path = request.path(), "{message}"),
            Severity::Info | Severity::Success => {
                tracing::info!(path = request.path(), "{message}");
            }
            Severity::Warning => tracing::warn!(path = request.path(), "{message}"),
            Severity::Error => tracing::error!(path = request.path(), "{message}"),
        }

        if self.setting.enabled_for(request) {
            session.push_message(FlashMessage {
                severity,
                message: message.to_string(),
            });
        }
    }
}
