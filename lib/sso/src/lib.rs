//! Google OAuth2 single sign-on for web applications.
//!
//! The crate is host-agnostic. A host application provides a
//! [`UserStore`] and a [`SessionStore`], mounts the routes returned by
//! [`compat::sso_routes`], and calls into:
//!
//! - [`LoginFlow`] to start a login and to handle the provider callback,
//! - [`SessionGuard`] on every request to end sessions whose provider token
//!   was revoked,
//! - [`LoginContext`] to render login buttons.
//!
//! Host differences (route declaration style, email-field lookup, async
//! support) are resolved once by [`compat`], and [`adapter`] runs sync or
//! async hooks on whatever the host supports.

pub mod adapter;
pub mod claims;
pub mod compat;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod login;
pub mod notify;
pub mod policy;
pub mod provider;
pub mod request;
pub mod session;
pub mod user;

pub use adapter::{Adapted, Callable, ExecutionAdapter};
pub use claims::{IdentityClaims, ProviderToken};
pub use compat::{Capabilities, FrameworkVersion, HostFramework, UrlRegistrar};
pub use config::SsoConfig;
pub use context::{LoginContext, ProviderButton};
pub use error::{CapabilityError, ConfigurationError, LoginError, ProviderError, StoreError};
pub use guard::{GuardOutcome, SessionGuard};
pub use login::{Authenticated, CallbackOutcome, CallbackParams, LoginFlow, LoginState};
pub use notify::{Notifier, SessionMessages, Severity};
pub use policy::{CallbackPolicy, UsernameStrategy};
pub use provider::{GoogleProvider, IdentityProvider, token_validator};
pub use request::SsoRequest;
pub use session::{SessionData, SessionStore};
pub use user::{LocalUser, MemoryUserStore, NewUser, UserStore};
