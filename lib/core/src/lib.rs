//! Core types shared by the google-sso crates.
//!
//! Provides the strongly-typed identifiers for users and browser sessions
//! and the rootcause-based `Result` alias used at crate boundaries.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId, UserId};
