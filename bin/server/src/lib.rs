//! google-sso web server.
//!
//! A small Axum application that signs users in with Google through the
//! `google-sso` library and keeps them in PostgreSQL.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
