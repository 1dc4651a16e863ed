//! Error handling foundation for google-sso.
//!
//! Only the `Result` alias lives here. Each crate defines its own
//! domain error enums and carries them in a rootcause `Report`, adding
//! context as errors cross layer boundaries.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
