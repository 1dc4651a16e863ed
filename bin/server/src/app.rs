//! HTTP router.

use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};

/// Builds the application router.
///
/// The SSO routes are mounted only where the host resolution placed them;
/// with SSO disabled only the landing page and logout remain.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/", get(auth::index))
        .route("/logout/", get(auth::logout));

    if let Some(path) = &state.paths.login {
        router = router.route(path, get(auth::login));
    }
    if let Some(path) = &state.paths.callback {
        router = router.route(path, get(auth::callback));
    }

    router
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::session_guard,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
