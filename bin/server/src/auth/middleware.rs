//! Session guard middleware for Axum.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use google_sso::GuardOutcome;
use std::sync::Arc;

use super::{AppState, session::removal_cookie};

/// Ends the session when Google no longer accepts its access token.
///
/// Mounted with [`axum::middleware::from_fn_with_state`]. Requests without
/// a session pass straight through.
pub async fn session_guard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let (Some(session_id), mut session) = state.sessions.load(&jar) else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    match state.guard.enforce(&path, &mut session).await {
        Ok(GuardOutcome::Ended) => {
            state.sessions.remove(session_id);
            let response = next.run(request).await;
            (jar.add(removal_cookie()), response).into_response()
        }
        Ok(GuardOutcome::Skipped | GuardOutcome::Valid) => next.run(request).await,
        Err(err) => {
            tracing::error!(error = %err, path = %path, "session guard failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}
