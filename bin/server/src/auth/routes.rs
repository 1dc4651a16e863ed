//! Authentication routes for login, callback, logout and the landing page.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use google_sso::{CallbackParams, SessionStore, SsoRequest};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    AppState,
    session::{removal_cookie, session_cookie},
};
use crate::error::AuthError;

/// Session key holding the signed-in user's email, for display.
const USER_EMAIL_KEY: &str = "user_email";

/// Headers copied into the request seen by hooks.
const FORWARDED_HEADERS: [header::HeaderName; 3] =
    [header::HOST, header::USER_AGENT, header::REFERER];

/// Builds the host-agnostic request view.
fn sso_request(uri: &Uri, query: &HashMap<String, String>, headers: &HeaderMap) -> SsoRequest {
    let mut request = SsoRequest::new(uri.path());
    for (name, value) in query {
        request = request.with_query(name.clone(), value.clone());
    }
    for name in &FORWARDED_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            request = request.with_header(name.as_str(), value);
        }
    }
    request
}

/// Starts a login by redirecting to Google.
pub async fn login(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> impl IntoResponse {
    let request = sso_request(&uri, &query, &headers);
    let (session_id, mut session) = state.sessions.load(&jar);

    let auth_url = state.flow.start_login(&request, &mut session);

    let session_id = state.sessions.save(session_id, session);
    let cookie = session_cookie(
        session_id,
        state.secure_cookies,
        state.sessions.duration_minutes(),
    );
    (jar.add(cookie), Redirect::to(&auth_url))
}

/// Handles the redirect back from Google.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let request = sso_request(&uri, &query, &headers);
    let params = CallbackParams {
        code: query.get("code").cloned(),
        state: query.get("state").cloned(),
        error: query.get("error").cloned(),
    };

    let (session_id, mut session) = state.sessions.load(&jar);
    let previous_user = session.user_id();

    let result = state
        .flow
        .handle_callback(&request, &params, &mut session)
        .await;

    if let Ok(google_sso::CallbackOutcome::Authenticated(done)) = &result {
        session.set(USER_EMAIL_KEY, Value::String(done.user.email.clone()));
    }

    // A new login gets a new session id. Cookieless failures keep no state.
    let logged_in = session.user_id().is_some() && session.user_id() != previous_user;
    let session_id = match session_id {
        _ if logged_in => Some(state.sessions.rotate(session_id, session)),
        Some(session_id) => Some(state.sessions.save(Some(session_id), session)),
        None => None,
    };

    let outcome = result.map_err(|report| AuthError::Login(report.current_context().clone()))?;
    tracing::debug!(state = %outcome.state(), "callback finished");

    let jar = match session_id {
        Some(session_id) => jar.add(session_cookie(
            session_id,
            state.secure_cookies,
            state.sessions.duration_minutes(),
        )),
        None => jar,
    };
    Ok((jar, Redirect::to(outcome.redirect_to())))
}

/// Logs out the user by deleting their session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(session_id) = super::session::session_id_from(&jar) {
        state.sessions.remove(session_id);
    }

    (jar.add(removal_cookie()), Redirect::to("/"))
}

/// Landing page: who is signed in, pending messages and the login buttons.
pub async fn index(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let request = sso_request(&uri, &query, &headers);
    let (session_id, mut session) = state.sessions.load(&jar);

    let messages = session.take_messages();
    let user_email = session
        .user_id()
        .and(session.get(USER_EMAIL_KEY))
        .and_then(|value| value.as_str().map(str::to_string));
    if let Some(session_id) = session_id {
        state.sessions.save(Some(session_id), session);
    }

    let buttons = state
        .context
        .asso_providers(&state.adapter, request.clone())
        .await
        .map_err(|report| AuthError::Capability(report.current_context().clone()))?;
    let show_form = state
        .context
        .ashow_form(&state.adapter, request)
        .await
        .map_err(|report| AuthError::Capability(report.current_context().clone()))?;

    let mut body = String::from("<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Sign in</title></head>\n<body>\n");
    for message in &messages {
        body.push_str(&format!(
            "<p class=\"message {}\">{}</p>\n",
            message.severity,
            escape_html(&message.message)
        ));
    }

    match user_email {
        Some(email) => {
            body.push_str(&format!(
                "<p>Signed in as {}.</p>\n<p><a href=\"/logout/\">Sign out</a></p>\n",
                escape_html(&email)
            ));
        }
        None => {
            for button in &buttons {
                body.push_str(&format!(
                    "<a class=\"{}\" href=\"{}\"><img src=\"{}\" alt=\"\"> {}</a>\n",
                    escape_html(&button.css_class),
                    escape_html(&button.login_url),
                    escape_html(&button.logo_url),
                    escape_html(&button.text)
                ));
            }
            if show_form {
                // Slot for the host's password login; this server mounts none.
                body.push_str(
                    "<form class=\"login-form\">\n<fieldset disabled>\n\
                     <input name=\"username\" placeholder=\"Username\">\n\
                     <input name=\"password\" type=\"password\" placeholder=\"Password\">\n\
                     </fieldset>\n</form>\n",
                );
            }
        }
    }
    body.push_str("</body>\n</html>\n");

    Ok(Html(body))
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            Self::Login(err) => tracing::error!(kind = err.kind(), "login failed: {}", err),
            Self::Capability(err) => tracing::error!("capability error: {}", err),
        }
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;"
        );
    }

    #[test]
    fn sso_request_copies_query_and_selected_headers() {
        let uri: Uri = "/google_sso/login/?next=/admin/".parse().expect("uri");
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "test-agent".parse().expect("header"));
        headers.insert(header::COOKIE, "session=secret".parse().expect("header"));
        let query = HashMap::from([("next".to_string(), "/admin/".to_string())]);

        let request = sso_request(&uri, &query, &headers);

        assert_eq!(request.path(), "/google_sso/login/");
        assert_eq!(request.query("next"), Some("/admin/"));
        assert_eq!(request.header("user-agent"), Some("test-agent"));
        assert_eq!(request.header("cookie"), None);
    }
}
