//! In-process session registry and the session cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use google_sso::{SessionData, SessionStore};
use google_sso_core::SessionId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::Duration as TimeDuration;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

struct Entry {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// Browser sessions keyed by the id in the session cookie.
///
/// Sessions without a signed-in user (pending logins, flash messages)
/// get the shorter anonymous lifetime.
pub struct SessionRegistry {
    entries: Mutex<HashMap<SessionId, Entry>>,
    duration: ChronoDuration,
    anonymous_duration: ChronoDuration,
}

impl SessionRegistry {
    pub fn new(duration_minutes: i64, anonymous_duration_minutes: i64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            duration: ChronoDuration::minutes(duration_minutes),
            anonymous_duration: ChronoDuration::minutes(anonymous_duration_minutes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session named by the cookie, or a fresh one.
    ///
    /// The id is `None` when the cookie is missing, malformed or points at
    /// an expired session.
    pub fn load(&self, jar: &CookieJar) -> (Option<SessionId>, SessionData) {
        let Some(session_id) = session_id_from(jar) else {
            return (None, SessionData::new());
        };

        match self.get(session_id) {
            Some(data) => (Some(session_id), data),
            None => (None, SessionData::new()),
        }
    }

    /// Returns a copy of a live session.
    pub fn get(&self, session_id: SessionId) -> Option<SessionData> {
        let entries = self.lock();
        entries
            .get(&session_id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.data.clone())
    }

    /// Stores `data` under `session_id`, or under a new id when `None`.
    pub fn save(&self, session_id: Option<SessionId>, data: SessionData) -> SessionId {
        let session_id = session_id.unwrap_or_default();
        let lifetime = if data.user_id().is_some() {
            self.duration
        } else {
            self.anonymous_duration
        };
        let expires_at = Utc::now() + lifetime;
        self.lock().insert(session_id, Entry { data, expires_at });
        session_id
    }

    /// Moves `data` to a new id and drops the old one.
    pub fn rotate(&self, old: Option<SessionId>, data: SessionData) -> SessionId {
        if let Some(old) = old {
            self.remove(old);
        }
        self.save(None, data)
    }

    pub fn remove(&self, session_id: SessionId) {
        self.lock().remove(&session_id);
    }

    /// Drops expired sessions and returns how many were removed.
    pub fn delete_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Session lifetime, for the cookie max-age.
    pub fn duration_minutes(&self) -> i64 {
        self.duration.num_minutes()
    }
}

/// Reads the session id from the cookie jar.
pub fn session_id_from(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::from_str(cookie.value()).ok())
}

/// Builds the session cookie for `session_id`.
pub fn session_cookie(session_id: SessionId, secure: bool, duration_minutes: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(duration_minutes))
        .build()
}

/// Builds a cookie that clears the session cookie.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}
