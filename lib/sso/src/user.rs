//! Local users and the store they live in.

use crate::claims::IdentityClaims;
use crate::compat::{ModelError, UserModel};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_sso_core::UserId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Mutex;

/// A user account of the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Extra creation defaults without a dedicated column.
    pub attributes: Map<String, Value>,
}

impl LocalUser {
    /// Name of the email field.
    pub const EMAIL_FIELD: &'static str = "email";

    /// Column names, in storage order.
    pub const FIELDS: [&'static str; 11] = [
        "id",
        "username",
        "email",
        "first_name",
        "last_name",
        "is_active",
        "is_staff",
        "is_superuser",
        "date_joined",
        "last_login",
        "attributes",
    ];

    /// Materializes a user from a creation record.
    #[must_use]
    pub fn from_new(id: UserId, new: NewUser) -> Self {
        Self {
            id,
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: new.is_active,
            is_staff: new.is_staff,
            is_superuser: new.is_superuser,
            date_joined: new.date_joined,
            last_login: None,
            attributes: new.attributes,
        }
    }

    /// Copies the provider's name claims onto the user.
    pub fn apply_names(&mut self, claims: &IdentityClaims) {
        if let Some(given) = &claims.given_name {
            self.first_name.clone_from(given);
        }
        if let Some(family) = &claims.family_name {
            self.last_name.clone_from(family);
        }
    }

    /// Reads `field` as a string, looking at `email` and `username`
    /// first and the attribute map after that.
    #[must_use]
    pub fn field_str(&self, field: &str) -> Option<&str> {
        match field {
            "email" => Some(&self.email),
            "username" => Some(&self.username),
            other => self.attributes.get(other).and_then(Value::as_str),
        }
    }
}

/// Schema of [`LocalUser`] as seen by the compatibility resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalUserModel;

impl UserModel for LocalUserModel {
    fn native_email_field(&self) -> Option<Result<String, ModelError>> {
        Some(Ok(LocalUser::EMAIL_FIELD.to_string()))
    }

    fn declared_email_field(&self) -> Option<&str> {
        Some(LocalUser::EMAIL_FIELD)
    }

    fn field_names(&self) -> Result<Vec<String>, ModelError> {
        Ok(LocalUser::FIELDS.iter().map(ToString::to_string).collect())
    }
}

/// A user about to be created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub attributes: Map<String, Value>,
}

impl NewUser {
    #[must_use]
    pub fn new(username: String, email: String) -> Self {
        Self {
            username,
            email,
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: Utc::now(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn with_names(mut self, claims: &IdentityClaims) -> Self {
        self.first_name = claims.given_name.clone().unwrap_or_default();
        self.last_name = claims.family_name.clone().unwrap_or_default();
        self
    }

    /// Merges creation defaults over the generated values.
    ///
    /// Known fields must have the right JSON type; mistyped values are
    /// logged and skipped. `email` is the lookup key and cannot be
    /// overridden. Unknown keys land in `attributes`.
    pub fn merge_defaults(&mut self, defaults: Map<String, Value>) {
        for (key, value) in defaults {
            let applied = match key.as_str() {
                "email" | "id" => false,
                "username" => set_string(&mut self.username, &value),
                "first_name" => set_string(&mut self.first_name, &value),
                "last_name" => set_string(&mut self.last_name, &value),
                "is_active" => set_bool(&mut self.is_active, &value),
                "is_staff" => set_bool(&mut self.is_staff, &value),
                "is_superuser" => set_bool(&mut self.is_superuser, &value),
                "date_joined" => match serde_json::from_value(value.clone()) {
                    Ok(date) => {
                        self.date_joined = date;
                        true
                    }
                    Err(_) => false,
                },
                _ => {
                    self.attributes.insert(key, value);
                    continue;
                }
            };

            if !applied {
                tracing::warn!(field = %key, "ignoring creation default");
            }
        }
    }
}

fn set_string(target: &mut String, value: &Value) -> bool {
    match value.as_str() {
        Some(s) => {
            *target = s.to_string();
            true
        }
        None => false,
    }
}

fn set_bool(target: &mut bool, value: &Value) -> bool {
    match value.as_bool() {
        Some(b) => {
            *target = b;
            true
        }
        None => false,
    }
}

/// Persistence for local users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Schema of the stored users.
    fn model(&self) -> &dyn UserModel;

    /// Finds the user whose `email_field` equals `email`, ignoring case.
    async fn find_by_email(
        &self,
        email_field: &str,
        email: &str,
    ) -> Result<Option<LocalUser>, Report<StoreError>>;

    /// Inserts a user.
    ///
    /// Fails with `StoreError::UniqueViolation` if the email or username
    /// is taken.
    async fn create(&self, user: NewUser) -> Result<LocalUser, Report<StoreError>>;

    /// Persists changes to an existing user.
    async fn save(&self, user: &LocalUser) -> Result<(), Report<StoreError>>;
}

/// In-process user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<LocalUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all users.
    pub fn all(&self) -> Result<Vec<LocalUser>, Report<StoreError>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<LocalUser>>, Report<StoreError>> {
        self.users.lock().map_err(|_| {
            StoreError::Backend {
                details: "user store lock poisoned".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    fn model(&self) -> &dyn UserModel {
        &LocalUserModel
    }

    async fn find_by_email(
        &self,
        email_field: &str,
        email: &str,
    ) -> Result<Option<LocalUser>, Report<StoreError>> {
        let users = self.lock()?;
        Ok(users
            .iter()
            .find(|user| {
                user.field_str(email_field)
                    .is_some_and(|value| value.eq_ignore_ascii_case(email))
            })
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<LocalUser, Report<StoreError>> {
        let mut users = self.lock()?;

        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::UniqueViolation {
                field: "email".to_string(),
                value: user.email,
            }
            .into());
        }
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation {
                field: "username".to_string(),
                value: user.username,
            }
            .into());
        }

        let created = LocalUser::from_new(UserId::new(), user);
        users.push(created.clone());
        Ok(created)
    }

    async fn save(&self, user: &LocalUser) -> Result<(), Report<StoreError>> {
        let mut users = self.lock()?;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::Backend {
                details: format!("user {} does not exist", user.id),
            }
            .into()),
        }
    }
}
