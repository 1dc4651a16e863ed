//! PostgreSQL user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_sso::compat::UserModel;
use google_sso::user::LocalUserModel;
use google_sso::{LocalUser, NewUser, StoreError, UserStore};
use google_sso_core::{Result, UserId};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, is_active, is_staff, \
                            is_superuser, date_joined, last_login, attributes";

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
    date_joined: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    attributes: serde_json::Value,
}

impl UserRow {
    fn try_into_user(self) -> Result<LocalUser, StoreError> {
        let id = UserId::from_str(&self.id).map_err(|e| StoreError::Backend {
            details: format!("invalid user id '{}': {}", self.id, e),
        })?;
        let attributes = match self.attributes {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(LocalUser {
            id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_superuser: self.is_superuser,
            date_joined: self.date_joined,
            last_login: self.last_login,
            attributes,
        })
    }
}

/// Maps a sqlx error onto the store error taxonomy.
fn store_error(err: sqlx::Error, user: Option<&LocalUser>) -> Report<StoreError> {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let on_username = db_err
                .constraint()
                .is_some_and(|constraint| constraint.contains("username"));
            let (field, value) = match (on_username, user) {
                (true, Some(user)) => ("username", user.username.clone()),
                (true, None) => ("username", String::new()),
                (false, Some(user)) => ("email", user.email.clone()),
                (false, None) => ("email", String::new()),
            };
            return StoreError::UniqueViolation {
                field: field.to_string(),
                value,
            }
            .into();
        }
    }
    StoreError::Backend {
        details: err.to_string(),
    }
    .into()
}

/// User store backed by the `users` table.
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Creates a new user store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    fn model(&self) -> &dyn UserModel {
        &LocalUserModel
    }

    async fn find_by_email(
        &self,
        email_field: &str,
        email: &str,
    ) -> Result<Option<LocalUser>, StoreError> {
        let builtin = matches!(email_field, "email" | "username");
        let sql = if builtin {
            format!("SELECT {USER_COLUMNS} FROM users WHERE lower({email_field}) = lower($1) LIMIT 1")
        } else {
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE lower(attributes ->> $2) = lower($1) LIMIT 1"
            )
        };

        let mut query = sqlx::query_as::<_, UserRow>(&sql).bind(email);
        if !builtin {
            query = query.bind(email_field);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error(e, None))?;

        row.map(UserRow::try_into_user).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<LocalUser, StoreError> {
        let created = LocalUser::from_new(UserId::new(), user);
        let row: UserRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, is_active, is_staff,
                               is_superuser, date_joined, last_login, attributes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(created.id.to_string())
        .bind(&created.username)
        .bind(&created.email)
        .bind(&created.first_name)
        .bind(&created.last_name)
        .bind(created.is_active)
        .bind(created.is_staff)
        .bind(created.is_superuser)
        .bind(created.date_joined)
        .bind(created.last_login)
        .bind(serde_json::Value::Object(created.attributes.clone()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error(e, Some(&created)))?;

        row.try_into_user()
    }

    async fn save(&self, user: &LocalUser) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, email = $3, first_name = $4, last_name = $5, is_active = $6,
                is_staff = $7, is_superuser = $8, last_login = $9, attributes = $10
            WHERE id = $1
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_superuser)
        .bind(user.last_login)
        .bind(serde_json::Value::Object(user.attributes.clone()))
        .execute(&self.pool)
        .await
        .map_err(|e| store_error(e, Some(user)))?;

        Ok(())
    }
}
