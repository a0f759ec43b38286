//! Local accounts in the olab SQLite database
//!
//! Passwords are stored as salted SHA-256 hashes; sessions are opaque
//! random tokens in `auth_sessions` with a `last_seen_at` timestamp.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use olab_common::credentials::{
    generate_salt, generate_token, hash_password, normalize_email, validate_password,
    validate_password_change, verify_password,
};
use olab_common::events::{AuthEvent, EventBus, SignOutReason};
use olab_common::models::User;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthProvider, AuthSession};
use crate::error::AuthError;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    password_salt: String,
    metadata: String,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            metadata: serde_json::from_str(&self.metadata).unwrap_or_default(),
            id: self.id,
            email: self.email,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    #[sqlx(flatten)]
    user: UserRow,
    last_seen_at: DateTime<Utc>,
}

pub struct LocalAuth {
    pool: SqlitePool,
    inactivity_timeout: Duration,
    events: EventBus<AuthEvent>,
}

impl LocalAuth {
    pub fn new(pool: SqlitePool, inactivity_timeout: Duration) -> Self {
        Self {
            pool,
            inactivity_timeout,
            events: EventBus::new(),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, password_salt, metadata FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    fn is_idle(&self, last_seen_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        (now - last_seen_at).to_std().unwrap_or_default() > self.inactivity_timeout
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        if self.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyRegistered);
        }

        let id = Uuid::new_v4().to_string();
        let salt = generate_salt();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, password_salt, metadata) VALUES (?, ?, ?, ?, '{}')",
        )
        .bind(&id)
        .bind(&email)
        .bind(hash_password(password, &salt))
        .bind(&salt)
        .execute(&self.pool)
        .await?;

        info!(user_id = %id, "Registered local account");
        Ok(User {
            id,
            email,
            metadata: serde_json::json!({}),
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let row = self
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, &row.password_salt, &row.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = generate_token();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO auth_sessions (token, user_id, created_at, last_seen_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(&row.id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let user = row.into_user();
        info!(user_id = %user.id, "Signed in");
        self.events.publish(AuthEvent::SignedIn { user: user.clone() });
        Ok(AuthSession { token, user })
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let user_id: Option<String> =
            sqlx::query_scalar("DELETE FROM auth_sessions WHERE token = ? RETURNING user_id")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(user_id) = user_id {
            info!(user_id = %user_id, "Signed out");
            self.events.publish(AuthEvent::SignedOut {
                user_id,
                reason: SignOutReason::Requested,
            });
        }
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Option<User>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT u.id, u.email, u.password_hash, u.password_salt, u.metadata, s.last_seen_at \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let now = Utc::now();
        if self.is_idle(row.last_seen_at, now) {
            sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            warn!(user_id = %row.user.id, "Session expired due to inactivity");
            self.events.publish(AuthEvent::SignedOut {
                user_id: row.user.id,
                reason: SignOutReason::Inactivity,
            });
            return Err(AuthError::SessionExpired);
        }

        sqlx::query("UPDATE auth_sessions SET last_seen_at = ? WHERE token = ?")
            .bind(now)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(Some(row.user.into_user()))
    }

    async fn update_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        validate_password_change(new_password, confirm_password)?;
        let user = self
            .current_user(token)
            .await?
            .ok_or(AuthError::NotSignedIn)?;

        let salt = generate_salt();
        sqlx::query(
            "UPDATE users SET password_hash = ?, password_salt = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(hash_password(new_password, &salt))
        .bind(&salt)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        info!(user_id = %user.id, "Password updated");
        self.events.publish(AuthEvent::PasswordUpdated { user_id: user.id });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
