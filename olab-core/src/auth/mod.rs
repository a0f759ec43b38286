//! Authentication collaborator
//!
//! Bearer-token sessions with an inactivity timeout. State changes are
//! broadcast as [`AuthEvent`]s; [`AuthProvider::subscribe`] hands out a
//! receiver.

use async_trait::async_trait;
use olab_common::events::AuthEvent;
use olab_common::models::User;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::AuthError;

pub mod hosted;
pub mod local;

pub use hosted::HostedAuth;
pub use local::LocalAuth;

/// Issued on sign in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new account. The e-mail is trimmed and lowercased.
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    /// User behind a token. Unknown tokens give `Ok(None)`; a session idle
    /// past the inactivity timeout is ended and reported as
    /// [`AuthError::SessionExpired`]. A successful lookup counts as activity.
    async fn current_user(&self, token: &str) -> Result<Option<User>, AuthError>;

    async fn update_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
