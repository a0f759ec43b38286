//! Hosted accounts through GoTrue-style endpoints
//!
//! The remote service owns credentials and tokens. Inactivity is tracked
//! here, per access token, since the remote tokens only expire on their own
//! schedule. Only tokens issued by this process's `sign_in` are honoured; a
//! token dropped for inactivity or sign out stays rejected even when the
//! remote service still accepts it.

use async_trait::async_trait;
use olab_common::credentials::{normalize_email, validate_password, validate_password_change};
use olab_common::events::{AuthEvent, EventBus, SignOutReason};
use olab_common::models::User;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::{AuthProvider, AuthSession};
use crate::error::{AuthError, StoreError};

/// User object as returned by the auth service
#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl From<RemoteUser> for User {
    fn from(u: RemoteUser) -> Self {
        User {
            id: u.id,
            email: u.email.unwrap_or_default(),
            metadata: u.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: RemoteUser,
}

/// Sign-up answers with either a session or a bare user, depending on
/// whether e-mail confirmation is enabled
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: RemoteUser },
    User(RemoteUser),
}

/// Error body; field names differ between endpoints and versions
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn text(self) -> String {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .unwrap_or_default()
    }
}

/// Last request seen for one access token
#[derive(Debug, Clone)]
struct Activity {
    user_id: String,
    last: Instant,
}

/// Result of recording a request for a token
#[derive(Debug, PartialEq, Eq)]
enum Touch {
    Active,
    /// Idle past the timeout; the token is now forgotten
    Expired { user_id: String },
    /// Never issued here, signed out, or already expired
    Unknown,
}

pub struct HostedAuth {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    inactivity_timeout: Duration,
    last_seen: Mutex<HashMap<String, Activity>>,
    events: EventBus<AuthEvent>,
}

impl HostedAuth {
    pub fn new(
        base_url: &str,
        api_key: &str,
        request_timeout: Duration,
        inactivity_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("olab/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            inactivity_timeout,
            last_seen: Mutex::new(HashMap::new()),
            events: EventBus::new(),
        })
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/auth/v1/{}", self.base_url, path);
        debug!(url = %url, "Auth request");
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(token.unwrap_or(&self.api_key))
    }

    async fn error_from(response: reqwest::Response) -> (StatusCode, String) {
        let status = response.status();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        (status, body.text())
    }

    async fn register(&self, token: &str, user_id: &str) {
        self.last_seen.lock().await.insert(
            token.to_string(),
            Activity {
                user_id: user_id.to_string(),
                last: Instant::now(),
            },
        );
    }

    /// Record a request for `token`, then drop every other idle token.
    /// Owners of dropped tokens get a `SignedOut` event.
    async fn touch(&self, token: &str) -> Touch {
        let now = Instant::now();
        let (touch, pruned) = {
            let mut seen = self.last_seen.lock().await;
            let touch = match seen.get(token).map(|a| a.last) {
                None => Touch::Unknown,
                Some(last) if now.duration_since(last) > self.inactivity_timeout => Touch::Expired {
                    user_id: seen.remove(token).map(|a| a.user_id).unwrap_or_default(),
                },
                Some(_) => {
                    if let Some(activity) = seen.get_mut(token) {
                        activity.last = now;
                    }
                    Touch::Active
                }
            };
            let idle: Vec<String> = seen
                .iter()
                .filter(|(_, a)| now.duration_since(a.last) > self.inactivity_timeout)
                .map(|(t, _)| t.clone())
                .collect();
            let pruned: Vec<String> = idle
                .iter()
                .filter_map(|t| seen.remove(t))
                .map(|a| a.user_id)
                .collect();
            (touch, pruned)
        };

        for user_id in pruned {
            debug!(user_id = %user_id, "Dropped idle token");
            self.events.publish(AuthEvent::SignedOut {
                user_id,
                reason: SignOutReason::Inactivity,
            });
        }
        touch
    }

    /// Best-effort remote logout; the token is already forgotten locally
    async fn remote_logout(&self, token: &str) {
        match self.request(Method::POST, "logout", Some(token)).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "Remote logout failed");
            }
            Ok(_) => {}
            Err(e) => warn!("Remote logout failed: {}", e),
        }
    }
}

#[async_trait]
impl AuthProvider for HostedAuth {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        let response = self
            .request(Method::POST, "signup", None)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(StoreError::from)?;

        if !response.status().is_success() {
            let (status, message) = Self::error_from(response).await;
            if message.to_lowercase().contains("already registered") {
                return Err(AuthError::AlreadyRegistered);
            }
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body: SignUpResponse = response.json().await.map_err(StoreError::from)?;
        let user: User = match body {
            SignUpResponse::Session { user } | SignUpResponse::User(user) => user.into(),
        };
        info!(user_id = %user.id, "Registered hosted account");
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let response = self
            .request(Method::POST, "token?grant_type=password", None)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(StoreError::from)?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AuthError::InvalidCredentials)
            }
            _ => {
                let (status, message) = Self::error_from(response).await;
                return Err(StoreError::Api {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }
        }

        let body: TokenResponse = response.json().await.map_err(StoreError::from)?;
        let user: User = body.user.into();
        self.register(&body.access_token, &user.id).await;
        info!(user_id = %user.id, "Signed in");
        self.events.publish(AuthEvent::SignedIn { user: user.clone() });
        Ok(AuthSession {
            token: body.access_token,
            user,
        })
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let known = self.last_seen.lock().await.remove(token);
        self.remote_logout(token).await;
        if let Some(Activity { user_id, .. }) = known {
            info!(user_id = %user_id, "Signed out");
            self.events.publish(AuthEvent::SignedOut {
                user_id,
                reason: SignOutReason::Requested,
            });
        }
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Option<User>, AuthError> {
        match self.touch(token).await {
            Touch::Active => {}
            Touch::Unknown => return Ok(None),
            Touch::Expired { user_id } => {
                warn!(user_id = %user_id, "Session expired due to inactivity");
                self.remote_logout(token).await;
                self.events.publish(AuthEvent::SignedOut {
                    user_id,
                    reason: SignOutReason::Inactivity,
                });
                return Err(AuthError::SessionExpired);
            }
        }

        let response = self
            .request(Method::GET, "user", Some(token))
            .send()
            .await
            .map_err(StoreError::from)?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.last_seen.lock().await.remove(token);
                return Ok(None);
            }
            _ => {
                let (status, message) = Self::error_from(response).await;
                return Err(StoreError::Api {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }
        }

        let user: User = response
            .json::<RemoteUser>()
            .await
            .map_err(StoreError::from)?
            .into();
        Ok(Some(user))
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

        let response = self
            .request(Method::PUT, "user", Some(token))
            .json(&serde_json::json!({ "password": new_password }))
            .send()
            .await
            .map_err(StoreError::from)?;
        if !response.status().is_success() {
            let (status, message) = Self::error_from(response).await;
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        info!(user_id = %user.id, "Password updated");
        self.events.publish(AuthEvent::PasswordUpdated { user_id: user.id });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
