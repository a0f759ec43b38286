//! Per-user annotation sessions
//!
//! A session is created on first use and guarded by its own mutex, so the
//! requests of one user run one after another while different users never
//! wait on each other.

use olab_common::events::AuthEvent;
use olab_common::models::UserId;
use olab_core::AnnotationSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type SessionHandle = Arc<Mutex<AnnotationSession>>;

pub struct SessionRegistry {
    batch_size: usize,
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session of `user_id`, created empty if there is none
    pub async fn get(&self, user_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, "Creating annotation session");
                Arc::new(Mutex::new(AnnotationSession::new(user_id, self.batch_size)))
            })
            .clone()
    }

    /// Forget a user's session; `true` if there was one
    pub async fn remove(&self, user_id: &str) -> bool {
        self.sessions.lock().await.remove(user_id).is_some()
    }

    pub async fn contains(&self, user_id: &str) -> bool {
        self.sessions.lock().await.contains_key(user_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Remove sessions of users as they sign out or time out
pub fn spawn_auth_listener(
    registry: Arc<SessionRegistry>,
    mut events: broadcast::Receiver<AuthEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedOut { user_id, reason }) => {
                    if registry.remove(&user_id).await {
                        info!(user_id = %user_id, ?reason, "Dropped annotation session");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
