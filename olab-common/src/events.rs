//! Event types for the OLAB event system
//!
//! Auth state changes are broadcast on a `tokio::sync::broadcast` channel
//! owned by the auth provider; subscribers play the role of
//! "on auth state change" callbacks.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{LabelKind, PropertyId, SentenceId, User, UserId};

/// Channel capacity for auth and labeling events
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Why a user session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutReason {
    /// Explicit sign out
    Requested,
    /// Idle longer than the inactivity timeout
    Inactivity,
}

impl SignOutReason {
    /// Message shown on the login screen after the session ended
    pub fn message(&self) -> Option<&'static str> {
        match self {
            SignOutReason::Requested => None,
            SignOutReason::Inactivity => {
                Some("Session expired due to inactivity. Please sign in again.")
            }
        }
    }
}

/// Auth state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    SignedIn { user: User },
    SignedOut { user_id: UserId, reason: SignOutReason },
    PasswordUpdated { user_id: UserId },
}

/// Labeling activity, used for progress refresh and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LabelEvent {
    LabelSaved {
        user_id: UserId,
        property_id: PropertyId,
        sentence_id: SentenceId,
        kind: LabelKind,
        /// Counter change applied to the sentence (+1 first save, 0 edit)
        delta: i64,
    },
    PropertyVisibilityChanged {
        property_id: PropertyId,
        is_active: bool,
    },
}

/// Thin wrapper over a broadcast sender
#[derive(Debug, Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, event: E) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
