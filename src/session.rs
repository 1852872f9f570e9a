//! Conversation continuity with the remote model.
//!
//! The server hands back a session id with each reply. Keeping it (and
//! sending it with the next request) is what makes follow-up questions work.
//! The id survives restarts and only goes away on an explicit reset.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::Result;
use crate::storage::{KeyValueStore, KEY_SESSION_ID};

pub struct ConversationSession {
    current: Mutex<Option<String>>,
    store: Arc<KeyValueStore>,
}

impl ConversationSession {
    /// Restore the last persisted id, if any.
    pub fn load(store: Arc<KeyValueStore>) -> Self {
        let current = store.get::<String>(KEY_SESSION_ID);
        if let Some(id) = &current {
            info!("Resuming conversation session {id}");
        }
        Self {
            current: Mutex::new(current),
            store,
        }
    }

    pub fn current_id(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Take over `new_id` if it differs from the current one. Returns whether anything changed.
    pub fn adopt(&self, new_id: &str) -> Result<bool> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() == Some(new_id) {
            return Ok(false);
        }
        self.store.set(KEY_SESSION_ID, &new_id)?;
        info!("Conversation session → {new_id}");
        *current = Some(new_id.to_string());
        Ok(true)
    }

    pub fn reset(&self) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.remove(KEY_SESSION_ID)?;
        *current = None;
        info!("Conversation session cleared");
        Ok(())
    }
}
