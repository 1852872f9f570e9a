//! Process-wide user choices, injected into every component that needs them.
//!
//! Values are read from and written straight through to the state store.
//! Writes are last-writer-wins.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::session::ConversationSession;
use crate::storage::{
    KeyValueStore, KEY_ACCESS_TOKEN, KEY_SELECTED_MODEL, KEY_SKIPPED_VERSION, KEY_USERNAME,
    KEY_WEB_SEARCH,
};

pub struct AppState {
    store: Arc<KeyValueStore>,
    session: ConversationSession,
}

impl AppState {
    pub fn load(store: Arc<KeyValueStore>) -> Self {
        let session = ConversationSession::load(store.clone());
        Self { store, session }
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Model id sent with chat requests; `None` lets the server choose.
    pub fn selected_model(&self) -> Option<String> {
        self.store
            .get::<String>(KEY_SELECTED_MODEL)
            .filter(|m| !m.is_empty())
    }

    pub fn set_selected_model(&self, model: &str) -> Result<()> {
        self.store.set(KEY_SELECTED_MODEL, &model)?;
        info!("Selected model → {model}");
        Ok(())
    }

    pub fn web_search(&self) -> bool {
        self.store.get::<bool>(KEY_WEB_SEARCH).unwrap_or(false)
    }

    pub fn set_web_search(&self, enabled: bool) -> Result<()> {
        self.store.set(KEY_WEB_SEARCH, &enabled)?;
        info!("Web search → {}", if enabled { "on" } else { "off" });
        Ok(())
    }

    pub fn skipped_version(&self) -> Option<String> {
        self.store.get::<String>(KEY_SKIPPED_VERSION)
    }

    pub fn skip_version(&self, version: &str) -> Result<()> {
        self.store.set(KEY_SKIPPED_VERSION, &version)
    }

    pub fn clear_skipped_version(&self) -> Result<()> {
        self.store.remove(KEY_SKIPPED_VERSION)
    }

    /// Bearer token from the last successful login.
    pub fn access_token(&self) -> Option<String> {
        self.store
            .get::<String>(KEY_ACCESS_TOKEN)
            .filter(|t| !t.is_empty())
    }

    pub fn username(&self) -> Option<String> {
        self.access_token()?;
        self.store.get::<String>(KEY_USERNAME)
    }

    pub fn set_login(&self, username: &str, token: &str) -> Result<()> {
        self.store.set(KEY_ACCESS_TOKEN, &token)?;
        self.store.set(KEY_USERNAME, &username)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.remove(KEY_ACCESS_TOKEN)?;
        self.store.remove(KEY_USERNAME)?;
        info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_nothing_stored() {
        let state = AppState::load(Arc::new(KeyValueStore::in_memory()));
        assert_eq!(state.selected_model(), None);
        assert!(!state.web_search());
        assert_eq!(state.skipped_version(), None);
        assert_eq!(state.session().current_id(), None);
    }

    #[test]
    fn choices_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let state = AppState::load(Arc::new(KeyValueStore::open(&path)));
        state.set_selected_model("kumru").unwrap();
        state.set_web_search(true).unwrap();
        state.skip_version("2.0.0").unwrap();
        state.session().adopt("s-9").unwrap();

        let restored = AppState::load(Arc::new(KeyValueStore::open(&path)));
        assert_eq!(restored.selected_model().as_deref(), Some("kumru"));
        assert!(restored.web_search());
        assert_eq!(restored.skipped_version().as_deref(), Some("2.0.0"));
        assert_eq!(restored.session().current_id().as_deref(), Some("s-9"));

        restored.clear_skipped_version().unwrap();
        assert_eq!(restored.skipped_version(), None);
    }

    #[test]
    fn login_persists_until_logout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let state = AppState::load(Arc::new(KeyValueStore::open(&path)));
        assert_eq!(state.access_token(), None);
        state.set_login("ayse", "jwt-1").unwrap();

        let restored = AppState::load(Arc::new(KeyValueStore::open(&path)));
        assert_eq!(restored.access_token().as_deref(), Some("jwt-1"));
        assert_eq!(restored.username().as_deref(), Some("ayse"));

        restored.logout().unwrap();
        assert_eq!(restored.access_token(), None);
        assert_eq!(restored.username(), None);
    }
}
