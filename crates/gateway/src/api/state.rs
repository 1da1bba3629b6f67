//! Shared handler state (spec §6 Boundary), grounded on
//! `admin-gateway::state::AppState`'s `Arc<Inner>` clone-handle pattern.

use std::sync::Arc;

use crate::manager::Manager;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    manager: Arc<Manager>,
    object_store: Arc<ObjectStore>,
}

impl AppState {
    pub fn new(manager: Arc<Manager>, object_store: Arc<ObjectStore>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                manager,
                object_store,
            }),
        }
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.inner.manager
    }

    pub fn object_store(&self) -> &Arc<ObjectStore> {
        &self.inner.object_store
    }
}
