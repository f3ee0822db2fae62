//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::PortalConfig;
use crate::db::Store;
use crate::identity::IdentityClient;
use crate::storage::ObjectStorage;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// store, object storage, the identity-provider client and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PortalConfig,
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    identity: IdentityClient,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: PortalConfig,
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let identity = IdentityClient::new(&config.identity);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                storage,
                identity,
            }),
        }
    }

    /// Get a reference to the portal configuration.
    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.inner.config
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    /// Get a reference to object storage.
    #[must_use]
    pub fn storage(&self) -> &dyn ObjectStorage {
        self.inner.storage.as_ref()
    }

    /// Get a reference to the identity-provider client.
    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }
}
