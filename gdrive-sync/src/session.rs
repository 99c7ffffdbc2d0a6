use std::sync::Arc;

use anyhow::Context;
use gdrive_core::DriveClient;
use tracing::info;

use crate::checksum::ChecksumCache;
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::path::{PathError, VirtualPath};
use crate::remote::{DriveRemote, RemoteStore};
use crate::resolver::{PathResolver, discover_root_anchor};

/// One sync session: a root anchor plus the resolver, cache and engine bound to it.
pub struct DriveSession {
    config: SyncConfig,
    engine: SyncEngine,
}

impl DriveSession {
    /// Connects to Drive with an already-acquired access token.
    pub async fn connect(config: SyncConfig, access_token: &str) -> anyhow::Result<Self> {
        let client = DriveClient::new(access_token).context("failed to build drive client")?;
        Self::connect_with_client(config, client).await
    }

    pub async fn connect_with_client(
        config: SyncConfig,
        client: DriveClient,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn RemoteStore> =
            Arc::new(DriveRemote::with_retry(client, config.retry_policy()));
        Self::bootstrap(config, store).await
    }

    pub async fn bootstrap(config: SyncConfig, store: Arc<dyn RemoteStore>) -> anyhow::Result<Self> {
        let root = discover_root_anchor(store.as_ref(), &config.root_folder)
            .await
            .with_context(|| format!("failed to locate root folder {:?}", config.root_folder))?;
        info!(id = %root.id, title = %root.title, "sync session started");

        let resolver = Arc::new(
            PathResolver::new(Arc::clone(&store), root.clone(), config.namespace.clone())
                .with_policy(config.ambiguity),
        );
        let cache = Arc::new(ChecksumCache::new(store, root, config.cache_settings()));
        Ok(Self {
            engine: SyncEngine::new(resolver, cache),
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &PathResolver {
        self.engine.resolver()
    }

    pub fn cache(&self) -> &ChecksumCache {
        self.engine.cache()
    }

    /// Parses a namespaced caller path such as `gdrive/album1/IMG_1.jpg`.
    pub fn path(&self, raw: &str) -> Result<VirtualPath, PathError> {
        VirtualPath::parse(&self.config.namespace, raw)
    }
}
