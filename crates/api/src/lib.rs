//! Beacon public API façade (in-process).
//!
//! This crate defines the small async surface UI layers call: store / find /
//! update / delete kubeconfigs, plus the remote-config sync. The in-process
//! implementation wires the persist store, the parse backend, and the shared
//! config slice; a mock implementation serves frontend tests.

#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use beacon_core::config::StatelessConfig;
use beacon_core::Result;
use beacon_persist::ident::{self, IdentScope};
use beacon_persist::{resolve, KubeconfigStore};
use beacon_sync::{ParseBackend, SharedConfig};
use tracing::warn;

pub use beacon_core::config::{Cluster, ClusterMap, ParsedResponse};
pub use beacon_core::Error;
pub use beacon_persist::ident::{FileScope, MemScope};
pub use beacon_sync::{is_config_different, HttpBackend};

/// Async surface over the stateless-cluster kubeconfig subsystem.
#[async_trait]
pub trait StatelessClusters: Send + Sync {
    /// Persist a base64 kubeconfig blob, returning its record id.
    async fn store_kubeconfig(&self, kubeconfig: &str) -> Result<i64>;

    /// All stored blobs, in storage order.
    async fn list_kubeconfigs(&self) -> Result<Vec<String>>;

    /// First stored blob whose clusters or custom names reference `name`.
    async fn find_by_cluster_name(&self, name: &str) -> Result<Option<String>>;

    /// Rename a cluster: mutate its stored kubeconfig, then re-parse the
    /// updated blob so the shared slice reflects the new identity.
    async fn rename_cluster(&self, cluster_name: &str, new_name: &str) -> Result<()>;

    /// Remove the stored kubeconfig whose raw cluster name matches,
    /// returning the removed blob.
    async fn delete_cluster(&self, name: &str) -> Result<Option<String>>;

    /// Best-effort background refresh of the shared slice. Never fails.
    async fn sync(&self);

    /// The per-profile identifier, created on first use.
    fn user_id(&self) -> String;

    /// Current shared stateless-config slice.
    fn config(&self) -> Arc<Option<StatelessConfig>>;
}

/// In-process implementation wiring persist + sync.
pub struct InProcApi {
    store: KubeconfigStore,
    backend: Arc<dyn ParseBackend>,
    shared: SharedConfig,
    scope: Arc<dyn IdentScope>,
}

impl InProcApi {
    pub fn new(
        store: KubeconfigStore,
        backend: Arc<dyn ParseBackend>,
        shared: SharedConfig,
        scope: Arc<dyn IdentScope>,
    ) -> Self {
        Self { store, backend, shared, scope }
    }

    pub fn shared(&self) -> &SharedConfig {
        &self.shared
    }
}

#[async_trait]
impl StatelessClusters for InProcApi {
    async fn store_kubeconfig(&self, kubeconfig: &str) -> Result<i64> {
        self.store.add(kubeconfig).await
    }

    async fn list_kubeconfigs(&self) -> Result<Vec<String>> {
        Ok(self.store.list_all().await?.into_iter().map(|(_, b)| b).collect())
    }

    async fn find_by_cluster_name(&self, name: &str) -> Result<Option<String>> {
        resolve::find_by_cluster_name(&self.store, name).await
    }

    async fn rename_cluster(&self, cluster_name: &str, new_name: &str) -> Result<()> {
        resolve::rename_cluster(&self.store, cluster_name, new_name).await?;

        // The raw cluster name still resolves after a rename; re-parse the
        // updated blob and publish so readers see the new display name.
        if let Some(blob) = resolve::find_by_cluster_name(&self.store, cluster_name).await? {
            match self.backend.parse_one(&blob).await {
                Ok(response) => self.shared.publish(StatelessConfig::from_response(response)),
                Err(e) => warn!(error = %e, "re-parse after rename failed; shared state is stale"),
            }
        }
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<Option<String>> {
        resolve::delete_by_cluster_name(&self.store, name).await
    }

    async fn sync(&self) {
        beacon_sync::sync_stateless_configs(&self.store, self.backend.as_ref(), &self.shared).await;
    }

    fn user_id(&self) -> String {
        ident::get_or_create(self.scope.as_ref())
    }

    fn config(&self) -> Arc<Option<StatelessConfig>> {
        self.shared.current()
    }
}

// ----------------- Mock implementation -----------------

/// In-memory mock for frontend tests: records live in a plain Vec, the
/// config slice and user id are canned.
#[derive(Default)]
pub struct MockApi {
    pub records: std::sync::Mutex<Vec<String>>,
    pub config: SharedConfig,
    pub user_id: String,
}

#[async_trait]
impl StatelessClusters for MockApi {
    async fn store_kubeconfig(&self, kubeconfig: &str) -> Result<i64> {
        let mut records = self.records.lock().expect("mock lock");
        records.push(kubeconfig.to_string());
        Ok(records.len() as i64)
    }

    async fn list_kubeconfigs(&self) -> Result<Vec<String>> {
        Ok(self.records.lock().expect("mock lock").clone())
    }

    async fn find_by_cluster_name(&self, name: &str) -> Result<Option<String>> {
        let records = self.records.lock().expect("mock lock").clone();
        for blob in records {
            if let Ok(doc) = beacon_core::kubeconfig::decode(&blob) {
                let hit = doc.clusters.iter().any(|c| c.name == name)
                    || doc.contexts.iter().any(|c| c.context.custom_name() == Some(name));
                if hit {
                    return Ok(Some(blob));
                }
            }
        }
        Ok(None)
    }

    async fn rename_cluster(&self, cluster_name: &str, new_name: &str) -> Result<()> {
        let mut records = self.records.lock().expect("mock lock");
        for blob in records.iter_mut() {
            let Ok(mut doc) = beacon_core::kubeconfig::decode(blob) else { continue };
            if beacon_core::kubeconfig::set_custom_name(&mut doc, cluster_name, new_name).is_ok() {
                *blob = beacon_core::kubeconfig::encode(&doc)?;
                return Ok(());
            }
        }
        Err(Error::ContextNotFound(cluster_name.to_string()))
    }

    async fn delete_cluster(&self, name: &str) -> Result<Option<String>> {
        let mut records = self.records.lock().expect("mock lock");
        let idx = records.iter().position(|blob| {
            beacon_core::kubeconfig::decode(blob)
                .map(|doc| doc.clusters.iter().any(|c| c.name == name))
                .unwrap_or(false)
        });
        Ok(idx.map(|i| records.remove(i)))
    }

    async fn sync(&self) {}

    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn config(&self) -> Arc<Option<StatelessConfig>> {
        self.config.current()
    }
}
