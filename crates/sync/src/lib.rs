//! Beacon remote config synchronizer.
//!
//! Sends locally stored kubeconfigs to the backend's parsing endpoint and
//! reconciles the result into the shared cluster-config slice. Sync is a
//! best-effort background refresh: failures are logged at this boundary and
//! never propagated to the caller.

#![forbid(unsafe_code)]

pub mod debounce;

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use beacon_core::config::{ClusterMap, ParsedResponse, StatelessConfig};
use beacon_core::{Error, Result};
use beacon_persist::KubeconfigStore;
use metrics::counter;
use reqwest::header::ACCEPT;
use tracing::{debug, info, warn};

/// Seam to the backend's kubeconfig parser. In-process tests swap in a mock;
/// production posts JSON over HTTP.
#[async_trait]
pub trait ParseBackend: Send + Sync {
    /// `POST /parseKubeConfig` with `{"kubeconfigs": [...]}`.
    async fn parse_many(&self, kubeconfigs: &[String]) -> Result<ParsedResponse>;
    /// `POST /parseKubeConfig` with `{"kubeconfig": "..."}` (rename path).
    async fn parse_one(&self, kubeconfig: &str) -> Result<ParsedResponse>;
}

/// HTTP implementation of [`ParseBackend`].
pub struct HttpBackend {
    client: reqwest::Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client: reqwest::Client::new(), base }
    }

    async fn post(&self, body: serde_json::Value) -> Result<ParsedResponse> {
        let url = format!("{}/parseKubeConfig", self.base);
        let resp = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::SyncFailed(format!("posting to {url}: {e}")))?
            .error_for_status()
            .map_err(|e| Error::SyncFailed(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| Error::SyncFailed(format!("decoding parse response: {e}")))
    }
}

#[async_trait]
impl ParseBackend for HttpBackend {
    async fn parse_many(&self, kubeconfigs: &[String]) -> Result<ParsedResponse> {
        self.post(serde_json::json!({ "kubeconfigs": kubeconfigs })).await
    }

    async fn parse_one(&self, kubeconfig: &str) -> Result<ParsedResponse> {
        self.post(serde_json::json!({ "kubeconfig": kubeconfig })).await
    }
}

/// The application-wide stateless-config slice. Readers get the current
/// `Arc` snapshot; publishers swap it wholesale. Last writer wins; there is
/// no read-decide-write transaction.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<Option<StatelessConfig>>>,
}

impl SharedConfig {
    pub fn new() -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(None)) }
    }

    pub fn current(&self) -> Arc<Option<StatelessConfig>> {
        self.inner.load_full()
    }

    pub fn publish(&self, config: StatelessConfig) {
        self.inner.store(Arc::new(Some(config)));
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-parse all stored kubeconfigs and publish into the shared slice when
/// the slice was absent or the cluster key count changed. Fire-and-forget:
/// any failure is logged and the slice left untouched.
///
/// The publish decision is the original key-count heuristic, not a deep
/// diff; use [`is_config_different`] where a real comparison is needed.
pub async fn sync_stateless_configs(
    store: &KubeconfigStore,
    backend: &dyn ParseBackend,
    shared: &SharedConfig,
) {
    if let Err(e) = try_sync(store, backend, shared).await {
        counter!("sync_failed_total", 1u64);
        warn!(error = %e, "stateless config sync failed; shared state untouched");
    }
}

async fn try_sync(
    store: &KubeconfigStore,
    backend: &dyn ParseBackend,
    shared: &SharedConfig,
) -> Result<()> {
    let records = store.list_all().await?;
    let blobs: Vec<String> = records.into_iter().map(|(_, blob)| blob).collect();
    let response = backend.parse_many(&blobs).await?;
    let next = StatelessConfig::from_response(response);

    let previous = shared.current();
    let publish = match previous.as_ref() {
        None => true,
        Some(prev) => next.stateless_clusters.len() != prev.stateless_clusters.len(),
    };
    if publish {
        info!(clusters = next.stateless_clusters.len(), "publishing stateless cluster config");
        counter!("sync_publish_total", 1u64);
        shared.publish(next);
    } else {
        debug!(clusters = next.stateless_clusters.len(), "stateless config unchanged (key count)");
    }
    Ok(())
}

/// Structural comparison of two name-keyed cluster maps, ignoring the
/// volatile `useToken` field. True when presence/absence differs, key-set
/// sizes differ, or any cluster's remaining fields differ.
pub fn is_config_different(current: Option<&ClusterMap>, proposed: Option<&ClusterMap>) -> bool {
    let (current, proposed) = match (current, proposed) {
        (None, None) => return false,
        (Some(c), Some(p)) => (c, p),
        _ => return true,
    };
    if current.len() != proposed.len() {
        return true;
    }
    proposed.iter().any(|(name, cluster)| match current.get(name) {
        None => true,
        Some(existing) => !existing.same_identity(cluster),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use beacon_core::config::Cluster;
    use std::sync::Mutex;

    fn map(json: serde_json::Value) -> ClusterMap {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn diff_ignores_use_token() {
        let a = map(serde_json::json!({"a": {"name": "a", "useToken": true, "x": 1}}));
        let b = map(serde_json::json!({"a": {"name": "a", "useToken": false, "x": 1}}));
        assert!(!is_config_different(Some(&a), Some(&b)));
    }

    #[test]
    fn diff_sees_field_changes() {
        let a = map(serde_json::json!({"a": {"name": "a", "x": 1}}));
        let b = map(serde_json::json!({"a": {"name": "a", "x": 2}}));
        assert!(is_config_different(Some(&a), Some(&b)));
    }

    #[test]
    fn diff_on_presence_and_size() {
        let a = map(serde_json::json!({"a": {"name": "a"}}));
        let both = map(serde_json::json!({"a": {"name": "a"}, "b": {"name": "b"}}));
        assert!(is_config_different(None, Some(&a)));
        assert!(is_config_different(Some(&a), None));
        assert!(!is_config_different(None, None));
        assert!(is_config_different(Some(&a), Some(&both)));
        assert!(!is_config_different(Some(&a), Some(&a.clone())));
    }

    /// Canned backend recording what it was asked to parse.
    struct FakeBackend {
        response: ParsedResponse,
        seen: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl FakeBackend {
        fn with_clusters(names: &[&str]) -> Self {
            let clusters: Vec<Cluster> = names
                .iter()
                .map(|n| serde_json::from_value(serde_json::json!({"name": n})).unwrap())
                .collect();
            Self {
                response: ParsedResponse { clusters, rest: Default::default() },
                seen: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            let mut b = Self::with_clusters(&[]);
            b.fail = true;
            b
        }
    }

    #[async_trait]
    impl ParseBackend for FakeBackend {
        async fn parse_many(&self, kubeconfigs: &[String]) -> Result<ParsedResponse> {
            self.seen.lock().unwrap().push(kubeconfigs.len());
            if self.fail {
                return Err(Error::SyncFailed("backend down".to_string()));
            }
            Ok(self.response.clone())
        }

        async fn parse_one(&self, _kubeconfig: &str) -> Result<ParsedResponse> {
            if self.fail {
                return Err(Error::SyncFailed("backend down".to_string()));
            }
            Ok(self.response.clone())
        }
    }

    async fn store_with_one_blob() -> KubeconfigStore {
        let path = std::env::temp_dir().join(format!(
            "beacon-sync-{}.db",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let s = KubeconfigStore::open(path).await.unwrap();
        s.add(BASE64.encode("clusters: []\ncontexts: []\n")).await.unwrap();
        s
    }

    #[tokio::test]
    async fn sync_publishes_when_slice_absent() {
        let store = store_with_one_blob().await;
        let backend = FakeBackend::with_clusters(&["prod"]);
        let shared = SharedConfig::new();

        sync_stateless_configs(&store, &backend, &shared).await;

        let cfg = shared.current();
        let cfg = cfg.as_ref().as_ref().unwrap();
        assert!(cfg.stateless_clusters.contains_key("prod"));
        assert_eq!(*backend.seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn sync_skips_publish_on_same_key_count() {
        let store = store_with_one_blob().await;
        let backend = FakeBackend::with_clusters(&["prod"]);
        let shared = SharedConfig::new();

        sync_stateless_configs(&store, &backend, &shared).await;
        let first = shared.current();
        sync_stateless_configs(&store, &backend, &shared).await;
        let second = shared.current();
        // Same key count, no republish: the same Arc is still installed.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn sync_failure_leaves_slice_untouched() {
        let store = store_with_one_blob().await;
        let shared = SharedConfig::new();

        sync_stateless_configs(&store, &FakeBackend::with_clusters(&["prod"]), &shared).await;
        let before = shared.current();
        sync_stateless_configs(&store, &FakeBackend::failing(), &shared).await;
        let after = shared.current();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn sync_republishes_on_key_count_change() {
        let store = store_with_one_blob().await;
        let shared = SharedConfig::new();

        sync_stateless_configs(&store, &FakeBackend::with_clusters(&["prod"]), &shared).await;
        sync_stateless_configs(&store, &FakeBackend::with_clusters(&["prod", "edge"]), &shared).await;
        let cfg = shared.current();
        let cfg = cfg.as_ref().as_ref().unwrap();
        assert_eq!(cfg.stateless_clusters.len(), 2);
    }
}
