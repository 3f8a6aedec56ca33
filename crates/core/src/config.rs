//! Backend-parsed cluster configuration types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One backend-parsed cluster. Only `name` is interpreted here; the rest of
/// the payload is opaque. `useToken` fluctuates independently of cluster
/// identity and is excluded from identity comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "useToken", default, skip_serializing_if = "Option::is_none")]
    pub use_token: Option<bool>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Cluster {
    /// Equality with the volatile `useToken` flag stripped from both sides.
    pub fn same_identity(&self, other: &Cluster) -> bool {
        self.name == other.name && self.rest == other.rest
    }
}

/// Response of the backend's `/parseKubeConfig` endpoint:
/// `{ clusters: [...], ...rest }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub clusters: Vec<Cluster>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Name-keyed view of parsed clusters. Keys are unique; a cluster's key is
/// its backend-assigned name, which reflects any custom-name override.
pub type ClusterMap = HashMap<String, Cluster>;

/// The stateless slice of shared application state: the name-keyed cluster
/// map plus the full parsed response it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatelessConfig {
    pub stateless_clusters: ClusterMap,
    pub response: ParsedResponse,
}

impl StatelessConfig {
    /// Build the name-keyed map from a parsed response.
    pub fn from_response(response: ParsedResponse) -> Self {
        let stateless_clusters = response
            .clusters
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();
        Self { stateless_clusters, response }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(json: serde_json::Value) -> Cluster {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn use_token_is_not_identity() {
        let a = cluster(serde_json::json!({"name": "a", "useToken": true, "server": "s"}));
        let b = cluster(serde_json::json!({"name": "a", "useToken": false, "server": "s"}));
        assert!(a.same_identity(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn from_response_keys_by_name() {
        let response: ParsedResponse = serde_json::from_value(serde_json::json!({
            "clusters": [{"name": "a"}, {"name": "b"}],
            "extra": 1,
        }))
        .unwrap();
        let cfg = StatelessConfig::from_response(response);
        assert_eq!(cfg.stateless_clusters.len(), 2);
        assert!(cfg.stateless_clusters.contains_key("a"));
        assert_eq!(cfg.response.rest.get("extra"), Some(&serde_json::json!(1)));
    }
}
