//! Kubeconfig codec: base64 + YAML decode/encode and the custom-name
//! extension mutation.
//!
//! Documents are handled as plain serde structures with unknown fields
//! flattened through, so credentials and vendor extensions round-trip
//! untouched. The `headlamp_info` context extension is a wire format shared
//! with other tooling and must not be corrupted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reserved extension name carrying the user-chosen display name.
pub const HEADLAMP_INFO: &str = "headlamp_info";

/// A decoded kubeconfig document. Only `clusters` and `contexts` are
/// interpreted; everything else (users, preferences, current-context, ...)
/// is carried opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubeconfigDoc {
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextDetails,
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDetails {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<NamedExtension>>,
    #[serde(flatten)]
    pub rest: serde_yaml::Mapping,
}

/// A `{name, extension}` pair under a context's `extensions` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedExtension {
    pub name: String,
    pub extension: serde_yaml::Value,
}

impl ContextDetails {
    /// The `headlamp_info.customName` override on this context, if any.
    pub fn custom_name(&self) -> Option<&str> {
        self.extensions
            .as_ref()?
            .iter()
            .find(|e| e.name == HEADLAMP_INFO)?
            .extension
            .get("customName")?
            .as_str()
    }
}

/// Base64-decode then parse the YAML document. Missing `clusters` or
/// `contexts` is a parse error.
pub fn decode(blob: &str) -> Result<KubeconfigDoc> {
    let bytes = BASE64
        .decode(blob.trim())
        .map_err(|e| Error::MalformedKubeconfig(format!("base64: {e}")))?;
    serde_yaml::from_slice(&bytes).map_err(|e| Error::MalformedKubeconfig(format!("yaml: {e}")))
}

/// Serialize to YAML then base64-encode. `decode(encode(d)) == d` for any
/// `d` produced by `decode`.
pub fn encode(doc: &KubeconfigDoc) -> Result<String> {
    let yaml = serde_yaml::to_string(doc)
        .map_err(|e| Error::MalformedKubeconfig(format!("yaml: {e}")))?;
    Ok(BASE64.encode(yaml))
}

/// Record `custom_name` as the display name for the cluster identified by
/// `cluster_name`.
///
/// The matching context is found by raw cluster name or by an existing
/// custom name (renaming an already-renamed cluster). A raw-name match
/// appends a fresh `headlamp_info` entry; a custom-name match updates the
/// existing entry in place.
pub fn set_custom_name(doc: &mut KubeconfigDoc, cluster_name: &str, custom_name: &str) -> Result<()> {
    let ctx = doc
        .contexts
        .iter_mut()
        .find(|c| c.context.cluster == cluster_name || c.context.custom_name() == Some(cluster_name))
        .ok_or_else(|| Error::ContextNotFound(cluster_name.to_string()))?;

    let matched_raw_name = ctx.context.cluster == cluster_name;
    let extensions = ctx.context.extensions.get_or_insert_with(Vec::new);

    if matched_raw_name {
        extensions.push(NamedExtension {
            name: HEADLAMP_INFO.to_string(),
            extension: custom_name_value(custom_name),
        });
    } else if let Some(entry) = extensions.iter_mut().find(|e| e.name == HEADLAMP_INFO) {
        match &mut entry.extension {
            serde_yaml::Value::Mapping(m) => {
                m.insert("customName".into(), custom_name.into());
            }
            other => *other = custom_name_value(custom_name),
        }
    }
    Ok(())
}

fn custom_name_value(custom_name: &str) -> serde_yaml::Value {
    let mut m = serde_yaml::Mapping::new();
    m.insert("customName".into(), custom_name.into());
    serde_yaml::Value::Mapping(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"apiVersion: v1
kind: Config
clusters:
- name: cluster-a
  cluster:
    server: https://example.test:6443
contexts:
- name: ctx1
  context:
    cluster: cluster-a
    user: admin
users:
- name: admin
  user:
    token: abc123
"#
    }

    fn sample_blob() -> String {
        BASE64.encode(sample_yaml())
    }

    #[test]
    fn decode_reads_clusters_and_contexts() {
        let doc = decode(&sample_blob()).unwrap();
        assert_eq!(doc.clusters.len(), 1);
        assert_eq!(doc.clusters[0].name, "cluster-a");
        assert_eq!(doc.contexts[0].context.cluster, "cluster-a");
        assert_eq!(doc.contexts[0].context.user.as_deref(), Some("admin"));
        // users carried through the flattened rest
        assert!(doc.rest.get("users").is_some());
    }

    #[test]
    fn round_trip_is_identity() {
        let doc = decode(&sample_blob()).unwrap();
        let again = decode(&encode(&doc).unwrap()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn decode_rejects_bad_base64_and_missing_keys() {
        assert!(matches!(decode("!!not-base64!!"), Err(Error::MalformedKubeconfig(_))));
        let no_contexts = BASE64.encode("clusters: []\n");
        assert!(matches!(decode(&no_contexts), Err(Error::MalformedKubeconfig(_))));
    }

    #[test]
    fn set_custom_name_appends_on_raw_match() {
        let mut doc = decode(&sample_blob()).unwrap();
        set_custom_name(&mut doc, "cluster-a", "my-name").unwrap();
        let exts = doc.contexts[0].context.extensions.as_ref().unwrap();
        let infos: Vec<_> = exts.iter().filter(|e| e.name == HEADLAMP_INFO).collect();
        assert_eq!(infos.len(), 1);
        assert_eq!(doc.contexts[0].context.custom_name(), Some("my-name"));
    }

    #[test]
    fn set_custom_name_updates_in_place_on_custom_match() {
        let mut doc = decode(&sample_blob()).unwrap();
        set_custom_name(&mut doc, "cluster-a", "my-name").unwrap();
        // Rename the already-renamed cluster via its custom name.
        set_custom_name(&mut doc, "my-name", "second-name").unwrap();
        let exts = doc.contexts[0].context.extensions.as_ref().unwrap();
        let infos: Vec<_> = exts.iter().filter(|e| e.name == HEADLAMP_INFO).collect();
        assert_eq!(infos.len(), 1, "must update the same entry, not append");
        assert_eq!(doc.contexts[0].context.custom_name(), Some("second-name"));
    }

    #[test]
    fn set_custom_name_survives_round_trip() {
        let mut doc = decode(&sample_blob()).unwrap();
        set_custom_name(&mut doc, "cluster-a", "renamed").unwrap();
        let again = decode(&encode(&doc).unwrap()).unwrap();
        assert_eq!(again.contexts[0].context.custom_name(), Some("renamed"));
        assert_eq!(doc, again);
    }

    #[test]
    fn set_custom_name_unknown_cluster_fails() {
        let mut doc = decode(&sample_blob()).unwrap();
        let err = set_custom_name(&mut doc, "nope", "x").unwrap_err();
        assert!(matches!(err, Error::ContextNotFound(_)));
    }
}
