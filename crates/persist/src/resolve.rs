//! Cluster identity resolution over stored kubeconfigs.
//!
//! A logical cluster name can be either a raw `clusters[].name` or a
//! `headlamp_info.customName` override on a context. Scans run in store
//! cursor order and the first match wins; duplicate names across stored
//! kubeconfigs are a known ambiguity and get no further tie-break.

use beacon_core::{kubeconfig, Error, Result};
use tracing::{debug, warn};

use crate::KubeconfigStore;

/// Return the raw blob of the first stored kubeconfig whose clusters or
/// custom-name extensions reference `name`.
pub async fn find_by_cluster_name(store: &KubeconfigStore, name: &str) -> Result<Option<String>> {
    let wanted = name.to_string();
    let hit = store
        .find_first_matching(move |blob| matches_cluster(blob, &wanted))
        .await?;
    Ok(hit.map(|(_, blob)| blob))
}

/// Delete the first stored kubeconfig whose raw `clusters[].name` matches,
/// returning the removed blob. Custom names deliberately do not match here:
/// removal addresses the underlying cluster, not its display alias.
pub async fn delete_by_cluster_name(store: &KubeconfigStore, name: &str) -> Result<Option<String>> {
    let wanted = name.to_string();
    store
        .delete_first_matching(move |blob| matches_raw_cluster(blob, &wanted))
        .await
}

/// Record `custom_name` as the display name for `cluster_name`: resolve the
/// stored blob, mutate its matching context, and write it back in place.
///
/// Find and update are separate store operations; two racing renames can
/// lose one update.
pub async fn rename_cluster(store: &KubeconfigStore, cluster_name: &str, custom_name: &str) -> Result<()> {
    let wanted = cluster_name.to_string();
    let (id, blob) = store
        .find_first_matching(move |blob| matches_cluster(blob, &wanted))
        .await?
        .ok_or_else(|| Error::ContextNotFound(cluster_name.to_string()))?;

    let mut doc = kubeconfig::decode(&blob)?;
    kubeconfig::set_custom_name(&mut doc, cluster_name, custom_name)?;
    store.update_record(id, kubeconfig::encode(&doc)?).await?;
    debug!(cluster = cluster_name, custom = custom_name, "cluster renamed");
    Ok(())
}

fn matches_cluster(blob: &str, name: &str) -> bool {
    let doc = match kubeconfig::decode(blob) {
        Ok(d) => d,
        Err(e) => {
            // One corrupt row must not mask later matches.
            warn!(error = %e, "skipping undecodable kubeconfig record");
            return false;
        }
    };
    doc.clusters.iter().any(|c| c.name == name)
        || doc.contexts.iter().any(|c| c.context.custom_name() == Some(name))
}

fn matches_raw_cluster(blob: &str, name: &str) -> bool {
    match kubeconfig::decode(blob) {
        Ok(doc) => doc.clusters.iter().any(|c| c.name == name),
        Err(e) => {
            warn!(error = %e, "skipping undecodable kubeconfig record");
            false
        }
    }
}
