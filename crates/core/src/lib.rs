//! Beacon core types: kubeconfig documents, cluster config, and errors.

#![forbid(unsafe_code)]

pub mod config;
pub mod kubeconfig;

use serde::{Deserialize, Serialize};

/// Errors suitable for transport over RPC later. Storage and codec failures
/// propagate to the caller; sync failures are swallowed at the sync boundary.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum Error {
    /// The storage engine is missing or could not be opened/migrated.
    #[error("store_unavailable: {0}")]
    StoreUnavailable(String),
    /// An underlying read/write failed; carries the engine's error text.
    #[error("transaction_failed: {0}")]
    TransactionFailed(String),
    /// The record id no longer exists.
    #[error("record_not_found: id {0}")]
    RecordNotFound(i64),
    /// The blob did not base64-decode or parse as a kubeconfig document.
    #[error("malformed_kubeconfig: {0}")]
    MalformedKubeconfig(String),
    /// No context matched the requested cluster or custom name.
    #[error("context_not_found: no context matches {0:?}")]
    ContextNotFound(String),
    /// Network/backend error while synchronizing parsed configs.
    #[error("sync_failed: {0}")]
    SyncFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
