//! Per-profile secure identifier.
//!
//! The backend disambiguates same-named clusters belonging to different
//! users by mixing a per-profile random token into proxy identities. The
//! token is generated once and persisted under a single key; the persisted
//! scope is injected so tests can swap in an in-memory one.

use rand::{Rng, RngCore};

/// Key under which the identifier is persisted. Storage contract shared
/// with other tooling; do not change the spelling.
pub const USER_ID_KEY: &str = "headlamp-userId";

/// Default identifier length in hex characters.
pub const TOKEN_LEN: usize = 16;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// A persisted string key-value scope. Persistence is assumed available;
/// there is no error path.
pub trait IdentScope: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str);
}

/// Read the persisted identifier, generating and persisting one on first
/// use. Idempotent: every later call in the same scope returns the same
/// value.
pub fn get_or_create(scope: &dyn IdentScope) -> String {
    if let Some(id) = scope.get(USER_ID_KEY) {
        return id;
    }
    let id = generate_token(TOKEN_LEN, false);
    scope.put(USER_ID_KEY, &id);
    id
}

/// Generate a random lowercase-hex token.
///
/// Production path draws OS-level random bytes, two hex digits per byte,
/// truncated to `len`. The insecure path (one thread-rng hex digit per
/// length unit) exists only for test environments and must never be used
/// outside an explicit `test_env` flag.
pub fn generate_token(len: usize, test_env: bool) -> String {
    if test_env {
        let mut rng = rand::thread_rng();
        return (0..len).map(|_| HEX[rng.gen_range(0..HEX.len())] as char).collect();
    }
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    let hex: String = buf.iter().map(|b| format!("{b:02x}")).collect();
    hex[..len].to_string()
}

/// File-backed scope: one file per key under the given directory.
pub struct FileScope {
    dir: std::path::PathBuf,
}

impl FileScope {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        let dir = dir.into();
        let _ = std::fs::create_dir_all(&dir);
        Self { dir }
    }

    /// Scope rooted at the store's data directory.
    pub fn open_default() -> Self {
        Self::new(crate::data_dir())
    }
}

impl IdentScope for FileScope {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.dir.join(key))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn put(&self, key: &str, value: &str) {
        let _ = std::fs::write(self.dir.join(key), value);
    }
}

/// In-memory scope for tests and mock frontends.
#[derive(Default)]
pub struct MemScope {
    map: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl IdentScope for MemScope {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        if let Ok(mut map) = self.map.lock() {
            map.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let scope = MemScope::default();
        let first = get_or_create(&scope);
        let second = get_or_create(&scope);
        assert_eq!(first, second);
        assert_eq!(first.len(), TOKEN_LEN);
    }

    #[test]
    fn tokens_are_lowercase_hex() {
        for test_env in [false, true] {
            let t = generate_token(TOKEN_LEN, test_env);
            assert_eq!(t.len(), TOKEN_LEN);
            assert!(t.bytes().all(|b| HEX.contains(&b)));
        }
    }

    #[test]
    fn file_scope_round_trips() {
        let dir = std::env::temp_dir().join(format!(
            "beacon-ident-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let scope = FileScope::new(&dir);
        assert!(scope.get(USER_ID_KEY).is_none());
        let id = get_or_create(&scope);
        assert_eq!(scope.get(USER_ID_KEY).as_deref(), Some(id.as_str()));
        assert_eq!(get_or_create(&scope), id);
    }
}
