//! Per-account on-disk cache of the last-known-good key set.
//!
//! One JSON file per account under the cache directory, overwritten in full
//! after every successful fetch and read back only when the authority is
//! unreachable. A missing, unreadable, or corrupt cache file reads as an
//! empty key set — the caller decides whether that is fatal.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::keys::Key;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unable to serialise keys: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Cache file for one account: `<dir>/.<account>.json`.
    pub fn path_for(&self, account: &str) -> PathBuf {
        self.dir.join(format!(".{account}.json"))
    }

    /// Overwrite the account's cache with the full key sequence.
    ///
    /// The write either fully succeeds or reports failure; a failure is a
    /// warning for the caller, not a reason to drop already-fetched keys.
    pub fn write(&self, account: &str, keys: &[Key]) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_vec(keys)?;
        write_private_file(&self.path_for(account), &body)?;
        Ok(())
    }

    /// Read the account's cached keys.
    ///
    /// Never fails: an absent or unreadable file and invalid JSON all read
    /// as an empty sequence, with a diagnostic on the debug channel.
    pub fn read(&self, account: &str) -> Vec<Key> {
        let path = self.path_for(account);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!("unable to read cache file {}: {err}", path.display());
                return Vec::new();
            }
        };
        match serde_json::from_slice(&data) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::debug!("cache file {} is not valid JSON: {err}", path.display());
                Vec::new()
            }
        }
    }
}

/// Write-then-rename with mode 0600 so readers never observe a partial file
/// and the key set stays readable only by the service account.
pub(crate) fn write_private_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        #[cfg(unix)]
        let mut file = {
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp)?
        };
        #[cfg(not(unix))]
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;

        file.write_all(data)?;
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(public_key: &str, account: &str) -> Key {
        Key {
            public_key: public_key.to_string(),
            public_key_sig: "00ff".to_string(),
            account: account.to_string(),
            ssh_options: String::new(),
        }
    }

    #[test]
    fn write_then_read_roundtrips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        let keys = vec![
            key("ssh-ed25519 AAAA alice", "alice@example.com"),
            key("ssh-ed25519 BBBB bob", ""),
        ];
        store.write("alice", &keys).unwrap();
        assert_eq!(store.read("alice"), keys);
    }

    #[test]
    fn empty_sequence_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        store.write("alice", &[]).unwrap();
        assert_eq!(store.read("alice"), Vec::<Key>::new());
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        assert!(store.read("nobody").is_empty());
    }

    #[test]
    fn corrupt_json_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("alice"), b"{ not json").unwrap();
        assert!(store.read("alice").is_empty());
    }

    #[test]
    fn overwrite_replaces_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        store.write("alice", &[key("a", "a"), key("b", "b")]).unwrap();
        store.write("alice", &[key("c", "c")]).unwrap();
        let read = store.read("alice");
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].public_key, "c");
    }

    #[test]
    fn cache_file_is_hidden_and_account_scoped() {
        let store = CacheStore::new(PathBuf::from("/var/cache/keywarden"));
        assert_eq!(
            store.path_for("alice"),
            PathBuf::from("/var/cache/keywarden/.alice.json")
        );
    }

    #[cfg(unix)]
    #[test]
    fn cache_file_is_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf());
        store.write("alice", &[key("a", "a")]).unwrap();
        let mode = std::fs::metadata(store.path_for("alice"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn write_into_unwritable_dir_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let store = CacheStore::new(file);
        assert!(store.write("alice", &[key("a", "a")]).is_err());
    }
}
