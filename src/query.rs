//! End-to-end query orchestration.
//!
//! One invocation handles one account lookup:
//! fetch → verify → store cache (fresh path) / load cache → verify
//! (fallback path) → fingerprint filter. The caller renders the surviving
//! keys and maps the outcome to a process exit code; nothing below this
//! layer terminates the process.
//!
//! Only keys that passed verification are ever written to the cache, so the
//! fallback path serves previously-verified keys even if the trust keys on
//! disk change between invocations.

use thiserror::Error;

use crate::cache::CacheStore;
use crate::config::Settings;
use crate::fingerprint;
use crate::keys::Key;
use crate::remote::{self, FetchError, Fetcher};
use crate::verify;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Verification requested with nothing to verify against — refused
    /// before any network or cache work.
    #[error("verification requested but no trusted public key configured")]
    MissingTrustKeys,
    #[error("unable to resolve local hostname: {0}")]
    Hostname(std::io::Error),
    /// The authority was unreachable or unusable and the cache had nothing:
    /// there is no safe key set to print.
    #[error("unable to obtain keys ({fetch}) and the cache is empty")]
    NoKeys { fetch: FetchError },
}

#[derive(Debug)]
pub struct QueryOutcome {
    pub keys: Vec<Key>,
    /// The fetched keys could not be cached; they are still printed, but
    /// the invocation reports the failure through its exit code.
    pub cache_write_failed: bool,
}

pub async fn run(
    settings: &Settings,
    account: &str,
    fingerprint: Option<&str>,
    connection: Option<&str>,
) -> Result<QueryOutcome, QueryError> {
    if settings.verify && settings.public_keys.is_empty() {
        return Err(QueryError::MissingTrustKeys);
    }

    let host = remote::local_hostname(&settings.hostname_prefix, &settings.hostname_suffix)
        .map_err(QueryError::Hostname)?;
    let cache = CacheStore::new(settings.cache_dir.clone());

    let fetched = match Fetcher::new(settings) {
        Ok(fetcher) => {
            fetcher
                .authorized_keys(&host, account, fingerprint, connection)
                .await
        }
        Err(err) => Err(err),
    };

    let mut cache_write_failed = false;
    let keys = match fetched {
        Ok(keys) => {
            tracing::debug!(count = keys.len(), "fetched keys from authority");
            let keys = if settings.verify {
                verify::verify_keys(&settings.public_keys, &keys)
            } else {
                keys
            };
            if let Err(err) = cache.write(account, &keys) {
                tracing::warn!("unable to write cache for {account}: {err}");
                cache_write_failed = true;
            }
            keys
        }
        Err(fetch) => {
            tracing::debug!("fetch failed ({fetch}), falling back to cache");
            let cached = cache.read(account);
            if cached.is_empty() {
                return Err(QueryError::NoKeys { fetch });
            }
            if settings.verify {
                verify::verify_keys(&settings.public_keys, &cached)
            } else {
                cached
            }
        }
    };

    let keys = match fingerprint {
        Some(fp) => fingerprint::filter_by_fingerprint(fp, account, &keys),
        None => keys,
    };

    Ok(QueryOutcome {
        keys,
        cache_write_failed,
    })
}
