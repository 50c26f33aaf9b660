//! Fingerprint-based narrowing of the verified key set.
//!
//! When sshd passes the client-presented fingerprint (`%f`), the agent can
//! return just the one key the client is actually using — and attribute the
//! login to the account that owns it.

use ssh_key::{HashAlg, PublicKey};

use crate::audit;
use crate::keys::Key;

/// Return the first key whose SHA256 fingerprint matches `fingerprint`,
/// emitting an audit record for the owning account. First match wins.
///
/// Keys with an empty `account` are legacy/unattributed and never eligible
/// here. Unparsable public keys are skipped. No match returns an empty set:
/// a fingerprint was presented, so nothing else may authenticate.
pub fn filter_by_fingerprint(fingerprint: &str, user: &str, keys: &[Key]) -> Vec<Key> {
    for key in keys {
        if key.account.is_empty() {
            continue;
        }
        let parsed = match PublicKey::from_openssh(&key.public_key) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(account = %key.account, "unparsable public key: {err}");
                continue;
            }
        };
        if parsed.fingerprint(HashAlg::Sha256).to_string() == fingerprint {
            audit::record_login(&key.account, user);
            return vec![key.clone()];
        }
    }
    Vec::new()
}
