//! keywarden — SSH login-time key distribution agent.
//!
//! Invoked synchronously by sshd's `AuthorizedKeysCommand` for each
//! connecting user, the agent prints the set of public keys authorized for
//! that account to stdout. Candidate keys come from a remote authority over
//! an authenticated HTTP channel; when the authority is unreachable the
//! agent falls back to a local per-account cache so logins keep working
//! during outages.
//!
//! Pipeline: fetch → verify (signatures against trusted signer keys) →
//! store cache → fingerprint filter → render `authorized_keys` lines.
//! On any unresolved error the agent prints nothing and exits non-zero, so
//! sshd denies the login rather than guessing (fail-closed).

pub mod audit;
pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod install;
pub mod keys;
pub mod query;
pub mod remote;
pub mod sshd;
pub mod verify;
pub mod version;

pub use keys::Key;
