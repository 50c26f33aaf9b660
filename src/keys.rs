//! Key records and `authorized_keys` rendering.

use std::io::Write;

use serde::{Deserialize, Serialize};

/// One candidate authentication key, as returned by the authority or read
/// from the local cache.
///
/// The wire field `email` identifies the account that owns the key; an empty
/// string means the record is unattributed (legacy). `public_key_sig` is the
/// hex-encoded signature over the UTF-8 bytes of `public_key`, produced by
/// the authority's signer. An unparsable signature is treated as
/// "verification fails", never as a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub public_key_sig: String,
    #[serde(default, rename = "email")]
    pub account: String,
    #[serde(default)]
    pub ssh_options: String,
}

/// Render one `authorized_keys` line: the options prefix (followed by
/// exactly one space) when present, then the public key, then a newline.
pub fn authorized_keys_line(key: &Key) -> String {
    if key.ssh_options.is_empty() {
        format!("{}\n", key.public_key)
    } else {
        format!("{} {}\n", key.ssh_options, key.public_key)
    }
}

/// Print the surviving keys in order, one line each.
///
/// sshd closes the pipe as soon as it has seen enough, so a write error
/// (typically `BrokenPipe`) stops printing without being treated as an
/// application failure.
pub fn write_authorized_keys(keys: &[Key], out: &mut impl Write) {
    for key in keys {
        if let Err(err) = out.write_all(authorized_keys_line(key).as_bytes()) {
            if err.kind() != std::io::ErrorKind::BrokenPipe {
                tracing::debug!("stopped printing keys: {err}");
            }
            break;
        }
    }
    let _ = out.flush();
}
