//! Best-effort audit record for fingerprint-attributed logins.
//!
//! One syslog line on the AUTH facility naming which account's key was used
//! to log in as which local user. Delivery is best-effort: a missing syslog
//! socket must never fail a login, so every error is swallowed after a
//! debug-level note.

use syslog::{Facility, Formatter3164};

use crate::version;

pub fn record_login(account: &str, user: &str) {
    let formatter = Formatter3164 {
        facility: Facility::LOG_AUTH,
        hostname: None,
        process: version::NAME.to_string(),
        pid: std::process::id(),
    };
    match syslog::unix(formatter) {
        Ok(mut logger) => {
            if let Err(err) = logger.info(format!("account {account} logged in as {user}")) {
                tracing::debug!("audit record not delivered: {err}");
            }
        }
        Err(err) => {
            tracing::debug!("syslog unavailable, audit record dropped: {err}");
        }
    }
}
