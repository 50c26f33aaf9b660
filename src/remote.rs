//! Remote authority client: one authenticated, time-bounded request.
//!
//! `GET {base}/authorized_keys/{hostname}/{account}` with a bearer token,
//! optional `f` (client fingerprint) and `c` (connection token) query
//! parameters, and a hard timeout so a dead authority can never hang an
//! interactive login. Every failure maps to a typed outcome the caller
//! resolves via the cache fallback.

use std::time::Duration;

use thiserror::Error;

use crate::config::Settings;
use crate::keys::Key;
use crate::version;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unable to build request: {0}")]
    Build(reqwest::Error),
    #[error("unable to reach authority: {0}")]
    Transport(reqwest::Error),
    #[error("authority returned HTTP {0}")]
    Status(u16),
    #[error("authority response is not a key list: {0}")]
    Parse(reqwest::Error),
}

/// Local hostname with the configured prefix/suffix applied.
///
/// Failure here is fatal to the invocation: without a hostname the request
/// path cannot be constructed.
pub fn local_hostname(prefix: &str, suffix: &str) -> std::io::Result<String> {
    let name = hostname::get()?;
    Ok(format!("{prefix}{}{suffix}", name.to_string_lossy()))
}

/// Third token of the sshd connection-info string, when it splits into
/// exactly four whitespace-separated tokens. Passed through opaquely as the
/// `c` query parameter.
pub fn connection_token(connection: &str) -> Option<&str> {
    let parts: Vec<&str> = connection.split_whitespace().collect();
    (parts.len() == 4).then(|| parts[2])
}

pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(version::user_agent())
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(FetchError::Build)?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    /// Fetch the candidate key list for `account`, in authority order.
    pub async fn authorized_keys(
        &self,
        host: &str,
        account: &str,
        fingerprint: Option<&str>,
        connection: Option<&str>,
    ) -> Result<Vec<Key>, FetchError> {
        let url = format!(
            "{}/authorized_keys/{}/{}",
            self.base_url,
            urlencoding::encode(host),
            urlencoding::encode(account)
        );
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(f) = fingerprint {
            query.push(("f", f));
        }
        if let Some(c) = connection.and_then(connection_token) {
            query.push(("c", c));
        }
        tracing::debug!(%url, "querying authority");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.token),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| {
                if err.is_builder() {
                    FetchError::Build(err)
                } else {
                    FetchError::Transport(err)
                }
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(FetchError::Status(status));
        }
        response.json().await.map_err(FetchError::Parse)
    }
}
