//! Event source over HTTP
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic; the orchestrator
//! runs it on worker threads.

use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

use super::{EventPage, EventSource, FetchError};
use crate::models::{AccountId, Cursor};

/// Fetches event pages from `GET {base}/events/{cursor}`
///
/// Each account authenticates with its own bearer token, which the host app
/// keeps current through [`HttpEventSource::set_access_token`].
pub struct HttpEventSource {
    agent: ureq::Agent,
    base_url: Url,
    tokens: RwLock<HashMap<AccountId, String>>,
}

impl HttpEventSource {
    /// Create a source for the API at `base_url`
    ///
    /// `timeout` bounds every request end to end, so a stalled server never
    /// holds an account's sync lock indefinitely.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            base_url,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// Set or replace the access token used for an account
    pub fn set_access_token(&self, account_id: &AccountId, token: impl Into<String>) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(account_id.clone(), token.into());
        }
    }

    /// Forget an account's token (on logout)
    pub fn remove_account(&self, account_id: &AccountId) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.remove(account_id);
        }
    }

    fn events_url(&self, since: &Cursor) -> Result<Url, FetchError> {
        let relative = if since.is_start() {
            "events".to_string()
        } else {
            format!("events/{}", urlencoding::encode(since.as_str()))
        };
        self.base_url
            .join(&relative)
            .map_err(|e| FetchError::Remote(format!("Cannot build events URL: {}", e)))
    }

    fn token_for(&self, account_id: &AccountId) -> Result<String, FetchError> {
        self.tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.get(account_id).cloned())
            .ok_or_else(|| FetchError::Remote(format!("No access token for {}", account_id)))
    }
}

impl EventSource for HttpEventSource {
    fn fetch_events(
        &self,
        account_id: &AccountId,
        since: &Cursor,
    ) -> Result<EventPage, FetchError> {
        let url = self.events_url(since)?;
        let token = self.token_for(account_id)?;
        debug!("Fetching events for {} since {}", account_id, since);

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &format!("Bearer {}", token))
            .header("Accept", "application/json")
            .call()
            .map_err(classify_error)?;

        response
            .body_mut()
            .read_json::<EventPage>()
            .map_err(|e| match classify_error(e) {
                // A body that fails mid-read is still a transport problem
                network @ FetchError::Network(_) => network,
                FetchError::Remote(msg) => {
                    FetchError::Remote(format!("Malformed events response: {}", msg))
                }
            })
    }
}

/// Split ureq failures into "could not connect" and "server said no"
fn classify_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(code) => FetchError::Remote(format!("HTTP {}", code)),
        e @ (ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed) => FetchError::Network(e.to_string()),
        other => FetchError::Remote(other.to_string()),
    }
}
