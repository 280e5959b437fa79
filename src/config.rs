//! Client configuration: where the remote store lives and how long we are
//! willing to wait for it.

use std::time::Duration;
use url::Url;

/// Submissions with no response within this window transition to `Failed`
/// with a timeout reason rather than hanging indefinitely.
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause between reload attempts after the change feed is disrupted.
const DEFAULT_FEED_RETRY: Duration = Duration::from_secs(2);

/// Configuration for the engine and its HTTP client.
#[derive(Debug, Clone)]
pub struct Config {
    base_url: Url,
    api_key: Option<String>,
    submit_timeout: Duration,
    feed_retry: Duration,
}

impl Config {
    /// Creates a configuration pointing at `base_url` with default timeouts.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            feed_retry: DEFAULT_FEED_RETRY,
        }
    }

    /// Sets the bearer token sent with every remote store request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    pub fn with_feed_retry(mut self, feed_retry: Duration) -> Self {
        self.feed_retry = feed_retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn submit_timeout(&self) -> Duration {
        self.submit_timeout
    }

    pub fn feed_retry(&self) -> Duration {
        self.feed_retry
    }
}
