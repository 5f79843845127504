//! Readiness probing of function frontends.

use async_trait::async_trait;
use url::Url;

/// Checks whether a function frontend answers HTTP yet.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn ready(&self, endpoint: &Url) -> bool;
}

/// Probe that issues a GET against the frontend; any HTTP response counts
/// as ready, the watchdog's status code does not matter.
#[derive(Debug, Clone)]
pub struct HttpReadinessProbe {
    client: reqwest::Client,
}

impl HttpReadinessProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn ready(&self, endpoint: &Url) -> bool {
        self.client.get(endpoint.clone()).send().await.is_ok()
    }
}
