//! Shared state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use ukfaas_manager::Manager;

/// Release metadata reported by `/system/info`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub release: String,
    pub sha: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            release: "dev".to_string(),
            sha: "dev".to_string(),
        }
    }
}

/// Provider state: the coordinator plus proxy plumbing.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<dyn Manager>,
    pub client: reqwest::Client,
    pub version: VersionInfo,
    /// Outer deadline applied around invoke resolution, including any
    /// scale-from-zero readiness wait.
    pub invoke_timeout: Duration,
}

impl AppState {
    pub fn new(manager: Arc<dyn Manager>, version: VersionInfo, invoke_timeout: Duration) -> Self {
        Self {
            manager,
            client: reqwest::Client::new(),
            version,
            invoke_timeout,
        }
    }
}
