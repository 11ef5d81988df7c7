//! HTTP readiness and health probing

use async_trait::async_trait;
use std::time::Duration;

use crate::traits::HttpProbe;
use shared::{process_debug, Component};

/// Probe backed by a shared `reqwest` client
#[derive(Clone, Default)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get_ok(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let ok = response.status() == reqwest::StatusCode::OK;
                if !ok {
                    process_debug!(Component::WebServer, "Probe {} returned {}", url, response.status());
                }
                ok
            }
            Err(e) => {
                process_debug!(Component::WebServer, "Probe {} failed: {}", url, e);
                false
            }
        }
    }
}
