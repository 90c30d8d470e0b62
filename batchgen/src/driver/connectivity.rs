//! Reachability backpressure.
//!
//! A task that finds the network down blocks itself until the probe succeeds
//! again. Other tasks are unaffected; each of them probes on its own.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::AutomationDriver;
use crate::{Error, Result};

/// Configuration for connectivity handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Sleep between failed probes in milliseconds.
    pub retry_delay_ms: u64,
    /// URL requested by the HTTP probe.
    pub probe_url: String,
    /// HTTP probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 30_000,
            probe_url: "https://www.google.com".to_string(),
            probe_timeout_ms: 5_000,
        }
    }
}

/// Shared reachability gate.
///
/// Loss and restore are logged once per transition across all callers.
pub struct ConnectivityGate {
    retry_delay: Duration,
    online: AtomicBool,
}

impl ConnectivityGate {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            online: AtomicBool::new(true),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Block the calling task until `driver` reports the network reachable.
    ///
    /// Returns `false` if cancelled while waiting.
    pub async fn wait_until_reachable<D: AutomationDriver>(
        &self,
        driver: &D,
        cancel: &CancellationToken,
    ) -> bool {
        self.wait_offline(driver, cancel).await.is_some()
    }

    /// Like [`Self::wait_until_reachable`], but reports how long the task was
    /// held offline. Zero when the first probe succeeds, `None` if cancelled.
    pub async fn wait_offline<D: AutomationDriver>(
        &self,
        driver: &D,
        cancel: &CancellationToken,
    ) -> Option<Duration> {
        let mut offline_since: Option<Instant> = None;

        loop {
            if driver.is_reachable().await {
                if !self.online.swap(true, Ordering::SeqCst) {
                    info!("Connectivity restored, resuming work");
                }
                return Some(offline_since.map_or(Duration::ZERO, |since| since.elapsed()));
            }
            offline_since.get_or_insert_with(Instant::now);

            if self.online.swap(false, Ordering::SeqCst) {
                warn!(
                    retry_in_ms = self.retry_delay.as_millis() as u64,
                    "Connectivity lost, pausing workers"
                );
            } else {
                debug!("Still offline");
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }
}

/// HTTP reachability probe.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &ConnectivityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.probe_timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP probe client: {}", e)))?;

        Ok(Self {
            client,
            url: config.probe_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Any HTTP response counts as reachable.
    pub async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Reachability probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_unreachable_address() {
        let config = ConnectivityConfig {
            retry_delay_ms: 10,
            probe_url: "http://127.0.0.1:9".to_string(),
            probe_timeout_ms: 500,
        };
        let probe = HttpProbe::new(&config).unwrap();
        assert!(!probe.is_reachable().await);
    }

    #[test]
    fn test_gate_starts_online() {
        let gate = ConnectivityGate::new(Duration::from_millis(10));
        assert!(gate.is_online());
    }
}
