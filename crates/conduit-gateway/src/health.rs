//! Periodic health polling of downstream servers.
//!
//! Each server moves `unknown → {healthy, unhealthy}` on its first probe and
//! then toggles between the two; it never returns to `unknown`. Every server
//! has its own polling task, so one hanging server never delays the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::{DownstreamServer, Registry};

/// Last known health of a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not probed yet.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Health record for one server, overwritten on every probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    /// Server id.
    pub server: String,
    /// Current status.
    pub status: HealthStatus,
    /// When the last probe finished.
    pub last_checked: Option<DateTime<Utc>>,
    /// Error from the last failed probe; cleared on success.
    pub last_error: Option<String>,
    /// Round-trip time of the last successful probe.
    pub latency_ms: Option<u64>,
}

impl HealthRecord {
    fn unknown(server: &str) -> Self {
        Self {
            server: server.to_string(),
            status: HealthStatus::Unknown,
            last_checked: None,
            last_error: None,
            latency_ms: None,
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx within the probe timeout.
    Healthy { latency: Duration },
    /// Non-2xx, timeout or transport failure.
    Unhealthy { error: String },
}

/// Polls every registered server and keeps the latest record per server.
#[derive(Debug)]
pub struct HealthMonitor {
    registry: Arc<Registry>,
    client: reqwest::Client,
    records: RwLock<HashMap<String, HealthRecord>>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor with every server in `unknown`.
    pub fn new(
        registry: Arc<Registry>,
        client: reqwest::Client,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let records = registry
            .iter()
            .map(|s| (s.id.clone(), HealthRecord::unknown(&s.id)))
            .collect();
        Self {
            registry,
            client,
            records: RwLock::new(records),
            interval,
            probe_timeout,
        }
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Last known status, or `None` if `id` is not registered.
    pub fn status(&self, id: &str) -> Option<HealthStatus> {
        self.records.read().get(id).map(|r| r.status)
    }

    /// Full record for `id`.
    pub fn record(&self, id: &str) -> Option<HealthRecord> {
        self.records.read().get(id).cloned()
    }

    /// Every record, sorted by server id.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let mut records: Vec<HealthRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.server.cmp(&b.server));
        records
    }

    /// Number of servers currently `unhealthy`.
    pub fn unhealthy_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.status == HealthStatus::Unhealthy)
            .count()
    }

    /// Record a probe outcome for `id`, logging status transitions.
    ///
    /// Outcomes for unregistered ids are ignored.
    pub fn apply(&self, id: &str, outcome: ProbeOutcome) {
        let (previous, current) = {
            let mut records = self.records.write();
            let Some(record) = records.get_mut(id) else {
                return;
            };
            let previous = record.status;
            record.last_checked = Some(Utc::now());
            match outcome {
                ProbeOutcome::Healthy { latency } => {
                    record.status = HealthStatus::Healthy;
                    record.last_error = None;
                    record.latency_ms = Some(latency.as_millis() as u64);
                }
                ProbeOutcome::Unhealthy { error } => {
                    record.status = HealthStatus::Unhealthy;
                    record.last_error = Some(error);
                }
            }
            (previous, record.clone())
        };

        if previous == current.status {
            tracing::trace!(server = %id, status = %current.status, "health unchanged");
            return;
        }
        match current.status {
            HealthStatus::Healthy => tracing::info!(
                server = %id,
                from = %previous,
                latency_ms = current.latency_ms,
                "downstream healthy"
            ),
            _ => tracing::warn!(
                server = %id,
                from = %previous,
                error = current.last_error.as_deref().unwrap_or(""),
                "downstream unhealthy"
            ),
        }
    }

    /// Probe one server without recording the result.
    pub async fn probe(&self, server: &DownstreamServer) -> ProbeOutcome {
        let started = Instant::now();
        let result = self
            .client
            .get(server.health_url())
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ProbeOutcome::Healthy {
                latency: started.elapsed(),
            },
            Ok(response) => ProbeOutcome::Unhealthy {
                error: format!("health check returned HTTP {}", response.status().as_u16()),
            },
            Err(e) if e.is_timeout() => ProbeOutcome::Unhealthy {
                error: format!(
                    "health check timed out after {}ms",
                    self.probe_timeout.as_millis()
                ),
            },
            Err(e) if e.is_connect() => ProbeOutcome::Unhealthy {
                error: format!("connection failed: {}", e),
            },
            Err(e) => ProbeOutcome::Unhealthy {
                error: e.to_string(),
            },
        }
    }

    /// Probe one server and record the result.
    pub async fn poll_one(&self, server: &DownstreamServer) {
        let outcome = self.probe(server).await;
        self.apply(&server.id, outcome);
    }

    /// Probe every server concurrently, once.
    pub async fn poll_all(&self) {
        join_all(self.registry.iter().map(|s| self.poll_one(s))).await;
    }

    /// Start one polling task per server; each polls immediately, then every
    /// interval, until `cancel` fires.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> MonitorHandle {
        self.spawn_pollers(cancel, time::Instant::now())
    }

    /// Run one [`poll_all`](Self::poll_all) round, then start the pollers
    /// with their first probe one interval later.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> MonitorHandle {
        self.poll_all().await;
        self.spawn_pollers(cancel, time::Instant::now() + self.interval)
    }

    fn spawn_pollers(self: &Arc<Self>, cancel: CancellationToken, first: time::Instant) -> MonitorHandle {
        let tasks = self
            .registry
            .iter()
            .map(|server| {
                let monitor = Arc::clone(self);
                let server = Arc::clone(server);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    // Fixed cadence: probe latency does not push later ticks back.
                    let mut ticker = time::interval_at(first, monitor.interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = ticker.tick() => {}
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = monitor.poll_one(&server) => {}
                        }
                    }
                    tracing::debug!(server = %server.id, "health poller stopped");
                })
            })
            .collect();

        tracing::info!(
            servers = self.registry.len(),
            interval_secs = self.interval.as_secs(),
            "health monitor started"
        );
        MonitorHandle { cancel, tasks }
    }
}

/// Running pollers started by [`HealthMonitor::spawn`].
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Cancel every poller and wait for them to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        join_all(self.tasks).await;
    }
}
