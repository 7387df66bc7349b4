//! Prometheus metrics and the health/metrics HTTP server
//!
//! The collector groups its series by concern. Matchmaking metrics follow
//! the queue depth, open proposals and how each proposal closed. Relay
//! metrics count forwarded signals by kind and outcome. Service metrics
//! track connections and uptime.

pub mod collector;
pub mod health;

pub use collector::{
    MatchmakingMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, RelayMetrics,
    ServiceMetrics,
};
pub use health::HealthServer;

use std::sync::Arc;

/// Collector plus the health server that exposes it
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    /// Get the metrics collector
    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Get the health server
    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    /// Serve `/health`, `/metrics` and friends until stopped
    pub async fn start(&self) -> anyhow::Result<()> {
        self.health_server.start().await
    }

    /// Stop the metrics service
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}
