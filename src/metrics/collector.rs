//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the duet matchmaking and
//! signaling service using Prometheus metrics.

use crate::matchmaking::engine::MatchmakingStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Matchmaking metrics
    matchmaking_metrics: MatchmakingMetrics,

    /// Signaling relay metrics
    relay_metrics: RelayMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Live client connections
    pub connections_active: IntGauge,

    /// Total client connections accepted
    pub connections_total: IntCounter,

    /// Client messages received by event name
    pub client_messages_total: IntCounterVec,

    /// Client frames rejected at the boundary
    pub invalid_messages_total: IntCounter,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Matchmaking metrics
#[derive(Clone)]
pub struct MatchmakingMetrics {
    /// Connections currently in the waiting queue
    pub waiting_connections: IntGauge,

    /// Connections currently searching (queued or proposal-pending)
    pub searching_connections: IntGauge,

    /// Open proposals
    pub open_proposals: IntGauge,

    /// Connections with a confirmed partner
    pub matched_connections: IntGauge,

    /// Seek requests by outcome
    pub seeks_total: IntCounterVec,

    /// Closed proposals by outcome
    pub proposals_closed_total: IntCounterVec,

    /// Events emitted to clients by event name and delivery status
    pub events_emitted_total: IntCounterVec,
}

/// Signaling relay metrics
#[derive(Clone)]
pub struct RelayMetrics {
    /// Relayed messages by kind and outcome
    pub signals_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Engine operation durations
    pub operation_duration: HistogramVec,

    /// Time from proposal to confirmation
    pub confirmation_latency: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let matchmaking_metrics = MatchmakingMetrics::new(&registry)?;
        let relay_metrics = RelayMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            matchmaking_metrics,
            relay_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get matchmaking metrics
    pub fn matchmaking(&self) -> &MatchmakingMetrics {
        &self.matchmaking_metrics
    }

    /// Get relay metrics
    pub fn relay(&self) -> &RelayMetrics {
        &self.relay_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from an engine stats snapshot
    pub fn update_from_matchmaking_stats(&self, stats: &MatchmakingStats) {
        self.matchmaking_metrics
            .waiting_connections
            .set(stats.waiting as i64);
        self.matchmaking_metrics
            .searching_connections
            .set(stats.searching as i64);
        self.matchmaking_metrics
            .open_proposals
            .set(stats.open_proposals as i64);
        self.matchmaking_metrics
            .matched_connections
            .set(stats.matched_connections as i64);
        self.service_metrics
            .connections_active
            .set(stats.live_connections as i64);
    }

    /// Record a seek request
    pub fn record_seek(&self, outcome: &str) {
        self.matchmaking_metrics
            .seeks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a proposal leaving the store
    pub fn record_proposal_closed(&self, outcome: &str) {
        self.matchmaking_metrics
            .proposals_closed_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a confirmed match and how long the proposal was open
    pub fn record_match_confirmed(&self, latency: Duration) {
        self.record_proposal_closed("confirmed");
        self.performance_metrics
            .confirmation_latency
            .observe(latency.as_secs_f64());
    }

    /// Record an event handed to the registry
    pub fn record_event_emitted(&self, event: &str, delivered: bool) {
        let status = if delivered { "delivered" } else { "dropped" };
        self.matchmaking_metrics
            .events_emitted_total
            .with_label_values(&[event, status])
            .inc();
    }

    /// Record a relayed signaling message
    pub fn record_signal(&self, kind: &str, outcome: &str) {
        self.relay_metrics
            .signals_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Record a client message received by the transport
    pub fn record_client_message(&self, event: &str) {
        self.service_metrics
            .client_messages_total
            .with_label_values(&[event])
            .inc();
    }

    /// Record a client frame that failed validation
    pub fn record_invalid_message(&self) {
        self.service_metrics.invalid_messages_total.inc();
    }

    /// Record a connection being accepted
    pub fn record_connection_opened(&self) {
        self.service_metrics.connections_total.inc();
        self.service_metrics.connections_active.inc();
    }

    /// Record a connection closing
    pub fn record_connection_closed(&self) {
        self.service_metrics.connections_active.dec();
    }

    /// Record engine operation duration
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::new("duet_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let connections_active =
            IntGauge::new("duet_connections_active", "Live client connections")?;
        registry.register(Box::new(connections_active.clone()))?;

        let connections_total =
            IntCounter::new("duet_connections_total", "Total client connections accepted")?;
        registry.register(Box::new(connections_total.clone()))?;

        let client_messages_total = IntCounterVec::new(
            Opts::new("duet_client_messages_total", "Client messages received"),
            &["event"],
        )?;
        registry.register(Box::new(client_messages_total.clone()))?;

        let invalid_messages_total = IntCounter::new(
            "duet_invalid_messages_total",
            "Client frames rejected at the boundary",
        )?;
        registry.register(Box::new(invalid_messages_total.clone()))?;

        let health_status = IntGauge::new(
            "duet_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("duet_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            connections_active,
            connections_total,
            client_messages_total,
            invalid_messages_total,
            health_status,
            component_health,
        })
    }
}

impl MatchmakingMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let waiting_connections =
            IntGauge::new("duet_waiting_connections", "Connections in the waiting queue")?;
        registry.register(Box::new(waiting_connections.clone()))?;

        let searching_connections = IntGauge::new(
            "duet_searching_connections",
            "Connections searching for a partner",
        )?;
        registry.register(Box::new(searching_connections.clone()))?;

        let open_proposals = IntGauge::new("duet_open_proposals", "Open match proposals")?;
        registry.register(Box::new(open_proposals.clone()))?;

        let matched_connections = IntGauge::new(
            "duet_matched_connections",
            "Connections with a confirmed partner",
        )?;
        registry.register(Box::new(matched_connections.clone()))?;

        let seeks_total = IntCounterVec::new(
            Opts::new("duet_seeks_total", "Seek requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(seeks_total.clone()))?;

        let proposals_closed_total = IntCounterVec::new(
            Opts::new("duet_proposals_closed_total", "Closed proposals by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(proposals_closed_total.clone()))?;

        let events_emitted_total = IntCounterVec::new(
            Opts::new("duet_events_emitted_total", "Events emitted to clients"),
            &["event", "status"],
        )?;
        registry.register(Box::new(events_emitted_total.clone()))?;

        Ok(Self {
            waiting_connections,
            searching_connections,
            open_proposals,
            matched_connections,
            seeks_total,
            proposals_closed_total,
            events_emitted_total,
        })
    }
}

impl RelayMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let signals_total = IntCounterVec::new(
            Opts::new("duet_signals_total", "Relayed signaling messages"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(signals_total.clone()))?;

        Ok(Self { signals_total })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "duet_operation_duration_seconds",
                "Matchmaking engine operation duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "duet_confirmation_latency_seconds",
                "Time from proposal to mutual acceptance",
            )
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            operation_duration,
            confirmation_latency,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        assert!(!collector.registry().gather().is_empty());
    }

    #[test]
    fn test_record_seek_and_proposals() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_seek("queued");
        collector.record_seek("queued");
        collector.record_proposal_closed("rejected");
        collector.record_match_confirmed(Duration::from_secs(2));

        assert_eq!(
            collector
                .matchmaking()
                .seeks_total
                .with_label_values(&["queued"])
                .get(),
            2
        );
        assert_eq!(
            collector
                .matchmaking()
                .proposals_closed_total
                .with_label_values(&["confirmed"])
                .get(),
            1
        );
    }

    #[test]
    fn test_update_from_stats() {
        let collector = MetricsCollector::new().unwrap();
        let stats = MatchmakingStats {
            waiting: 3,
            searching: 5,
            open_proposals: 1,
            matched_connections: 4,
            live_connections: 9,
            ..Default::default()
        };

        collector.update_from_matchmaking_stats(&stats);

        assert_eq!(collector.matchmaking().waiting_connections.get(), 3);
        assert_eq!(collector.matchmaking().open_proposals.get(), 1);
        assert_eq!(collector.service().connections_active.get(), 9);
    }

    #[test]
    fn test_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();
        let duration = timer.stop();
        collector.record_operation("seek", duration);

        assert_eq!(
            collector
                .performance()
                .operation_duration
                .with_label_values(&["seek"])
                .get_sample_count(),
            1
        );
    }
}
