//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the connection
//! registry, matchmaking engine, signaling relay, both HTTP servers and the
//! background tasks together.

use crate::config::AppConfig;
use crate::error::MatchmakingError;
use crate::matchmaking::MatchmakingEngine;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::registry::InMemoryConnectionRegistry;
use crate::relay::SignalingRelay;
use crate::transport::{
    MessageHandler, SignalingServer, SignalingServerConfig, SignalingState,
};
use crate::types::{ClientMessage, ConnectionId, SignalKind};
use crate::utils::as_millis_f64;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Cheap, cloneable view of the running service used by health probes
#[derive(Clone)]
pub struct ServiceHandle {
    service_name: Arc<str>,
    engine: MatchmakingEngine,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceHandle {
    pub fn new(service_name: &str, engine: MatchmakingEngine) -> Self {
        Self {
            service_name: Arc::from(service_name),
            engine,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn engine(&self) -> &MatchmakingEngine {
        &self.engine
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Production message handler routing client frames to the engine and relay
pub struct ProductionMessageHandler {
    engine: MatchmakingEngine,
    relay: SignalingRelay,
}

impl ProductionMessageHandler {
    pub fn new(engine: MatchmakingEngine, relay: SignalingRelay) -> Self {
        Self { engine, relay }
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_client_message(&self, from: ConnectionId, message: ClientMessage) {
        let start_time = std::time::Instant::now();
        let event_name = message.name();

        match message {
            ClientMessage::Seek => {
                let outcome = self.engine.seek(from).await;
                debug!("seek from {} -> {:?}", from, outcome);
            }
            ClientMessage::Accept(reference) => {
                let outcome = self.engine.accept(from, &reference.proposal_key).await;
                debug!("accept from {} -> {:?}", from, outcome);
            }
            ClientMessage::Reject(reference) => {
                let outcome = self.engine.reject(from, &reference.proposal_key).await;
                debug!("reject from {} -> {:?}", from, outcome);
            }
            ClientMessage::Cancel => {
                let cancelled = self.engine.cancel(from).await;
                debug!("cancel from {} -> {}", from, cancelled);
            }
            ClientMessage::SignalOffer(request) => {
                self.relay
                    .forward(from, request.to, SignalKind::Offer, request.payload);
            }
            ClientMessage::SignalAnswer(request) => {
                self.relay
                    .forward(from, request.to, SignalKind::Answer, request.payload);
            }
            ClientMessage::SignalCandidate(request) => {
                self.relay
                    .forward(from, request.to, SignalKind::Candidate, request.payload);
            }
        }

        debug!(
            "Handled '{}' from {} in {:.2}ms",
            event_name,
            from,
            as_millis_f64(start_time.elapsed())
        );
    }

    async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let outcome = self.engine.disconnect(connection_id).await;
        debug!("disconnect of {} -> {:?}", connection_id, outcome);
    }

    async fn handle_error(&self, connection_id: ConnectionId, error: MatchmakingError, raw: &str) {
        warn!(
            "Rejected frame from {} - error: '{}', size: {} bytes",
            connection_id,
            error,
            raw.len()
        );

        if !raw.is_empty() {
            let preview: String = raw.chars().take(100).collect();
            debug!("Frame preview: {:?}", preview);
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Live client connections
    registry: Arc<InMemoryConnectionRegistry>,

    /// Core matchmaking components
    engine: MatchmakingEngine,
    relay: SignalingRelay,

    /// WebSocket server for clients
    signaling_server: Arc<SignalingServer>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Probe shared with the health server
    handle: ServiceHandle,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing duet signaling service");
        info!(
            "Configuration: service={}, http_port={}, metrics_port={}",
            config.service.name, config.service.http_port, config.service.metrics_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        // Initialize matchmaking system
        let registry = Arc::new(InMemoryConnectionRegistry::new());
        let engine = MatchmakingEngine::with_metrics(registry.clone(), metrics_collector.clone());
        let relay = SignalingRelay::new(
            engine.partners(),
            registry.clone(),
            metrics_collector.clone(),
        );

        let handle = ServiceHandle::new(&config.service.name, engine.clone());
        let metrics_service = Self::initialize_metrics(&config, metrics_collector.clone(), &handle);

        let handler = Arc::new(ProductionMessageHandler::new(engine.clone(), relay.clone()));
        let signaling_server = Arc::new(SignalingServer::new(
            SignalingServerConfig {
                host: config.service.bind_host.clone(),
                port: config.service.http_port,
                cors_allowed_origin: config.transport.cors_allowed_origin.clone(),
            },
            SignalingState {
                registry: registry.clone(),
                handler,
                metrics_collector,
            },
        ));

        // Fail early on a CORS origin the router cannot use
        signaling_server
            .create_router()
            .map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?;

        Ok(Self {
            config,
            registry,
            engine,
            relay,
            signaling_server,
            metrics_service,
            handle,
            background_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start both servers and the background tasks
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting duet signaling service");

        self.handle.set_running(true).await;

        self.start_metrics_service().await;
        self.start_signaling_server().await;
        self.start_background_tasks().await;

        info!("✅ Duet signaling service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of duet service");

        self.handle.set_running(false).await;

        if let Err(e) = self.signaling_server.stop().await {
            warn!("Failed to stop signaling server: {}", e);
        }
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        self.stop_background_tasks().await;

        let final_stats = self.engine.get_stats().await;
        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Duet service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.handle.is_running().await
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn engine(&self) -> &MatchmakingEngine {
        &self.engine
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }

    pub fn registry(&self) -> Arc<InMemoryConnectionRegistry> {
        self.registry.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        handle: &ServiceHandle,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: config.service.bind_host.clone(),
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone())
                .with_service(handle.clone()),
        );
        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    async fn start_metrics_service(&self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.lock().await.push(metrics_handle);
    }

    async fn start_signaling_server(&self) {
        info!("Starting signaling server");

        let server = self.signaling_server.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Signaling server failed: {}", e);
            }
        });

        self.background_tasks.lock().await.push(server_handle);
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        let mut tasks = Vec::new();

        info!(
            "Starting metrics update task ({}s interval)...",
            self.config.metrics_update_interval().as_secs()
        );
        tasks.push({
            let engine = self.engine.clone();
            let metrics_collector = self.metrics_service.collector();
            let handle = self.handle.clone();
            let update_interval = self.config.metrics_update_interval();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(update_interval);

                while handle.is_running().await {
                    interval.tick().await;

                    let stats = engine.get_stats().await;
                    debug!(
                        "Updating metrics - waiting: {}, proposals: {}, matched: {}",
                        stats.waiting, stats.open_proposals, stats.matched_connections
                    );
                    metrics_collector.update_from_matchmaking_stats(&stats);
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(handle.uptime().as_secs() as i64);

                    let healthy = engine.verify_invariants().await.is_ok();
                    metrics_collector.update_health_status(if healthy { 2 } else { 1 });
                    metrics_collector.update_component_health("matchmaking", healthy);
                    metrics_collector.update_component_health("signaling", true);
                }

                info!("Metrics update task stopped");
            })
        });

        match self.config.proposal_timeout() {
            Some(max_age) => {
                info!(
                    "Starting proposal expiry sweep ({}s timeout, {}s interval)...",
                    max_age.as_secs(),
                    self.config.expiry_sweep_interval().as_secs()
                );
                let engine = self.engine.clone();
                let handle = self.handle.clone();
                let sweep_interval = self.config.expiry_sweep_interval();

                tasks.push(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(sweep_interval);

                    while handle.is_running().await {
                        interval.tick().await;

                        let expired = engine.expire_stale_proposals(max_age).await;
                        if expired > 0 {
                            info!("Expired {} stale proposals", expired);
                        }
                    }

                    info!("Proposal expiry sweep stopped");
                }));
            }
            None => info!("Proposal expiry disabled - proposals stay open until answered"),
        }

        let task_count = tasks.len();
        self.background_tasks.lock().await.extend(tasks);
        info!("{} background maintenance tasks started", task_count);
    }

    async fn stop_background_tasks(&self) {
        let tasks: Vec<JoinHandle<()>> = self.background_tasks.lock().await.drain(..).collect();
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in tasks.into_iter().enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProposalRef, ServerEvent, SignalRequest};
    use serde_json::json;

    fn create_handler() -> (ProductionMessageHandler, Arc<InMemoryConnectionRegistry>) {
        let registry = Arc::new(InMemoryConnectionRegistry::new());
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap());
        let engine = MatchmakingEngine::with_metrics(registry.clone(), metrics_collector.clone());
        let relay = SignalingRelay::new(engine.partners(), registry.clone(), metrics_collector);
        (ProductionMessageHandler::new(engine, relay), registry)
    }

    #[tokio::test]
    async fn test_handler_drives_full_session() {
        let (handler, registry) = create_handler();
        let (a, mut a_events) = registry.register().unwrap();
        let (b, mut b_events) = registry.register().unwrap();

        handler.handle_client_message(a, ClientMessage::Seek).await;
        handler.handle_client_message(b, ClientMessage::Seek).await;

        let proposal_key = match a_events.try_recv().unwrap() {
            ServerEvent::MatchProposed { proposal_key } => proposal_key,
            other => panic!("Expected proposal, got {:?}", other),
        };
        assert!(matches!(
            b_events.try_recv().unwrap(),
            ServerEvent::MatchProposed { .. }
        ));

        for id in [a, b] {
            handler
                .handle_client_message(
                    id,
                    ClientMessage::Accept(ProposalRef {
                        proposal_key: proposal_key.clone(),
                    }),
                )
                .await;
        }
        assert_eq!(
            a_events.try_recv().unwrap(),
            ServerEvent::MatchConfirmed { partner_id: b }
        );
        assert_eq!(
            b_events.try_recv().unwrap(),
            ServerEvent::MatchConfirmed { partner_id: a }
        );

        handler
            .handle_client_message(
                a,
                ClientMessage::SignalOffer(SignalRequest {
                    to: b,
                    payload: json!({"sdp": "v=0"}),
                }),
            )
            .await;
        assert_eq!(
            b_events.try_recv().unwrap(),
            ServerEvent::SignalOffer(crate::types::SignalDelivery {
                from: a,
                payload: json!({"sdp": "v=0"}),
            })
        );

        registry.unregister(&a);
        handler.handle_disconnect(a).await;
        assert_eq!(
            b_events.try_recv().unwrap(),
            ServerEvent::PartnerLeft { partner_id: a }
        );
    }

    #[tokio::test]
    async fn test_app_state_rejects_bad_cors_origin() {
        let mut config = AppConfig::default();
        config.transport.cors_allowed_origin = "bad\norigin".to_string();

        assert!(matches!(
            AppState::new(config).await,
            Err(ServiceError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_app_state_starts_stopped() {
        let state = AppState::new(AppConfig::default()).await.unwrap();
        assert!(!state.is_running().await);
        assert_eq!(state.engine().get_stats().await.live_connections, 0);
    }
}
