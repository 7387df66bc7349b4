//! WebSocket server for client connections
//!
//! Every accepted socket is registered with the connection registry, told its
//! id, and then split into a writer task draining the registry channel and a
//! reader loop feeding decoded frames to the [`MessageHandler`].

use crate::error::MatchmakingError;
use crate::metrics::MetricsCollector;
use crate::registry::{ConnectionRegistry, InMemoryConnectionRegistry};
use crate::transport::handlers::MessageHandler;
use crate::transport::messages::{
    encode_event, parse_client_message, MAX_FRAME_BYTES, SIGNALING_PATH,
};
use crate::types::{ConnectionId, ServerEvent};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

/// Signaling server configuration
#[derive(Debug, Clone)]
pub struct SignalingServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed browser origin, or `*` for any
    pub cors_allowed_origin: String,
}

impl Default for SignalingServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            cors_allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Shared state for socket handlers
#[derive(Clone)]
pub struct SignalingState {
    pub registry: Arc<InMemoryConnectionRegistry>,
    pub handler: Arc<dyn MessageHandler>,
    pub metrics_collector: Arc<MetricsCollector>,
}

impl SignalingState {
    /// Decode one text frame and route it
    ///
    /// Invalid frames are answered with an `error` event on the same
    /// connection and handed to [`MessageHandler::handle_error`].
    pub async fn dispatch_text(&self, connection_id: ConnectionId, text: &str) {
        match parse_client_message(text) {
            Ok(message) => {
                self.metrics_collector.record_client_message(message.name());
                self.handler
                    .handle_client_message(connection_id, message)
                    .await;
            }
            Err(e) => {
                let error = e.downcast::<MatchmakingError>().unwrap_or_else(|e| {
                    MatchmakingError::InvalidClientMessage {
                        reason: e.to_string(),
                    }
                });
                self.reject_frame(connection_id, error, text).await;
            }
        }
    }

    async fn reject_frame(&self, connection_id: ConnectionId, error: MatchmakingError, raw: &str) {
        self.metrics_collector.record_invalid_message();

        if let Err(e) = self.registry.send(
            &connection_id,
            ServerEvent::Error {
                message: error.to_string(),
            },
        ) {
            debug!("Could not report invalid frame to {}: {}", connection_id, e);
        }

        self.handler.handle_error(connection_id, error, raw).await;
    }
}

/// Server that accepts client sockets on the signaling path
pub struct SignalingServer {
    config: SignalingServerConfig,
    state: SignalingState,
    shutdown_tx: broadcast::Sender<()>,
}

impl SignalingServer {
    pub fn new(config: SignalingServerConfig, state: SignalingState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind and serve until [`SignalingServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid signaling server address")?;

        let app = self.create_router()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Signaling server listening on ws://{}{}", addr, SIGNALING_PATH);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Signaling server shutdown signal received");
            })
            .await?;

        info!("Signaling server stopped");
        Ok(())
    }

    /// Build the router with CORS applied
    pub fn create_router(&self) -> Result<Router> {
        let cors = cors_layer(&self.config.cors_allowed_origin)?;

        Ok(Router::new()
            .route(SIGNALING_PATH, get(ws_handler))
            .with_state(self.state.clone())
            .layer(cors))
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping signaling server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to signaling server: {}", e);
        }

        Ok(())
    }
}

fn cors_layer(allowed_origin: &str) -> Result<CorsLayer> {
    let origin = if allowed_origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(allowed_origin).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("Invalid CORS origin '{}': {}", allowed_origin, e),
            }
        })?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST]))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SignalingState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SignalingState) {
    let (connection_id, events) = match state.registry.register() {
        Ok(registered) => registered,
        Err(e) => {
            error!("Failed to register connection: {}", e);
            return;
        }
    };

    state.metrics_collector.record_connection_opened();
    info!("Connection {} opened", connection_id);

    if let Err(e) = state
        .registry
        .send(&connection_id, ServerEvent::Connected { connection_id })
    {
        warn!("Failed to greet connection {}: {}", connection_id, e);
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events);

        while let Some(event) = events.next().await {
            let text = match encode_event(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Dropping outbound event for {}: {}", connection_id, e);
                    continue;
                }
            };

            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!("Writer for {} closed", connection_id);
                break;
            }
        }

        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => state.dispatch_text(connection_id, text.as_str()).await,
            Ok(Message::Binary(bytes)) => {
                let error = MatchmakingError::InvalidClientMessage {
                    reason: format!("binary frame of {} bytes, expected text", bytes.len()),
                };
                state.reject_frame(connection_id, error, "").await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Socket error on {}: {}", connection_id, e);
                break;
            }
        }
    }

    state.registry.unregister(&connection_id);
    state.handler.handle_disconnect(connection_id).await;
    state.metrics_collector.record_connection_closed();
    writer.abort();

    info!("Connection {} closed", connection_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientMessage;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request, http::StatusCode};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingHandler {
        messages: Mutex<Vec<(ConnectionId, ClientMessage)>>,
        errors: Mutex<Vec<(ConnectionId, String)>>,
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle_client_message(&self, from: ConnectionId, message: ClientMessage) {
            self.messages.lock().unwrap().push((from, message));
        }

        async fn handle_disconnect(&self, _connection_id: ConnectionId) {}

        async fn handle_error(
            &self,
            connection_id: ConnectionId,
            _error: MatchmakingError,
            raw: &str,
        ) {
            self.errors
                .lock()
                .unwrap()
                .push((connection_id, raw.to_string()));
        }
    }

    fn create_state() -> (SignalingState, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let state = SignalingState {
            registry: Arc::new(InMemoryConnectionRegistry::new()),
            handler: handler.clone(),
            metrics_collector: Arc::new(MetricsCollector::new().unwrap()),
        };
        (state, handler)
    }

    #[tokio::test]
    async fn test_valid_frame_reaches_handler() {
        let (state, handler) = create_state();
        let (id, mut events) = state.registry.register().unwrap();

        state.dispatch_text(id, r#"{"event":"seek"}"#).await;

        let messages = handler.messages.lock().unwrap();
        assert_eq!(messages.as_slice(), &[(id, ClientMessage::Seek)]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_error_event() {
        let (state, handler) = create_state();
        let (id, mut events) = state.registry.register().unwrap();

        state.dispatch_text(id, r#"{"event":"accept"}"#).await;

        assert!(handler.messages.lock().unwrap().is_empty());
        assert_eq!(handler.errors.lock().unwrap().len(), 1);
        match events.try_recv() {
            Ok(ServerEvent::Error { message }) => {
                assert!(message.contains("Invalid client message"))
            }
            other => panic!("Expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_get_is_not_upgraded() {
        let (state, _handler) = create_state();
        let server = SignalingServer::new(SignalingServerConfig::default(), state);
        let app = server.create_router().unwrap();

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let (state, _handler) = create_state();
        let server = SignalingServer::new(SignalingServerConfig::default(), state);
        let app = server.create_router().unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/ws")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        assert!(cors_layer("bad\norigin").is_err());
        assert!(cors_layer("*").is_ok());
    }
}
