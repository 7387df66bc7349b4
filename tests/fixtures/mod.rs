//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use duet::error::{MatchmakingError, Result};
use duet::matchmaking::MatchmakingEngine;
use duet::metrics::MetricsCollector;
use duet::registry::ConnectionRegistry;
use duet::relay::SignalingRelay;
use duet::types::{ConnectionId, ProposalKey, ServerEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Registry that records every event sent to every connection
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    live: Mutex<HashSet<ConnectionId>>,
    events: Mutex<HashMap<ConnectionId, Vec<ServerEvent>>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new live connection
    pub fn connect(&self) -> ConnectionId {
        let id = ConnectionId::new();
        self.live.lock().unwrap().insert(id);
        id
    }

    /// Mark a connection as gone without telling the engine
    pub fn drop_connection(&self, id: &ConnectionId) {
        self.live.lock().unwrap().remove(id);
    }

    /// Remove and return the events recorded for `id`
    pub fn take_events(&self, id: &ConnectionId) -> Vec<ServerEvent> {
        self.events
            .lock()
            .unwrap()
            .remove(id)
            .unwrap_or_default()
    }

    /// Events recorded for `id`, without clearing them
    pub fn events_for(&self, id: &ConnectionId) -> Vec<ServerEvent> {
        self.events
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of events of the given name recorded for `id`
    pub fn count_events_named(&self, id: &ConnectionId, name: &str) -> usize {
        self.events_for(id)
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Key of the most recent proposal announced to `id`
    pub fn last_proposal_key(&self, id: &ConnectionId) -> Option<ProposalKey> {
        self.events_for(id).iter().rev().find_map(|event| match event {
            ServerEvent::MatchProposed { proposal_key } => Some(proposal_key.clone()),
            _ => None,
        })
    }
}

impl ConnectionRegistry for RecordingRegistry {
    fn is_live(&self, id: &ConnectionId) -> bool {
        self.live.lock().unwrap().contains(id)
    }

    fn send(&self, id: &ConnectionId, event: ServerEvent) -> Result<()> {
        if !self.is_live(id) {
            return Err(MatchmakingError::ConnectionUnavailable {
                connection_id: id.to_string(),
            }
            .into());
        }

        self.events
            .lock()
            .unwrap()
            .entry(*id)
            .or_default()
            .push(event);
        Ok(())
    }

    fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

/// Engine, relay and recording registry wired together
pub struct TestSystem {
    pub registry: Arc<RecordingRegistry>,
    pub engine: MatchmakingEngine,
    pub relay: SignalingRelay,
}

pub fn create_test_system() -> TestSystem {
    let registry = Arc::new(RecordingRegistry::new());
    let metrics_collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
    let engine = MatchmakingEngine::with_metrics(registry.clone(), metrics_collector.clone());
    let relay = SignalingRelay::new(engine.partners(), registry.clone(), metrics_collector);

    TestSystem {
        registry,
        engine,
        relay,
    }
}

impl TestSystem {
    /// Seek, accept and confirm a pair, clearing their recorded events
    pub async fn matched_pair(&self) -> (ConnectionId, ConnectionId) {
        let a = self.registry.connect();
        let b = self.registry.connect();

        self.engine.seek(a).await;
        self.engine.seek(b).await;

        let key = self
            .registry
            .last_proposal_key(&a)
            .expect("pair should have been proposed");
        self.engine.accept(a, &key).await;
        self.engine.accept(b, &key).await;

        self.registry.take_events(&a);
        self.registry.take_events(&b);
        (a, b)
    }
}
