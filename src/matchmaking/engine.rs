//! Matchmaking engine: queue admission, pairing and proposal lifecycle
//!
//! The engine is the single owner of the waiting queue, the searching set and
//! the proposal store. Every public operation takes the state lock once and
//! performs its whole check-then-act sequence, including event emission,
//! before releasing it. Events go out through unbounded channels, so holding
//! the lock while emitting never blocks and keeps per-connection event order
//! identical to operation order.

use crate::error::{MatchmakingError, Result};
use crate::matchmaking::partners::PartnerDirectory;
use crate::matchmaking::proposal::{Proposal, ProposalStore};
use crate::matchmaking::queue::WaitingQueue;
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionId, ConnectionState, ProposalKey, ServerEvent};
use crate::utils::{as_millis_f64, current_timestamp};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Snapshot of engine state and lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchmakingStats {
    /// Connections in the waiting queue
    pub waiting: usize,
    /// Connections searching (queued or proposal-pending)
    pub searching: usize,
    /// Open proposals
    pub open_proposals: usize,
    /// Connections with a published partner
    pub matched_connections: usize,
    /// Live connections in the registry
    pub live_connections: usize,
    /// Seek requests that admitted a connection
    pub seeks: u64,
    /// Proposals created
    pub proposals_created: u64,
    /// Proposals confirmed by both sides
    pub matches_confirmed: u64,
    /// Proposals voided by a rejection
    pub proposals_rejected: u64,
    /// Proposals voided by a disconnect
    pub proposals_abandoned: u64,
    /// Proposals voided by the expiry sweep
    pub proposals_expired: u64,
    /// Successful cancellations
    pub cancellations: u64,
    /// Disconnects processed
    pub disconnects: u64,
}

/// Result of a seek request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The connection was already searching; nothing changed
    AlreadySearching,
    /// Paired with a waiting connection
    Proposed {
        proposal_key: ProposalKey,
        partner: ConnectionId,
    },
    /// No valid partner waiting; appended to the queue
    Queued { position: usize },
}

/// Result of an accept request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Unknown key or not a participant
    Ignored,
    /// Recorded; still waiting for the other participant
    Pending,
    /// Both participants accepted
    Confirmed {
        participants: (ConnectionId, ConnectionId),
    },
}

/// Result of a reject request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectOutcome {
    /// Unknown key or not a participant
    Ignored,
    /// Proposal voided
    Rejected {
        other: ConnectionId,
        other_requeued: bool,
    },
}

/// Result of a disconnect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectOutcome {
    /// Participants whose open proposal was voided
    pub notified_participants: Vec<ConnectionId>,
    /// Former confirmed partner, if the connection was matched
    pub former_partner: Option<ConnectionId>,
}

/// Mutable matchmaking state, only reachable through the engine lock
#[derive(Debug, Default)]
struct MatchState {
    queue: WaitingQueue,
    searching: HashSet<ConnectionId>,
    proposals: ProposalStore,
    counters: MatchmakingStats,
}

/// The matchmaking state machine
#[derive(Clone)]
pub struct MatchmakingEngine {
    state: Arc<Mutex<MatchState>>,
    registry: Arc<dyn ConnectionRegistry>,
    partners: Arc<PartnerDirectory>,
    metrics_collector: Arc<MetricsCollector>,
}

impl MatchmakingEngine {
    /// Create a new engine over a connection registry
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        // Create a default metrics collector if none provided
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(registry, metrics_collector)
    }

    /// Create a new engine with metrics collector
    pub fn with_metrics(
        registry: Arc<dyn ConnectionRegistry>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(MatchState::default())),
            registry,
            partners: Arc::new(PartnerDirectory::new()),
            metrics_collector,
        }
    }

    /// Partner directory published by this engine
    pub fn partners(&self) -> Arc<PartnerDirectory> {
        self.partners.clone()
    }

    /// Start searching for a partner
    pub async fn seek(&self, id: ConnectionId) -> SeekOutcome {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;

        if state.searching.contains(&id) {
            debug!("Ignoring duplicate seek from {}", id);
            self.metrics_collector.record_seek("duplicate");
            return SeekOutcome::AlreadySearching;
        }

        // A matched connection searching again dissolves its current pair
        if let Some(former_partner) = self.partners.retract(&id) {
            info!(
                "Connection {} left its match with {} to search again",
                id, former_partner
            );
            self.emit(&former_partner, ServerEvent::PartnerLeft { partner_id: id });
        }

        state.searching.insert(id);
        state.counters.seeks += 1;

        let outcome = self.pair_or_enqueue(&mut state, id);
        match &outcome {
            SeekOutcome::Proposed {
                proposal_key,
                partner,
            } => {
                info!(
                    "Match proposed - key: {}, seeker: {}, partner: {}",
                    proposal_key, id, partner
                );
                self.metrics_collector.record_seek("proposed");
            }
            SeekOutcome::Queued { position } => {
                info!(
                    "Added to queue - connection: {}, position: {}, waiting: {}",
                    id,
                    position,
                    state.queue.len()
                );
                self.metrics_collector.record_seek("queued");
            }
            SeekOutcome::AlreadySearching => {}
        }

        self.finish_operation("seek", &state, timer);
        outcome
    }

    /// Accept an open proposal
    pub async fn accept(&self, id: ConnectionId, proposal_key: &ProposalKey) -> AcceptOutcome {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;

        let fully_accepted = match state.proposals.get_mut(proposal_key) {
            None => {
                debug!(
                    "Ignoring accept from {} for unknown proposal {}",
                    id, proposal_key
                );
                return AcceptOutcome::Ignored;
            }
            Some(proposal) => {
                if !proposal.accept(id) {
                    warn!(
                        "Ignoring accept from non-participant {} for proposal {}",
                        id, proposal_key
                    );
                    return AcceptOutcome::Ignored;
                }
                proposal.is_fully_accepted()
            }
        };

        info!("Proposal {} accepted by {}", proposal_key, id);

        if !fully_accepted {
            self.finish_operation("accept", &state, timer);
            return AcceptOutcome::Pending;
        }

        let Some(proposal) = state.proposals.remove(proposal_key) else {
            return AcceptOutcome::Ignored;
        };
        let (a, b) = proposal.participants();
        state.searching.remove(&a);
        state.searching.remove(&b);
        state.counters.matches_confirmed += 1;

        self.partners.publish(a, b);
        self.emit(&a, ServerEvent::MatchConfirmed { partner_id: b });
        self.emit(&b, ServerEvent::MatchConfirmed { partner_id: a });

        let latency = (current_timestamp() - proposal.created_at())
            .to_std()
            .unwrap_or_default();
        self.metrics_collector.record_match_confirmed(latency);

        info!(
            "Match confirmed - {} <-> {}, open for {:.2}ms",
            a,
            b,
            as_millis_f64(latency)
        );

        self.finish_operation("accept", &state, timer);
        AcceptOutcome::Confirmed {
            participants: (a, b),
        }
    }

    /// Reject an open proposal
    ///
    /// Voids the pairing for both sides. The other participant is put back in
    /// the queue if it is still live; the rejecter has to seek again.
    pub async fn reject(&self, id: ConnectionId, proposal_key: &ProposalKey) -> RejectOutcome {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;

        let other = match state.proposals.get(proposal_key) {
            None => {
                debug!(
                    "Ignoring reject from {} for unknown proposal {}",
                    id, proposal_key
                );
                return RejectOutcome::Ignored;
            }
            Some(proposal) => match proposal.other(&id) {
                Some(other) => other,
                None => {
                    warn!(
                        "Ignoring reject from non-participant {} for proposal {}",
                        id, proposal_key
                    );
                    return RejectOutcome::Ignored;
                }
            },
        };

        state.proposals.remove(proposal_key);
        state.searching.remove(&id);
        state.searching.remove(&other);
        state.counters.proposals_rejected += 1;
        self.metrics_collector.record_proposal_closed("rejected");

        info!("Proposal {} rejected by {}", proposal_key, id);

        self.emit(&id, ServerEvent::MatchRejected);
        self.emit(&other, ServerEvent::MatchRejected);

        let other_requeued = if self.registry.is_live(&other) {
            state.searching.insert(other);
            state.queue.enqueue(other);
            info!(
                "Re-queued {} after rejection, position: {}",
                other,
                state.queue.len() - 1
            );
            true
        } else {
            debug!("Not re-queueing {}: connection is gone", other);
            false
        };

        self.finish_operation("reject", &state, timer);
        RejectOutcome::Rejected {
            other,
            other_requeued,
        }
    }

    /// Stop searching
    ///
    /// Only valid while the connection is queued. Cancelling with an open
    /// proposal is refused; the client has to reject it instead.
    pub async fn cancel(&self, id: ConnectionId) -> bool {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;

        if !state.searching.contains(&id) {
            debug!("Ignoring cancel from {}: not searching", id);
            return false;
        }

        if let Some(key) = state.proposals.key_for(&id) {
            debug!("Refusing cancel from {}: proposal {} is pending", id, key);
            return false;
        }

        state.searching.remove(&id);
        state.queue.remove(&id);
        state.counters.cancellations += 1;

        info!("Search cancelled by {}", id);
        self.finish_operation("cancel", &state, timer);
        true
    }

    /// Remove every trace of a connection
    ///
    /// The single cleanup entry point for transport teardown. The surviving
    /// participant of a voided proposal is notified but not re-queued.
    pub async fn disconnect(&self, id: ConnectionId) -> DisconnectOutcome {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;
        let mut outcome = DisconnectOutcome::default();

        state.searching.remove(&id);
        state.queue.remove(&id);
        state.counters.disconnects += 1;

        for key in state.proposals.keys_involving(&id) {
            let Some(proposal) = state.proposals.remove(&key) else {
                continue;
            };
            let Some(other) = proposal.other(&id) else {
                continue;
            };

            state.searching.remove(&other);
            state.counters.proposals_abandoned += 1;
            self.metrics_collector.record_proposal_closed("disconnected");

            info!(
                "Proposal {} voided by disconnect of {}, notifying {}",
                key, id, other
            );
            self.emit(&other, ServerEvent::MatchRejected);
            outcome.notified_participants.push(other);
        }

        if outcome.notified_participants.len() > 1 {
            self.report_violation(format!(
                "connection {} was a participant in {} proposals",
                id,
                outcome.notified_participants.len()
            ));
        }

        if let Some(former_partner) = self.partners.retract(&id) {
            info!(
                "Match {} <-> {} dissolved by disconnect",
                id, former_partner
            );
            self.emit(&former_partner, ServerEvent::PartnerLeft { partner_id: id });
            outcome.former_partner = Some(former_partner);
        }

        info!("Connection {} cleaned up", id);
        self.finish_operation("disconnect", &state, timer);
        outcome
    }

    /// Void proposals that have been open longer than `max_age`
    ///
    /// Both participants are notified and neither is re-queued.
    pub async fn expire_stale_proposals(&self, max_age: Duration) -> usize {
        let timer = self.metrics_collector.start_timer();
        let mut state = self.state.lock().await;

        let expired = state.proposals.expired_keys(current_timestamp(), max_age);
        for key in &expired {
            let Some(proposal) = state.proposals.remove(key) else {
                continue;
            };
            let (a, b) = proposal.participants();
            state.searching.remove(&a);
            state.searching.remove(&b);
            state.counters.proposals_expired += 1;
            self.metrics_collector.record_proposal_closed("expired");

            info!(
                "Proposal {} expired after {}s without mutual acceptance",
                key,
                max_age.as_secs()
            );
            self.emit(&a, ServerEvent::MatchRejected);
            self.emit(&b, ServerEvent::MatchRejected);
        }

        if !expired.is_empty() {
            self.finish_operation("expire", &state, timer);
        }
        expired.len()
    }

    /// Current lifecycle state of a connection
    pub async fn connection_state(&self, id: &ConnectionId) -> ConnectionState {
        let state = self.state.lock().await;

        if self.partners.partner_of(id).is_some() {
            ConnectionState::Matched
        } else if state.proposals.key_for(id).is_some() {
            ConnectionState::ProposalPending
        } else if state.searching.contains(id) {
            ConnectionState::Searching
        } else {
            ConnectionState::Idle
        }
    }

    /// Queue contents, head first
    pub async fn waiting_connections(&self) -> Vec<ConnectionId> {
        self.state.lock().await.queue.snapshot()
    }

    /// Key of the open proposal naming `id`
    pub async fn open_proposal_for(&self, id: &ConnectionId) -> Option<ProposalKey> {
        self.state.lock().await.proposals.key_for(id).cloned()
    }

    /// Get engine statistics
    pub async fn get_stats(&self) -> MatchmakingStats {
        let state = self.state.lock().await;
        self.snapshot(&state)
    }

    /// Check the structural invariants of the shared state
    pub async fn verify_invariants(&self) -> Result<()> {
        let state = self.state.lock().await;
        match Self::find_violation(&state) {
            Some(message) => Err(MatchmakingError::InvariantViolation { message }.into()),
            None => Ok(()),
        }
    }

    /// Dequeue candidates until a valid partner is found, else enqueue `id`
    fn pair_or_enqueue(&self, state: &mut MatchState, id: ConnectionId) -> SeekOutcome {
        while let Some(candidate) = state.queue.dequeue_head() {
            if candidate == id {
                self.report_violation(format!("connection {} was queued while seeking", id));
                continue;
            }

            if !self.registry.is_live(&candidate) {
                debug!("Discarding stale queue entry {}", candidate);
                state.searching.remove(&candidate);
                continue;
            }

            if let Some(key) = state.proposals.key_for(&candidate) {
                self.report_violation(format!(
                    "queued connection {} already in proposal {}",
                    candidate, key
                ));
                continue;
            }

            let proposal = Proposal::new(id, candidate);
            let proposal_key = proposal.key().clone();
            let conflicts = state.proposals.insert(proposal);
            if !conflicts.is_empty() {
                self.report_violation(format!(
                    "connections {:?} joined a second proposal {}",
                    conflicts, proposal_key
                ));
            }
            state.counters.proposals_created += 1;

            self.emit(
                &id,
                ServerEvent::MatchProposed {
                    proposal_key: proposal_key.clone(),
                },
            );
            self.emit(
                &candidate,
                ServerEvent::MatchProposed {
                    proposal_key: proposal_key.clone(),
                },
            );

            return SeekOutcome::Proposed {
                proposal_key,
                partner: candidate,
            };
        }

        state.queue.enqueue(id);
        SeekOutcome::Queued {
            position: state.queue.len() - 1,
        }
    }

    /// Deliver an event, swallowing transport failures
    fn emit(&self, to: &ConnectionId, event: ServerEvent) {
        let event_name = event.name();
        match self.registry.send(to, event) {
            Ok(()) => self.metrics_collector.record_event_emitted(event_name, true),
            Err(e) => {
                debug!("Dropped '{}' for {}: {}", event_name, to, e);
                self.metrics_collector.record_event_emitted(event_name, false);
            }
        }
    }

    fn report_violation(&self, message: String) {
        error!("Matchmaking invariant violated: {}", message);
        debug_assert!(false, "matchmaking invariant violated: {}", message);
    }

    fn finish_operation(&self, operation: &str, state: &MatchState, timer: MetricsTimer) {
        if cfg!(debug_assertions) {
            if let Some(message) = Self::find_violation(state) {
                self.report_violation(message);
            }
        }

        let stats = self.snapshot(state);
        self.metrics_collector.update_from_matchmaking_stats(&stats);
        self.metrics_collector.record_operation(operation, timer.stop());
    }

    fn snapshot(&self, state: &MatchState) -> MatchmakingStats {
        MatchmakingStats {
            waiting: state.queue.len(),
            searching: state.searching.len(),
            open_proposals: state.proposals.len(),
            matched_connections: self.partners.matched_count(),
            live_connections: self.registry.live_count(),
            ..state.counters.clone()
        }
    }

    fn find_violation(state: &MatchState) -> Option<String> {
        for id in state.queue.snapshot() {
            if !state.searching.contains(&id) {
                return Some(format!("queued connection {} is not searching", id));
            }
            if let Some(key) = state.proposals.key_for(&id) {
                return Some(format!(
                    "queued connection {} is a participant in proposal {}",
                    id, key
                ));
            }
        }
        None
    }
}
