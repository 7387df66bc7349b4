//! Match proposals awaiting mutual acceptance

use crate::types::{ConnectionId, ProposalKey};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A tentative pairing of two connections
#[derive(Debug, Clone)]
pub struct Proposal {
    key: ProposalKey,
    participant_a: ConnectionId,
    participant_b: ConnectionId,
    accepted_by: HashSet<ConnectionId>,
    created_at: DateTime<Utc>,
}

impl Proposal {
    /// Create a proposal; participants are stored in key order
    pub fn new(first: ConnectionId, second: ConnectionId) -> Self {
        let (participant_a, participant_b) = if first <= second {
            (first, second)
        } else {
            (second, first)
        };

        Self {
            key: ProposalKey::for_pair(participant_a, participant_b),
            participant_a,
            participant_b,
            accepted_by: HashSet::new(),
            created_at: crate::utils::current_timestamp(),
        }
    }

    pub fn key(&self) -> &ProposalKey {
        &self.key
    }

    pub fn participants(&self) -> (ConnectionId, ConnectionId) {
        (self.participant_a, self.participant_b)
    }

    pub fn involves(&self, id: &ConnectionId) -> bool {
        self.participant_a == *id || self.participant_b == *id
    }

    /// The participant that is not `id`
    pub fn other(&self, id: &ConnectionId) -> Option<ConnectionId> {
        if self.participant_a == *id {
            Some(self.participant_b)
        } else if self.participant_b == *id {
            Some(self.participant_a)
        } else {
            None
        }
    }

    /// Record an acceptance; returns false for non-participants
    pub fn accept(&mut self, id: ConnectionId) -> bool {
        if !self.involves(&id) {
            return false;
        }
        self.accepted_by.insert(id);
        true
    }

    pub fn has_accepted(&self, id: &ConnectionId) -> bool {
        self.accepted_by.contains(id)
    }

    pub fn is_fully_accepted(&self) -> bool {
        self.has_accepted(&self.participant_a) && self.has_accepted(&self.participant_b)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        crate::utils::is_older_than(self.created_at, now, max_age)
    }
}

/// Open proposals, indexed by key and by participant
#[derive(Debug, Default)]
pub struct ProposalStore {
    proposals: HashMap<ProposalKey, Proposal>,
    by_participant: HashMap<ConnectionId, ProposalKey>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a proposal
    ///
    /// Returns the participants that already had an open proposal. A non-empty
    /// result means the caller broke the one-proposal-per-connection rule.
    pub fn insert(&mut self, proposal: Proposal) -> Vec<ConnectionId> {
        let (a, b) = proposal.participants();
        let conflicts: Vec<ConnectionId> = [a, b]
            .into_iter()
            .filter(|id| self.by_participant.contains_key(id))
            .collect();

        self.by_participant.insert(a, proposal.key().clone());
        self.by_participant.insert(b, proposal.key().clone());
        self.proposals.insert(proposal.key().clone(), proposal);
        conflicts
    }

    pub fn get(&self, key: &ProposalKey) -> Option<&Proposal> {
        self.proposals.get(key)
    }

    pub fn get_mut(&mut self, key: &ProposalKey) -> Option<&mut Proposal> {
        self.proposals.get_mut(key)
    }

    /// Destroy a proposal and its participant index entries
    pub fn remove(&mut self, key: &ProposalKey) -> Option<Proposal> {
        let proposal = self.proposals.remove(key)?;
        let (a, b) = proposal.participants();
        for id in [a, b] {
            if self.by_participant.get(&id) == Some(key) {
                self.by_participant.remove(&id);
            }
        }
        Some(proposal)
    }

    /// Key of the open proposal naming `id`, if any
    pub fn key_for(&self, id: &ConnectionId) -> Option<&ProposalKey> {
        self.by_participant.get(id)
    }

    /// Every open proposal naming `id`
    ///
    /// Scans the whole store rather than trusting the participant index, so
    /// disconnect cleanup also catches proposals left behind by a bug.
    pub fn keys_involving(&self, id: &ConnectionId) -> Vec<ProposalKey> {
        self.proposals
            .values()
            .filter(|proposal| proposal.involves(id))
            .map(|proposal| proposal.key().clone())
            .collect()
    }

    /// Keys of proposals older than `max_age`
    pub fn expired_keys(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<ProposalKey> {
        self.proposals
            .values()
            .filter(|proposal| proposal.is_expired(now, max_age))
            .map(|proposal| proposal.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_acceptance() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let stranger = ConnectionId::new();
        let mut proposal = Proposal::new(a, b);

        assert!(!proposal.accept(stranger));
        assert!(proposal.accept(a));
        assert!(!proposal.is_fully_accepted());
        assert!(proposal.accept(a));
        assert!(!proposal.is_fully_accepted());
        assert!(proposal.accept(b));
        assert!(proposal.is_fully_accepted());
    }

    #[test]
    fn test_proposal_other_participant() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let proposal = Proposal::new(a, b);

        assert_eq!(proposal.other(&a), Some(b));
        assert_eq!(proposal.other(&b), Some(a));
        assert_eq!(proposal.other(&ConnectionId::new()), None);
        assert_eq!(proposal.key(), &ProposalKey::for_pair(b, a));
    }

    #[test]
    fn test_store_indexes_participants() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let mut store = ProposalStore::new();

        let conflicts = store.insert(Proposal::new(a, b));
        assert!(conflicts.is_empty());

        let key = ProposalKey::for_pair(a, b);
        assert_eq!(store.key_for(&a), Some(&key));
        assert_eq!(store.keys_involving(&b), vec![key.clone()]);

        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert!(store.key_for(&a).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_reports_conflicting_insert() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        let mut store = ProposalStore::new();

        store.insert(Proposal::new(a, b));
        let conflicts = store.insert(Proposal::new(a, c));
        assert_eq!(conflicts, vec![a]);
    }

    #[test]
    fn test_expired_keys() {
        let mut store = ProposalStore::new();
        store.insert(Proposal::new(ConnectionId::new(), ConnectionId::new()));

        let now = crate::utils::current_timestamp();
        assert!(store.expired_keys(now, Duration::from_secs(60)).is_empty());

        let later = now + chrono::Duration::seconds(120);
        assert_eq!(store.expired_keys(later, Duration::from_secs(60)).len(), 1);
    }
}
