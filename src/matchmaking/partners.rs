//! Published partner mapping for confirmed matches

use crate::types::ConnectionId;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

/// Connection -> confirmed partner mapping
///
/// Written only by the matchmaking engine; the signaling relay reads it to
/// authorize forwarding.
#[derive(Debug, Default)]
pub struct PartnerDirectory {
    partners: RwLock<HashMap<ConnectionId, ConnectionId>>,
}

impl PartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current partner of `id`
    pub fn partner_of(&self, id: &ConnectionId) -> Option<ConnectionId> {
        self.partners
            .read()
            .map(|partners| partners.get(id).copied())
            .unwrap_or(None)
    }

    /// Whether `from` may send to `to`
    pub fn is_authorized(&self, from: &ConnectionId, to: &ConnectionId) -> bool {
        self.partner_of(from).as_ref() == Some(to)
    }

    /// Number of connections with a published partner
    pub fn matched_count(&self) -> usize {
        self.partners
            .read()
            .map(|partners| partners.len())
            .unwrap_or(0)
    }

    /// Publish a confirmed pair in both directions
    pub(crate) fn publish(&self, a: ConnectionId, b: ConnectionId) {
        match self.partners.write() {
            Ok(mut partners) => {
                partners.insert(a, b);
                partners.insert(b, a);
            }
            Err(_) => warn!("Failed to acquire partner lock while publishing {} <-> {}", a, b),
        }
    }

    /// Retract the pair containing `id`; returns the former partner
    pub(crate) fn retract(&self, id: &ConnectionId) -> Option<ConnectionId> {
        let mut partners = match self.partners.write() {
            Ok(partners) => partners,
            Err(_) => {
                warn!("Failed to acquire partner lock while retracting {}", id);
                return None;
            }
        };

        let partner = partners.remove(id)?;
        // Only drop the reverse entry if it still points back at us
        if partners.get(&partner) == Some(id) {
            partners.remove(&partner);
        }
        Some(partner)
    }
}
