use crate::types::Address;
use std::collections::HashMap;

/// Ticket id -> owner lookups for the current round only.
#[derive(Debug, Default, Clone)]
pub struct TicketOwnerCache {
    ticket_ids: Vec<u64>,
    owners: HashMap<u64, Address>,
}

impl TicketOwnerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket_ids(&self) -> &[u64] {
        &self.ticket_ids
    }

    pub fn needs_rebuild(&self, ids: &[u64]) -> bool {
        self.ticket_ids != ids || ids.iter().any(|id| !self.owners.contains_key(id))
    }

    /// Ids from `ids` with no known owner yet. Ownership never changes, so
    /// cached entries are not looked up again.
    pub fn missing(&self, ids: &[u64]) -> Vec<u64> {
        ids.iter()
            .copied()
            .filter(|id| !self.owners.contains_key(id))
            .collect()
    }

    /// Replace the cache for a new ticket-id list. Previously known owners
    /// survive only if their id is still listed.
    pub fn rebuild(&mut self, ids: &[u64], fetched: HashMap<u64, Address>) {
        let mut owners = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(owner) = fetched.get(id).or_else(|| self.owners.get(id)) {
                owners.insert(*id, *owner);
            }
        }
        self.ticket_ids = ids.to_vec();
        self.owners = owners;
    }

    pub fn owner(&self, ticket_id: u64) -> Option<Address> {
        self.owners.get(&ticket_id).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn contains(&self, ticket_id: u64) -> bool {
        self.owners.contains_key(&ticket_id)
    }
}
