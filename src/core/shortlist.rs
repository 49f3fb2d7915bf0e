use std::collections::HashMap;

use rand::{seq::IteratorRandom, thread_rng};
use tokio::sync::RwLock;

use super::member::Member;

/// The bounded set of members actively probed with heartbeats.
#[derive(Debug)]
pub(crate) struct Shortlist {
    local: String,
    capacity: usize,
    members: RwLock<HashMap<String, Member>>,
}

impl Shortlist {
    pub(crate) fn new(local: impl Into<String>, capacity: usize) -> Self {
        Self {
            local: local.into(),
            capacity,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub(crate) async fn contains(&self, identifier: &str) -> bool {
        self.members.read().await.contains_key(identifier)
    }

    /// Adds `member` if there is spare capacity. A member already present is refreshed.
    pub(crate) async fn try_insert(&self, member: Member) -> bool {
        let identifier = member.identifier();
        if identifier == self.local {
            return false;
        }

        let mut members = self.members.write().await;
        if members.contains_key(&identifier) || members.len() < self.capacity {
            members.insert(identifier, member);
            return true;
        }

        false
    }

    /// Fills spare capacity with randomly chosen `candidates`. Returns the newly added identifiers.
    pub(crate) async fn backfill(&self, candidates: Vec<Member>) -> Vec<String> {
        let mut members = self.members.write().await;
        let spare = self.capacity.saturating_sub(members.len());
        if spare == 0 {
            return vec![];
        }

        let chosen = candidates
            .into_iter()
            .filter(|m| {
                let identifier = m.identifier();
                identifier != self.local && !members.contains_key(&identifier)
            })
            .choose_multiple(&mut thread_rng(), spare);

        chosen
            .into_iter()
            .map(|member| {
                let identifier = member.identifier();
                members.insert(identifier.clone(), member);
                identifier
            })
            .collect()
    }

    pub(crate) async fn remove(&self, identifier: &str) -> Option<Member> {
        self.members.write().await.remove(identifier)
    }

    /// A snapshot of all Shortlist members.
    pub(crate) async fn members(&self) -> Vec<Member> {
        self.members.read().await.values().cloned().collect()
    }
}
