use std::time::Duration;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

use super::member::Member;

/// The outcome of [`MembershipDirectory::upsert`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// The member was not known before.
    Joined,
    /// The member was known; `gap` is the time since it was last seen.
    Refreshed { gap: Duration },
    /// The message was about the local node and was dropped.
    Ignored,
}

/// Concurrent store of all known members, keyed by identifier.
///
/// Every operation ignores the local node's own identifier.
#[derive(Debug)]
pub struct MembershipDirectory {
    local: String,
    members: DashMap<String, Member>,
}

impl MembershipDirectory {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            members: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.members.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<Member> {
        self.members.get(identifier).map(|m| m.value().clone())
    }

    /// Inserts or overwrites `member`, stamping `last_seen` with the current time.
    pub fn upsert(&self, mut member: Member) -> Upsert {
        let identifier = member.identifier();
        if identifier == self.local {
            return Upsert::Ignored;
        }

        let now = Instant::now();
        member.last_seen = Some(now);

        match self.members.entry(identifier) {
            Entry::Occupied(mut entry) => {
                let gap = entry
                    .get()
                    .last_seen
                    .map(|prev| now.saturating_duration_since(prev))
                    .unwrap_or_default();
                entry.insert(member);
                Upsert::Refreshed { gap }
            }
            Entry::Vacant(entry) => {
                entry.insert(member);
                Upsert::Joined
            }
        }
    }

    /// Refreshes `last_seen` of an already known member. Returns `false` if it is unknown.
    pub fn touch(&self, identifier: &str) -> bool {
        match self.members.get_mut(identifier) {
            Some(mut member) => {
                member.last_seen = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, identifier: &str) -> Option<Member> {
        if identifier == self.local {
            return None;
        }
        self.members.remove(identifier).map(|(_, member)| member)
    }

    /// A point-in-time snapshot of all members.
    pub fn list(&self) -> Vec<Member> {
        self.members.iter().map(|m| m.value().clone()).collect()
    }

    /// Removes every member not seen for longer than `ttl` as of `now`.
    pub fn remove_stale(&self, ttl: Duration, now: Instant) -> Vec<Member> {
        let mut removed = Vec::new();

        self.members.retain(|_, member| {
            let stale = member
                .last_seen
                .map_or(true, |seen| now.saturating_duration_since(seen) > ttl);
            if stale {
                removed.push(member.clone());
            }
            !stale
        });

        removed
    }
}
