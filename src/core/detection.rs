use std::collections::HashSet;
use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::api::config::{BoomConfig, FailurePropagation};

use super::codec::MessageKind;
use super::event::MembershipEvent;
use super::member::Member;
use super::membership::MembershipDirectory;
use super::shortlist::Shortlist;
use super::transport::TransportLayer;
use super::utils::{fan_out, send_message};

/// Per-member record of outstanding heartbeat requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct HeartbeatTracker {
    pub(crate) missed: u32,
    /// `None` until the first response arrives.
    pub(crate) last_response: Option<Instant>,
    pub(crate) last_response_clock: u64,
    /// Set once a MemberFailureDetected was issued for the current streak of misses.
    pub(crate) suspected: bool,
}

impl HeartbeatTracker {
    fn new() -> Self {
        Self {
            missed: 1,
            last_response: None,
            last_response_clock: 0,
            suspected: false,
        }
    }
}

/// A FailList entry.
#[derive(Clone, Debug)]
pub(crate) struct Suspicion {
    pub(crate) member: Member,
    pub(crate) since: Instant,
}

/// What a heartbeat request to a member amounts to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Probe {
    /// First request, a tracker was created.
    New,
    /// Another request without a response in between.
    Missed(u32),
    /// The threshold was reached; the failure must be propagated.
    Escalate,
    /// The failure was already propagated; keep probing.
    Suspected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    Unmonitored,
    Probing,
    Suspected,
}

/// Heartbeat-based failure detector.
///
/// Probes a bounded Shortlist of members, counts unanswered requests and
/// propagates suspicion once a member stays silent for too long.
#[derive(Debug)]
pub(crate) struct FailureDetector<T: TransportLayer> {
    addr: String,
    socket: Arc<T>,
    config: Arc<BoomConfig>,
    membership: Arc<MembershipDirectory>,
    shortlist: Shortlist,
    fail_list: DashMap<String, Suspicion>,
    trackers: DashMap<String, HeartbeatTracker>,
    tx: broadcast::Sender<MembershipEvent>,
}

impl<T: TransportLayer> FailureDetector<T> {
    pub(crate) fn new(
        addr: impl Into<String>,
        socket: Arc<T>,
        config: Arc<BoomConfig>,
        membership: Arc<MembershipDirectory>,
        tx: broadcast::Sender<MembershipEvent>,
    ) -> Self {
        let addr = addr.into();
        let shortlist = Shortlist::new(&addr, config.max_shortlist_size());

        Self {
            addr,
            socket,
            config,
            membership,
            shortlist,
            fail_list: DashMap::new(),
            trackers: DashMap::new(),
            tx,
        }
    }

    pub(crate) fn shortlist(&self) -> &Shortlist {
        &self.shortlist
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self, identifier: &str) -> Option<HeartbeatTracker> {
        self.trackers.get(identifier).map(|t| t.value().clone())
    }

    /// A snapshot of the FailList.
    pub(crate) fn suspects(&self) -> Vec<Member> {
        self.fail_list
            .iter()
            .map(|entry| entry.value().member.clone())
            .collect()
    }

    pub(crate) async fn status(&self, identifier: &str) -> MemberStatus {
        if self.fail_list.contains_key(identifier) {
            return MemberStatus::Suspected;
        }
        if self.trackers.contains_key(identifier) || self.shortlist.contains(identifier).await {
            return MemberStatus::Probing;
        }
        MemberStatus::Unmonitored
    }

    /// Runs one heartbeat round on behalf of `local`.
    ///
    /// Backfills the Shortlist from the directory, then sends a HeartbeatRequest to
    /// every Shortlist member, escalating members that missed too many rounds.
    pub(crate) async fn heartbeat_tick(&self, local: &Member) -> usize {
        for identifier in self.shortlist.backfill(self.membership.list()).await {
            tracing::debug!("[{}] probing {} from now on", &self.addr, identifier);
        }

        let targets = self.shortlist.members().await;
        for target in &targets {
            match self.track_request(target) {
                Probe::Escalate => self.escalate(target).await,
                Probe::Missed(missed) => {
                    tracing::debug!(
                        "[{}] {} has {} unanswered heartbeat requests",
                        &self.addr,
                        target.identifier(),
                        missed
                    );
                }
                Probe::New | Probe::Suspected => {}
            }
        }

        fan_out(
            &self.addr,
            &self.socket,
            MessageKind::HeartbeatRequest,
            local,
            targets,
        )
        .await
    }

    /// Records an outgoing heartbeat request to `target`.
    pub(crate) fn track_request(&self, target: &Member) -> Probe {
        let threshold = self.config.missed_heartbeat_threshold();

        match self.trackers.entry(target.identifier()) {
            Entry::Vacant(entry) => {
                tracing::debug!(
                    "[{}] requesting a response from new member {}",
                    &self.addr,
                    entry.key()
                );
                entry.insert(HeartbeatTracker::new());
                Probe::New
            }
            Entry::Occupied(mut entry) => {
                let tracker = entry.get_mut();
                if tracker.missed < threshold {
                    tracker.missed += 1;
                    Probe::Missed(tracker.missed)
                } else if tracker.suspected {
                    Probe::Suspected
                } else {
                    tracker.suspected = true;
                    Probe::Escalate
                }
            }
        }
    }

    async fn escalate(&self, suspect: &Member) {
        let identifier = suspect.identifier();
        tracing::info!(
            "[{}] {} did not respond {} times, initiating failure propagation",
            &self.addr,
            &identifier,
            self.config.missed_heartbeat_threshold()
        );

        self.membership.remove(&identifier);
        self.suspect(suspect);

        let targets = self.propagation_targets(&identifier).await;
        let sent = fan_out(
            &self.addr,
            &self.socket,
            MessageKind::MemberFailureDetected,
            suspect,
            targets,
        )
        .await;

        tracing::debug!(
            "[{}] propagated failure of {} to {} members",
            &self.addr,
            &identifier,
            sent
        );
    }

    /// Adds `member` to the FailList. Returns `false` if it was already suspected.
    fn suspect(&self, member: &Member) -> bool {
        match self.fail_list.entry(member.identifier()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                let event = MembershipEvent::new_member_suspected(&self.addr, entry.key());
                entry.insert(Suspicion {
                    member: member.clone(),
                    since: Instant::now(),
                });
                let _ = self.tx.send(event);
                true
            }
        }
    }

    async fn propagation_targets(&self, suspect: &str) -> Vec<Member> {
        let candidates = match self.config.failure_propagation() {
            FailurePropagation::Shortlist => self.shortlist.members().await,
            FailurePropagation::Directory => self.membership.list(),
        };

        candidates
            .into_iter()
            .filter(|m| {
                let identifier = m.identifier();
                identifier != suspect && identifier != self.addr
            })
            .collect()
    }

    /// Answers a HeartbeatRequest from `from` and opportunistically starts probing it back.
    pub(crate) async fn handle_heartbeat_request(&self, from: Member, local: &Member) {
        let identifier = from.identifier();
        if identifier == self.addr {
            return;
        }

        match send_message(&*self.socket, MessageKind::HeartbeatResponse, local, &from).await {
            Ok(_) => tracing::debug!("[{}] sent HeartbeatResponse to {}", &self.addr, &identifier),
            Err(e) => {
                tracing::warn!("[{}] failed to respond to {}: {}", &self.addr, &identifier, e)
            }
        }

        if !self.shortlist.contains(&identifier).await && self.shortlist.try_insert(from).await {
            tracing::debug!("[{}] probing {} in return", &self.addr, &identifier);
        }
    }

    /// Resets the tracker of `from`. Returns `false` if `from` is not tracked.
    pub(crate) fn handle_heartbeat_response(&self, from: &Member) -> bool {
        let identifier = from.identifier();

        match self.trackers.get_mut(&identifier) {
            Some(mut tracker) => {
                tracker.missed = 0;
                tracker.last_response = Some(Instant::now());
                tracker.last_response_clock = from.clock;
                tracker.suspected = false;
                true
            }
            None => {
                tracing::debug!(
                    "[{}] received a response from {} which we are not tracking",
                    &self.addr,
                    &identifier
                );
                false
            }
        }
    }

    /// Handles suspicion gossiped by another node.
    ///
    /// The suspect leaves the directory and the Shortlist, enters the FailList and
    /// receives one direct HeartbeatRequest to prove it is still alive.
    pub(crate) async fn handle_failure_detected(&self, suspect: Member, local: &Member) {
        let identifier = suspect.identifier();
        if identifier == self.addr {
            tracing::debug!("[{}] ignoring failure report about ourselves", &self.addr);
            return;
        }

        tracing::info!("[{}] received failure report for {}", &self.addr, &identifier);

        self.membership.remove(&identifier);
        self.shortlist.remove(&identifier).await;
        self.suspect(&suspect);
        self.trackers
            .entry(identifier.clone())
            .or_insert_with(HeartbeatTracker::new)
            .suspected = true;

        if let Err(e) =
            send_message(&*self.socket, MessageKind::HeartbeatRequest, local, &suspect).await
        {
            tracing::warn!("[{}] failed to verify {}: {}", &self.addr, &identifier, e);
        }
    }

    /// Resolves every FailList entry: members that responded since they were
    /// suspected are resurrected, all others are dropped permanently.
    pub(crate) async fn reconcile_fail_list(&self) -> (Vec<String>, Vec<String>) {
        let suspicions: Vec<(String, Instant)> = self
            .fail_list
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().since))
            .collect();

        let mut resurrected = Vec::new();
        let mut failed = Vec::new();

        for (identifier, since) in suspicions {
            let responded = self
                .trackers
                .get(&identifier)
                .and_then(|t| t.last_response)
                .is_some_and(|at| at >= since);

            self.fail_list.remove(&identifier);

            if responded {
                tracing::info!("[{}] {} is alive again", &self.addr, &identifier);
                let _ = self
                    .tx
                    .send(MembershipEvent::new_member_recovered(&self.addr, &identifier));
                resurrected.push(identifier);
            } else {
                tracing::info!("[{}] declaring {} as failed", &self.addr, &identifier);
                self.trackers.remove(&identifier);
                self.shortlist.remove(&identifier).await;
                self.membership.remove(&identifier);
                let _ = self
                    .tx
                    .send(MembershipEvent::new_member_failed(&self.addr, &identifier));
                failed.push(identifier);
            }
        }

        (resurrected, failed)
    }

    /// Stops probing `identifier` and drops everything known about it.
    pub(crate) async fn forget(&self, identifier: &str) {
        self.shortlist.remove(identifier).await;
        self.fail_list.remove(identifier);
        self.trackers.remove(identifier);
    }

    /// Drops trackers of members that are neither probed nor suspected.
    pub(crate) async fn prune_trackers(&self) -> usize {
        let mut keep: HashSet<String> = self
            .shortlist
            .members()
            .await
            .iter()
            .map(Member::identifier)
            .collect();
        keep.extend(self.fail_list.iter().map(|entry| entry.key().clone()));

        let before = self.trackers.len();
        self.trackers.retain(|identifier, _| keep.contains(identifier));
        let pruned = before.saturating_sub(self.trackers.len());

        if pruned > 0 {
            tracing::debug!("[{}] dropped {} idle heartbeat trackers", &self.addr, pruned);
        }
        pruned
    }
}
