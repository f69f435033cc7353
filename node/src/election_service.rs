//! Election service: the node-side owner of every running election.
//!
//! [`ElectionService`] is a synchronous core that turns [`ServiceEvent`]s into
//! [`ServiceOutput`]s; [`ElectionService::spawn`] drives it from a tokio task
//! that also sleeps until the next round deadline. One task owns all
//! adapters, so each election is only ever touched by one event at a time.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use fedvote_consensus::{
    ActiveElections, ElectionRoster, PendingMessages, RosterSwap, RoundTimers, SharedSigner,
    SharedVerifier, VolunteerPayload,
};
use fedvote_messages::{ElectionKey, ElectionMessage, MessageSigner};
use fedvote_types::{Identity, Timestamp};
use fedvote_utils::StatsCounter;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::metrics::NodeMetrics;
use crate::tracing_spans;
use crate::wire_message::WireMessage;
use crate::NodeError;

/// Capacity of the event and output channels created by [`ElectionService::spawn`].
pub const CHANNEL_CAPACITY: usize = 1024;

/// Commit reports kept until [`ElectionService::take_reports`] drains them.
pub const MAX_REPORTS: usize = 64;

/// A leader's slot needs attention at `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub key: ElectionKey,
    /// The slot's leader failed to produce its required message.
    pub missing: bool,
    /// What this node relays if it ends up volunteering.
    pub payload: VolunteerPayload,
}

#[derive(Clone, Debug)]
pub enum ServiceEvent {
    /// Raw envelope bytes from a peer.
    Inbound(Vec<u8>),
    Trigger(Trigger),
    /// Replace the live roster used for elections started from now on.
    RosterUpdate(ElectionRoster),
    /// The network moved on: forget everything before `(height, minute)`.
    Advance { height: u32, minute: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceOutput {
    /// Envelope bytes to send to every peer.
    Broadcast(Vec<u8>),
    /// A committed replacement, already applied to the live roster.
    ApplySwap(RosterSwap),
}

/// What this node saw of one election when it committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReport {
    pub swap: RosterSwap,
    pub round: u32,
    pub latency_ms: u64,
    /// Rendered claim history, one column per leader.
    pub grid: String,
}

pub struct ElectionService {
    identity: Identity,
    roster: ElectionRoster,
    elections: ActiveElections,
    timers: RoundTimers,
    /// Last round each timer was armed for.
    rounds: HashMap<ElectionKey, u32>,
    started_at: HashMap<ElectionKey, Timestamp>,
    reports: VecDeque<CommitReport>,
    metrics: Option<Arc<NodeMetrics>>,
}

impl ElectionService {
    pub fn new(
        config: &NodeConfig,
        signer: SharedSigner,
        verifier: SharedVerifier,
        roster: ElectionRoster,
    ) -> Self {
        let identity = signer.identity();
        let early = PendingMessages::new(config.max_buffered, config.buffer_ttl_ms);
        Self {
            identity,
            roster,
            elections: ActiveElections::new(
                signer,
                verifier,
                config.max_elections,
                config.adapter_config(),
                early,
            ),
            timers: RoundTimers::new(config.round_timeout_ms),
            rounds: HashMap::new(),
            started_at: HashMap::new(),
            reports: VecDeque::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NodeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The live roster, including every swap applied so far.
    pub fn roster(&self) -> &ElectionRoster {
        &self.roster
    }

    pub fn elections(&self) -> &ActiveElections {
        &self.elections
    }

    pub fn stats(&self) -> &StatsCounter {
        self.elections.stats()
    }

    pub fn take_reports(&mut self) -> Vec<CommitReport> {
        self.reports.drain(..).collect()
    }

    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    pub fn handle(&mut self, event: ServiceEvent, now: Timestamp) -> Vec<ServiceOutput> {
        let mut out = Vec::new();
        match event {
            ServiceEvent::Inbound(bytes) => self.on_inbound(&bytes, now, &mut out),
            ServiceEvent::Trigger(trigger) => self.on_trigger(trigger, now, &mut out),
            ServiceEvent::RosterUpdate(roster) => {
                tracing::info!(
                    leaders = roster.leaders.len(),
                    candidates = roster.candidates.len(),
                    "live roster replaced"
                );
                self.roster = roster;
            }
            ServiceEvent::Advance { height, minute } => {
                let pruned = self.elections.prune_before(height, minute);
                let keep = |k: &ElectionKey| (k.height, k.minute) >= (height, minute);
                let stale: Vec<ElectionKey> =
                    self.rounds.keys().filter(|k| !keep(k)).copied().collect();
                for key in stale {
                    self.forget(&key);
                }
                tracing::debug!(height, minute, pruned, "pruned old elections");
            }
        }
        self.collect(now, &mut out);
        out
    }

    /// Fire every round deadline that has passed.
    pub fn on_deadline(&mut self, now: Timestamp) -> Vec<ServiceOutput> {
        let mut out = Vec::new();
        for key in self.timers.pop_expired(now) {
            self.rounds.remove(&key);
            let span = tracing_spans::election_span(&key);
            let _enter = span.enter();
            match self.elections.timeout(&key, now) {
                Ok(reply) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.rounds_advanced.inc();
                    }
                    self.emit(reply, &mut out);
                    self.rearm(&key, now);
                }
                Err(e) => tracing::debug!(error = %e, "timer fired for a retired election"),
            }
        }
        let expired = self.elections.expire_buffered(now);
        if expired > 0 {
            tracing::debug!(expired, "expired buffered messages");
        }
        self.collect(now, &mut out);
        out
    }

    fn on_inbound(&mut self, bytes: &[u8], now: Timestamp, out: &mut Vec<ServiceOutput>) {
        if let Some(metrics) = &self.metrics {
            metrics.messages_received.inc();
        }
        let msg = match WireMessage::decode(bytes).and_then(WireMessage::into_election) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::trace!("keepalive");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "dropping malformed envelope");
                if let Some(metrics) = &self.metrics {
                    metrics.messages_rejected.inc();
                }
                return;
            }
        };

        let key = msg.location().key();
        let span = tracing_spans::execute_span(&key, msg.kind(), &msg.signer());
        let _enter = span.enter();
        let deferred_before = self.elections.get(&key).map(|a| a.deferred_len());
        let reply = self.elections.route(msg, now);
        if let (Some(before), Some(adapter)) = (deferred_before, self.elections.get(&key)) {
            if adapter.deferred_len() > before {
                if let Some(metrics) = &self.metrics {
                    metrics.messages_deferred.inc();
                }
            }
        }
        self.emit(reply, out);
        self.rearm(&key, now);
    }

    fn on_trigger(&mut self, trigger: Trigger, now: Timestamp, out: &mut Vec<ServiceOutput>) {
        let key = trigger.key;
        if !trigger.missing {
            tracing::trace!(%key, "slot leader present");
            return;
        }
        if self.elections.contains(&key) || self.elections.is_finished(&key) {
            return;
        }
        let span = tracing_spans::election_span(&key);
        let _enter = span.enter();
        match self
            .elections
            .start_election(key, &self.roster, trigger.payload, now)
        {
            Ok(messages) => {
                tracing::info!(faulted = ?self.roster.leader_for_slot(&key), "election started");
                if let Some(metrics) = &self.metrics {
                    metrics.elections_started.inc();
                }
                self.started_at.insert(key, now);
                self.emit(messages, out);
                self.rearm(&key, now);
            }
            Err(e) => tracing::warn!(error = %e, "could not start election"),
        }
    }

    /// Arm the round timer whenever the election's round moved.
    fn rearm(&mut self, key: &ElectionKey, now: Timestamp) {
        let Some(adapter) = self.elections.get(key) else {
            return;
        };
        if adapter.is_processed() {
            return;
        }
        let round = adapter.round();
        if self.rounds.get(key) != Some(&round) {
            self.rounds.insert(*key, round);
            self.timers.arm(*key, now);
        }
    }

    fn emit(&self, messages: Vec<ElectionMessage>, out: &mut Vec<ServiceOutput>) {
        for msg in messages {
            let span = tracing_spans::broadcast_span(msg.kind(), msg.location().round);
            let _enter = span.enter();
            match WireMessage::election(&msg).encode() {
                Ok(bytes) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.messages_broadcast.inc();
                    }
                    out.push(ServiceOutput::Broadcast(bytes));
                }
                Err(e) => tracing::warn!(error = %e, "could not encode outbound message"),
            }
        }
    }

    /// Apply fresh roster swaps and retire the elections that produced them.
    fn collect(&mut self, now: Timestamp, out: &mut Vec<ServiceOutput>) {
        for swap in self.elections.take_swaps() {
            let span = tracing_spans::roster_swap_span(
                &swap.key,
                swap.faulted_index,
                swap.candidate_index,
            );
            let _enter = span.enter();
            if let Err(e) = self.roster.apply_swap(&swap) {
                tracing::warn!(error = %e, "committed swap does not fit the live roster");
            } else {
                tracing::info!(candidate = %swap.candidate, "roster swap applied");
            }
            let latency_ms = self
                .started_at
                .get(&swap.key)
                .map(|started| started.elapsed_since(now))
                .unwrap_or_default();
            if let Some(metrics) = &self.metrics {
                metrics.elections_committed.inc();
                metrics.commit_latency_ms.observe(latency_ms as f64);
            }
            if let Some(adapter) = self.elections.get(&swap.key) {
                if self.reports.len() >= MAX_REPORTS {
                    self.reports.pop_front();
                }
                self.reports.push_back(CommitReport {
                    swap: swap.clone(),
                    round: adapter.round(),
                    latency_ms,
                    grid: adapter.election().history().render(),
                });
            }
            out.push(ServiceOutput::ApplySwap(swap));
        }
        for key in self.elections.retire_processed() {
            self.forget(&key);
        }
        if let Some(metrics) = &self.metrics {
            metrics.active_elections.set(self.elections.len() as i64);
        }
    }

    fn forget(&mut self, key: &ElectionKey) {
        self.timers.cancel(key);
        self.rounds.remove(key);
        self.started_at.remove(key);
    }

    /// Run the service on its own task until shutdown or until every event
    /// sender is dropped.
    pub fn spawn(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (
        mpsc::Sender<ServiceEvent>,
        mpsc::Receiver<ServiceOutput>,
        JoinHandle<Result<Self, NodeError>>,
    ) {
        let (event_tx, mut events) = mpsc::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut service = self;

        let handle = tokio::spawn(async move {
            loop {
                let wait = service.next_deadline().map(|deadline| {
                    Duration::from_millis(deadline.as_millis().saturating_sub(Timestamp::now().as_millis()))
                });
                let outputs = tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        tracing::info!("election service shutting down");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => service.handle(event, Timestamp::now()),
                        None => break,
                    },
                    _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                        service.on_deadline(Timestamp::now())
                    }
                };
                for output in outputs {
                    out_tx
                        .send(output)
                        .await
                        .map_err(|_| NodeError::ChannelClosed)?;
                }
            }
            Ok(service)
        });

        (event_tx, out_rx, handle)
    }
}
