//! In-process federation: one [`ElectionService`] per member, a seeded lossy
//! router between them and a logical clock that jumps to the next round
//! deadline whenever the network goes quiet. With `enable_metrics` set in
//! the node configuration every member also keeps its own Prometheus
//! registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, ensure};
use fedvote_consensus::{ElectionRoster, RosterSwap, SharedSigner, VolunteerPayload};
use fedvote_messages::{Ed25519Verifier, ElectionKey, KeyPairSigner, MessageSigner};
use fedvote_node::{
    CommitReport, ElectionService, NodeConfig, NodeMetrics, ServiceEvent, ServiceOutput, Trigger,
};
use fedvote_types::{Identity, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const START_MILLIS: u64 = 1_700_000_000_000;
/// Seeds for candidate keys start here so they never collide with leaders.
const CANDIDATE_SEED_BASE: u8 = 101;
/// Chance per step of letting time run to the next deadline while messages
/// are still in flight.
const EARLY_TIMEOUT_RATE: f64 = 0.005;

#[derive(Clone, Debug)]
pub struct SimulationParams {
    pub leaders: u8,
    pub candidates: u8,
    pub seed: u64,
    pub drop_rate: f64,
    pub duplicate_rate: f64,
    pub key: ElectionKey,
    pub max_steps: usize,
    pub max_timeouts: usize,
}

pub struct Member {
    pub identity: Identity,
    pub leader: bool,
    pub swap: Option<RosterSwap>,
    pub stats: String,
    pub metrics: Option<Arc<NodeMetrics>>,
}

pub struct SimulationOutcome {
    pub roster: ElectionRoster,
    pub faulted: Identity,
    pub members: Vec<Member>,
    /// Report of the first leader that committed.
    pub report: Option<CommitReport>,
    pub steps: usize,
    pub timeouts: usize,
    pub delivered: usize,
    pub dropped: usize,
}

impl SimulationOutcome {
    pub fn committed(&self) -> usize {
        self.members.iter().filter(|m| m.swap.is_some()).count()
    }

    /// The single committed candidate, if anyone committed.
    pub fn winner(&self) -> Option<Identity> {
        self.members
            .iter()
            .find_map(|m| m.swap.as_ref().map(|s| s.candidate))
    }

    /// Envelopes broadcast across the federation, when metrics were kept.
    pub fn broadcasts(&self) -> Option<u64> {
        self.members
            .iter()
            .map(|m| m.metrics.as_ref().map(|metrics| metrics.messages_broadcast.get()))
            .sum()
    }
}

struct Router {
    rng: StdRng,
    in_flight: Vec<(usize, Vec<u8>)>,
    swaps: Vec<Option<RosterSwap>>,
    delivered: usize,
    dropped: usize,
}

impl Router {
    fn route(&mut self, from: usize, outputs: Vec<ServiceOutput>) {
        for output in outputs {
            match output {
                ServiceOutput::Broadcast(bytes) => {
                    for to in (0..self.swaps.len()).filter(|to| *to != from) {
                        self.in_flight.push((to, bytes.clone()));
                    }
                }
                ServiceOutput::ApplySwap(swap) => {
                    tracing::debug!(node = from, candidate = %swap.candidate, "node committed");
                    self.swaps[from] = Some(swap);
                }
            }
        }
    }

    fn all_committed(&self) -> bool {
        self.swaps.iter().all(Option::is_some)
    }
}

pub fn run(params: &SimulationParams, base: &NodeConfig) -> anyhow::Result<SimulationOutcome> {
    ensure!(
        (1..CANDIDATE_SEED_BASE).contains(&params.leaders),
        "leaders must be between 1 and {}",
        CANDIDATE_SEED_BASE - 1
    );
    ensure!(
        params.candidates <= u8::MAX - CANDIDATE_SEED_BASE,
        "at most {} candidates",
        u8::MAX - CANDIDATE_SEED_BASE
    );
    ensure!(
        (0.0..1.0).contains(&params.drop_rate) && (0.0..1.0).contains(&params.duplicate_rate),
        "drop and duplicate rates must lie in [0, 1)"
    );

    let seeds: Vec<(u8, bool)> = (1..=params.leaders)
        .map(|s| (s, true))
        .chain((0..params.candidates).map(|i| (CANDIDATE_SEED_BASE + i, false)))
        .collect();
    let signers: Vec<Arc<KeyPairSigner>> = seeds
        .iter()
        .map(|(s, _)| Arc::new(KeyPairSigner::from_seed(&[*s; 32])))
        .collect();
    let ids: Vec<Identity> = signers.iter().map(|s| s.identity()).collect();
    let leaders = params.leaders as usize;
    let roster = ElectionRoster::new(ids[..leaders].to_vec(), ids[leaders..].to_vec());
    let Some(faulted) = roster.leader_for_slot(&params.key) else {
        bail!("roster has no leaders");
    };

    let mut nodes: Vec<ElectionService> = Vec::with_capacity(signers.len());
    let mut metrics: Vec<Option<Arc<NodeMetrics>>> = Vec::with_capacity(signers.len());
    for signer in signers {
        let signer: SharedSigner = signer;
        let mut service =
            ElectionService::new(base, signer, Arc::new(Ed25519Verifier), roster.clone());
        let node_metrics = if base.enable_metrics {
            let node_metrics = Arc::new(NodeMetrics::new()?);
            service = service.with_metrics(node_metrics.clone());
            Some(node_metrics)
        } else {
            None
        };
        nodes.push(service);
        metrics.push(node_metrics);
    }

    let mut router = Router {
        rng: StdRng::seed_from_u64(params.seed),
        in_flight: Vec::new(),
        swaps: vec![None; nodes.len()],
        delivered: 0,
        dropped: 0,
    };
    let mut now = Timestamp::new(START_MILLIS);

    for (i, node) in nodes.iter_mut().enumerate() {
        let trigger = ServiceEvent::Trigger(Trigger {
            key: params.key,
            missing: true,
            payload: VolunteerPayload {
                missing: format!("eom:{}", params.key).into_bytes(),
                ack: node.identity().as_bytes().to_vec(),
            },
        });
        let outputs = node.handle(trigger, now);
        router.route(i, outputs);
    }

    let mut steps = 0;
    let mut timeouts = 0;
    while steps < params.max_steps && !router.all_committed() {
        steps += 1;
        let idle = router.in_flight.is_empty();
        if idle || router.rng.gen_bool(EARLY_TIMEOUT_RATE) {
            let Some(deadline) = nodes.iter().filter_map(|n| n.next_deadline()).min() else {
                break;
            };
            if timeouts >= params.max_timeouts {
                if idle {
                    break;
                }
                continue;
            }
            timeouts += 1;
            now = now.max(deadline);
            tracing::debug!(at = now.as_millis(), "round deadline");
            for (i, node) in nodes.iter_mut().enumerate() {
                let outputs = node.on_deadline(now);
                router.route(i, outputs);
            }
            continue;
        }

        let pick = router.rng.gen_range(0..router.in_flight.len());
        let (to, bytes) = router.in_flight.swap_remove(pick);
        if router.rng.gen_bool(params.drop_rate) {
            router.dropped += 1;
            continue;
        }
        if router.rng.gen_bool(params.duplicate_rate) {
            router.in_flight.push((to, bytes.clone()));
        }
        router.delivered += 1;
        now = now.plus_millis(1);
        let outputs = nodes[to].handle(ServiceEvent::Inbound(bytes), now);
        router.route(to, outputs);
    }

    let winners: BTreeSet<Identity> = router
        .swaps
        .iter()
        .flatten()
        .map(|s| s.candidate)
        .collect();
    if winners.len() > 1 {
        bail!("split commit: {} different candidates", winners.len());
    }

    let report = nodes
        .iter_mut()
        .zip(&seeds)
        .filter(|(_, (_, leader))| *leader)
        .find_map(|(node, _)| node.take_reports().into_iter().next());
    let members = nodes
        .iter()
        .zip(&seeds)
        .zip(router.swaps)
        .zip(metrics)
        .map(|(((node, (_, leader)), swap), metrics)| Member {
            identity: node.identity(),
            leader: *leader,
            swap,
            stats: node.stats().render(),
            metrics,
        })
        .collect();

    Ok(SimulationOutcome {
        roster,
        faulted,
        members,
        report,
        steps,
        timeouts,
        delivered: router.delivered,
        dropped: router.dropped,
    })
}
