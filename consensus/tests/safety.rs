//! Agreement under hostile delivery: reordering, duplication, loss and
//! unsynchronized round timeouts, across many seeds. Also liveness once the
//! network heals, with the faulted leader silent throughout.

use std::collections::HashSet;
use std::sync::Arc;

use fedvote_consensus::{AdapterConfig, ElectionAdapter, ElectionRoster, SharedVerifier};
use fedvote_messages::{Ed25519Verifier, ElectionKey, ElectionMessage, KeyPairSigner, MessageSigner};
use fedvote_nullables::NullClock;
use fedvote_types::Timestamp;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KEY: ElectionKey = ElectionKey {
    height: 9_001,
    minute: 7,
    slot: 2,
};

fn nodes(leaders: u8, candidates: u8) -> (ElectionRoster, Vec<ElectionAdapter>) {
    let signers: Vec<Arc<KeyPairSigner>> = (1..=leaders)
        .chain(201..201 + candidates)
        .map(|seed| Arc::new(KeyPairSigner::from_seed(&[seed; 32])))
        .collect();
    let ids: Vec<_> = signers.iter().map(|s| s.identity()).collect();
    let roster = ElectionRoster::new(
        ids[..leaders as usize].to_vec(),
        ids[leaders as usize..].to_vec(),
    );
    let verifier: SharedVerifier = Arc::new(Ed25519Verifier);
    let adapters = signers
        .into_iter()
        .map(|s| {
            ElectionAdapter::new(KEY, roster.clone(), s, verifier.clone(), AdapterConfig::default())
                .unwrap()
        })
        .collect();
    (roster, adapters)
}

#[derive(Default)]
struct Net {
    /// (recipient, message)
    in_flight: Vec<(usize, ElectionMessage)>,
}

impl Net {
    fn broadcast(&mut self, nodes: &[ElectionAdapter], msg: ElectionMessage) {
        for (i, node) in nodes.iter().enumerate() {
            if node.owner() != msg.signer() {
                self.in_flight.push((i, msg.clone()));
            }
        }
    }

    fn broadcast_all(&mut self, nodes: &[ElectionAdapter], out: Vec<ElectionMessage>) {
        for msg in out {
            self.broadcast(nodes, msg);
        }
    }

    /// Deliver everything in random order, without loss, until quiet.
    fn drain(&mut self, nodes: &mut [ElectionAdapter], rng: &mut StdRng, now: Timestamp) {
        let mut steps = 0;
        while !self.in_flight.is_empty() {
            steps += 1;
            assert!(steps < 200_000, "no quiescence");
            let pick = rng.gen_range(0..self.in_flight.len());
            let (to, msg) = self.in_flight.swap_remove(pick);
            let out = nodes[to].execute(msg, now);
            self.broadcast_all(nodes, out);
        }
    }
}

fn assert_agreement(roster: &ElectionRoster, nodes: &[ElectionAdapter], seed: u64) {
    let committed: HashSet<_> = nodes
        .iter()
        .filter_map(|n| n.election().committed_candidate())
        .collect();
    assert!(committed.len() <= 1, "seed {}: split commit {:?}", seed, committed);
    for node in nodes {
        assert!(node.election().equivocations().is_empty(), "seed {}", seed);
        for leader in &roster.leaders {
            assert_eq!(
                node.election().history().detect_illegal_vote(leader),
                Ok(()),
                "seed {}",
                seed
            );
        }
    }
}

#[test]
fn lossy_reordered_delivery_with_timeouts_never_splits() {
    for seed in 0..40u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (roster, mut nodes) = nodes(5, 4);
        let clock = NullClock::default();
        let mut net = Net::default();

        let initial: Vec<ElectionMessage> =
            nodes.iter_mut().filter_map(|n| n.start(clock.now())).collect();
        net.broadcast_all(&nodes, initial);

        let mut timeouts = 0;
        for _ in 0..20_000 {
            let fire_timeout = net.in_flight.is_empty() || rng.gen_bool(0.02);
            if fire_timeout {
                if timeouts >= 40 {
                    break;
                }
                timeouts += 1;
                let target = rng.gen_range(0..nodes.len());
                let now = clock.advance(1_000);
                let out = nodes[target].timeout(now);
                net.broadcast_all(&nodes, out);
                continue;
            }
            let pick = rng.gen_range(0..net.in_flight.len());
            let (to, msg) = net.in_flight.swap_remove(pick);
            if rng.gen_bool(0.1) {
                continue;
            }
            if rng.gen_bool(0.1) {
                net.in_flight.push((to, msg.clone()));
            }
            let out = nodes[to].execute(msg, clock.now());
            net.broadcast_all(&nodes, out);
        }
        assert_agreement(&roster, &nodes, seed);
    }
}

#[test]
fn reliable_shuffled_delivery_commits_everywhere() {
    for seed in 0..25u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (roster, mut nodes) = nodes(5, 3);
        let clock = NullClock::default();
        let now = clock.now();
        let mut net = Net::default();

        let initial: Vec<ElectionMessage> = nodes.iter_mut().filter_map(|n| n.start(now)).collect();
        assert_eq!(initial.len(), 1);
        let volunteer = initial[0].signer();
        net.broadcast_all(&nodes, initial);

        let mut steps = 0;
        while !net.in_flight.is_empty() {
            steps += 1;
            assert!(steps < 200_000, "seed {}: no quiescence", seed);
            let pick = rng.gen_range(0..net.in_flight.len());
            let (to, msg) = net.in_flight.swap_remove(pick);
            if rng.gen_bool(0.2) {
                net.in_flight.push((to, msg.clone()));
            }
            let out = nodes[to].execute(msg, now);
            net.broadcast_all(&nodes, out);
        }

        for node in &nodes {
            assert_eq!(
                node.election().committed_candidate(),
                Some(volunteer),
                "seed {}",
                seed
            );
            assert!(node.roster_swap().is_some(), "seed {}", seed);
        }
        assert_agreement(&roster, &nodes, seed);
    }
}

/// Run an election in which the faulted leader never speaks: a lossy phase
/// with timers firing at random, then a healed network where every timer
/// fires once per tick. With `skew`, one live leader's timer has already
/// fired twice at the start and those Faults were lost.
fn silent_faulted_leader(
    leaders: u8,
    seed: u64,
    skew: bool,
) -> (ElectionRoster, Vec<ElectionAdapter>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (roster, mut nodes) = nodes(leaders, 3);
    let faulted = roster.leader_for_slot(&KEY).unwrap();
    nodes.retain(|n| n.owner() != faulted);
    let clock = NullClock::default();
    let mut net = Net::default();

    let initial: Vec<ElectionMessage> =
        nodes.iter_mut().filter_map(|n| n.start(clock.now())).collect();
    net.broadcast_all(&nodes, initial);

    if skew {
        let fast = nodes
            .iter()
            .position(|n| roster.leaders.contains(&n.owner()))
            .unwrap();
        for _ in 0..2 {
            nodes[fast].timeout(clock.advance(1_000));
        }
        assert_eq!(nodes[fast].round(), 2);
    }

    let mut timeouts = 0;
    for _ in 0..5_000 {
        if net.in_flight.is_empty() || rng.gen_bool(0.03) {
            if timeouts >= 12 {
                break;
            }
            timeouts += 1;
            let target = rng.gen_range(0..nodes.len());
            let out = nodes[target].timeout(clock.advance(1_000));
            net.broadcast_all(&nodes, out);
            continue;
        }
        let pick = rng.gen_range(0..net.in_flight.len());
        let (to, msg) = net.in_flight.swap_remove(pick);
        if rng.gen_bool(0.3) {
            continue;
        }
        if rng.gen_bool(0.1) {
            net.in_flight.push((to, msg.clone()));
        }
        let out = nodes[to].execute(msg, clock.now());
        net.broadcast_all(&nodes, out);
    }

    for _ in 0..40 {
        net.drain(&mut nodes, &mut rng, clock.now());
        if nodes.iter().all(|n| n.is_processed()) {
            break;
        }
        let now = clock.advance(1_000);
        for i in 0..nodes.len() {
            let out = nodes[i].timeout(now);
            net.broadcast_all(&nodes, out);
        }
    }
    (roster, nodes)
}

fn assert_all_committed(roster: &ElectionRoster, nodes: &[ElectionAdapter], seed: u64) {
    assert_agreement(roster, nodes, seed);
    for node in nodes {
        assert!(
            node.election().is_committed(),
            "seed {}: {} stuck in round {}",
            seed,
            node.owner(),
            node.round()
        );
        assert!(node.is_processed(), "seed {}", seed);
    }
}

#[test]
fn silent_faulted_leader_every_live_node_commits_after_healing() {
    for leaders in 3..=5u8 {
        for seed in 0..20u64 {
            let (roster, nodes) = silent_faulted_leader(leaders, seed, false);
            assert_all_committed(&roster, &nodes, seed);
        }
    }
}

#[test]
fn skewed_timer_with_silent_faulted_leader_still_commits() {
    for leaders in 3..=5u8 {
        for seed in 100..110u64 {
            let (roster, nodes) = silent_faulted_leader(leaders, seed, true);
            assert_all_committed(&roster, &nodes, seed);
        }
    }
}

#[test]
fn lagging_leader_catches_up_on_a_peer_fault() {
    let (roster, mut nodes) = nodes(3, 3);
    let faulted = roster.leader_for_slot(&KEY).unwrap();
    nodes.retain(|n| n.owner() != faulted);
    let clock = NullClock::default();
    let live: Vec<usize> = (0..nodes.len())
        .filter(|&i| roster.leaders.contains(&nodes[i].owner()))
        .collect();
    assert_eq!(live.len(), 2);
    let (ahead, behind) = (live[0], live[1]);

    // `ahead` times out three times, `behind` not at all.
    let mut last = Vec::new();
    for _ in 0..3 {
        last = nodes[ahead].timeout(clock.advance(1_000));
    }
    assert_eq!(nodes[ahead].round(), 3);
    assert_eq!(nodes[behind].round(), 0);

    let fault = last.remove(0);
    assert_eq!(fault.location().round, 3);
    nodes[behind].execute(fault, clock.now());
    assert_eq!(nodes[behind].round(), 3);

    // Same round on both sides: reliable delivery now commits.
    let mut rng = StdRng::seed_from_u64(7);
    let mut net = Net::default();
    let now = clock.advance(1_000);
    for i in 0..nodes.len() {
        let out = nodes[i].timeout(now);
        net.broadcast_all(&nodes, out);
    }
    for _ in 0..40 {
        net.drain(&mut nodes, &mut rng, clock.now());
        if nodes.iter().all(|n| n.is_processed()) {
            break;
        }
        let now = clock.advance(1_000);
        for i in 0..nodes.len() {
            let out = nodes[i].timeout(now);
            net.broadcast_all(&nodes, out);
        }
    }
    assert_all_committed(&roster, &nodes, 7);
}
