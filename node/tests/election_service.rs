//! Several election services wired together through in-process channels.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use fedvote_consensus::{ElectionRoster, RosterSwap, SharedSigner, VolunteerPayload};
use fedvote_messages::{Ed25519Verifier, ElectionKey, KeyPairSigner, MessageSigner};
use fedvote_types::Identity;
use fedvote_node::{
    ElectionService, NodeConfig, NodeError, NodeMetrics, ServiceEvent, ServiceOutput,
    ShutdownController, Trigger,
};
use fedvote_nullables::{NullClock, NullNetwork};
use tokio::sync::mpsc;

const KEY: ElectionKey = ElectionKey {
    height: 700,
    minute: 4,
    slot: 0,
};

fn seed_hex(seed: u8) -> String {
    hex::encode([seed; 32])
}

fn roster(leaders: &[u8], candidates: &[u8]) -> ElectionRoster {
    let id = |s: &u8| KeyPairSigner::from_seed(&[*s; 32]).identity();
    ElectionRoster::new(
        leaders.iter().map(id).collect(),
        candidates.iter().map(id).collect(),
    )
}

struct Federation {
    events: Vec<mpsc::Sender<ServiceEvent>>,
    swaps: mpsc::Receiver<RosterSwap>,
    handles: Vec<tokio::task::JoinHandle<Result<ElectionService, NodeError>>>,
    metrics: Vec<Arc<NodeMetrics>>,
    shutdown: ShutdownController,
}

/// Start one service per seed and forward every broadcast to all other nodes.
fn federation(seeds: &[u8], roster: &ElectionRoster) -> Federation {
    let shutdown = ShutdownController::new();
    let (swap_tx, swaps) = mpsc::channel(64);
    let mut events = Vec::new();
    let mut outputs = Vec::new();
    let mut handles = Vec::new();
    let mut metrics = Vec::new();

    for seed in seeds {
        let config = NodeConfig {
            identity_seed: Some(seed_hex(*seed)),
            round_timeout_ms: 60_000,
            ..NodeConfig::default()
        };
        let signer: SharedSigner = Arc::new(config.signer().unwrap());
        let node_metrics = Arc::new(NodeMetrics::new().unwrap());
        let service = ElectionService::new(&config, signer, Arc::new(Ed25519Verifier), roster.clone())
            .with_metrics(node_metrics.clone());
        let (tx, rx, handle) = service.spawn(shutdown.subscribe());
        events.push(tx);
        outputs.push(rx);
        handles.push(handle);
        metrics.push(node_metrics);
    }

    for (i, mut rx) in outputs.into_iter().enumerate() {
        let peers: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, tx)| tx.clone())
            .collect();
        let swap_tx = swap_tx.clone();
        tokio::spawn(async move {
            while let Some(output) = rx.recv().await {
                match output {
                    ServiceOutput::Broadcast(bytes) => {
                        for peer in &peers {
                            let _ = peer.send(ServiceEvent::Inbound(bytes.clone())).await;
                        }
                    }
                    ServiceOutput::ApplySwap(swap) => {
                        let _ = swap_tx.send(swap).await;
                    }
                }
            }
        });
    }

    Federation {
        events,
        swaps,
        handles,
        metrics,
        shutdown,
    }
}

async fn trigger_all(fed: &Federation) {
    for tx in &fed.events {
        tx.send(ServiceEvent::Trigger(Trigger {
            key: KEY,
            missing: true,
            payload: VolunteerPayload {
                missing: b"eom".to_vec(),
                ack: b"ack".to_vec(),
            },
        }))
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn federation_replaces_the_faulted_leader_everywhere() {
    let seeds = [1u8, 2, 3, 101, 102];
    let live = roster(&seeds[..3], &seeds[3..]);
    let faulted = live.leader_for_slot(&KEY).unwrap();
    let mut fed = federation(&seeds, &live);
    trigger_all(&fed).await;

    let mut swaps = Vec::new();
    while swaps.len() < seeds.len() {
        let swap = tokio::time::timeout(Duration::from_secs(10), fed.swaps.recv())
            .await
            .expect("every node commits")
            .unwrap();
        swaps.push(swap);
    }
    assert!(swaps.iter().all(|s| s == &swaps[0]));
    assert_eq!(swaps[0].faulted, faulted);
    assert_eq!(swaps[0].key, KEY);

    fed.shutdown.shutdown();
    for handle in fed.handles {
        let mut service = handle.await.unwrap().unwrap();
        let reports = service.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].swap, swaps[0]);
        assert!(reports[0].grid.contains("Lvl"));
        assert!(service.roster().leaders.contains(&swaps[0].candidate));
        assert!(!service.roster().leaders.contains(&faulted));
        assert!(service.elections().is_finished(&KEY));
    }
    for metrics in &fed.metrics {
        assert_eq!(metrics.elections_committed.get(), 1);
        assert_eq!(metrics.active_elections.get(), 0);
    }
}

#[tokio::test]
async fn late_trigger_replays_buffered_messages() {
    let seeds = [1u8, 2, 3, 101];
    let live = roster(&seeds[..3], &seeds[3..]);
    let mut fed = federation(&seeds, &live);

    // everyone but the first leader starts; its messages wait in the buffer
    for tx in &fed.events[1..] {
        tx.send(ServiceEvent::Trigger(Trigger {
            key: KEY,
            missing: true,
            payload: VolunteerPayload::default(),
        }))
        .await
        .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    fed.events[0]
        .send(ServiceEvent::Trigger(Trigger {
            key: KEY,
            missing: true,
            payload: VolunteerPayload::default(),
        }))
        .await
        .unwrap();

    let mut committed = 0;
    while committed < seeds.len() {
        tokio::time::timeout(Duration::from_secs(10), fed.swaps.recv())
            .await
            .expect("every node commits")
            .unwrap();
        committed += 1;
    }
    fed.shutdown.shutdown();
}

#[tokio::test]
async fn dropping_all_senders_stops_the_service() {
    let live = roster(&[1, 2, 3], &[101]);
    let config = NodeConfig::default();
    let signer: SharedSigner = Arc::new(KeyPairSigner::from_seed(&[1; 32]));
    let service = ElectionService::new(&config, signer, Arc::new(Ed25519Verifier), live);
    let shutdown = ShutdownController::new();
    let (tx, _rx, handle) = service.spawn(shutdown.subscribe());
    drop(tx);
    let service = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(service.elections().is_empty());
}

/// Same federation, driven synchronously: broadcasts land in a
/// [`NullNetwork`] and are delivered in send order.
#[test]
fn synchronous_services_over_null_network() {
    let seeds = [1u8, 2, 3, 4, 101, 102, 103];
    let live = roster(&seeds[..4], &seeds[4..]);
    let clock = NullClock::default();
    let net = NullNetwork::new();
    let mut nodes: Vec<ElectionService> = seeds
        .iter()
        .map(|seed| {
            let signer: SharedSigner = Arc::new(KeyPairSigner::from_seed(&[*seed; 32]));
            ElectionService::new(&NodeConfig::default(), signer, Arc::new(Ed25519Verifier), live.clone())
        })
        .collect();

    let mut swaps = Vec::new();
    let deliver = |from: Identity, outputs: Vec<ServiceOutput>, swaps: &mut Vec<RosterSwap>| {
        for output in outputs {
            match output {
                ServiceOutput::Broadcast(bytes) => net.broadcast(from, bytes),
                ServiceOutput::ApplySwap(swap) => swaps.push(swap),
            }
        }
    };

    for node in nodes.iter_mut() {
        let outputs = node.handle(
            ServiceEvent::Trigger(Trigger {
                key: KEY,
                missing: true,
                payload: VolunteerPayload::default(),
            }),
            clock.now(),
        );
        deliver(node.identity(), outputs, &mut swaps);
    }

    let mut rounds = 0;
    loop {
        let sent = net.take_sent();
        if sent.is_empty() {
            break;
        }
        rounds += 1;
        assert!(rounds < 100, "broadcast storm");
        for (from, bytes) in sent {
            for node in nodes.iter_mut().filter(|n| n.identity() != from) {
                let outputs = node.handle(ServiceEvent::Inbound(bytes.clone()), clock.advance(1));
                deliver(node.identity(), outputs, &mut swaps);
            }
        }
    }

    assert_eq!(swaps.len(), seeds.len());
    assert!(swaps.iter().all(|s| s == &swaps[0]));
    for node in &nodes {
        assert_eq!(node.roster().leaders[swaps[0].faulted_index as usize], swaps[0].candidate);
        assert_eq!(node.next_deadline(), None);
    }
}

/// A leader that starts after everyone else committed learns the outcome
/// from the answers to its first Fault.
#[test]
fn finished_election_answers_a_late_fault() {
    let seeds = [1u8, 2, 3, 101];
    let live = roster(&seeds[..3], &seeds[3..]);
    let clock = NullClock::default();
    let net = NullNetwork::new();
    let config = NodeConfig {
        round_timeout_ms: 1_000,
        ..NodeConfig::default()
    };
    let mut nodes: Vec<ElectionService> = seeds
        .iter()
        .map(|seed| {
            let signer: SharedSigner = Arc::new(KeyPairSigner::from_seed(&[*seed; 32]));
            ElectionService::new(&config, signer, Arc::new(Ed25519Verifier), live.clone())
        })
        .collect();
    let mut late = nodes.remove(2);
    let trigger = || {
        ServiceEvent::Trigger(Trigger {
            key: KEY,
            missing: true,
            payload: VolunteerPayload::default(),
        })
    };

    let mut swaps = Vec::new();
    for node in nodes.iter_mut() {
        for output in node.handle(trigger(), clock.now()) {
            if let ServiceOutput::Broadcast(bytes) = output {
                net.broadcast(node.identity(), bytes);
            }
        }
    }
    let mut rounds = 0;
    loop {
        let sent = net.take_sent();
        if sent.is_empty() {
            break;
        }
        rounds += 1;
        assert!(rounds < 100, "broadcast storm");
        for (from, bytes) in sent {
            for node in nodes.iter_mut().filter(|n| n.identity() != from) {
                for output in node.handle(ServiceEvent::Inbound(bytes.clone()), clock.now()) {
                    match output {
                        ServiceOutput::Broadcast(bytes) => net.broadcast(node.identity(), bytes),
                        ServiceOutput::ApplySwap(swap) => swaps.push(swap),
                    }
                }
            }
        }
    }
    assert_eq!(swaps.len(), nodes.len());
    assert!(nodes.iter().all(|n| n.elections().is_finished(&KEY)));

    assert!(late.handle(trigger(), clock.now()).is_empty());
    let faults = late.on_deadline(clock.advance(1_000));
    assert_eq!(faults.len(), 1);

    let mut answers = Vec::new();
    for output in faults {
        let ServiceOutput::Broadcast(bytes) = output else {
            panic!("expected the late leader's fault");
        };
        for node in nodes.iter_mut() {
            answers.extend(node.handle(ServiceEvent::Inbound(bytes.clone()), clock.now()));
        }
    }
    assert!(!answers.is_empty());

    let mut applied = Vec::new();
    for answer in answers {
        if let ServiceOutput::Broadcast(bytes) = answer {
            for output in late.handle(ServiceEvent::Inbound(bytes), clock.now()) {
                if let ServiceOutput::ApplySwap(swap) = output {
                    applied.push(swap);
                }
            }
        }
    }
    assert_eq!(applied, vec![swaps[0].clone()]);
    assert!(late.elections().is_finished(&KEY));
    assert_eq!(late.next_deadline(), None);
}

#[test]
fn config_file_round_trip() {
    let config = NodeConfig {
        identity_seed: Some(seed_hex(9)),
        round_timeout_ms: 1_500,
        log_format: "json".into(),
        enable_metrics: true,
        ..NodeConfig::default()
    };
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_toml_string().unwrap().as_bytes())
        .unwrap();
    let path = file.path().to_str().unwrap().to_string();
    let loaded = NodeConfig::from_toml_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.signer().unwrap().identity(),
        KeyPairSigner::from_seed(&[9; 32]).identity()
    );
}
