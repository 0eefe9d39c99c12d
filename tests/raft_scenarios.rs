//! Integration tests for the "Concrete scenarios" and invariants in spec §8, driven entirely
//! over the loopback transport (no sockets). Timing is seeded for reproducibility and tests poll
//! with bounded retries rather than sleeping for fixed durations wherever avoidable.

use std::sync::Arc;
use std::time::Duration;

use raftpax::config::Tuning;
use raftpax::raft::{self, ApplyMsg, Raft};
use raftpax::transport::local::LocalRaftHub;
use tokio::sync::mpsc::UnboundedReceiver;

fn fast_tuning() -> Tuning {
    Tuning {
        heartbeat_interval_ms: 20,
        election_timeout_lo_ms: 60,
        election_timeout_hi_ms: 100,
        applier_poll_ms: 10,
        ..Tuning::default()
    }
}

async fn cluster(n: usize, seed_base: u64) -> (Arc<LocalRaftHub>, Vec<Arc<Raft>>, Vec<UnboundedReceiver<ApplyMsg>>) {
    let hub = LocalRaftHub::new(n);
    let mut peers = Vec::with_capacity(n);
    let mut rxs = Vec::with_capacity(n);
    for id in 0..n as u64 {
        let (peer, rx) = raft::bootstrap_loopback(id, n, &hub, fast_tuning(), Some(seed_base + id)).await;
        peer.spawn();
        peers.push(peer);
        rxs.push(rx);
    }
    (hub, peers, rxs)
}

async fn await_leader_excluding(peers: &[Arc<Raft>], excluded: &[usize]) -> usize {
    for _ in 0..300 {
        for (i, p) in peers.iter().enumerate() {
            if excluded.contains(&i) {
                continue;
            }
            let (_, is_leader) = p.get_state().await;
            if is_leader {
                return i;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no leader elected within timeout");
}

async fn await_apply(rx: &mut UnboundedReceiver<ApplyMsg>, expected_index: u64) -> ApplyMsg {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let msg = rx.recv().await.expect("applier channel closed early");
            if msg.index == expected_index {
                return msg;
            }
            assert!(msg.index < expected_index, "applier skipped ahead of expected index");
        }
    })
    .await
    .expect("timed out waiting for apply")
}

/// Scenario 1: three-peer happy path.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_peer_happy_path_commits_and_applies() {
    let (_hub, peers, mut rxs) = cluster(3, 1).await;
    let leader = await_leader_excluding(&peers, &[]).await;

    let (index, _term, is_leader) = peers[leader].start(b"x".to_vec()).await;
    assert!(is_leader);
    assert_eq!(index, 1);

    for rx in rxs.iter_mut() {
        let msg = await_apply(rx, 1).await;
        assert_eq!(msg.command, b"x");
    }

    for p in &peers {
        p.kill();
    }
}

/// Scenario 2: leader-loss recovery.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leader_loss_recovery_commits_on_new_leader() {
    let (hub, peers, mut rxs) = cluster(3, 10).await;
    let first_leader = await_leader_excluding(&peers, &[]).await;

    let (idx_a, _, ok) = peers[first_leader].start(b"a".to_vec()).await;
    assert!(ok);
    for rx in rxs.iter_mut() {
        await_apply(rx, idx_a).await;
    }

    peers[first_leader].kill();
    hub.drop_peer(first_leader as u64);

    let second_leader = await_leader_excluding(&peers, &[first_leader]).await;
    assert_ne!(second_leader, first_leader);

    let (idx_b, _, ok) = peers[second_leader].start(b"b".to_vec()).await;
    assert!(ok);
    assert_eq!(idx_b, idx_a + 1);

    for (i, rx) in rxs.iter_mut().enumerate() {
        if i == first_leader {
            continue;
        }
        let msg = await_apply(rx, idx_b).await;
        assert_eq!(msg.command, b"b");
    }

    for p in &peers {
        p.kill();
    }
}

/// Scenario 3: partition then heal.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitioned_minority_catches_up_after_heal() {
    let (hub, peers, mut rxs) = cluster(3, 20).await;
    let leader = await_leader_excluding(&peers, &[]).await;
    let minority = (leader + 1) % 3;
    let majority_peers: Vec<usize> = (0..3).filter(|&i| i != minority).collect();

    for &other in &majority_peers {
        hub.partition(minority as u64, other as u64);
    }

    // The majority side must still make progress, possibly behind a new leader if the
    // partitioned peer happened to be the original one.
    let working_leader = if majority_peers.contains(&leader) {
        leader
    } else {
        await_leader_excluding(&peers, &[minority]).await
    };

    let (index, _, ok) = peers[working_leader].start(b"c".to_vec()).await;
    assert!(ok);
    for &i in &majority_peers {
        await_apply(&mut rxs[i], index).await;
    }

    for &other in &majority_peers {
        hub.heal(minority as u64, other as u64);
    }

    let msg = await_apply(&mut rxs[minority], index).await;
    assert_eq!(msg.command, b"c");

    for p in &peers {
        p.kill();
    }
}

/// Election Safety (invariant 1): at most one leader per term, sampled across a live cluster.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_one_leader_per_term() {
    let (_hub, peers, _rxs) = cluster(3, 30).await;
    await_leader_excluding(&peers, &[]).await;

    for _ in 0..20 {
        let mut leaders_by_term = std::collections::HashMap::new();
        for p in &peers {
            let (term, is_leader) = p.get_state().await;
            if is_leader {
                *leaders_by_term.entry(term).or_insert(0) += 1;
            }
        }
        for (_term, count) in leaders_by_term {
            assert!(count <= 1, "more than one leader observed in the same term");
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    for p in &peers {
        p.kill();
    }
}
