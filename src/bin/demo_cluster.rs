//! Boots a small in-process Raft cluster over the loopback transport and drives `Start()` calls
//! from a simple command loop, in the spirit of the teacher's `client_db.rs` REPL.

use std::io::{self, BufRead, Write};

use raftpax::config::Tuning;
use raftpax::error::Result;
use raftpax::raft;
use raftpax::transport::local::LocalRaftHub;

const N_PEERS: usize = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let hub = LocalRaftHub::new(N_PEERS);
    let mut peers = Vec::with_capacity(N_PEERS);
    let mut apply_rxs = Vec::with_capacity(N_PEERS);
    for id in 0..N_PEERS as u64 {
        let (peer, rx) = raft::bootstrap_loopback(id, N_PEERS, &hub, Tuning::default(), None).await;
        peer.spawn();
        peers.push(peer);
        apply_rxs.push(rx);
    }

    for (id, mut rx) in apply_rxs.into_iter().enumerate() {
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                println!("  [peer {id}] applied index={} command={:?}", msg.index, String::from_utf8_lossy(&msg.command));
            }
        });
    }

    println!("raftpax demo cluster: {N_PEERS} peers over an in-process loopback transport.");
    println!("Enter a command to replicate it; !leader reports who the current leader is; !quit exits.");

    let stdin = io::stdin();
    loop {
        print!("raftpax> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "!quit" {
            break;
        }
        if line == "!leader" {
            report_leader(&peers).await;
            continue;
        }

        let mut proposed = false;
        for peer in &peers {
            let (index, term, is_leader) = peer.start(line.as_bytes().to_vec()).await;
            if is_leader {
                println!("  proposed at index={index} term={term}");
                proposed = true;
                break;
            }
        }
        if !proposed {
            println!("  no leader elected yet, try again shortly");
        }
    }

    for peer in &peers {
        peer.kill();
    }
    Ok(())
}

async fn report_leader(peers: &[std::sync::Arc<raft::Raft>]) {
    for (id, peer) in peers.iter().enumerate() {
        let (term, is_leader) = peer.get_state().await;
        if is_leader {
            println!("  peer {id} is leader in term {term}");
            return;
        }
    }
    println!("  no leader right now");
}
