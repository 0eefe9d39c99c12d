//! The election-timer loop, spec §4.2: one ticking loop per peer whose next wait is a heartbeat
//! interval (Leader) or a randomized election timeout (Follower/Candidate), interruptible by the
//! one-slot `reset`/`skip` events.

use std::sync::Arc;

use super::Raft;
use crate::raft::state::Role;

pub async fn run_timer_loop(raft: Arc<Raft>) {
    while raft.is_alive() {
        let wait = raft.next_wait().await;
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                fire(&raft).await;
            }
            _ = raft.reset_timer_event().wait() => {
                // Valid heartbeat, granted vote, or a step-down happened: abandon this wait and
                // recompute a fresh one: no action here.
            }
            _ = raft.skip_timer_event().wait() => {
                fire(&raft).await;
            }
        }
    }
}

async fn fire(raft: &Arc<Raft>) {
    match raft.current_role().await {
        Role::Leader => raft.broadcast_heartbeats().await,
        Role::Follower | Role::Candidate => raft.start_election().await,
    }
}
