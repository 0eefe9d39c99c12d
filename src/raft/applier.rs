//! The commit applier, spec §4.5: delivers committed entries to the application strictly in
//! index order, waking on the `commitUpdated` event with a polling fallback.

use std::sync::Arc;

use super::Raft;

pub async fn run_applier_loop(raft: Arc<Raft>) {
    while raft.is_alive() {
        tokio::select! {
            _ = raft.commit_updated_event().wait() => {}
            _ = tokio::time::sleep(raft.applier_poll_interval()) => {}
        }
        raft.apply_ready().await;
    }
}
