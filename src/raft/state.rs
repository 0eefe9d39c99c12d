use serde_derive::{Deserialize, Serialize};

use crate::raft::log::Log;
use crate::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Everything guarded by the per-peer mutex (spec §5): persistent and volatile Raft state
/// together, since in practice every handler touches both under the same lock acquisition.
pub struct RaftState {
    pub current_term: u64,
    pub voted_for: Option<PeerId>,
    pub log: Log,

    pub role: Role,
    pub commit_index: u64,
    pub last_applied: u64,

    /// Leader-only bookkeeping. Sized to the peer count up front; only meaningful (and only
    /// written) while `role == Leader`.
    pub next_index: Vec<u64>,
    pub match_index: Vec<u64>,
}

impl RaftState {
    pub fn new(n_peers: usize) -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            role: Role::Follower,
            commit_index: 0,
            last_applied: 0,
            next_index: vec![1; n_peers],
            match_index: vec![0; n_peers],
        }
    }

    pub fn become_leader(&mut self, n_peers: usize, me: PeerId) {
        self.role = Role::Leader;
        let next = self.log.last_index() + 1;
        self.next_index = vec![next; n_peers];
        self.match_index = vec![0; n_peers];
        self.match_index[me as usize] = self.log.last_index();
    }
}

/// The subset of `RaftState` that must survive a restart, per spec §3 Persistence.
#[derive(Serialize, Deserialize)]
pub struct PersistentState {
    pub current_term: u64,
    pub voted_for: Option<PeerId>,
    pub log: Log,
}

impl From<&RaftState> for PersistentState {
    fn from(st: &RaftState) -> Self {
        Self {
            current_term: st.current_term,
            voted_for: st.voted_for,
            log: st.log.clone(),
        }
    }
}
