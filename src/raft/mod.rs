//! Leader-election and log-replication engine, spec §4.1–§4.5.

pub mod applier;
pub mod log;
pub mod rpc;
pub mod state;
pub mod timer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures_util::StreamExt;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};

use crate::config::Tuning;
use crate::event::Event;
use crate::persist::Persister;
use crate::transport::local::RaftHandler;
use crate::transport::RaftTransport;
use crate::PeerId;

use rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use state::{PersistentState, RaftState, Role};

/// A single committed entry delivered to the application, spec §6.2.
#[derive(Debug, Clone)]
pub struct ApplyMsg {
    pub index: u64,
    pub command: Vec<u8>,
}

/// One Raft peer. Construct with `Raft::new`, then call `Raft::spawn` once to start its
/// background timer and applier loops.
pub struct Raft {
    me: PeerId,
    n_peers: usize,
    tuning: Tuning,

    state: Mutex<RaftState>,
    persister: Arc<dyn Persister>,
    transport: Arc<dyn RaftTransport>,

    alive: Arc<AtomicBool>,
    reset_timer: Event,
    skip_timer: Event,
    commit_updated: Event,

    apply_tx: mpsc::UnboundedSender<ApplyMsg>,
    rng: Mutex<SmallRng>,
}

impl Raft {
    /// `seed`, when given, makes the election-timeout/heartbeat jitter reproducible — used by
    /// the test harness (spec §8, "Test harness (ADDED)").
    pub fn new(
        me: PeerId,
        n_peers: usize,
        transport: Arc<dyn RaftTransport>,
        persister: Arc<dyn Persister>,
        tuning: Tuning,
        seed: Option<u64>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ApplyMsg>) {
        let mut state = RaftState::new(n_peers);
        let saved = persister.raft_state();
        if !saved.is_empty() {
            if let Ok(restored) = bincode::deserialize::<PersistentState>(&saved) {
                state.current_term = restored.current_term;
                state.voted_for = restored.voted_for;
                state.log = restored.log;
            }
        }

        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };

        let (apply_tx, apply_rx) = mpsc::unbounded_channel();

        let raft = Arc::new(Self {
            me,
            n_peers,
            tuning,
            state: Mutex::new(state),
            persister,
            transport,
            alive: Arc::new(AtomicBool::new(true)),
            reset_timer: Event::new(),
            skip_timer: Event::new(),
            commit_updated: Event::new(),
            apply_tx,
            rng: Mutex::new(rng),
        });
        (raft, apply_rx)
    }

    /// Starts the election-timer and applier background loops. Call once per peer.
    pub fn spawn(self: &Arc<Self>) {
        tokio::spawn(timer::run_timer_loop(self.clone()));
        tokio::spawn(applier::run_applier_loop(self.clone()));
    }

    /// Spec §6.2. Returns `(index, term, isLeader)`; `isLeader=false` means the command was not
    /// accepted and the other two fields are meaningless to the caller beyond logging.
    pub async fn start(&self, command: Vec<u8>) -> (u64, u64, bool) {
        let mut st = self.state.lock().await;
        if st.role != Role::Leader {
            return (0, st.current_term, false);
        }
        let term = st.current_term;
        let index = st.log.append(term, command);
        st.match_index[self.me as usize] = index;
        self.persist(&st);
        drop(st);
        self.skip_timer.set();
        (index, term, true)
    }

    pub async fn get_state(&self) -> (u64, bool) {
        let st = self.state.lock().await;
        (st.current_term, st.role == Role::Leader)
    }

    /// Spec §5 "Cancellation / shutdown": sets the alive flag, checked at every loop iteration.
    /// In-flight RPCs complete and their replies are discarded.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn persist(&self, st: &RaftState) {
        let bytes = bincode::serialize(&PersistentState::from(st)).expect("encode raft state");
        self.persister.save_raft_state(bytes);
    }

    /// Spec §4.1, the "observes higher term" transition shared by every RPC path.
    fn step_down(&self, st: &mut RaftState, term: u64) {
        ::log::info!("peer {} stepping down to follower, term {} -> {}", self.me, st.current_term, term);
        st.current_term = term;
        st.voted_for = None;
        st.role = Role::Follower;
        self.persist(st);
        self.reset_timer.set();
    }

    pub(crate) async fn next_wait(&self) -> std::time::Duration {
        let role = self.state.lock().await.role;
        let mut rng = self.rng.lock().await;
        match role {
            Role::Leader => std::time::Duration::from_millis(self.tuning.heartbeat_interval_ms),
            Role::Follower | Role::Candidate => {
                let ms = rng.gen_range(self.tuning.election_timeout_lo_ms..self.tuning.election_timeout_hi_ms);
                std::time::Duration::from_millis(ms)
            }
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) async fn current_role(&self) -> Role {
        self.state.lock().await.role
    }

    /// Fired by the election timer when it elapses on a Follower or Candidate, spec §4.1/§4.2.
    pub(crate) async fn start_election(self: &Arc<Self>) {
        let (term, args) = {
            let mut st = self.state.lock().await;
            st.current_term += 1;
            st.role = Role::Candidate;
            st.voted_for = Some(self.me);
            self.persist(&st);
            let args = RequestVoteArgs {
                term: st.current_term,
                candidate_id: self.me,
                last_log_index: st.log.last_index(),
                last_log_term: st.log.last_term(),
            };
            (st.current_term, args)
        };
        ::log::info!("peer {} starting election for term {}", self.me, term);

        let mut votes = 1usize;
        if votes * 2 > self.n_peers {
            // Single-peer cluster: majority of one already reached.
            let mut st = self.state.lock().await;
            if st.role == Role::Candidate && st.current_term == term {
                st.become_leader(self.n_peers, self.me);
                drop(st);
                self.skip_timer.set();
            }
            return;
        }

        let mut futures = FuturesUnordered::new();
        for peer in 0..self.n_peers as PeerId {
            if peer == self.me {
                continue;
            }
            let transport = self.transport.clone();
            let args = args.clone();
            futures.push(async move { transport.request_vote(peer, args).await });
        }

        while let Some(reply) = futures.next().await {
            let Some(reply): Option<RequestVoteReply> = reply else {
                continue;
            };
            let mut st = self.state.lock().await;
            if reply.term > st.current_term {
                self.step_down(&mut st, reply.term);
                return;
            }
            if st.role != Role::Candidate || st.current_term != term {
                return;
            }
            if reply.vote_granted {
                votes += 1;
                if votes * 2 > self.n_peers {
                    st.become_leader(self.n_peers, self.me);
                    ::log::info!("peer {} became leader for term {}", self.me, term);
                    drop(st);
                    self.skip_timer.set();
                    return;
                }
            }
        }
    }

    /// Fired by the election timer when it elapses on a Leader (heartbeat interval), or right
    /// after becoming Leader, or right after `start()` appends a new entry.
    pub(crate) async fn broadcast_heartbeats(self: &Arc<Self>) {
        let (term, snapshots) = {
            let st = self.state.lock().await;
            if st.role != Role::Leader {
                return;
            }
            let mut snaps = Vec::with_capacity(self.n_peers.saturating_sub(1));
            for peer in 0..self.n_peers as PeerId {
                if peer == self.me {
                    continue;
                }
                let prev_log_index = st.next_index[peer as usize].saturating_sub(1);
                let prev_log_term = st.log.term_at(prev_log_index);
                let entries = st.log.entries_after(prev_log_index);
                snaps.push((
                    peer,
                    AppendEntriesArgs {
                        term: st.current_term,
                        leader_id: self.me,
                        prev_log_index,
                        prev_log_term,
                        entries,
                        leader_commit: st.commit_index,
                    },
                ));
            }
            (st.current_term, snaps)
        };

        for (peer, args) in snapshots {
            let raft = self.clone();
            tokio::spawn(async move {
                if let Some(reply) = raft.transport.append_entries(peer, args).await {
                    raft.handle_append_entries_reply(peer, term, reply).await;
                }
            });
        }
    }

    async fn handle_append_entries_reply(self: &Arc<Self>, peer: PeerId, sent_term: u64, reply: AppendEntriesReply) {
        let mut st = self.state.lock().await;
        if reply.term > st.current_term {
            self.step_down(&mut st, reply.term);
            return;
        }
        if st.role != Role::Leader || st.current_term != sent_term {
            return;
        }
        if reply.success {
            st.next_index[peer as usize] = st.next_index[peer as usize].max(reply.match_index + 1);
            st.match_index[peer as usize] = st.match_index[peer as usize].max(reply.match_index);
            self.try_advance_commit(&mut st);
        } else {
            let next = &mut st.next_index[peer as usize];
            *next = (*next).saturating_sub(1).max(1);
        }
    }

    /// Spec §4.4 commit-advance rule: largest `N` with a majority `matchIndex[*] >= N` and
    /// `log[N].term == currentTerm`. Never commits a prior-term entry directly. Grounded on the
    /// teacher's `quorum()` counting rule (`peers.len() / 2 + 1`): sorted descending, the element
    /// at `n_peers / 2` is the smallest value at least `n_peers / 2 + 1` peers (including self)
    /// have reached.
    fn try_advance_commit(&self, st: &mut RaftState) {
        let mut indices = st.match_index.clone();
        indices[self.me as usize] = st.log.last_index();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let majority_index = indices[self.n_peers / 2];
        if majority_index > st.commit_index && st.log.term_at(majority_index) == st.current_term {
            st.commit_index = majority_index;
            self.commit_updated.set();
        }
    }

    pub(crate) async fn apply_ready(&self) {
        let msgs = {
            let mut st = self.state.lock().await;
            let mut msgs = Vec::new();
            while st.last_applied < st.commit_index {
                st.last_applied += 1;
                let index = st.last_applied;
                msgs.push(ApplyMsg {
                    index,
                    command: st.log.entry_at(index).command.clone(),
                });
            }
            msgs
        };
        for msg in msgs {
            // The receiver dropping the channel means the application shut down; nothing to do.
            let _ = self.apply_tx.send(msg);
        }
    }

    pub(crate) fn reset_timer_event(&self) -> &Event {
        &self.reset_timer
    }

    pub(crate) fn skip_timer_event(&self) -> &Event {
        &self.skip_timer
    }

    pub(crate) fn applier_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tuning.applier_poll_ms)
    }

    pub(crate) fn commit_updated_event(&self) -> &Event {
        &self.commit_updated
    }
}

#[async_trait]
impl RaftHandler for Raft {
    /// Spec §4.3.
    async fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply {
        let mut st = self.state.lock().await;
        if args.term < st.current_term {
            ::log::debug!(
                "peer {} rejecting RequestVote from {} for stale term {} < {}",
                self.me, args.candidate_id, args.term, st.current_term
            );
            return RequestVoteReply {
                term: st.current_term,
                vote_granted: false,
            };
        }
        if args.term > st.current_term {
            self.step_down(&mut st, args.term);
        }
        let log_ok = args.last_log_term > st.log.last_term()
            || (args.last_log_term == st.log.last_term() && args.last_log_index >= st.log.last_index());
        let can_vote = st.voted_for.is_none() || st.voted_for == Some(args.candidate_id);
        if can_vote && log_ok {
            st.voted_for = Some(args.candidate_id);
            self.persist(&st);
            self.reset_timer.set();
            RequestVoteReply {
                term: st.current_term,
                vote_granted: true,
            }
        } else {
            ::log::debug!(
                "peer {} rejecting RequestVote from {} (voted_for={:?}, log_ok={})",
                self.me, args.candidate_id, st.voted_for, log_ok
            );
            RequestVoteReply {
                term: st.current_term,
                vote_granted: false,
            }
        }
    }

    /// Spec §4.4.
    async fn handle_append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesReply {
        let mut st = self.state.lock().await;
        if args.term < st.current_term {
            ::log::debug!(
                "peer {} rejecting AppendEntries from {} for stale term {} < {}",
                self.me, args.leader_id, args.term, st.current_term
            );
            return AppendEntriesReply {
                term: st.current_term,
                success: false,
                match_index: 0,
            };
        }
        if args.term > st.current_term {
            self.step_down(&mut st, args.term);
        } else {
            if st.role == Role::Candidate {
                st.role = Role::Follower;
            }
            self.reset_timer.set();
        }

        if !st.log.has_index(args.prev_log_index) || st.log.term_at(args.prev_log_index) != args.prev_log_term {
            ::log::debug!(
                "peer {} rejecting AppendEntries from {}: log mismatch at prev_log_index={}",
                self.me, args.leader_id, args.prev_log_index
            );
            return AppendEntriesReply {
                term: st.current_term,
                success: false,
                match_index: 0,
            };
        }

        let match_index = st.log.merge(args.prev_log_index, &args.entries);
        self.persist(&st);
        if args.leader_commit > st.commit_index {
            st.commit_index = args.leader_commit.min(match_index);
            self.commit_updated.set();
        }
        AppendEntriesReply {
            term: st.current_term,
            success: true,
            match_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::LocalRaftHub;

    /// Regression test for the commit-advance majority index: a 4-peer cluster needs 3 peers
    /// (including the leader) to agree before an entry commits, not 2.
    #[tokio::test]
    async fn commit_advances_only_on_true_majority_in_even_cluster() {
        let hub = LocalRaftHub::new(4);
        let (raft, _rx) = bootstrap_loopback(0, 4, &hub, Tuning::default(), Some(1)).await;

        let mut st = raft.state.lock().await;
        st.role = Role::Leader;
        st.current_term = 1;
        st.log.append(1, b"a".to_vec());

        st.match_index = vec![0, 1, 0, 0];
        raft.try_advance_commit(&mut st);
        assert_eq!(st.commit_index, 0, "only 2 of 4 peers agree, not a majority");

        st.match_index = vec![0, 1, 1, 0];
        raft.try_advance_commit(&mut st);
        assert_eq!(st.commit_index, 1, "3 of 4 peers (including self) is a true majority");
    }
}

/// Convenience constructor for wiring a `Raft` directly onto a loopback hub, used by the demo
/// binary and integration tests.
pub async fn bootstrap_loopback(
    me: PeerId,
    n_peers: usize,
    hub: &Arc<crate::transport::local::LocalRaftHub>,
    tuning: Tuning,
    seed: Option<u64>,
) -> (Arc<Raft>, mpsc::UnboundedReceiver<ApplyMsg>) {
    let transport = Arc::new(hub.transport(me));
    let persister = Arc::new(crate::persist::MemoryPersister::new());
    let (raft, rx) = Raft::new(me, n_peers, transport, persister, tuning, seed);
    hub.register(me, raft.clone());
    (raft, rx)
}
