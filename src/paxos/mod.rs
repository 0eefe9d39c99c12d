//! Multi-Paxos instance log: an independent Synod per sequence number, spec §4.6–§4.8.

pub mod instance;
pub mod proposer;
pub mod rpc;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::config::Tuning;
use crate::transport::local::PaxosHandler;
use crate::transport::PaxosTransport;
use crate::PeerId;

use instance::{AcceptOutcome, InstanceStore, PrepareOutcome};
use rpc::{AcceptArgs, AcceptReply, DecideArgs, DecideReply, PrepareArgs, PrepareReply};

/// Spec §6.3 `Status(seq)` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaxosStatus {
    Decided(Vec<u8>),
    Pending,
    Forgotten,
}

/// One Paxos peer.
pub struct Paxos {
    me: PeerId,
    n_peers: usize,
    tuning: Tuning,
    transport: Arc<dyn PaxosTransport>,
    alive: Arc<AtomicBool>,

    store: Mutex<InstanceStore>,
    next_prop_n: Mutex<HashMap<u64, i64>>,
    /// `peersDone[i]`, spec §3: the highest sequence peer `i` has declared forgettable. `-1`
    /// means "never declared".
    peers_done: Mutex<Vec<i64>>,
    rng: Mutex<SmallRng>,
}

impl Paxos {
    pub fn new(me: PeerId, n_peers: usize, transport: Arc<dyn PaxosTransport>, tuning: Tuning, seed: Option<u64>) -> Arc<Self> {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_entropy(),
        };
        Arc::new(Self {
            me,
            n_peers,
            tuning,
            transport,
            alive: Arc::new(AtomicBool::new(true)),
            store: Mutex::new(InstanceStore::new()),
            next_prop_n: Mutex::new(HashMap::new()),
            peers_done: Mutex::new(vec![-1; n_peers]),
            rng: Mutex::new(rng),
        })
    }

    /// Spec §6.3: fire-and-forget. Spawns the Prepare→Accept→Decide driver (spec §4.7) and
    /// returns immediately.
    pub fn start(self: &Arc<Self>, seq: u64, value: Vec<u8>) {
        let px = self.clone();
        tokio::spawn(proposer::drive(px, seq, value));
    }

    pub async fn status(&self, seq: u64) -> PaxosStatus {
        let min_done = self.current_min_done().await;
        if min_done >= 0 && seq as i64 <= min_done {
            return PaxosStatus::Forgotten;
        }
        match self.store.lock().await.status(seq) {
            Some((true, Some(v))) => PaxosStatus::Decided(v),
            _ => PaxosStatus::Pending,
        }
    }

    /// Spec §4.8: raises this peer's own done watermark.
    pub async fn done(&self, seq: u64) {
        let mut peers_done = self.peers_done.lock().await;
        let slot = &mut peers_done[self.me as usize];
        *slot = (*slot).max(seq as i64);
    }

    /// Spec §4.8: recomputes the global minimum done watermark, reclaims every instance at or
    /// below it, and returns `min + 1`.
    pub async fn min(&self) -> u64 {
        let m = self.current_min_done().await;
        if m >= 0 {
            ::log::debug!("peer {} reclaiming paxos instances at or below seq {}", self.me, m);
        }
        self.store.lock().await.forget_through(m);
        (m + 1) as u64
    }

    /// The largest sequence this peer has ever stored, or `-1` if none.
    pub async fn max(&self) -> i64 {
        self.store.lock().await.max_seq().map(|s| s as i64).unwrap_or(-1)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    async fn current_min_done(&self) -> i64 {
        self.peers_done.lock().await.iter().copied().min().unwrap_or(-1)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn me(&self) -> PeerId {
        self.me
    }

    pub(crate) fn n_peers(&self) -> usize {
        self.n_peers
    }

    pub(crate) fn transport(&self) -> Arc<dyn PaxosTransport> {
        self.transport.clone()
    }

    pub(crate) async fn is_decided(&self, seq: u64) -> bool {
        matches!(self.store.lock().await.status(seq), Some((true, _)))
    }

    /// Next candidate proposal number for `seq`: strides by `n_peers` starting from `self.me`,
    /// spec §4.7 step 1 / Invariant 1.
    pub(crate) async fn next_proposal_number(&self, seq: u64) -> i64 {
        let stride = self.n_peers as i64;
        let mut map = self.next_prop_n.lock().await;
        let entry = map.entry(seq).or_insert(self.me as i64);
        let n = *entry;
        *entry += stride;
        n
    }

    /// On a `Reject` hint, advances `nextPropN[seq]` past the hint, keeping the `self + k*stride`
    /// shape so the invariant that proposal numbers are globally unique per proposer still holds.
    pub(crate) async fn bump_proposal_number(&self, seq: u64, hint: i64) {
        let stride = self.n_peers as i64;
        let mut map = self.next_prop_n.lock().await;
        let entry = map.entry(seq).or_insert(self.me as i64);
        if *entry <= hint {
            let k = (hint - self.me as i64) / stride + 1;
            *entry = self.me as i64 + k.max(0) * stride;
        }
    }

    pub(crate) async fn backoff(&self) {
        let jitter = {
            let mut rng = self.rng.lock().await;
            rng.gen_range(0..=self.tuning.paxos_backoff_jitter_ms)
        };
        tokio::time::sleep(Duration::from_millis(self.tuning.paxos_backoff_base_ms + jitter)).await;
    }

    pub(crate) async fn local_done(&self) -> i64 {
        self.peers_done.lock().await[self.me as usize]
    }

    pub(crate) async fn merge_peer_done(&self, peer: PeerId, done: i64) {
        let mut peers_done = self.peers_done.lock().await;
        let slot = &mut peers_done[peer as usize];
        *slot = (*slot).max(done);
    }
}

#[async_trait]
impl PaxosHandler for Paxos {
    async fn handle_prepare(&self, args: PrepareArgs) -> PrepareReply {
        let mut store = self.store.lock().await;
        match store.prepare(args.seq, args.prop_num) {
            PrepareOutcome::Ok { max_accept_n, accepted_value } => PrepareReply {
                ok: true,
                max_prep_num: args.prop_num,
                max_accept_num: max_accept_n,
                accepted_value,
            },
            PrepareOutcome::Reject { max_prep_n } => {
                ::log::debug!(
                    "peer {} rejecting Prepare(seq={}, n={}) from {}: already promised {}",
                    self.me, args.seq, args.prop_num, args.proposer_id, max_prep_n
                );
                PrepareReply {
                    ok: false,
                    max_prep_num: max_prep_n,
                    max_accept_num: -1,
                    accepted_value: None,
                }
            }
        }
    }

    async fn handle_accept(&self, args: AcceptArgs) -> AcceptReply {
        let mut store = self.store.lock().await;
        match store.accept(args.seq, args.prop_num, args.value) {
            AcceptOutcome::Ok => AcceptReply {
                ok: true,
                max_prep_num: args.prop_num,
            },
            AcceptOutcome::Reject { max_prep_n } => {
                ::log::debug!(
                    "peer {} rejecting Accept(seq={}, n={}) from {}: already promised {}",
                    self.me, args.seq, args.prop_num, args.proposer_id, max_prep_n
                );
                AcceptReply {
                    ok: false,
                    max_prep_num: max_prep_n,
                }
            }
        }
    }

    async fn handle_decide(&self, args: DecideArgs) -> DecideReply {
        {
            let mut store = self.store.lock().await;
            store.decide(args.seq, args.prop_num, args.value);
        }
        let mut peers_done = self.peers_done.lock().await;
        let slot = &mut peers_done[args.proposer_id as usize];
        *slot = (*slot).max(args.done);
        DecideReply {
            done: peers_done[self.me as usize],
        }
    }
}

/// Convenience constructor for wiring a `Paxos` directly onto a loopback hub, used by the demo
/// binary and integration tests.
pub fn bootstrap_loopback(
    me: PeerId,
    n_peers: usize,
    hub: &Arc<crate::transport::local::LocalPaxosHub>,
    tuning: Tuning,
    seed: Option<u64>,
) -> Arc<Paxos> {
    let transport = Arc::new(hub.transport(me));
    let px = Paxos::new(me, n_peers, transport, tuning, seed);
    hub.register(me, px.clone());
    px
}
