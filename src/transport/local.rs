//! In-process loopback transport (spec §1.1, §8): no sockets, direct `async` calls into a
//! registered peer's handler, with `partition`/`heal`/`drop_peer` controls so integration tests
//! can deterministically reproduce the "Concrete scenarios" in spec §8.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::paxos::rpc::{AcceptArgs, AcceptReply, DecideArgs, DecideReply, PrepareArgs, PrepareReply};
use crate::raft::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::transport::{PaxosTransport, RaftTransport};
use crate::PeerId;

/// What a peer's Raft engine exposes to the loopback transport so it can be dispatched to
/// directly, without going through protobuf at all.
#[async_trait]
pub trait RaftHandler: Send + Sync {
    async fn handle_request_vote(&self, args: RequestVoteArgs) -> RequestVoteReply;
    async fn handle_append_entries(&self, args: AppendEntriesArgs) -> AppendEntriesReply;
}

#[async_trait]
pub trait PaxosHandler: Send + Sync {
    async fn handle_prepare(&self, args: PrepareArgs) -> PrepareReply;
    async fn handle_accept(&self, args: AcceptArgs) -> AcceptReply;
    async fn handle_decide(&self, args: DecideArgs) -> DecideReply;
}

/// Tracks which directed links are cut. `partition(a, b)` cuts both directions; `drop_peer(id)`
/// cuts every link touching `id`, modeling a crashed process rather than a network split.
#[derive(Default)]
struct Links {
    cut: HashSet<(PeerId, PeerId)>,
    dead: HashSet<PeerId>,
}

impl Links {
    fn reachable(&self, from: PeerId, to: PeerId) -> bool {
        !self.dead.contains(&from)
            && !self.dead.contains(&to)
            && !self.cut.contains(&(from, to))
    }
}

/// The shared hub a cluster of loopback peers register with. One hub per test cluster.
pub struct LocalRaftHub {
    nodes: Mutex<Vec<Option<Arc<dyn RaftHandler>>>>,
    links: Mutex<Links>,
}

impl LocalRaftHub {
    pub fn new(n_peers: usize) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(vec![None; n_peers]),
            links: Mutex::new(Links::default()),
        })
    }

    pub fn register(&self, id: PeerId, handler: Arc<dyn RaftHandler>) {
        self.nodes.lock()[id as usize] = Some(handler);
    }

    pub fn partition(&self, a: PeerId, b: PeerId) {
        let mut links = self.links.lock();
        links.cut.insert((a, b));
        links.cut.insert((b, a));
    }

    pub fn heal(&self, a: PeerId, b: PeerId) {
        let mut links = self.links.lock();
        links.cut.remove(&(a, b));
        links.cut.remove(&(b, a));
    }

    pub fn drop_peer(&self, id: PeerId) {
        self.links.lock().dead.insert(id);
    }

    pub fn revive_peer(&self, id: PeerId) {
        self.links.lock().dead.remove(&id);
    }

    /// A transport handle for peer `me`, bound to this hub.
    pub fn transport(self: &Arc<Self>, me: PeerId) -> LocalRaftTransport {
        LocalRaftTransport { hub: self.clone(), me }
    }

    fn handler_if_reachable(&self, from: PeerId, to: PeerId) -> Option<Arc<dyn RaftHandler>> {
        let links = self.links.lock();
        if !links.reachable(from, to) {
            return None;
        }
        self.nodes.lock()[to as usize].clone()
    }
}

#[derive(Clone)]
pub struct LocalRaftTransport {
    hub: Arc<LocalRaftHub>,
    me: PeerId,
}

#[async_trait]
impl RaftTransport for LocalRaftTransport {
    async fn request_vote(&self, peer: PeerId, args: RequestVoteArgs) -> Option<RequestVoteReply> {
        let handler = self.hub.handler_if_reachable(self.me, peer)?;
        Some(handler.handle_request_vote(args).await)
    }

    async fn append_entries(&self, peer: PeerId, args: AppendEntriesArgs) -> Option<AppendEntriesReply> {
        let handler = self.hub.handler_if_reachable(self.me, peer)?;
        Some(handler.handle_append_entries(args).await)
    }
}

/// Same shape as `LocalRaftHub`, for the Paxos engine. Kept as a separate type (rather than a
/// generic one) because the handler traits differ and a cluster typically only runs one engine
/// at a time.
pub struct LocalPaxosHub {
    nodes: Mutex<Vec<Option<Arc<dyn PaxosHandler>>>>,
    links: Mutex<Links>,
}

impl LocalPaxosHub {
    pub fn new(n_peers: usize) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(vec![None; n_peers]),
            links: Mutex::new(Links::default()),
        })
    }

    pub fn register(&self, id: PeerId, handler: Arc<dyn PaxosHandler>) {
        self.nodes.lock()[id as usize] = Some(handler);
    }

    pub fn partition(&self, a: PeerId, b: PeerId) {
        let mut links = self.links.lock();
        links.cut.insert((a, b));
        links.cut.insert((b, a));
    }

    pub fn heal(&self, a: PeerId, b: PeerId) {
        let mut links = self.links.lock();
        links.cut.remove(&(a, b));
        links.cut.remove(&(b, a));
    }

    pub fn drop_peer(&self, id: PeerId) {
        self.links.lock().dead.insert(id);
    }

    pub fn revive_peer(&self, id: PeerId) {
        self.links.lock().dead.remove(&id);
    }

    pub fn transport(self: &Arc<Self>, me: PeerId) -> LocalPaxosTransport {
        LocalPaxosTransport { hub: self.clone(), me }
    }

    fn handler_if_reachable(&self, from: PeerId, to: PeerId) -> Option<Arc<dyn PaxosHandler>> {
        let links = self.links.lock();
        if !links.reachable(from, to) {
            return None;
        }
        self.nodes.lock()[to as usize].clone()
    }
}

#[derive(Clone)]
pub struct LocalPaxosTransport {
    hub: Arc<LocalPaxosHub>,
    me: PeerId,
}

#[async_trait]
impl PaxosTransport for LocalPaxosTransport {
    async fn prepare(&self, peer: PeerId, args: PrepareArgs) -> Option<PrepareReply> {
        let handler = self.hub.handler_if_reachable(self.me, peer)?;
        Some(handler.handle_prepare(args).await)
    }

    async fn accept(&self, peer: PeerId, args: AcceptArgs) -> Option<AcceptReply> {
        let handler = self.hub.handler_if_reachable(self.me, peer)?;
        Some(handler.handle_accept(args).await)
    }

    async fn decide(&self, peer: PeerId, args: DecideArgs) -> Option<DecideReply> {
        let handler = self.hub.handler_if_reachable(self.me, peer)?;
        Some(handler.handle_decide(args).await)
    }
}
