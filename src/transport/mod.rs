//! The `Call(peer, method, args, reply) -> bool` contract from spec §6.1, expressed as two
//! async traits — one per engine — with a `None` reply standing in for `false`.

pub mod grpc;
pub mod local;

use async_trait::async_trait;

use crate::raft::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::paxos::rpc::{AcceptArgs, AcceptReply, DecideArgs, DecideReply, PrepareArgs, PrepareReply};
use crate::PeerId;

/// At-most-once delivery to a named peer, reply valid only on `Some`. Implementations own their
/// own timeout; callers never race it with one of their own (spec §6.1).
#[async_trait]
pub trait RaftTransport: Send + Sync {
    async fn request_vote(&self, peer: PeerId, args: RequestVoteArgs) -> Option<RequestVoteReply>;
    async fn append_entries(&self, peer: PeerId, args: AppendEntriesArgs) -> Option<AppendEntriesReply>;
}

#[async_trait]
pub trait PaxosTransport: Send + Sync {
    async fn prepare(&self, peer: PeerId, args: PrepareArgs) -> Option<PrepareReply>;
    async fn accept(&self, peer: PeerId, args: AcceptArgs) -> Option<AcceptReply>;
    async fn decide(&self, peer: PeerId, args: DecideArgs) -> Option<DecideReply>;
}
