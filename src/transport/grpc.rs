//! gRPC-backed transport, built on `tonic`/`prost` generated clients and servers, mirroring the
//! way the teacher wires `tonic::transport::Channel` clients directly into its `Raft` struct.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint, Server};

use crate::error::Result;
use crate::paxos::rpc::{AcceptArgs, AcceptReply, DecideArgs, DecideReply, PrepareArgs, PrepareReply};
use crate::proto::paxos::paxos_service_client::PaxosServiceClient;
use crate::proto::paxos::paxos_service_server::{PaxosService, PaxosServiceServer};
use crate::proto::raft::raft_service_client::RaftServiceClient;
use crate::proto::raft::raft_service_server::{RaftService, RaftServiceServer};
use crate::raft::log::LogEntry;
use crate::raft::rpc::{AppendEntriesArgs, AppendEntriesReply, RequestVoteArgs, RequestVoteReply};
use crate::transport::local::{PaxosHandler, RaftHandler};
use crate::transport::{PaxosTransport, RaftTransport};
use crate::PeerId;

/// Connects to every peer address up front with a fixed per-call timeout. Spec §6.1: "may block
/// up to an internal timeout" — that timeout lives here, not in the engine.
pub struct GrpcRaftTransport {
    clients: Vec<RaftServiceClient<Channel>>,
}

impl GrpcRaftTransport {
    pub async fn connect(addrs: &[String], rpc_timeout: Duration) -> Result<Self> {
        let mut clients = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let endpoint = Endpoint::from_shared(addr.clone())?.timeout(rpc_timeout);
            clients.push(RaftServiceClient::new(endpoint.connect_lazy()));
        }
        Ok(Self { clients })
    }
}

#[async_trait]
impl RaftTransport for GrpcRaftTransport {
    async fn request_vote(&self, peer: PeerId, args: RequestVoteArgs) -> Option<RequestVoteReply> {
        let mut client = self.clients[peer as usize].clone();
        let req = crate::proto::raft::RequestVoteArgs {
            term: args.term,
            candidate_id: args.candidate_id,
            last_log_index: args.last_log_index,
            last_log_term: args.last_log_term,
        };
        let reply = client.request_vote(req).await.ok()?.into_inner();
        Some(RequestVoteReply {
            term: reply.term,
            vote_granted: reply.vote_granted,
        })
    }

    async fn append_entries(&self, peer: PeerId, args: AppendEntriesArgs) -> Option<AppendEntriesReply> {
        let mut client = self.clients[peer as usize].clone();
        let req = crate::proto::raft::AppendEntriesArgs {
            term: args.term,
            leader_id: args.leader_id,
            prev_log_index: args.prev_log_index,
            prev_log_term: args.prev_log_term,
            entries: args
                .entries
                .iter()
                .map(|e| crate::proto::raft::LogEntryProto {
                    term: e.term,
                    command: e.command.clone(),
                })
                .collect(),
            leader_commit: args.leader_commit,
        };
        let reply = client.append_entries(req).await.ok()?.into_inner();
        Some(AppendEntriesReply {
            term: reply.term,
            success: reply.success,
            match_index: reply.match_index,
        })
    }
}

pub struct GrpcPaxosTransport {
    clients: Vec<PaxosServiceClient<Channel>>,
}

impl GrpcPaxosTransport {
    pub async fn connect(addrs: &[String], rpc_timeout: Duration) -> Result<Self> {
        let mut clients = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let endpoint = Endpoint::from_shared(addr.clone())?.timeout(rpc_timeout);
            clients.push(PaxosServiceClient::new(endpoint.connect_lazy()));
        }
        Ok(Self { clients })
    }
}

#[async_trait]
impl PaxosTransport for GrpcPaxosTransport {
    async fn prepare(&self, peer: PeerId, args: PrepareArgs) -> Option<PrepareReply> {
        let mut client = self.clients[peer as usize].clone();
        let req = crate::proto::paxos::PrepareArgs {
            proposer_id: args.proposer_id,
            seq: args.seq,
            prop_num: args.prop_num,
        };
        let reply = client.prepare(req).await.ok()?.into_inner();
        Some(PrepareReply {
            ok: reply.ok,
            max_prep_num: reply.max_prep_num,
            max_accept_num: reply.max_accept_num,
            accepted_value: reply.has_accepted_value.then_some(reply.accepted_value),
        })
    }

    async fn accept(&self, peer: PeerId, args: AcceptArgs) -> Option<AcceptReply> {
        let mut client = self.clients[peer as usize].clone();
        let req = crate::proto::paxos::AcceptArgs {
            proposer_id: args.proposer_id,
            seq: args.seq,
            prop_num: args.prop_num,
            value: args.value,
        };
        let reply = client.accept(req).await.ok()?.into_inner();
        Some(AcceptReply {
            ok: reply.ok,
            max_prep_num: reply.max_prep_num,
        })
    }

    async fn decide(&self, peer: PeerId, args: DecideArgs) -> Option<DecideReply> {
        let mut client = self.clients[peer as usize].clone();
        let req = crate::proto::paxos::DecideArgs {
            proposer_id: args.proposer_id,
            seq: args.seq,
            prop_num: args.prop_num,
            value: args.value,
            done: args.done,
        };
        let reply = client.decide(req).await.ok()?.into_inner();
        Some(DecideReply { done: reply.done })
    }
}

/// Wraps a `Raft` peer so it can be mounted onto a `tonic::transport::Server`, translating
/// generated protobuf types back to the engine's own arg/reply types (the mirror image of
/// `GrpcRaftTransport`).
pub struct RaftGrpcServer {
    raft: Arc<dyn RaftHandler>,
}

impl RaftGrpcServer {
    pub fn new(raft: Arc<dyn RaftHandler>) -> Self {
        Self { raft }
    }
}

#[tonic::async_trait]
impl RaftService for RaftGrpcServer {
    async fn request_vote(
        &self,
        request: tonic::Request<crate::proto::raft::RequestVoteArgs>,
    ) -> std::result::Result<tonic::Response<crate::proto::raft::RequestVoteReply>, tonic::Status> {
        let args = request.into_inner();
        let reply = self
            .raft
            .handle_request_vote(RequestVoteArgs {
                term: args.term,
                candidate_id: args.candidate_id,
                last_log_index: args.last_log_index,
                last_log_term: args.last_log_term,
            })
            .await;
        Ok(tonic::Response::new(crate::proto::raft::RequestVoteReply {
            term: reply.term,
            vote_granted: reply.vote_granted,
        }))
    }

    async fn append_entries(
        &self,
        request: tonic::Request<crate::proto::raft::AppendEntriesArgs>,
    ) -> std::result::Result<tonic::Response<crate::proto::raft::AppendEntriesReply>, tonic::Status> {
        let args = request.into_inner();
        let reply = self
            .raft
            .handle_append_entries(AppendEntriesArgs {
                term: args.term,
                leader_id: args.leader_id,
                prev_log_index: args.prev_log_index,
                prev_log_term: args.prev_log_term,
                entries: args
                    .entries
                    .into_iter()
                    .map(|e| LogEntry { term: e.term, command: e.command })
                    .collect(),
                leader_commit: args.leader_commit,
            })
            .await;
        Ok(tonic::Response::new(crate::proto::raft::AppendEntriesReply {
            term: reply.term,
            success: reply.success,
            match_index: reply.match_index,
        }))
    }
}

/// Boots a `Raft` peer's gRPC server and blocks until it shuts down. Spec §1.1: the gRPC
/// transport is meant to be usable in a real multi-process deployment, not just client-side.
pub async fn serve_raft(raft: Arc<dyn RaftHandler>, addr: SocketAddr) -> Result<()> {
    Server::builder()
        .add_service(RaftServiceServer::new(RaftGrpcServer::new(raft)))
        .serve(addr)
        .await?;
    Ok(())
}

/// Wraps a `Paxos` peer for the same reason `RaftGrpcServer` wraps a `Raft` peer.
pub struct PaxosGrpcServer {
    paxos: Arc<dyn PaxosHandler>,
}

impl PaxosGrpcServer {
    pub fn new(paxos: Arc<dyn PaxosHandler>) -> Self {
        Self { paxos }
    }
}

#[tonic::async_trait]
impl PaxosService for PaxosGrpcServer {
    async fn prepare(
        &self,
        request: tonic::Request<crate::proto::paxos::PrepareArgs>,
    ) -> std::result::Result<tonic::Response<crate::proto::paxos::PrepareReply>, tonic::Status> {
        let args = request.into_inner();
        let reply = self
            .paxos
            .handle_prepare(PrepareArgs {
                proposer_id: args.proposer_id,
                seq: args.seq,
                prop_num: args.prop_num,
            })
            .await;
        Ok(tonic::Response::new(crate::proto::paxos::PrepareReply {
            ok: reply.ok,
            max_prep_num: reply.max_prep_num,
            max_accept_num: reply.max_accept_num,
            has_accepted_value: reply.accepted_value.is_some(),
            accepted_value: reply.accepted_value.unwrap_or_default(),
        }))
    }

    async fn accept(
        &self,
        request: tonic::Request<crate::proto::paxos::AcceptArgs>,
    ) -> std::result::Result<tonic::Response<crate::proto::paxos::AcceptReply>, tonic::Status> {
        let args = request.into_inner();
        let reply = self
            .paxos
            .handle_accept(AcceptArgs {
                proposer_id: args.proposer_id,
                seq: args.seq,
                prop_num: args.prop_num,
                value: args.value,
            })
            .await;
        Ok(tonic::Response::new(crate::proto::paxos::AcceptReply {
            ok: reply.ok,
            max_prep_num: reply.max_prep_num,
        }))
    }

    async fn decide(
        &self,
        request: tonic::Request<crate::proto::paxos::DecideArgs>,
    ) -> std::result::Result<tonic::Response<crate::proto::paxos::DecideReply>, tonic::Status> {
        let args = request.into_inner();
        let reply = self
            .paxos
            .handle_decide(DecideArgs {
                proposer_id: args.proposer_id,
                seq: args.seq,
                prop_num: args.prop_num,
                value: args.value,
                done: args.done,
            })
            .await;
        Ok(tonic::Response::new(crate::proto::paxos::DecideReply { done: reply.done }))
    }
}

/// Boots a `Paxos` peer's gRPC server and blocks until it shuts down.
pub async fn serve_paxos(paxos: Arc<dyn PaxosHandler>, addr: SocketAddr) -> Result<()> {
    Server::builder()
        .add_service(PaxosServiceServer::new(PaxosGrpcServer::new(paxos)))
        .serve(addr)
        .await?;
    Ok(())
}
