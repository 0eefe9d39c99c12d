//! Generated protobuf/gRPC bindings. The engines never touch this module directly; only
//! `crate::transport::grpc` speaks it, translating to and from the engines' own arg/reply types.

pub mod raft {
    tonic::include_proto!("raftpax.raft");
}

pub mod paxos {
    tonic::include_proto!("raftpax.paxos");
}
