use crate::PeerId;

/// Args for Prepare, spec §4.6/§4.7 phase 1. `prop_num` is signed: the instance store uses -1 to
/// mean "no proposal promised/accepted yet".
#[derive(Debug, Clone)]
pub struct PrepareArgs {
    pub proposer_id: PeerId,
    pub seq: u64,
    pub prop_num: i64,
}

#[derive(Debug, Clone)]
pub struct PrepareReply {
    pub ok: bool,
    /// The acceptor's `maxPrepN`. On reject, this is the hint the proposer uses to pick a
    /// larger proposal number; on OK, it equals the just-promised `prop_num`.
    pub max_prep_num: i64,
    pub max_accept_num: i64,
    pub accepted_value: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct AcceptArgs {
    pub proposer_id: PeerId,
    pub seq: u64,
    pub prop_num: i64,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AcceptReply {
    pub ok: bool,
    pub max_prep_num: i64,
}

#[derive(Debug, Clone)]
pub struct DecideArgs {
    pub proposer_id: PeerId,
    pub seq: u64,
    pub prop_num: i64,
    pub value: Vec<u8>,
    /// Piggybacked `peersDone[proposer_id]`, spec §4.7 step 3.
    pub done: i64,
}

#[derive(Debug, Clone)]
pub struct DecideReply {
    /// The receiver's own `peersDone[receiver]`, merged back by the proposer.
    pub done: i64,
}
