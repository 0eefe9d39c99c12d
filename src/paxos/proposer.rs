//! The proposer driver, spec §4.7: one task per `Start(seq, v)` call, looping Prepare→Accept→
//! Decide until this peer observes `seq` decided — whether by this driver's own Decide broadcast
//! or another proposer's.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures_util::StreamExt;

use crate::paxos::rpc::{AcceptArgs, AcceptReply, DecideArgs, DecideReply, PrepareArgs, PrepareReply};
use crate::transport::local::PaxosHandler;
use crate::PeerId;

use super::Paxos;

/// Dispatches to `peer`, bypassing the transport entirely when `peer == px.me()` — spec §4.7 step
/// 1 requires self-Prepare/Accept/Decide to go through "via direct call", not the lossy
/// transport, matching `paxos.go`'s `if i == px.me { px.Prepare(...) } else { call(...) }`.
async fn call_prepare(px: &Arc<Paxos>, peer: PeerId, args: PrepareArgs) -> Option<PrepareReply> {
    if peer == px.me() {
        Some(px.handle_prepare(args).await)
    } else {
        px.transport().prepare(peer, args).await
    }
}

async fn call_accept(px: &Arc<Paxos>, peer: PeerId, args: AcceptArgs) -> Option<AcceptReply> {
    if peer == px.me() {
        Some(px.handle_accept(args).await)
    } else {
        px.transport().accept(peer, args).await
    }
}

async fn call_decide(px: &Arc<Paxos>, peer: PeerId, args: DecideArgs) -> Option<DecideReply> {
    if peer == px.me() {
        Some(px.handle_decide(args).await)
    } else {
        px.transport().decide(peer, args).await
    }
}

pub async fn drive(px: Arc<Paxos>, seq: u64, value: Vec<u8>) {
    while px.is_alive() {
        if px.is_decided(seq).await {
            return;
        }

        let n = px.next_proposal_number(seq).await;
        let majority = px.n_peers() / 2 + 1;

        let prepare_args = PrepareArgs {
            proposer_id: px.me(),
            seq,
            prop_num: n,
        };
        let mut prepare_replies = Vec::new();
        let mut futures = FuturesUnordered::new();
        for peer in 0..px.n_peers() as PeerId {
            let px = px.clone();
            let args = prepare_args.clone();
            futures.push(async move { call_prepare(&px, peer, args).await });
        }
        while let Some(reply) = futures.next().await {
            if let Some(reply) = reply {
                prepare_replies.push(reply);
            }
        }

        let oks: Vec<_> = prepare_replies.iter().filter(|r| r.ok).collect();
        if oks.len() < majority {
            bump_from_rejects(&px, seq, &prepare_replies.iter().filter(|r| !r.ok).map(|r| r.max_prep_num).collect::<Vec<_>>()).await;
            px.backoff().await;
            continue;
        }

        // Spec §4.7 step 1: among OK replies that already carry an accepted value, adopt the one
        // with the highest accept number; otherwise this proposer is free to use its own value.
        let chosen_value = oks
            .iter()
            .filter(|r| r.max_accept_num >= 0)
            .max_by_key(|r| r.max_accept_num)
            .and_then(|r| r.accepted_value.clone())
            .unwrap_or_else(|| value.clone());

        let accept_args = AcceptArgs {
            proposer_id: px.me(),
            seq,
            prop_num: n,
            value: chosen_value.clone(),
        };
        let mut accept_replies = Vec::new();
        let mut futures = FuturesUnordered::new();
        for peer in 0..px.n_peers() as PeerId {
            let px = px.clone();
            let args = accept_args.clone();
            futures.push(async move { call_accept(&px, peer, args).await });
        }
        while let Some(reply) = futures.next().await {
            if let Some(reply) = reply {
                accept_replies.push(reply);
            }
        }

        let accept_oks = accept_replies.iter().filter(|r| r.ok).count();
        if accept_oks < majority {
            bump_from_rejects(&px, seq, &accept_replies.iter().filter(|r| !r.ok).map(|r| r.max_prep_num).collect::<Vec<_>>()).await;
            px.backoff().await;
            continue;
        }

        let done = px.local_done().await;
        let decide_args = DecideArgs {
            proposer_id: px.me(),
            seq,
            prop_num: n,
            value: chosen_value,
            done,
        };
        let mut futures = FuturesUnordered::new();
        for peer in 0..px.n_peers() as PeerId {
            let px = px.clone();
            let args = decide_args.clone();
            futures.push(async move { (peer, call_decide(&px, peer, args).await) });
        }
        while let Some((peer, reply)) = futures.next().await {
            if let Some(reply) = reply {
                px.merge_peer_done(peer, reply.done).await;
            }
        }
        return;
    }
}

async fn bump_from_rejects(px: &Arc<Paxos>, seq: u64, hints: &[i64]) {
    for &hint in hints {
        px.bump_proposal_number(seq, hint).await;
    }
}
