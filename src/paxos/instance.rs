use std::collections::HashMap;

/// Per-sequence-number acceptor record, spec §3/§4.6. Defaults model "untouched": no prepare or
/// accept has ever been seen for this `seq`.
#[derive(Clone, Debug)]
pub struct Instance {
    pub max_prep_n: i64,
    pub max_accept_n: i64,
    pub accepted_value: Option<Vec<u8>>,
    pub decided: bool,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            max_prep_n: -1,
            max_accept_n: -1,
            accepted_value: None,
            decided: false,
        }
    }
}

pub enum PrepareOutcome {
    Ok {
        max_accept_n: i64,
        accepted_value: Option<Vec<u8>>,
    },
    Reject {
        max_prep_n: i64,
    },
}

pub enum AcceptOutcome {
    Ok,
    Reject { max_prep_n: i64 },
}

/// The Synod acceptor state for every sequence number this peer has touched, spec §4.6. Atomic
/// per `seq` because every caller holds the enclosing `Paxos::store` mutex for the duration of
/// the call (see `Paxos` in mod.rs) — this type has no locking of its own.
#[derive(Default)]
pub struct InstanceStore {
    instances: HashMap<u64, Instance>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_seq(&self) -> Option<u64> {
        self.instances.keys().copied().max()
    }

    pub fn prepare(&mut self, seq: u64, n: i64) -> PrepareOutcome {
        let inst = self.instances.entry(seq).or_default();
        if n > inst.max_prep_n {
            inst.max_prep_n = n;
            PrepareOutcome::Ok {
                max_accept_n: inst.max_accept_n,
                accepted_value: inst.accepted_value.clone(),
            }
        } else {
            PrepareOutcome::Reject {
                max_prep_n: inst.max_prep_n,
            }
        }
    }

    pub fn accept(&mut self, seq: u64, n: i64, v: Vec<u8>) -> AcceptOutcome {
        let inst = self.instances.entry(seq).or_default();
        if n >= inst.max_prep_n {
            inst.max_prep_n = n;
            inst.max_accept_n = n;
            inst.accepted_value = Some(v);
            AcceptOutcome::Ok
        } else {
            AcceptOutcome::Reject {
                max_prep_n: inst.max_prep_n,
            }
        }
    }

    pub fn decide(&mut self, seq: u64, n: i64, v: Vec<u8>) {
        let inst = self.instances.entry(seq).or_default();
        inst.accepted_value = Some(v);
        inst.max_accept_n = n;
        inst.max_prep_n = inst.max_prep_n.max(n);
        inst.decided = true;
    }

    pub fn status(&self, seq: u64) -> Option<(bool, Option<Vec<u8>>)> {
        self.instances.get(&seq).map(|i| (i.decided, i.accepted_value.clone()))
    }

    /// Spec §4.8 GC: discards every instance at or below `min_done`. A negative `min_done`
    /// (nothing ever declared done) reclaims nothing.
    pub fn forget_through(&mut self, min_done: i64) {
        if min_done < 0 {
            return;
        }
        let min_done = min_done as u64;
        self.instances.retain(|&seq, _| seq > min_done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_rejects_non_increasing_proposal_numbers() {
        let mut store = InstanceStore::new();
        assert!(matches!(store.prepare(1, 5), PrepareOutcome::Ok { .. }));
        assert!(matches!(store.prepare(1, 3), PrepareOutcome::Reject { max_prep_n: 5 }));
        assert!(matches!(store.prepare(1, 5), PrepareOutcome::Reject { max_prep_n: 5 }));
    }

    #[test]
    fn accept_then_decide_round_trips_value() {
        let mut store = InstanceStore::new();
        store.prepare(1, 5);
        assert!(matches!(store.accept(1, 5, b"v".to_vec()), AcceptOutcome::Ok));
        store.decide(1, 5, b"v".to_vec());
        assert_eq!(store.status(1), Some((true, Some(b"v".to_vec()))));
    }

    #[test]
    fn forget_through_reclaims_only_at_or_below_watermark() {
        let mut store = InstanceStore::new();
        store.decide(1, 0, b"a".to_vec());
        store.decide(2, 0, b"b".to_vec());
        store.forget_through(1);
        assert_eq!(store.status(1), None);
        assert_eq!(store.status(2), Some((true, Some(b"b".to_vec()))));
    }
}
