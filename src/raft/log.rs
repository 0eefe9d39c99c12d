use serde_derive::{Deserialize, Serialize};

/// A single entry in a Raft log, indexed from 1. `command` is an opaque payload — the engine
/// never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub command: Vec<u8>,
}

/// The replicated log. Index 0 is always the sentinel `{term: 0, command: []}` described in
/// spec §3 ("Index 0 is a sentinel with term 0 used to simplify consistency checks at the log
/// head"); real entries occupy indices `1..=last_index()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Self {
            entries: vec![LogEntry { term: 0, command: Vec::new() }],
        }
    }

    /// The index of the last entry (0 if the log holds only the sentinel).
    pub fn last_index(&self) -> u64 {
        (self.entries.len() - 1) as u64
    }

    /// The term of the entry at `index`. `index` must be `<= last_index()`.
    pub fn term_at(&self, index: u64) -> u64 {
        self.entries[index as usize].term
    }

    pub fn last_term(&self) -> u64 {
        self.term_at(self.last_index())
    }

    /// True iff `index` names an entry that actually exists (including the sentinel at 0).
    pub fn has_index(&self, index: u64) -> bool {
        index <= self.last_index()
    }

    pub fn entry_at(&self, index: u64) -> &LogEntry {
        &self.entries[index as usize]
    }

    /// Appends a locally-originated entry (leader `Start`). Returns its new index.
    pub fn append(&mut self, term: u64, command: Vec<u8>) -> u64 {
        self.entries.push(LogEntry { term, command });
        self.last_index()
    }

    /// Returns every entry strictly after `index`, for replication to a follower whose
    /// `next_index` is `index + 1`.
    pub fn entries_after(&self, index: u64) -> Vec<LogEntry> {
        self.entries[(index as usize + 1)..].to_vec()
    }

    /// Implements the AppendEntries consistency/merge rule from spec §4.4 step 5: for each
    /// incoming entry at `prev_log_index + 1 + k`, if the slot is empty or holds a different
    /// term, truncate the suffix from there and append the remaining incoming entries;
    /// otherwise leave the existing (matching) entry untouched. Returns the resulting
    /// match index, `prev_log_index + entries.len()`.
    pub fn merge(&mut self, prev_log_index: u64, entries: &[LogEntry]) -> u64 {
        for (k, entry) in entries.iter().enumerate() {
            let index = prev_log_index + 1 + k as u64;
            let conflict = !self.has_index(index) || self.term_at(index) != entry.term;
            if conflict {
                self.entries.truncate(index as usize);
                self.entries.extend_from_slice(&entries[k..]);
                break;
            }
        }
        prev_log_index + entries.len() as u64
    }
}

impl Default for Log {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_term_zero() {
        let log = Log::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
    }

    #[test]
    fn append_advances_last_index() {
        let mut log = Log::new();
        let idx = log.append(1, b"x".to_vec());
        assert_eq!(idx, 1);
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.term_at(1), 1);
    }

    #[test]
    fn merge_preserves_matching_uncommitted_entries() {
        let mut log = Log::new();
        log.append(1, b"a".to_vec());
        log.append(1, b"b".to_vec());
        // Leader resends the same two entries: no truncation should occur.
        let entries = vec![
            LogEntry { term: 1, command: b"a".to_vec() },
            LogEntry { term: 1, command: b"b".to_vec() },
        ];
        let match_index = log.merge(0, &entries);
        assert_eq!(match_index, 2);
        assert_eq!(log.entry_at(1).command, b"a");
        assert_eq!(log.entry_at(2).command, b"b");
    }

    #[test]
    fn merge_truncates_on_conflict() {
        let mut log = Log::new();
        log.append(1, b"a".to_vec());
        log.append(1, b"stale".to_vec());
        let entries = vec![LogEntry { term: 2, command: b"fresh".to_vec() }];
        let match_index = log.merge(1, &entries);
        assert_eq!(match_index, 2);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.entry_at(2).command, b"fresh");
        assert_eq!(log.entry_at(2).term, 2);
    }
}
