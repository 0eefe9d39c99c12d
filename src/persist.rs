//! Durable-storage seam for Raft's persistent state, matching the original lab's `Persister`
//! parameter to `Make()` and the teacher's `fn persist(&mut self)` / `fn restore(&mut self, data:
//! &[u8])` stubs — except here the save/restore target is pluggable instead of a TODO.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::Result;

/// Saves and loads the bytes of `(currentTerm, votedFor, log)`, bincode-encoded by the caller.
/// Object-safe so a `Raft` can hold a `Box<dyn Persister>` without a generic parameter.
pub trait Persister: Send + Sync {
    fn save_raft_state(&self, data: Vec<u8>);
    fn raft_state(&self) -> Vec<u8>;
}

/// An in-memory `Persister`, the default for tests and the loopback demo — state does not
/// actually survive a process restart, only repeated `save`/`load` calls within one run.
#[derive(Default)]
pub struct MemoryPersister {
    state: Mutex<Vec<u8>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persister for MemoryPersister {
    fn save_raft_state(&self, data: Vec<u8>) {
        *self.state.lock() = data;
    }

    fn raft_state(&self) -> Vec<u8> {
        self.state.lock().clone()
    }
}

/// A file-backed `Persister` for the demo binary: `save_raft_state` overwrites the file
/// wholesale (no append log, no fsync — this is a teaching tool, not a WAL).
pub struct FilePersister {
    path: PathBuf,
}

impl FilePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let p = Self::new(path);
        if !p.path.exists() {
            std::fs::write(&p.path, [])?;
        }
        Ok(p)
    }
}

impl Persister for FilePersister {
    fn save_raft_state(&self, data: Vec<u8>) {
        // Best-effort: a real implementation would report the error upward, but persist() is
        // called from contexts that don't propagate Result (see DESIGN.md).
        let _ = std::fs::write(&self.path, data);
    }

    fn raft_state(&self) -> Vec<u8> {
        std::fs::read(&self.path).unwrap_or_default()
    }
}
