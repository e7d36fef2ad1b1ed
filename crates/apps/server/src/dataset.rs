//! The in-memory record set shared by all handlers.

use std::sync::Arc;

use parking_lot::RwLock;
use provenance::Record;

/// One immutable generation of the record set.
#[derive(Debug)]
pub struct Dataset {
    /// Bumped every time the content changes; part of every cache key.
    pub version: u64,
    /// blake3 over the canonical JSON encoding of `records`.
    pub content_hash: String,
    pub records: Arc<Vec<Record>>,
}

impl Dataset {
    fn new(version: u64, records: Vec<Record>) -> Self {
        Self {
            version,
            content_hash: fingerprint(&records),
            records: Arc::new(records),
        }
    }
}

fn fingerprint(records: &[Record]) -> String {
    let mut hasher = blake3::Hasher::new();
    for r in records {
        // Plain records always serialise.
        hasher.update(&serde_json::to_vec(r).unwrap_or_default());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Same content as before; version kept so cached responses stay valid.
    Unchanged { version: u64 },
    Replaced { previous: u64, version: u64 },
}

/// Readers grab an `Arc<Dataset>` snapshot and never block a reload for
/// longer than a pointer swap.
#[derive(Debug)]
pub struct DatasetStore {
    current: RwLock<Arc<Dataset>>,
}

impl DatasetStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Dataset::new(1, records))),
        }
    }

    pub fn snapshot(&self) -> Arc<Dataset> {
        self.current.read().clone()
    }

    pub fn replace(&self, records: Vec<Record>) -> ReplaceOutcome {
        let hash = fingerprint(&records);
        let mut current = self.current.write();
        if current.content_hash == hash {
            return ReplaceOutcome::Unchanged {
                version: current.version,
            };
        }

        let previous = current.version;
        let next = Dataset {
            version: previous + 1,
            content_hash: hash,
            records: Arc::new(records),
        };
        *current = Arc::new(next);
        ReplaceOutcome::Replaced {
            previous,
            version: previous + 1,
        }
    }
}
