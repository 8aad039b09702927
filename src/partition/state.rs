//! In-memory state owned by one partition actor.
//!
//! Dirty tracking uses two sequence numbers instead of a flag:
//!
//! ```text
//! mutation_seq   incremented by every successful add
//! persisted_seq  highest mutation_seq known to be in the durable store
//! dirty        = mutation_seq > persisted_seq
//! ```
//!
//! A checkpoint snapshots `(emails, mutation_seq)`, writes the snapshot
//! without holding the actor lock, and then marks that sequence persisted.
//! Adds that land while the write is in flight bump `mutation_seq` past the
//! snapshot, so the state correctly stays dirty.

use std::collections::HashSet;

use crate::email::normalize;

/// A point-in-time copy of the state, taken for a checkpoint.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub emails: Vec<String>,
    pub seq: u64,
}

/// Known breached emails of one partition plus dirty tracking.
#[derive(Debug, Default, Clone)]
pub struct PartitionState {
    emails: HashSet<String>,
    mutation_seq: u64,
    persisted_seq: u64,
}

impl PartitionState {
    /// Empty, clean state for a partition with no durable record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean state rehydrated from the durable store.
    pub fn from_persisted(emails: impl IntoIterator<Item = String>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| normalize(&e)).collect(),
            mutation_seq: 0,
            persisted_seq: 0,
        }
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&normalize(email))
    }

    /// Insert `email`. Returns false if it was already present.
    pub fn insert(&mut self, email: &str) -> bool {
        let inserted = self.emails.insert(normalize(email));
        if inserted {
            self.mutation_seq += 1;
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.mutation_seq > self.persisted_seq
    }

    pub fn mutation_seq(&self) -> u64 {
        self.mutation_seq
    }

    /// Snapshot for a checkpoint, or `None` if nothing is pending.
    pub fn snapshot_if_dirty(&self) -> Option<StateSnapshot> {
        self.is_dirty().then(|| StateSnapshot {
            emails: self.emails.iter().cloned().collect(),
            seq: self.mutation_seq,
        })
    }

    /// Record that everything up to `seq` is durable.
    ///
    /// Out-of-order completions never move the watermark backwards.
    pub fn mark_persisted(&mut self, seq: u64) {
        self.persisted_seq = self.persisted_seq.max(seq.min(self.mutation_seq));
    }
}
