//! Splits a ledger into batches.
use crate::ledger::AccountEntry;
use itertools::Itertools;

/// A contiguous slice of the ledger handled as one unit by the executor.
#[derive(Debug)]
pub struct Batch {
    /// Position of the batch in the plan.
    pub index: usize,
    /// Entries of the batch, in ledger order.
    pub entries: Vec<AccountEntry>,
}

impl Batch {
    /// Number of entries in the batch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Partitions `entries` into ordered chunks of at most `max_per_batch` entries.
///
/// A limit of zero is treated as one.
pub fn plan(entries: Vec<AccountEntry>, max_per_batch: usize) -> Vec<Batch> {
    let chunks = entries.into_iter().chunks(max_per_batch.max(1));
    let batches = chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| Batch { index, entries: chunk.collect() })
        .collect();
    batches
}
