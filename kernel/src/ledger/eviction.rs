// Eviction Policy
//
// Bounds the number of retained nightly builds. Pure: the caller is
// responsible for deleting the evicted directories after the trimmed
// ledger has been persisted.

use super::{Ledger, VersionRecord};

/// Trim `ledger` to at most `limit` records, dropping from the oldest end.
///
/// A limit below one is treated as one so an insert never evicts
/// everything.
pub fn evict(ledger: Ledger, limit: usize) -> (Ledger, Vec<VersionRecord>) {
    let limit = limit.max(1);
    let mut records = ledger.into_records();

    if records.len() <= limit {
        return (Ledger::from_records(records), Vec::new());
    }

    records.sort_by(super::recency_order);
    let evicted = records.split_off(limit);
    (Ledger::from_records(records), evicted)
}
