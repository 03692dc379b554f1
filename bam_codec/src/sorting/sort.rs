use super::keys::SortKey;
use crate::Record;
use rayon::prelude::*;

/// Sorts records by coordinate in parallel. The sort is stable: records with
/// equal keys, unmapped ones included, keep their input order.
pub fn sort_records(records: &mut [Record]) {
    records.par_sort_by_key(SortKey::of);
}

/// Same as [`sort_records`], on a dedicated pool of `thread_num` workers.
pub fn sort_records_with_threads(records: &mut [Record], thread_num: usize) {
    match rayon::ThreadPoolBuilder::new().num_threads(thread_num.max(1)).build() {
        Ok(pool) => pool.install(|| sort_records(records)),
        // Fall back to the global pool.
        Err(_) => sort_records(records),
    }
}

pub fn is_sorted(records: &[Record]) -> bool {
    records.windows(2).all(|w| SortKey::of(&w[0]) <= SortKey::of(&w[1]))
}
