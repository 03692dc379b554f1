use crate::Record;

/// Coordinate sort key: reference index, then 0-based position.
///
/// The reference index is compared unsigned, so unmapped records (`-1`) sort
/// after every reference sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    reference_id: u32,
    position: i32,
}

impl SortKey {
    pub fn new(reference_id: i32, position: i32) -> Self {
        SortKey { reference_id: reference_id as u32, position }
    }

    pub fn of(record: &Record) -> Self {
        SortKey::new(record.reference_id(), record.position())
    }
}
