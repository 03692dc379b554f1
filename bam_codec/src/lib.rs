//! Reading and writing SAM text and BAM binary alignments.
//!
//! This crate holds the record model shared by the whole workspace, the strict
//! SAM text reader and writer, the BAM record codec with its BGZF framing, a
//! parallel BAM reader, and the coordinate sorter.
pub mod bgzf;
mod block;
pub mod error;
pub mod gz;
pub mod header;
pub mod reorder;

pub mod record {
    /// The alignment record and its builder.
    pub mod alignment;
    /// CIGAR operations.
    pub mod cigar;
    /// Optional fields (tags) and their typed values.
    pub mod data;
    /// Bitwise flag set.
    pub mod flags;
    /// 4-bit sequence packing used by BAM.
    pub mod sequence;
}

pub mod sam {
    // Text reader with line-numbered errors.
    pub mod reader;
    pub mod writer;
}

pub mod bam {
    /// Binary layout of a single BAM record.
    pub mod codec;
    // Prefetches and inflates BGZF blocks on a thread pool.
    mod readahead;
    pub mod reader;
}

// Module responsible for sorting.
pub mod sorting {
    pub mod keys;
    pub mod sort;
}

use block::Block;
pub use error::{Error, Result};
pub use header::{Header, ReferenceSequence};
pub use record::alignment::{Record, RecordBuilder};
use std::mem;

pub(crate) const U32_SIZE: usize = mem::size_of::<u32>();
pub const MAGIC_NUMBER: &[u8] = b"BAM\x01";

/// Reference index and position of a record that is not placed on any
/// reference sequence.
pub const UNMAPPED: i32 = -1;
