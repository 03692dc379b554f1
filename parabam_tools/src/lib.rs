//! Parallel SAM to BAM transcoding with a benchmark harness.
//!
//! The [`writer::Writer`] compresses BGZF blocks on a worker pool and writes
//! them back in order, so its output does not depend on the thread count.
//! [`bench`] times the conversion over a sweep of thread counts and
//! [`verify`] proves two BAM files hold the same records.
pub mod bench;
mod compressor;
pub mod convert;
pub mod pipeline;
pub mod verify;
pub mod writer;

pub use bench::{BenchmarkConfig, Sample, ThreadSummary, TimingTable};
pub use pipeline::{run_pipeline, PipelineReport};
pub use verify::{digest_file, files_match, verify_bams, Verification};
pub use writer::{Writer, WriterOptions};
