use crate::bench::{benchmark_sam_to_bam, BenchmarkConfig, TimingTable};
use crate::convert::sam_to_bam;
use crate::verify::{verify_bams, OutputPaths, Verification};
use crate::writer::WriterOptions;
use bam_codec::{Error, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Everything the end-to-end run produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub paths: OutputPaths,
    pub timings: TimingTable,
    pub verification: Verification,
}

fn write_report<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(|e| Error::file(path, e))?;
    let mut out = BufWriter::new(file);
    write(&mut out)
        .and_then(|_| out.flush())
        .map_err(|e| Error::file(path, e))
}

/// Benchmarks the transcoder on `input`, then checks that the parallel output
/// holds the same records as a sequential conversion.
///
/// 1. thread sweep, every trial overwriting `<base>_pysam.bam`
/// 2. sequential reference `<base>.bam`
/// 3. both normalised to `_sorted.bam` / header-less `_sorted.sam`
/// 4. digest comparison
/// 5. timings written to `<base>_timings.tsv` and `.json`
pub fn run_pipeline<P: AsRef<Path>>(input: P, config: &BenchmarkConfig) -> Result<PipelineReport> {
    if config.threads.is_empty() || config.rounds == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "the benchmark needs at least one round and one thread count",
        )));
    }
    let paths = OutputPaths::for_input(input);
    let timings = benchmark_sam_to_bam(&paths.input, &paths.candidate_bam, config)?;

    let sequential = WriterOptions { thread_num: 1, ..config.writer.clone() };
    sam_to_bam(&paths.input, &paths.reference_bam, &sequential)?;

    let threads = config.threads.iter().copied().max().unwrap_or(1);
    let verification = verify_bams(&paths.reference_bam, &paths.candidate_bam, threads)?;

    write_report(&paths.timings_tsv, |out| timings.write_tsv(out))?;
    write_report(&paths.timings_json, |out| timings.write_json(out))?;

    Ok(PipelineReport { paths, timings, verification })
}
