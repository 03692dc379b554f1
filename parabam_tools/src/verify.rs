use crate::convert::{bam_to_sam, sort_bam};
use crate::writer::WriterOptions;
use bam_codec::{Error, Result};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

const READ_CHUNK: usize = 1 << 16;

/// MD5 of a file's bytes as lowercase hex.
pub fn digest_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| Error::file(path, e))?;
    let mut context = md5::Context::new();
    let mut buf = vec![0; READ_CHUNK];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => context.consume(&buf[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::file(path, e)),
        }
    }
    Ok(format!("{:x}", context.compute()))
}

/// Whether two files have the same digest.
pub fn files_match<P: AsRef<Path>, Q: AsRef<Path>>(a: P, b: Q) -> Result<bool> {
    Ok(digest_file(a)? == digest_file(b)?)
}

/// Outcome of comparing two normalised files. A mismatch is a result, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub reference: PathBuf,
    pub candidate: PathBuf,
    pub reference_digest: String,
    pub candidate_digest: String,
    pub matches: bool,
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

// `dir/name.bam` -> `dir/name`
fn strip_extension(path: &Path, extension: &str) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == extension => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

/// `<base>_sorted.bam` and `<base>_sorted.sam` next to `<base>.bam`.
pub fn sorted_paths(bam: &Path) -> (PathBuf, PathBuf) {
    let base = strip_extension(bam, "bam");
    (with_suffix(&base, "_sorted.bam"), with_suffix(&base, "_sorted.sam"))
}

/// Sorts `bam` by coordinate and renders it as header-less SAM, so that two
/// files holding the same records in any order normalise to the same bytes.
pub fn normalize_bam(bam: &Path, sorted_bam: &Path, sorted_sam: &Path, thread_num: usize) -> Result<()> {
    sort_bam(bam, sorted_bam, &WriterOptions::with_threads(thread_num))?;
    bam_to_sam(sorted_bam, sorted_sam, false, thread_num)?;
    Ok(())
}

/// Normalises both BAM files and compares the digests of the results.
pub fn verify_bams<P, Q>(reference: P, candidate: Q, thread_num: usize) -> Result<Verification>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (reference, candidate) = (reference.as_ref(), candidate.as_ref());
    let mut digests = Vec::with_capacity(2);
    for bam in [reference, candidate] {
        let (sorted_bam, sorted_sam) = sorted_paths(bam);
        normalize_bam(bam, &sorted_bam, &sorted_sam, thread_num)?;
        digests.push(digest_file(&sorted_sam)?);
    }
    let candidate_digest = digests.pop().unwrap_or_default();
    let reference_digest = digests.pop().unwrap_or_default();
    let matches = reference_digest == candidate_digest;
    info!(
        "{} ({}) vs {} ({}): {}",
        reference.display(),
        reference_digest,
        candidate.display(),
        candidate_digest,
        if matches { "identical" } else { "DIFFERENT" }
    );
    Ok(Verification {
        reference: reference.to_path_buf(),
        candidate: candidate.to_path_buf(),
        reference_digest,
        candidate_digest,
        matches,
    })
}

/// Files produced by the pipeline for `<base>.sam`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub input: PathBuf,
    /// Sequential (single thread) conversion.
    pub reference_bam: PathBuf,
    /// Output of the benchmark sweep.
    pub candidate_bam: PathBuf,
    pub reference_sorted_bam: PathBuf,
    pub reference_sorted_sam: PathBuf,
    pub candidate_sorted_bam: PathBuf,
    pub candidate_sorted_sam: PathBuf,
    pub timings_tsv: PathBuf,
    pub timings_json: PathBuf,
}

impl OutputPaths {
    pub fn for_input<P: AsRef<Path>>(input: P) -> Self {
        let input = input.as_ref();
        let base = strip_extension(input, "sam");
        let reference_bam = with_suffix(&base, ".bam");
        let candidate_bam = with_suffix(&base, "_pysam.bam");
        let (reference_sorted_bam, reference_sorted_sam) = sorted_paths(&reference_bam);
        let (candidate_sorted_bam, candidate_sorted_sam) = sorted_paths(&candidate_bam);
        OutputPaths {
            input: input.to_path_buf(),
            reference_bam,
            candidate_bam,
            reference_sorted_bam,
            reference_sorted_sam,
            candidate_sorted_bam,
            candidate_sorted_sam,
            timings_tsv: with_suffix(&base, "_timings.tsv"),
            timings_json: with_suffix(&base, "_timings.json"),
        }
    }
}
