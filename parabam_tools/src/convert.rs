//! File-level conversions. Every function here removes its output file when it
//! fails, so a path either holds a complete file or nothing.

use crate::writer::{Writer, WriterOptions};
use bam_codec::bam::reader::Reader as BamReader;
use bam_codec::sam::reader::Reader as SamReader;
use bam_codec::sam::writer::Writer as SamWriter;
use bam_codec::sorting::sort::sort_records_with_threads;
use bam_codec::{Error, Header, Record, Result};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// Sort order recorded in the header of sorted output.
pub const COORDINATE_ORDER: &str = "coordinate";

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::file(path, e))
}

fn remove_on_error<T>(path: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = fs::remove_file(path) {
            warn!("could not remove partial output {}: {}", path.display(), e);
        }
    }
    result
}

/// Writes `records` as a BAM file at `path`. Returns the number of records.
pub fn write_bam_file<P, I>(
    path: P,
    header: Arc<Header>,
    records: I,
    options: &WriterOptions,
) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Result<Record>>,
{
    let path = path.as_ref();
    let file = create(path)?;
    let result = (|| -> Result<u64> {
        let mut writer = Writer::new(file, header, options.clone())?;
        let mut count = 0;
        for record in records {
            writer.write_record(record?)?;
            count += 1;
        }
        writer.finish()?;
        Ok(count)
    })();
    remove_on_error(path, result)
}

/// Transcodes a SAM file into BAM.
pub fn sam_to_bam<P, Q>(input: P, output: Q, options: &WriterOptions) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = input.as_ref();
    let file = File::open(input).map_err(|e| Error::file(input, e))?;
    let mut reader = SamReader::new(BufReader::new(file))?;
    let header = reader.header().clone();
    let count = write_bam_file(output, header, reader.records(), options)?;
    info!("converted {} records from {}", count, input.display());
    Ok(count)
}

/// Reads a whole BAM file into memory.
pub fn read_bam<P: AsRef<Path>>(path: P, thread_num: usize) -> Result<(Header, Vec<Record>)> {
    let mut reader = BamReader::from_path(path, thread_num)?;
    let header = reader.read_header()?;
    let records = reader.records().collect::<Result<Vec<_>>>()?;
    Ok((header, records))
}

/// Renders a BAM file as SAM text, with or without the header.
pub fn bam_to_sam<P, Q>(input: P, output: Q, include_header: bool, thread_num: usize) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let output = output.as_ref();
    let mut reader = BamReader::from_path(input, thread_num)?;
    let header = Arc::new(reader.read_header()?);
    let file = create(output)?;
    let result = (|| -> Result<u64> {
        let mut writer = SamWriter::new(file, header);
        if include_header {
            writer.write_header()?;
        }
        let mut count = 0;
        for record in reader.records() {
            writer.write_record(&record?)?;
            count += 1;
        }
        writer.finish()?;
        Ok(count)
    })();
    remove_on_error(output, result)
}

/// Sorts a BAM file by coordinate. The output header carries
/// `SO:coordinate`.
pub fn sort_bam<P, Q>(input: P, output: Q, options: &WriterOptions) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (header, mut records) = read_bam(input, options.thread_num)?;
    sort_records_with_threads(&mut records, options.thread_num);
    let header = Arc::new(header.with_sort_order(COORDINATE_ORDER));
    write_bam_file(output, header, records.into_iter().map(Ok), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const SAM: &str = "@HD\tVN:1.6\n\
@SQ\tSN:chr1\tLN:1000\n\
@SQ\tSN:chr2\tLN:1000\n\
r1\t0\tchr2\t10\t60\t4M\t*\t0\t0\tACGT\tIIII\n\
r2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\n\
r3\t0\tchr1\t20\t60\t4M\t*\t0\t0\tACGT\tIIII\tNM:i:1\n";

    #[test]
    fn test_sam_bam_sam() {
        let dir = TempDir::new("convert").unwrap();
        let sam = dir.path().join("in.sam");
        fs::write(&sam, SAM).unwrap();
        let bam = dir.path().join("in.bam");
        assert_eq!(sam_to_bam(&sam, &bam, &WriterOptions::with_threads(2)).unwrap(), 3);

        let back = dir.path().join("back.sam");
        assert_eq!(bam_to_sam(&bam, &back, true, 2).unwrap(), 3);
        assert_eq!(fs::read_to_string(&back).unwrap(), SAM);
    }

    #[test]
    fn test_sort_bam_marks_header() {
        let dir = TempDir::new("convert").unwrap();
        let sam = dir.path().join("in.sam");
        fs::write(&sam, SAM).unwrap();
        let bam = dir.path().join("in.bam");
        sam_to_bam(&sam, &bam, &WriterOptions::default()).unwrap();

        let sorted = dir.path().join("sorted.bam");
        sort_bam(&bam, &sorted, &WriterOptions::with_threads(2)).unwrap();
        let (header, records) = read_bam(&sorted, 1).unwrap();
        assert_eq!(header.lines()[0], "@HD\tVN:1.6\tSO:coordinate");
        let names: Vec<&[u8]> = records.iter().map(|r| r.read_name()).collect();
        assert_eq!(names, vec![&b"r3"[..], &b"r1"[..], &b"r2"[..]]);
    }

    #[test]
    fn test_failed_conversion_leaves_no_output() {
        let dir = TempDir::new("convert").unwrap();
        let sam = dir.path().join("bad.sam");
        fs::write(&sam, format!("{}r4\t0\tchr1\n", SAM)).unwrap();
        let bam = dir.path().join("bad.bam");
        match sam_to_bam(&sam, &bam, &WriterOptions::default()) {
            Err(Error::Format { line, .. }) => assert_eq!(line, 7),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!bam.exists());
    }

    #[test]
    fn test_missing_input_names_path() {
        let dir = TempDir::new("convert").unwrap();
        let missing = dir.path().join("nope.sam");
        match sam_to_bam(&missing, dir.path().join("out.bam"), &WriterOptions::default()) {
            Err(Error::File { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected {:?}", other),
        }
    }
}
