mod common;

use bam_codec::sam::reader::Reader as SamReader;
use bam_codec::Record;
use parabam_tools::convert::{bam_to_sam, read_bam, sam_to_bam};
use parabam_tools::WriterOptions;
use std::fs;
use tempdir::TempDir;

fn parse(text: &str) -> Vec<Record> {
    let mut reader = SamReader::new(text.as_bytes()).unwrap();
    reader.records().collect::<Result<_, _>>().unwrap()
}

#[test]
fn round_trip_preserves_records_for_every_thread_count() {
    let dir = TempDir::new("round_trip").unwrap();
    let text = common::synthetic_sam(3000, 7);
    let sam = dir.path().join("in.sam");
    fs::write(&sam, &text).unwrap();
    let expected = parse(&text);

    for threads in [1, 2, 4, 16] {
        let bam = dir.path().join(format!("t{}.bam", threads));
        let options = WriterOptions { thread_num: threads, block_size: 8 * 1024, compression_level: 6 };
        assert_eq!(sam_to_bam(&sam, &bam, &options).unwrap(), expected.len() as u64);

        let (header, records) = read_bam(&bam, threads).unwrap();
        assert_eq!(header.text(), common::header_text());
        assert_eq!(records, expected, "threads = {}", threads);
    }
}

#[test]
fn bam_bytes_do_not_depend_on_thread_count() {
    let dir = TempDir::new("round_trip").unwrap();
    let sam = dir.path().join("in.sam");
    fs::write(&sam, common::synthetic_sam(5000, 11)).unwrap();

    let reference = dir.path().join("t1.bam");
    sam_to_bam(&sam, &reference, &WriterOptions::with_threads(1)).unwrap();
    let reference = fs::read(&reference).unwrap();
    for threads in [2, 3, 8, 16] {
        let bam = dir.path().join(format!("t{}.bam", threads));
        sam_to_bam(&sam, &bam, &WriterOptions::with_threads(threads)).unwrap();
        assert!(fs::read(&bam).unwrap() == reference, "threads = {}", threads);
    }
}

#[test]
fn sam_text_survives_bam() {
    let dir = TempDir::new("round_trip").unwrap();
    let text = common::synthetic_sam(500, 3);
    let sam = dir.path().join("in.sam");
    fs::write(&sam, &text).unwrap();
    let bam = dir.path().join("in.bam");
    sam_to_bam(&sam, &bam, &WriterOptions::with_threads(4)).unwrap();

    let back = dir.path().join("back.sam");
    bam_to_sam(&bam, &back, true, 4).unwrap();
    assert_eq!(fs::read_to_string(&back).unwrap(), text);
}

#[test]
fn empty_input_yields_header_only_bam() {
    let dir = TempDir::new("round_trip").unwrap();
    let sam = dir.path().join("empty.sam");
    fs::write(&sam, common::header_text()).unwrap();
    for threads in [1, 4] {
        let bam = dir.path().join(format!("empty{}.bam", threads));
        assert_eq!(sam_to_bam(&sam, &bam, &WriterOptions::with_threads(threads)).unwrap(), 0);
        let (header, records) = read_bam(&bam, 2).unwrap();
        assert_eq!(header.reference_sequences().len(), 3);
        assert!(records.is_empty());
    }
}
