mod common;

use bam_codec::sorting::keys::SortKey;
use bam_codec::{Header, Record, UNMAPPED};
use parabam_tools::convert::{read_bam, sam_to_bam, sort_bam, write_bam_file};
use parabam_tools::WriterOptions;
use std::fs;
use std::sync::Arc;
use tempdir::TempDir;

fn record(name: &str, reference_id: i32, position: i32) -> Record {
    Record::builder()
        .read_name(name)
        .reference_id(reference_id)
        .position(position)
        .build()
}

#[test]
fn sorts_by_reference_then_position_with_unmapped_last() {
    let dir = TempDir::new("sorting").unwrap();
    let header = Arc::new(Header::parse("@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:1000").unwrap());
    let input = vec![
        record("a", 0, 500),
        record("u1", UNMAPPED, UNMAPPED),
        record("b", 0, 100),
        record("c", 1, 50),
        record("u2", UNMAPPED, UNMAPPED),
    ];
    let bam = dir.path().join("in.bam");
    write_bam_file(&bam, header, input.into_iter().map(Ok), &WriterOptions::default()).unwrap();

    let sorted = dir.path().join("sorted.bam");
    sort_bam(&bam, &sorted, &WriterOptions::with_threads(4)).unwrap();
    let (_, records) = read_bam(&sorted, 2).unwrap();
    let order: Vec<&[u8]> = records.iter().map(|r| r.read_name()).collect();
    assert_eq!(order, vec![&b"b"[..], &b"a"[..], &b"c"[..], &b"u1"[..], &b"u2"[..]]);
}

#[test]
fn sorting_is_stable_and_idempotent() {
    let dir = TempDir::new("sorting").unwrap();
    let sam = dir.path().join("in.sam");
    fs::write(&sam, common::synthetic_sam(4000, 5)).unwrap();
    let bam = dir.path().join("in.bam");
    sam_to_bam(&sam, &bam, &WriterOptions::with_threads(4)).unwrap();
    let (_, original) = read_bam(&bam, 2).unwrap();

    let once = dir.path().join("once.bam");
    sort_bam(&bam, &once, &WriterOptions::with_threads(4)).unwrap();
    let twice = dir.path().join("twice.bam");
    sort_bam(&once, &twice, &WriterOptions::with_threads(2)).unwrap();
    assert_eq!(fs::read(&once).unwrap(), fs::read(&twice).unwrap());

    let (header, sorted) = read_bam(&once, 2).unwrap();
    assert_eq!(header.lines()[0], "@HD\tVN:1.6\tSO:coordinate");
    assert_eq!(sorted.len(), original.len());
    // Names are unique, so input rank is recoverable.
    let rank = |r: &Record| original.iter().position(|o| o.read_name() == r.read_name()).unwrap();
    for pair in sorted.windows(2) {
        let (a, b) = (SortKey::of(&pair[0]), SortKey::of(&pair[1]));
        assert!(a <= b);
        if a == b {
            assert!(rank(&pair[0]) < rank(&pair[1]));
        }
    }
}
