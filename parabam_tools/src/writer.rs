use crate::compressor::{encode_block, CompressTask, Compressor};
use bam_codec::gz::{EOF_BLOCK, MAX_BLOCK_DATA_SIZE};
use bam_codec::{bgzf, Header, Record, Result};
use flate2::Compression;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;

/// Tuning knobs of the BAM writer. None of them changes the decoded content;
/// for fixed options the output bytes do not depend on `thread_num`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Compression workers. 1 compresses in the calling thread.
    pub thread_num: usize,
    /// Target uncompressed bytes per block.
    pub block_size: usize,
    /// Deflate level, 0-9.
    pub compression_level: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            thread_num: 1,
            block_size: MAX_BLOCK_DATA_SIZE,
            compression_level: 6,
        }
    }
}

impl WriterOptions {
    pub fn with_threads(thread_num: usize) -> Self {
        WriterOptions { thread_num, ..WriterOptions::default() }
    }

    fn validate(&self) -> io::Result<()> {
        let invalid = |msg: String| Err(io::Error::new(io::ErrorKind::InvalidInput, msg));
        if self.thread_num == 0 {
            return invalid("thread_num must be at least 1".to_string());
        }
        if self.block_size == 0 {
            return invalid("block_size must be positive".to_string());
        }
        if self.compression_level > 9 {
            return invalid(format!("compression level {} is not in 0-9", self.compression_level));
        }
        Ok(())
    }
}

enum Sink<W> {
    // Encode and compress in the caller's thread.
    Sequential { inner: W, raw: Vec<u8>, out: Vec<u8> },
    Parallel(Compressor<W>),
}

/// BAM writer.
///
/// Records are grouped into blocks of about `block_size` encoded bytes, each
/// block numbered from 0 in arrival order. With more than one thread, blocks
/// are compressed concurrently and written back in order.
pub struct Writer<W>
where
    W: Write + Send + 'static,
{
    header: Arc<Header>,
    level: Compression,
    block_size: usize,
    block: Vec<Record>,
    block_bytes: usize,
    seq: u64,
    records_written: u64,
    sink: Sink<W>,
}

impl<W> Writer<W>
where
    W: Write + Send + 'static,
{
    /// Writes the BAM header right away; records follow through
    /// [`Writer::write_record`].
    pub fn new(mut inner: W, header: Arc<Header>, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let level = Compression::new(options.compression_level);

        let mut header_raw = Vec::new();
        header.write_bam(&mut header_raw)?;
        let mut header_block = Vec::new();
        bgzf::compress(&header_raw, level, &mut header_block)?;
        inner.write_all(&header_block)?;

        let sink = if options.thread_num == 1 {
            Sink::Sequential { inner, raw: Vec::new(), out: Vec::new() }
        } else {
            Sink::Parallel(Compressor::new(inner, header.clone(), options.thread_num, level)?)
        };
        debug!(
            "BAM writer started with {} thread(s), {} byte blocks",
            options.thread_num, options.block_size
        );

        Ok(Writer {
            header,
            level,
            block_size: options.block_size,
            block: Vec::new(),
            block_bytes: 0,
            seq: 0,
            records_written: 0,
            sink,
        })
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    /// Buffers a record, dispatching the current block first if the record
    /// does not fit. A block always holds at least one record.
    pub fn write_record(&mut self, record: Record) -> Result<()> {
        let len = record.encoded_len();
        if !self.block.is_empty() && self.block_bytes + len > self.block_size {
            self.flush_block()?;
        }
        self.block_bytes += len;
        self.block.push(record);
        self.records_written += 1;
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.block);
        self.block_bytes = 0;
        let seq = self.seq;
        self.seq += 1;

        match &mut self.sink {
            Sink::Sequential { inner, raw, out } => {
                out.clear();
                encode_block(seq, &records, &self.header, self.level, raw, out)?;
                inner.write_all(out)?;
            }
            Sink::Parallel(compressor) => compressor.compress_block(CompressTask { seq, records })?,
        }
        Ok(())
    }

    /// Writes the last block and the EOF marker, then returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_block()?;
        let mut inner = match self.sink {
            Sink::Sequential { inner, .. } => inner,
            Sink::Parallel(compressor) => compressor.finish()?,
        };
        inner.write_all(&EOF_BLOCK)?;
        inner.flush()?;
        info!("wrote {} records in {} blocks", self.records_written, self.seq);
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bam_codec::bam::reader::Reader;
    use bam_codec::Error;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn header() -> Arc<Header> {
        Arc::new(Header::parse("@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:100000").unwrap())
    }

    fn records(n: i32) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::builder()
                    .read_name(format!("read{}", i))
                    .reference_id(0)
                    .position(i)
                    .mapq(30)
                    .cigar("8M".parse().unwrap())
                    .sequence("ACGTTGCA")
                    .quality(vec![20; 8])
                    .build()
            })
            .collect()
    }

    fn write(records: &[Record], options: WriterOptions) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new(), header(), options)?;
        for record in records {
            writer.write_record(record.clone())?;
        }
        writer.finish()
    }

    #[test]
    fn test_empty_input_is_header_and_eof() {
        let bytes = write(&[], WriterOptions::default()).unwrap();
        assert!(bytes.ends_with(&EOF_BLOCK));
        let mut reader = Reader::new(Cursor::new(bytes), 1).unwrap();
        assert_eq!(reader.read_header().unwrap(), *header());
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn test_small_blocks_round_trip() {
        let expected = records(500);
        let options = WriterOptions { thread_num: 3, block_size: 300, compression_level: 1 };
        let bytes = write(&expected, options).unwrap();
        let mut reader = Reader::new(Cursor::new(bytes), 2).unwrap();
        reader.read_header().unwrap();
        let actual: Vec<Record> = reader.records().collect::<Result<_>>().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_thread_count_does_not_change_bytes() {
        let input = records(2000);
        let reference = write(&input, WriterOptions::with_threads(1)).unwrap();
        for threads in [2, 5, 8] {
            assert_eq!(write(&input, WriterOptions::with_threads(threads)).unwrap(), reference);
        }
    }

    // Counts writes, taking its time over each.
    struct SlowSink(Arc<AtomicUsize>);

    impl Write for SlowSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_millis(20));
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dropped_writer_stops_writing() {
        let writes = Arc::new(AtomicUsize::new(0));
        let options = WriterOptions { thread_num: 4, block_size: 1, compression_level: 1 };
        let mut writer = Writer::new(SlowSink(writes.clone()), header(), options).unwrap();
        for record in records(40) {
            writer.write_record(record).unwrap();
        }
        drop(writer);
        let at_drop = writes.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(writes.load(Ordering::SeqCst), at_drop);
    }

    #[test]
    fn test_invalid_options() {
        let options = WriterOptions { compression_level: 12, ..WriterOptions::default() };
        assert!(matches!(write(&[], options), Err(Error::Io(_))));
        assert!(write(&[], WriterOptions::with_threads(0)).is_err());
    }

    #[test]
    fn test_options_from_json() {
        let options: WriterOptions = serde_json::from_str(r#"{"thread_num": 4}"#).unwrap();
        assert_eq!(options.thread_num, 4);
        assert_eq!(options.compression_level, 6);
    }
}
