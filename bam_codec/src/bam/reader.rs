use super::codec::decode_record;
use super::readahead::Readahead;
use crate::error::{self, Error, Result};
use crate::record::alignment::FIXED_FIELDS_SIZE;
use crate::{Block, Header, Record, U32_SIZE};
use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// BAM reader with parallel block decompression.
///
/// The decompressed stream is exposed through [`Read`]; header and records are
/// parsed on top of it.
pub struct Reader {
    readahead: Readahead,
    block_buffer: Option<Block>,
    eof_reached: bool,
    record_buf: Vec<u8>,
    count_of_blocks: usize,
    count_of_bytes_read: u64,
}

impl Reader {
    /// `thread_num` decompression workers read ahead of the consumer.
    pub fn new<R>(inner: R, thread_num: usize) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Ok(Self {
            readahead: Readahead::new(thread_num, Box::new(inner))?,
            block_buffer: Some(Block::default()),
            eof_reached: false,
            record_buf: Vec::new(),
            count_of_blocks: 0,
            count_of_bytes_read: 0,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P, thread_num: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file(path, e))?;
        Reader::new(BufReader::new(file), thread_num)
    }

    /// Reads the header. Must be called once, before any record.
    pub fn read_header(&mut self) -> Result<Header> {
        Header::read_bam(self)
    }

    /// Reads the next record, `None` at the end of the stream.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let mut size_buf = [0; U32_SIZE];
        let mut filled = 0;
        while filled < U32_SIZE {
            match self.read(&mut size_buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(error::from_io(e)),
            }
        }
        match filled {
            0 => return Ok(None),
            U32_SIZE => {}
            _ => return Err(Error::InvalidBam("truncated record size".to_string())),
        }

        let block_size = LittleEndian::read_u32(&size_buf) as usize;
        if block_size < FIXED_FIELDS_SIZE {
            return Err(Error::InvalidBam(format!("record of {} bytes is too short", block_size)));
        }
        let mut record_buf = std::mem::take(&mut self.record_buf);
        record_buf.resize(block_size, 0);
        let read = self.read_exact(&mut record_buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::InvalidBam("truncated record".to_string())
            } else {
                error::from_io(e)
            }
        });
        let record = read.and_then(|_| decode_record(&record_buf));
        self.record_buf = record_buf;
        record.map(Some)
    }

    /// Iterator over the remaining records; stops after the first error.
    pub fn records(&mut self) -> Records<'_> {
        Records { reader: self, failed: false }
    }

    /// Compressed bytes consumed so far.
    pub fn compressed_bytes_read(&self) -> u64 {
        self.count_of_bytes_read
    }

    pub fn blocks_read(&self) -> usize {
        self.count_of_blocks
    }
}

impl Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.eof_reached {
                return Ok(0);
            }
            let block = match self.block_buffer.as_mut() {
                Some(block) => block,
                None => return Ok(0),
            };
            match block.data_mut().read(buf)? {
                // Block exhausted, get new.
                0 => {
                    let old = self.block_buffer.take().unwrap_or_default();
                    match self.readahead.get_block(old)? {
                        None => self.eof_reached = true,
                        Some(new_block) => {
                            self.count_of_blocks += 1;
                            self.count_of_bytes_read += new_block.compressed_size;
                            self.block_buffer = Some(new_block);
                        }
                    }
                }
                n => return Ok(n),
            }
        }
    }
}

/// An iterator over records of a BAM reader.
///
/// This is created by calling [`Reader::records`].
pub struct Records<'a> {
    reader: &'a mut Reader,
    failed: bool,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam::codec::encode_record;
    use crate::bgzf;
    use crate::gz::EOF_BLOCK;
    use flate2::Compression;
    use std::io::Cursor;

    fn header() -> Header {
        Header::parse("@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:5000").unwrap()
    }

    fn records(n: i32) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::builder()
                    .read_name(format!("read{}", i))
                    .reference_id(0)
                    .position(i * 7)
                    .mapq(60)
                    .cigar("4M".parse().unwrap())
                    .sequence("ACGT")
                    .quality(vec![30; 4])
                    .build()
            })
            .collect()
    }

    // Small members so records straddle block boundaries.
    fn bam_bytes(header: &Header, records: &[Record], with_eof: bool) -> Vec<u8> {
        let mut raw = Vec::new();
        header.write_bam(&mut raw).unwrap();
        for record in records {
            encode_record(record, header, &mut raw).unwrap();
        }
        let mut out = Vec::new();
        for chunk in raw.chunks(100) {
            bgzf::write_block(chunk, Compression::fast(), &mut out).unwrap();
        }
        if with_eof {
            out.extend_from_slice(&EOF_BLOCK);
        }
        out
    }

    #[test]
    fn test_reads_header_and_records() {
        let header = header();
        let expected = records(300);
        let bytes = bam_bytes(&header, &expected, true);
        let mut reader = Reader::new(Cursor::new(bytes), 3).unwrap();
        assert_eq!(reader.read_header().unwrap(), header);
        let actual: Vec<Record> = reader.records().collect::<Result<_>>().unwrap();
        assert_eq!(actual, expected);
        assert!(reader.blocks_read() > 1);
    }

    #[test]
    fn test_missing_eof_is_rejected() {
        let header = header();
        let bytes = bam_bytes(&header, &records(10), false);
        let mut reader = Reader::new(Cursor::new(bytes), 2).unwrap();
        reader.read_header().unwrap();
        let result: Result<Vec<Record>> = reader.records().collect();
        assert!(matches!(result, Err(Error::InvalidBam(_))));
    }

    #[test]
    fn test_bad_magic() {
        let mut out = Vec::new();
        bgzf::write_block(b"BAM\x02\0\0\0\0\0\0\0\0", Compression::fast(), &mut out).unwrap();
        out.extend_from_slice(&EOF_BLOCK);
        let mut reader = Reader::new(Cursor::new(out), 1).unwrap();
        assert!(matches!(reader.read_header(), Err(Error::InvalidBam(_))));
    }
}
