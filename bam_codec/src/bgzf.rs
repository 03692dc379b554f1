// BGZF member framing, after noodles-bgzf (reader.rs / writer.rs).

use crate::error::{Error, Result};
use crate::gz::{
    CompressionMethod, OperatingSystem, BGZF_HEADER_SIZE, BGZF_SI1, BGZF_SI2, BGZF_SLEN,
    BGZF_XLEN, FLAG_EXTRA, MAGIC_NUMBER, MAX_BLOCK_DATA_SIZE, MAX_BLOCK_SIZE, MTIME_NONE,
    TRAILER_SIZE,
};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// One BGZF member as read from the stream, before inflation.
#[derive(Debug, Default)]
pub struct RawBlock {
    pub(crate) cdata: Vec<u8>,
    pub(crate) crc32: u32,
    pub(crate) uncompressed_size: u32,
    /// Size of the whole member on disk
    pub compressed_size: u64,
}

impl RawBlock {
    /// True for the empty member that terminates a stream.
    pub fn is_eof(&self) -> bool {
        self.uncompressed_size == 0
    }
}

/// Deflates `data` into BGZF members appended to `dest`. Input larger than a
/// single member is split at fixed offsets, so the output only depends on the
/// bytes and the level.
pub fn compress(data: &[u8], level: Compression, dest: &mut Vec<u8>) -> io::Result<()> {
    for chunk in data.chunks(MAX_BLOCK_DATA_SIZE) {
        write_block(chunk, level, dest)?;
    }
    Ok(())
}

/// Writes one BGZF member holding `data` (at most `MAX_BLOCK_DATA_SIZE` bytes).
pub fn write_block(data: &[u8], level: Compression, dest: &mut Vec<u8>) -> io::Result<()> {
    debug_assert!(data.len() <= MAX_BLOCK_DATA_SIZE);

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    let cdata = encoder.finish()?;

    let block_size = BGZF_HEADER_SIZE + cdata.len() + TRAILER_SIZE;
    if block_size > MAX_BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("compressed block of {} bytes exceeds BGZF limit", block_size),
        ));
    }

    dest.reserve(block_size);
    dest.extend_from_slice(&MAGIC_NUMBER);
    dest.write_u8(CompressionMethod::Deflate as u8)?;
    dest.write_u8(FLAG_EXTRA)?;
    dest.write_u32::<LittleEndian>(MTIME_NONE)?;
    dest.write_u8(0)?;
    dest.write_u8(OperatingSystem::Unknown as u8)?;
    dest.write_u16::<LittleEndian>(BGZF_XLEN as u16)?;
    dest.write_u8(BGZF_SI1)?;
    dest.write_u8(BGZF_SI2)?;
    dest.write_u16::<LittleEndian>(BGZF_SLEN)?;
    // BSIZE is "total block size minus 1".
    dest.write_u16::<LittleEndian>((block_size - 1) as u16)?;
    dest.extend_from_slice(&cdata);
    dest.write_u32::<LittleEndian>(crc32(data))?;
    dest.write_u32::<LittleEndian>(data.len() as u32)?;

    Ok(())
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Reads the next member into `block`. Returns `false` on a clean end of
/// stream (no bytes left at a member boundary).
pub fn read_block<R>(reader: &mut R, block: &mut RawBlock) -> Result<bool>
where
    R: Read + ?Sized,
{
    let mut header = [0; BGZF_HEADER_SIZE];
    match read_fully(reader, &mut header)? {
        0 => return Ok(false),
        n if n < BGZF_HEADER_SIZE => {
            return Err(Error::InvalidBam(format!(
                "truncated BGZF header: expected {} bytes, got {}",
                BGZF_HEADER_SIZE, n
            )))
        }
        _ => {}
    }

    if header[..2] != MAGIC_NUMBER
        || header[2] != CompressionMethod::Deflate as u8
        || header[3] & FLAG_EXTRA == 0
    {
        return Err(Error::InvalidBam("not a BGZF member".to_string()));
    }
    if LittleEndian::read_u16(&header[10..12]) as usize != BGZF_XLEN
        || header[12] != BGZF_SI1
        || header[13] != BGZF_SI2
    {
        return Err(Error::InvalidBam("missing BGZF block size subfield".to_string()));
    }

    // Add 1 because BSIZE is "total Block SIZE minus 1".
    let block_size = LittleEndian::read_u16(&header[16..18]) as usize + 1;
    if block_size < BGZF_HEADER_SIZE + TRAILER_SIZE {
        return Err(Error::InvalidBam(format!(
            "expected clen >= {}, got {}",
            BGZF_HEADER_SIZE + TRAILER_SIZE,
            block_size
        )));
    }

    let cdata_len = block_size - BGZF_HEADER_SIZE - TRAILER_SIZE;
    block.cdata.resize(cdata_len, 0);
    read_member_part(reader, &mut block.cdata)?;

    let mut trailer = [0; TRAILER_SIZE];
    read_member_part(reader, &mut trailer)?;
    block.crc32 = LittleEndian::read_u32(&trailer[..4]);
    block.uncompressed_size = LittleEndian::read_u32(&trailer[4..]);
    block.compressed_size = block_size as u64;

    Ok(true)
}

/// Inflates a member into `dest` (cleared first) and checks ISIZE and CRC32.
pub fn inflate(block: &RawBlock, dest: &mut Vec<u8>) -> Result<()> {
    dest.clear();
    let mut decoder = DeflateDecoder::new(&block.cdata[..]);
    decoder
        .read_to_end(dest)
        .map_err(|e| Error::InvalidBam(format!("corrupt deflate stream: {}", e)))?;

    if dest.len() != block.uncompressed_size as usize {
        return Err(Error::InvalidBam(format!(
            "block size mismatch: header says {}, inflated {}",
            block.uncompressed_size,
            dest.len()
        )));
    }
    if crc32(dest) != block.crc32 {
        return Err(Error::InvalidBam("block checksum mismatch".to_string()));
    }
    Ok(())
}

fn read_member_part<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: Read + ?Sized,
{
    if read_fully(reader, buf)? < buf.len() {
        return Err(Error::InvalidBam("truncated BGZF block".to_string()));
    }
    Ok(())
}

// Like `read_exact`, but reports how much was read instead of failing on EOF.
fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
