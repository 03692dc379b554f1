// RFC 1952 § 2.3.1
pub(crate) const MAGIC_NUMBER: [u8; 2] = [0x1f, 0x8b];

pub(crate) const MTIME_NONE: u32 = 0;

// ID1 (1) + ID2 (1) + CM (1) + FLG (1) + MTIME (4) + XLF (1) + OS (1)
pub(crate) const HEADER_SIZE: usize = 10;

// CRC32 (4) + ISIZE (4)
pub(crate) const TRAILER_SIZE: usize = 8;

// XLEN (2)
pub(crate) const GZIP_XLEN_SIZE: usize = 2;

// SI1 (1) + SI2 (1) + SLEN (2) + BSIZE (2)
pub(crate) const BGZF_XLEN: usize = 6;

pub const BGZF_HEADER_SIZE: usize = HEADER_SIZE + GZIP_XLEN_SIZE + BGZF_XLEN;

/// Largest member a BGZF stream may contain, header and trailer included.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Uncompressed bytes put into one BGZF member. Leaves room for deflate
/// overhead on incompressible input.
pub const MAX_BLOCK_DATA_SIZE: usize = 65280;

// FLG.FEXTRA
pub(crate) const FLAG_EXTRA: u8 = 0x04;

// "BC" subfield identifiers.
pub(crate) const BGZF_SI1: u8 = b'B';
pub(crate) const BGZF_SI2: u8 = b'C';
pub(crate) const BGZF_SLEN: u16 = 2;

/// Empty member terminating every BGZF stream (SAMv1 § 4.1.2).
pub const EOF_BLOCK: [u8; 28] = [
    0x1f, 0x8b, // ID1, ID2
    0x08, // CM = DEFLATE
    0x04, // FLG = FEXTRA
    0x00, 0x00, 0x00, 0x00, // MTIME
    0x00, // XFL
    0xff, // OS = unknown
    0x06, 0x00, // XLEN
    0x42, 0x43, // SI1, SI2
    0x02, 0x00, // SLEN
    0x1b, 0x00, // BSIZE = 27
    0x03, 0x00, // empty deflate stream
    0x00, 0x00, 0x00, 0x00, // CRC32
    0x00, 0x00, 0x00, 0x00, // ISIZE
];

#[non_exhaustive]
pub(crate) enum CompressionMethod {
    Deflate = 8,
}

#[non_exhaustive]
pub(crate) enum OperatingSystem {
    Unknown = 255,
}
