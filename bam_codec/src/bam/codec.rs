//! Layout:
//!
//! block_size                       uint32_t
//! refID                            int32_t
//! pos                              int32_t
//! l_read_name                      uint8_t
//! mapq                             uint8_t
//! bin                              uint16_t
//! n_cigar_op                       uint16_t
//! flag                             uint16_t
//! l_seq                            uint32_t
//! next_refID                       int32_t
//! next_pos                         int32_t
//! tlen                             int32_t
//! read_name                        char[l_read_name]
//! cigar                            uint32_t[n_cigar_op]
//! seq                              uint8_t[(l_seq+1)/2]
//! qual                             char[l_seq]
//! tags                             remaining bytes

use crate::error::{Error, Result};
use crate::record::alignment::FIXED_FIELDS_SIZE;
use crate::record::cigar::Cigar;
use crate::record::data::Data;
use crate::record::sequence::{decode_seq, encode_seq};
use crate::{Header, Record, U32_SIZE, UNMAPPED};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

const MISSING_QUALITY: u8 = 0xff;
const MAX_READ_NAME_LEN: usize = 254;

/// Computes the BAI bin of the 0-based half-open interval `[beg, end)`.
pub fn reg2bin(beg: i32, end: i32) -> u16 {
    let end = end - 1;
    let bin = if beg >> 14 == end >> 14 {
        ((1 << 15) - 1) / 7 + (beg >> 14)
    } else if beg >> 17 == end >> 17 {
        ((1 << 12) - 1) / 7 + (beg >> 17)
    } else if beg >> 20 == end >> 20 {
        ((1 << 9) - 1) / 7 + (beg >> 20)
    } else if beg >> 23 == end >> 23 {
        ((1 << 6) - 1) / 7 + (beg >> 23)
    } else if beg >> 26 == end >> 26 {
        ((1 << 3) - 1) / 7 + (beg >> 26)
    } else {
        0
    };
    bin as u16
}

fn check_reference(id: i32, header: &Header, field: &str) -> Result<()> {
    let n_ref = header.reference_sequences().len();
    if id == UNMAPPED || (id >= 0 && (id as usize) < n_ref) {
        Ok(())
    } else {
        Err(Error::InvalidRecord(format!(
            "{} {} is outside the {} reference sequences of the header",
            field, id, n_ref
        )))
    }
}

/// Appends the BAM encoding of `record` to `buf`, `block_size` prefix included.
/// Nothing is appended when the record violates a BAM limit.
pub fn encode_record(record: &Record, header: &Header, buf: &mut Vec<u8>) -> Result<()> {
    check_reference(record.reference_id(), header, "reference index")?;
    check_reference(record.mate_reference_id(), header, "mate reference index")?;
    if record.position() < UNMAPPED || record.mate_position() < UNMAPPED {
        return Err(Error::InvalidRecord("negative position".to_string()));
    }

    let read_name: &[u8] = match record.read_name() {
        [] => b"*",
        name => name,
    };
    if read_name.len() > MAX_READ_NAME_LEN {
        return Err(Error::InvalidRecord(format!(
            "read name of {} bytes exceeds {}",
            read_name.len(),
            MAX_READ_NAME_LEN
        )));
    }
    let n_cigar_op = u16::try_from(record.cigar().len()).map_err(|_| {
        Error::InvalidRecord(format!("{} CIGAR operations exceed 65535", record.cigar().len()))
    })?;
    let l_seq = record.sequence().len();
    if !record.quality().is_empty() && record.quality().len() != l_seq {
        return Err(Error::InvalidRecord(format!(
            "quality length {} does not match sequence length {}",
            record.quality().len(),
            l_seq
        )));
    }

    let mut tags = Vec::with_capacity(record.data().encoded_len());
    record.data().encode(&mut tags).map_err(Error::InvalidRecord)?;

    let span = record.cigar().reference_span().max(1) as i32;
    let bin = reg2bin(record.position(), record.position().saturating_add(span));

    let start = buf.len();
    let block_size = FIXED_FIELDS_SIZE
        + read_name.len()
        + 1
        + record.cigar().len() * U32_SIZE
        + (l_seq + 1) / 2
        + l_seq
        + tags.len();
    buf.reserve(U32_SIZE + block_size);

    buf.write_u32::<LittleEndian>(block_size as u32)?;
    buf.write_i32::<LittleEndian>(record.reference_id())?;
    buf.write_i32::<LittleEndian>(record.position())?;
    buf.write_u8(read_name.len() as u8 + 1)?;
    buf.write_u8(record.mapq())?;
    buf.write_u16::<LittleEndian>(bin)?;
    buf.write_u16::<LittleEndian>(n_cigar_op)?;
    buf.write_u16::<LittleEndian>(record.flags().into())?;
    buf.write_u32::<LittleEndian>(l_seq as u32)?;
    buf.write_i32::<LittleEndian>(record.mate_reference_id())?;
    buf.write_i32::<LittleEndian>(record.mate_position())?;
    buf.write_i32::<LittleEndian>(record.template_length())?;
    buf.extend_from_slice(read_name);
    buf.push(0);
    record.cigar().write_as_bytes(buf);
    if let Err(base) = encode_seq(record.sequence(), buf) {
        buf.truncate(start);
        return Err(Error::InvalidRecord(format!(
            "base {:?} has no 4-bit code",
            base as char
        )));
    }
    if record.quality().is_empty() {
        buf.resize(buf.len() + l_seq, MISSING_QUALITY);
    } else {
        buf.extend_from_slice(record.quality());
    }
    buf.extend_from_slice(&tags);

    debug_assert_eq!(buf.len() - start, U32_SIZE + block_size);
    Ok(())
}

fn take<'a>(bytes: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if bytes.len() < len {
        return Err(Error::InvalidBam(format!("record truncated in {}", what)));
    }
    let (head, tail) = bytes.split_at(len);
    *bytes = tail;
    Ok(head)
}

/// Decodes one record from `bytes`, the data following its `block_size`.
pub fn decode_record(mut bytes: &[u8]) -> Result<Record> {
    let fixed = take(&mut bytes, FIXED_FIELDS_SIZE, "fixed fields")?;
    let reference_id = LittleEndian::read_i32(&fixed[0..4]);
    let position = LittleEndian::read_i32(&fixed[4..8]);
    let l_read_name = fixed[8] as usize;
    let mapq = fixed[9];
    let n_cigar_op = LittleEndian::read_u16(&fixed[12..14]) as usize;
    let flags = LittleEndian::read_u16(&fixed[14..16]);
    let l_seq = LittleEndian::read_u32(&fixed[16..20]) as usize;
    let mate_reference_id = LittleEndian::read_i32(&fixed[20..24]);
    let mate_position = LittleEndian::read_i32(&fixed[24..28]);
    let template_length = LittleEndian::read_i32(&fixed[28..32]);

    let name = take(&mut bytes, l_read_name, "read name")?;
    let name = match name.split_last() {
        Some((0, name)) => name,
        _ => return Err(Error::InvalidBam("read name is not NUL-terminated".to_string())),
    };
    let read_name = if name == b"*" { Vec::new() } else { name.to_vec() };

    let cigar = Cigar::from_bytes(take(&mut bytes, n_cigar_op * U32_SIZE, "CIGAR")?)
        .map_err(Error::InvalidBam)?;
    let sequence = decode_seq(take(&mut bytes, (l_seq + 1) / 2, "sequence")?, l_seq);
    let quality = take(&mut bytes, l_seq, "quality")?;
    let quality = if quality.first() == Some(&MISSING_QUALITY) {
        Vec::new()
    } else {
        quality.to_vec()
    };
    let data = Data::decode(bytes).map_err(Error::InvalidBam)?;

    Ok(Record::builder()
        .read_name(read_name)
        .flags(flags.into())
        .reference_id(reference_id)
        .position(position)
        .mapq(mapq)
        .cigar(cigar)
        .mate_reference_id(mate_reference_id)
        .mate_position(mate_position)
        .template_length(template_length)
        .sequence(sequence)
        .quality(quality)
        .data(data)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sam::reader::parse_record;

    fn header() -> Header {
        Header::parse("@SQ\tSN:chr1\tLN:100000\n@SQ\tSN:chr2\tLN:100000").unwrap()
    }

    fn encode(line: &str) -> (Record, Vec<u8>) {
        let record = parse_record(line, &header()).unwrap();
        let mut buf = Vec::new();
        encode_record(&record, &header(), &mut buf).unwrap();
        (record, buf)
    }

    #[test]
    fn test_reg2bin() {
        assert_eq!(reg2bin(-1, 0), 4680);
        assert_eq!(reg2bin(0, 1), 4681);
        assert_eq!(reg2bin(16383, 16385), 585);
    }

    #[test]
    fn test_record_round_trip() {
        let (record, buf) =
            encode("r1\t99\tchr2\t1000\t60\t3S5M1I2M\t=\t1200\t250\tACGTACGTACG\tIIIIIIIIIII\tNM:i:300\tXB:B:f,1.5\tRG:Z:x");
        let block_size = LittleEndian::read_u32(&buf[..4]) as usize;
        assert_eq!(block_size + 4, buf.len());
        assert_eq!(buf.len(), record.encoded_len());
        assert_eq!(decode_record(&buf[4..]).unwrap(), record);
    }

    #[test]
    fn test_missing_fields() {
        let (record, buf) = encode("*\t4\t*\t0\t255\t*\t*\t0\t0\tACG\t*");
        assert_eq!(&buf[36..38], b"*\0");
        assert_eq!(&buf[buf.len() - 3..], &[0xff, 0xff, 0xff]);
        let decoded = decode_record(&buf[4..]).unwrap();
        assert_eq!(decoded, record);
        assert!(decoded.read_name().is_empty());
        assert!(decoded.quality().is_empty());
    }

    #[test]
    fn test_rejects_limits() {
        let mut buf = Vec::new();
        let out_of_range = Record::builder().read_name("r").reference_id(2).position(0).build();
        assert!(matches!(
            encode_record(&out_of_range, &header(), &mut buf),
            Err(Error::InvalidRecord(_))
        ));
        let long_name = Record::builder().read_name(vec![b'a'; 255]).build();
        assert!(matches!(
            encode_record(&long_name, &header(), &mut buf),
            Err(Error::InvalidRecord(_))
        ));
        let bad_qual = Record::builder().read_name("r").sequence("ACGT").quality(vec![1]).build();
        assert!(matches!(
            encode_record(&bad_qual, &header(), &mut buf),
            Err(Error::InvalidRecord(_))
        ));
        let bad_base = Record::builder().read_name("r").sequence("AC.T").build();
        assert!(matches!(
            encode_record(&bad_base, &header(), &mut buf),
            Err(Error::InvalidRecord(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_cigar_code_is_invalid_bam() {
        let (_, mut buf) = encode("r1\t0\tchr1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII");
        // The single CIGAR word follows the fixed fields and "r1\0".
        let op = 4 + FIXED_FIELDS_SIZE + 3;
        LittleEndian::write_u32(&mut buf[op..op + 4], 4 << 4 | 12);
        match decode_record(&buf[4..]) {
            Err(Error::InvalidBam(reason)) => assert!(reason.contains("CIGAR")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record() {
        let (_, buf) = encode("r1\t0\tchr1\t10\t60\t4M\t*\t0\t0\tACGT\tIIII");
        assert!(matches!(decode_record(&buf[4..buf.len() - 2]), Err(Error::InvalidBam(_))));
    }
}
