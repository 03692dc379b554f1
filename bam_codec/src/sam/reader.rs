use crate::error::{Error, Result};
use crate::record::cigar::Cigar;
use crate::record::data::{Data, Tag, Value};
use crate::record::flags::Flags;
use crate::record::sequence::is_valid_base;
use crate::{Header, Record, UNMAPPED};
use log::warn;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;

const MANDATORY_FIELDS: usize = 11;

/// Strict SAM text reader. The header is consumed on construction; records
/// are then parsed one line at a time.
pub struct Reader<R> {
    inner: R,
    header: Arc<Header>,
    line: String,
    line_no: usize,
    // First record line, read while looking for the end of the header.
    pending: Option<(String, usize)>,
    rewrite_reported: bool,
}

impl<R: BufRead> Reader<R> {
    pub fn new(inner: R) -> Result<Reader<R>> {
        let mut reader = Reader {
            inner,
            header: Arc::new(Header::new()),
            line: String::new(),
            line_no: 0,
            pending: None,
            rewrite_reported: false,
        };

        let mut header = Header::new();
        while let Some(line) = reader.next_line()? {
            if line.starts_with('@') {
                header.push_line(&line, reader.line_no)?;
            } else {
                reader.pending = Some((line, reader.line_no));
                break;
            }
        }
        reader.header = Arc::new(header);
        Ok(reader)
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        if self.inner.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if self.line.ends_with('\n') {
            self.line.pop();
            if self.line.ends_with('\r') {
                self.line.pop();
            }
        }
        if self.line.is_empty() {
            return Err(Error::format(self.line_no, "empty line"));
        }
        Ok(Some(self.line.clone()))
    }

    /// Reads the next record, `None` at end of input.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        let (line, line_no) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.next_line()? {
                Some(line) => (line, self.line_no),
                None => return Ok(None),
            },
        };
        if line.starts_with('@') {
            return Err(Error::format(line_no, "header line after alignment records"));
        }
        let (record, rewrite) = parse_fields(&line, &self.header, !self.rewrite_reported)
            .map_err(|reason| Error::format(line_no, reason))?;
        if let Some(rewrite) = rewrite {
            warn!("line {}: {}; further non-canonical lines are not reported", line_no, rewrite);
            self.rewrite_reported = true;
        }
        Ok(Some(record))
    }

    /// Lazy iterator over the remaining records. It stops after the first
    /// error.
    pub fn records(&mut self) -> Records<'_, R> {
        Records { reader: self, failed: false }
    }
}

/// An iterator over records of a SAM reader.
///
/// This is created by calling [`Reader::records`].
pub struct Records<'a, R> {
    reader: &'a mut Reader<R>,
    failed: bool,
}

impl<'a, R: BufRead> Iterator for Records<'a, R> {
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

fn parse_number<T: FromStr>(field: &str, name: &str) -> std::result::Result<T, String> {
    field.parse().map_err(|_| format!("invalid {} {:?}", name, field))
}

// 1-based text position to 0-based; 0 means unavailable.
fn parse_position(field: &str, name: &str) -> std::result::Result<i32, String> {
    let pos: i32 = parse_number(field, name)?;
    if pos < 0 {
        return Err(format!("invalid {} {:?}", name, field));
    }
    Ok(pos - 1)
}

fn parse_reference(field: &str, header: &Header) -> std::result::Result<i32, String> {
    if field == "*" {
        return Ok(UNMAPPED);
    }
    header
        .reference_id(field)
        .ok_or_else(|| format!("unknown reference sequence {:?}", field))
}

fn parse_tag(field: &str) -> std::result::Result<(Tag, Value), String> {
    let mut parts = field.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(tag), Some(ty), Some(value)) => {
            let tag: Tag = tag.parse()?;
            let value = Value::parse_sam(ty, value).map_err(|e| format!("tag {}: {}", tag, e))?;
            Ok((tag, value))
        }
        _ => Err(format!("malformed optional field {:?}", field)),
    }
}

// Numbers are written back in their shortest form.
fn check_number<T: ToString>(field: &str, value: T, name: &str, rewrite: &mut Option<String>) {
    if rewrite.is_some() {
        return;
    }
    let canonical = value.to_string();
    if canonical != field {
        *rewrite = Some(format!("{} {:?} is written as {}", name, field, canonical));
    }
}

/// Parses one alignment line against `header`.
pub fn parse_record(line: &str, header: &Header) -> std::result::Result<Record, String> {
    parse_fields(line, header, false).map(|(record, _)| record)
}

// With `check_rewrite`, also describes the first field that the SAM writer
// would render differently.
fn parse_fields(
    line: &str,
    header: &Header,
    check_rewrite: bool,
) -> std::result::Result<(Record, Option<String>), String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MANDATORY_FIELDS {
        return Err(format!(
            "expected at least {} fields, found {}",
            MANDATORY_FIELDS,
            fields.len()
        ));
    }

    let read_name = match fields[0] {
        "*" => Vec::new(),
        "" => return Err("empty QNAME".to_string()),
        name => name.as_bytes().to_vec(),
    };
    // A placeholder stops the checks when they are not wanted.
    let mut rewrite = if check_rewrite { None } else { Some(String::new()) };
    let flag: u16 = parse_number(fields[1], "FLAG")?;
    check_number(fields[1], flag, "FLAG", &mut rewrite);
    let flags = Flags::from(flag);
    let reference_id = parse_reference(fields[2], header)?;
    let position = parse_position(fields[3], "POS")?;
    check_number(fields[3], position + 1, "POS", &mut rewrite);
    let mapq: u8 = parse_number(fields[4], "MAPQ")?;
    check_number(fields[4], mapq, "MAPQ", &mut rewrite);
    let cigar: Cigar = fields[5].parse()?;
    check_number(fields[5], &cigar, "CIGAR", &mut rewrite);
    let mate_reference_id = match fields[6] {
        "=" => reference_id,
        rnext => parse_reference(rnext, header)?,
    };
    if rewrite.is_none() && fields[6] != "=" && fields[6] != "*" && fields[6] == fields[2] {
        rewrite = Some(format!("RNEXT {:?} equal to RNAME is written as =", fields[6]));
    }
    let mate_position = parse_position(fields[7], "PNEXT")?;
    check_number(fields[7], mate_position + 1, "PNEXT", &mut rewrite);
    let template_length: i32 = parse_number(fields[8], "TLEN")?;
    check_number(fields[8], template_length, "TLEN", &mut rewrite);

    let sequence = match fields[9] {
        "*" => Vec::new(),
        seq if !seq.is_empty() && seq.bytes().all(is_valid_base) => {
            if rewrite.is_none() && seq.bytes().any(|b| b.is_ascii_lowercase()) {
                rewrite = Some("lowercase SEQ is written in uppercase".to_string());
            }
            seq.as_bytes().to_vec()
        }
        seq => return Err(format!("invalid SEQ {:?}", seq)),
    };
    let quality = match fields[10] {
        "*" => Vec::new(),
        qual if qual.bytes().all(|b| (b'!'..=b'~').contains(&b)) => {
            qual.bytes().map(|b| b - 33).collect()
        }
        qual => return Err(format!("invalid QUAL {:?}", qual)),
    };
    if !quality.is_empty() && quality.len() != sequence.len() {
        return Err(format!(
            "QUAL length {} does not match SEQ length {}",
            quality.len(),
            sequence.len()
        ));
    }
    if !cigar.is_empty() && !sequence.is_empty() && cigar.read_length() as usize != sequence.len() {
        warn!(
            "{}: CIGAR covers {} bases but SEQ has {}",
            fields[0],
            cigar.read_length(),
            sequence.len()
        );
    }

    let mut data = Data::new();
    for field in &fields[MANDATORY_FIELDS..] {
        let (tag, value) = parse_tag(field)?;
        // Skip the tag name and its colon.
        check_number(&field[3..], &value, "optional field", &mut rewrite);
        data.push(tag, value)?;
    }

    let record = Record::builder()
        .read_name(read_name)
        .flags(flags)
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
        .build();
    Ok((record, rewrite.filter(|_| check_rewrite)))
}
