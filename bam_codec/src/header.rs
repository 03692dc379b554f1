use crate::error::{self, Error, Result};
use crate::MAGIC_NUMBER;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::ffi::CStr;
use std::io::{self, Read};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: u32,
}

/// SAM header. Lines are kept verbatim so the text can be written back
/// unchanged; reference sequences keep their declaration order, which defines
/// the reference indices used by records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    lines: Vec<String>,
    reference_sequences: Vec<ReferenceSequence>,
    name_to_id: HashMap<String, usize>,
}

impl Header {
    pub fn new() -> Self {
        Header::default()
    }

    /// Parses header text, one `@` line per text line.
    pub fn parse(text: &str) -> Result<Header> {
        let mut header = Header::new();
        for (i, line) in text.lines().enumerate() {
            header.push_line(line, i + 1)?;
        }
        Ok(header)
    }

    /// Validates and appends one header line. `line_no` is only used for
    /// error messages.
    pub fn push_line(&mut self, line: &str, line_no: usize) -> Result<()> {
        let bytes = line.as_bytes();
        if bytes.len() < 3
            || bytes[0] != b'@'
            || !bytes[1].is_ascii_alphabetic()
            || !bytes[2].is_ascii_alphabetic()
            || (bytes.len() > 3 && bytes[3] != b'\t')
        {
            return Err(Error::format(line_no, format!("malformed header line {:?}", line)));
        }

        let record_type = &line[1..3];
        if record_type != "CO" {
            let mut name = None;
            let mut length = None;
            for field in line.split('\t').skip(1) {
                let fb = field.as_bytes();
                if fb.len() < 3
                    || !fb[0].is_ascii_alphabetic()
                    || !fb[1].is_ascii_alphanumeric()
                    || fb[2] != b':'
                {
                    return Err(Error::format(
                        line_no,
                        format!("malformed header field {:?}", field),
                    ));
                }
                if record_type == "SQ" {
                    match &field[..2] {
                        "SN" => name = Some(&field[3..]),
                        "LN" => length = Some(&field[3..]),
                        _ => {}
                    }
                }
            }

            if record_type == "SQ" {
                let name = name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| Error::format(line_no, "@SQ line without SN"))?;
                let length = length
                    .ok_or_else(|| Error::format(line_no, "@SQ line without LN"))?
                    .parse::<u32>()
                    .ok()
                    .filter(|&l| l >= 1 && l <= i32::MAX as u32)
                    .ok_or_else(|| Error::format(line_no, "invalid @SQ LN"))?;
                self.add_reference(name, length)
                    .map_err(|reason| Error::format(line_no, reason))?;
            }
        }

        self.lines.push(line.to_string());
        Ok(())
    }

    fn add_reference(&mut self, name: &str, length: u32) -> std::result::Result<(), String> {
        if self.name_to_id.contains_key(name) {
            return Err(format!("duplicate reference sequence {}", name));
        }
        self.name_to_id.insert(name.to_string(), self.reference_sequences.len());
        self.reference_sequences.push(ReferenceSequence { name: name.to_string(), length });
        Ok(())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.reference_sequences.is_empty()
    }

    pub fn reference_sequences(&self) -> &[ReferenceSequence] {
        &self.reference_sequences
    }

    /// Index of a reference sequence by name.
    pub fn reference_id(&self, name: &str) -> Option<i32> {
        self.name_to_id.get(name).map(|&id| id as i32)
    }

    pub fn reference_name(&self, id: i32) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.reference_sequences.get(id))
            .map(|r| r.name.as_str())
    }

    /// Header text: the lines joined by `\n`, each terminated.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }

    /// Copy of the header whose `@HD` line carries `SO:<order>`.
    pub fn with_sort_order(&self, order: &str) -> Header {
        let mut header = self.clone();
        let sort_field = format!("SO:{}", order);
        match header.lines.iter_mut().find(|l| l.starts_with("@HD")) {
            Some(line) => {
                let mut fields: Vec<String> = line.split('\t').map(String::from).collect();
                match fields.iter_mut().skip(1).find(|f| f.starts_with("SO:")) {
                    Some(field) => *field = sort_field,
                    None => fields.push(sort_field),
                }
                *line = fields.join("\t");
            }
            None => header.lines.insert(0, format!("@HD\tVN:1.6\t{}", sort_field)),
        }
        header
    }

    /// Appends the BAM header: magic, text and the binary reference list.
    pub fn write_bam(&self, dest: &mut Vec<u8>) -> Result<()> {
        let text = self.text();
        let l_text = u32::try_from(text.len())
            .map_err(|_| Error::InvalidRecord("header text too long".to_string()))?;
        dest.extend_from_slice(MAGIC_NUMBER);
        dest.write_u32::<LittleEndian>(l_text)?;
        dest.extend_from_slice(text.as_bytes());
        dest.write_u32::<LittleEndian>(self.reference_sequences.len() as u32)?;
        for reference in &self.reference_sequences {
            dest.write_u32::<LittleEndian>(reference.name.len() as u32 + 1)?;
            dest.extend_from_slice(reference.name.as_bytes());
            dest.push(0);
            dest.write_u32::<LittleEndian>(reference.length)?;
        }
        Ok(())
    }

    /// Reads a BAM header. The binary reference list is authoritative; the
    /// text is kept line by line without re-validation.
    pub fn read_bam<R>(reader: &mut R) -> Result<Header>
    where
        R: Read + ?Sized,
    {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic).map_err(truncated)?;
        if magic != MAGIC_NUMBER {
            return Err(Error::InvalidBam("invalid BAM header".to_string()));
        }

        let l_text = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let mut text = vec![0; l_text];
        reader.read_exact(&mut text).map_err(truncated)?;
        // Plain header text in SAM; not necessarily NUL-terminated.
        while text.last() == Some(&0) {
            text.pop();
        }
        let text = String::from_utf8(text)
            .map_err(|e| Error::InvalidBam(format!("header text is not UTF-8: {}", e)))?;

        let mut header = Header::new();
        header.lines = text.lines().filter(|l| !l.is_empty()).map(String::from).collect();

        let n_ref = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        for _ in 0..n_ref {
            let (name, length) = read_reference_sequence(reader)?;
            header.add_reference(&name, length).map_err(Error::InvalidBam)?;
        }
        Ok(header)
    }
}

fn truncated(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::InvalidBam("truncated BAM header".to_string())
    } else {
        error::from_io(e)
    }
}

fn read_reference_sequence<R>(reader: &mut R) -> Result<(String, u32)>
where
    R: Read + ?Sized,
{
    let l_name = reader.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let mut c_name = vec![0; l_name];
    reader.read_exact(&mut c_name).map_err(truncated)?;
    let name = CStr::from_bytes_with_nul(&c_name)
        .map_err(|e| Error::InvalidBam(e.to_string()))?
        .to_str()
        .map_err(|e| Error::InvalidBam(e.to_string()))?
        .to_string();
    let l_ref = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    Ok((name, l_ref))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "@HD\tVN:1.6\tSO:unsorted\n@SQ\tSN:chr1\tLN:1000\n@SQ\tSN:chr2\tLN:500\n@CO\tfree text: anything\n";

    #[test]
    fn test_parse_keeps_text_and_order() {
        let header = Header::parse(TEXT).unwrap();
        assert_eq!(header.text(), TEXT);
        assert_eq!(header.reference_id("chr2"), Some(1));
        assert_eq!(header.reference_id("chr3"), None);
        assert_eq!(header.reference_name(0), Some("chr1"));
        assert_eq!(header.reference_name(-1), None);
    }

    #[test]
    fn test_rejects_malformed_lines() {
        let cases = [
            "HD\tVN:1.6",
            "@SQ\tSN:chr1",
            "@SQ\tLN:10",
            "@SQ\tSN:chr1\tLN:0",
            "@SQ\tSN:chr1\tLN:10\n@SQ\tSN:chr1\tLN:20",
            "@PG\tID",
        ];
        for text in cases {
            assert!(matches!(Header::parse(text), Err(Error::Format { .. })), "{}", text);
        }
    }

    #[test]
    fn test_error_reports_line_number() {
        match Header::parse("@HD\tVN:1.6\n@SQ\tSN:x") {
            Err(Error::Format { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_with_sort_order() {
        let header = Header::parse(TEXT).unwrap().with_sort_order("coordinate");
        assert_eq!(header.lines()[0], "@HD\tVN:1.6\tSO:coordinate");

        let bare = Header::parse("@SQ\tSN:chr1\tLN:10").unwrap().with_sort_order("coordinate");
        assert_eq!(bare.lines()[0], "@HD\tVN:1.6\tSO:coordinate");
        assert_eq!(bare.lines().len(), 2);
    }

    #[test]
    fn test_bam_round_trip() {
        let header = Header::parse(TEXT).unwrap();
        let mut bytes = Vec::new();
        header.write_bam(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], MAGIC_NUMBER);
        let decoded = Header::read_bam(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_truncated_bam_header() {
        let header = Header::parse(TEXT).unwrap();
        let mut bytes = Vec::new();
        header.write_bam(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(Header::read_bam(&mut &bytes[..]), Err(Error::InvalidBam(_))));
    }
}
