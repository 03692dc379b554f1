use crate::error::{Error, Result};
use crate::{Header, Record, UNMAPPED};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

/// Renders records as SAM text.
pub struct Writer<W: Write> {
    inner: W,
    header: Arc<Header>,
    line: String,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W, header: Arc<Header>) -> Self {
        Writer { inner, header, line: String::new() }
    }

    /// Writes the header lines. Optional; a header-less SAM is still valid
    /// for comparison purposes.
    pub fn write_header(&mut self) -> Result<()> {
        self.inner.write_all(self.header.text().as_bytes())?;
        Ok(())
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.line.clear();
        format_record(record, &self.header, &mut self.line)?;
        self.line.push('\n');
        self.inner.write_all(self.line.as_bytes())?;
        Ok(())
    }

    /// Flushes and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn reference_name<'h>(header: &'h Header, id: i32) -> Result<&'h str> {
    if id == UNMAPPED {
        return Ok("*");
    }
    header
        .reference_name(id)
        .ok_or_else(|| Error::InvalidRecord(format!("reference index {} not in header", id)))
}

/// Appends the SAM line of `record`, without the newline.
pub fn format_record(record: &Record, header: &Header, line: &mut String) -> Result<()> {
    let name = match record.read_name() {
        [] => Cow::Borrowed("*"),
        name => String::from_utf8_lossy(name),
    };
    let rname = reference_name(header, record.reference_id())?;
    let rnext = if record.mate_reference_id() != UNMAPPED
        && record.mate_reference_id() == record.reference_id()
    {
        "="
    } else {
        reference_name(header, record.mate_reference_id())?
    };

    // Writing into a String can't fail.
    let _ = write!(
        line,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        name,
        u16::from(record.flags()),
        rname,
        record.position() as i64 + 1,
        record.mapq(),
        record.cigar(),
        rnext,
        record.mate_position() as i64 + 1,
        record.template_length(),
    );

    match record.sequence() {
        [] => line.push('*'),
        seq => line.extend(seq.iter().map(|&b| b as char)),
    }
    line.push('\t');
    match record.quality() {
        [] => line.push('*'),
        qual => line.extend(qual.iter().map(|&q| (q.saturating_add(33)) as char)),
    }

    for (tag, value) in record.data().iter() {
        let _ = write!(line, "\t{}:{}", tag, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sam::reader::Reader;

    const TEXT: &str = "@HD\tVN:1.6\tSO:unsorted\n\
@SQ\tSN:chr1\tLN:1000\n\
@SQ\tSN:chr2\tLN:1000\n\
r1\t99\tchr1\t100\t60\t2S4M\t=\t200\t104\tNNACGT\t#!IIII\tNM:i:0\tXB:B:c,-1,2\tXF:f:0.5\n\
r2\t65\tchr1\t7\t0\t3M\tchr2\t9\t0\tACG\t*\tXA:A:q\tXH:H:CAFE\n\
r3\t4\t*\t0\t255\t*\t*\t0\t0\t*\t*\n";

    fn rewrite(text: &str, include_header: bool) -> String {
        let mut reader = Reader::new(text.as_bytes()).unwrap();
        let mut writer = Writer::new(Vec::new(), reader.header().clone());
        if include_header {
            writer.write_header().unwrap();
        }
        for record in reader.records() {
            writer.write_record(&record.unwrap()).unwrap();
        }
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!(rewrite(TEXT, true), TEXT);
    }

    #[test]
    fn test_headerless_output() {
        let out = rewrite(TEXT, false);
        assert!(out.starts_with("r1\t"));
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_unknown_reference_index() {
        let header = Arc::new(Header::new());
        let record = Record::builder().read_name("r").reference_id(3).position(0).build();
        let mut writer = Writer::new(Vec::new(), header);
        assert!(matches!(writer.write_record(&record), Err(Error::InvalidRecord(_))));
    }
}
