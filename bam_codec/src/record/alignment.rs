use super::cigar::Cigar;
use super::data::Data;
use super::flags::Flags;
use crate::UNMAPPED;

/// Fixed-size part of a BAM record after `block_size`.
pub(crate) const FIXED_FIELDS_SIZE: usize = 32;

/// One alignment line. Positions are 0-based, `-1` when absent; an empty
/// sequence or quality stands for `*`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    read_name: Vec<u8>,
    flags: Flags,
    reference_id: i32,
    position: i32,
    mapq: u8,
    cigar: Cigar,
    mate_reference_id: i32,
    mate_position: i32,
    template_length: i32,
    sequence: Vec<u8>,
    quality: Vec<u8>,
    data: Data,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            read_name: Vec::new(),
            flags: Flags::empty(),
            reference_id: UNMAPPED,
            position: UNMAPPED,
            mapq: 255,
            cigar: Cigar::default(),
            mate_reference_id: UNMAPPED,
            mate_position: UNMAPPED,
            template_length: 0,
            sequence: Vec::new(),
            quality: Vec::new(),
            data: Data::default(),
        }
    }
}

impl Record {
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// Read name without the trailing NUL. Empty means `*`.
    pub fn read_name(&self) -> &[u8] {
        &self.read_name
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn reference_id(&self) -> i32 {
        self.reference_id
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn mapq(&self) -> u8 {
        self.mapq
    }

    pub fn cigar(&self) -> &Cigar {
        &self.cigar
    }

    pub fn mate_reference_id(&self) -> i32 {
        self.mate_reference_id
    }

    pub fn mate_position(&self) -> i32 {
        self.mate_position
    }

    pub fn template_length(&self) -> i32 {
        self.template_length
    }

    /// Bases as uppercase ASCII.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Raw phred scores (not offset by 33).
    pub fn quality(&self) -> &[u8] {
        &self.quality
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Size of the BAM encoding, `block_size` prefix included. Used to cut
    /// record streams into blocks.
    pub fn encoded_len(&self) -> usize {
        let l_seq = self.sequence.len();
        4 + FIXED_FIELDS_SIZE
            // A missing name is stored as `*`.
            + self.read_name.len().max(1)
            + 1
            + self.cigar.len() * 4
            + (l_seq + 1) / 2
            + l_seq
            + self.data.encoded_len()
    }
}

/// Builds a [`Record`]. Unset fields take the values of an unmapped record
/// with no name.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    record: Record,
}

impl RecordBuilder {
    pub fn read_name(mut self, name: impl Into<Vec<u8>>) -> Self {
        self.record.read_name = name.into();
        self
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.record.flags = flags;
        self
    }

    pub fn reference_id(mut self, id: i32) -> Self {
        self.record.reference_id = id;
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.record.position = position;
        self
    }

    pub fn mapq(mut self, mapq: u8) -> Self {
        self.record.mapq = mapq;
        self
    }

    pub fn cigar(mut self, cigar: Cigar) -> Self {
        self.record.cigar = cigar;
        self
    }

    pub fn mate_reference_id(mut self, id: i32) -> Self {
        self.record.mate_reference_id = id;
        self
    }

    pub fn mate_position(mut self, position: i32) -> Self {
        self.record.mate_position = position;
        self
    }

    pub fn template_length(mut self, tlen: i32) -> Self {
        self.record.template_length = tlen;
        self
    }

    pub fn sequence(mut self, bases: impl Into<Vec<u8>>) -> Self {
        self.record.sequence = bases.into();
        self.record.sequence.make_ascii_uppercase();
        self
    }

    pub fn quality(mut self, quality: impl Into<Vec<u8>>) -> Self {
        self.record.quality = quality.into();
        self
    }

    pub fn data(mut self, data: Data) -> Self {
        self.record.data = data;
        self
    }

    pub fn build(self) -> Record {
        self.record
    }
}
