use bitflags::bitflags;

// https://github.com/samtools/htslib/blob/32de287eafdafc45dde0a22244b72697294f161d/htslib/sam.h
bitflags! {
    /// SAM FLAG field. Unknown bits are kept so they survive a round trip.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// The read is paired in sequencing, no matter whether it is mapped in a pair.
        const PAIRED = 0x1;
        /// The read is mapped in a proper pair.
        const PROPER_PAIR = 0x2;
        /// The read itself is unmapped; conflictive with PROPER_PAIR.
        const UNMAPPED = 0x4;
        /// The mate is unmapped.
        const MATE_UNMAPPED = 0x8;
        /// The read is mapped to the reverse strand.
        const REVERSE = 0x10;
        /// The mate is mapped to the reverse strand.
        const MATE_REVERSE = 0x20;
        /// This is read1.
        const READ1 = 0x40;
        /// This is read2.
        const READ2 = 0x80;
        /// Not primary alignment.
        const SECONDARY = 0x100;
        /// QC failure.
        const QC_FAIL = 0x200;
        /// Optical or PCR duplicate.
        const DUPLICATE = 0x400;
        /// Supplementary alignment.
        const SUPPLEMENTARY = 0x800;
    }
}

impl From<u16> for Flags {
    fn from(bits: u16) -> Self {
        Flags::from_bits_retain(bits)
    }
}

impl From<Flags> for u16 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}
