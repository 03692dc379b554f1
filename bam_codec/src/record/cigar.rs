use crate::U32_SIZE;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::fmt;
use std::slice::Iter;
use std::str::FromStr;

const OP_CODES: &[u8; 9] = b"MIDNSHP=X";

/// A single operation, packed the BAM way: `length << 4 | code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Op(pub u32);

impl Op {
    /// Builds an operation from its SAM letter and length.
    pub fn new(op_type: u8, length: u32) -> Option<Op> {
        if length >= 1 << 28 {
            return None;
        }
        OP_CODES
            .iter()
            .position(|&c| c == op_type)
            .map(|code| Op(length << 4 | code as u32))
    }

    /// True if operation is one of M, =, X, D, N
    pub fn is_consuming_reference(&self) -> bool {
        let op = self.0 & 0xF;
        matches!(op, 0 | 2 | 3 | 7 | 8)
    }

    /// Returns whether the operation kind causes the alignment to consume the read.
    pub fn consumes_read(&self) -> bool {
        let op = self.0 & 0xF;
        matches!(op, 0 | 1 | 4 | 7 | 8)
    }

    /// Length of operator
    pub fn length(&self) -> u32 {
        self.0 >> 4
    }

    /// SAM letter of the operation, `None` for codes 9..=15.
    pub fn op_type(&self) -> Option<char> {
        OP_CODES.get((self.0 & 0xF) as usize).map(|&c| c as char)
    }
}

/// CIGAR string. Empty means "unavailable" (`*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cigar(pub Vec<Op>);

impl Cigar {
    pub fn new(ops: Vec<Op>) -> Cigar {
        Cigar(ops)
    }

    pub fn ops(&self) -> Iter<Op> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Calculates the read length.
    ///
    /// This sums the lengths of the CIGAR operations that consume the read, i.e., alignment
    /// matches (`M`), insertions to the reference (`I`), soft clips (`S`), sequence matches (`=`),
    /// and sequence mismatches (`X`).
    pub fn read_length(&self) -> u32 {
        self.ops().filter(|op| op.consumes_read()).map(Op::length).sum()
    }

    /// Number of reference bases covered by the alignment.
    pub fn reference_span(&self) -> u32 {
        self.ops()
            .filter(|op| op.is_consuming_reference())
            .map(Op::length)
            .sum()
    }

    pub fn write_as_bytes(&self, bytes: &mut Vec<u8>) {
        for op in self.ops() {
            // Writing into a Vec can't fail.
            let _ = bytes.write_u32::<LittleEndian>(op.0);
        }
    }

    /// Unpacks BAM CIGAR words. Codes 9..=15 have no SAM letter and are
    /// rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Cigar, String> {
        bytes
            .chunks_exact(U32_SIZE)
            .map(|chunk| {
                let op = Op(LittleEndian::read_u32(chunk));
                match op.op_type() {
                    Some(_) => Ok(op),
                    None => Err(format!("invalid CIGAR operation code {}", op.0 & 0xF)),
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Cigar)
    }
}

impl FromStr for Cigar {
    type Err = String;

    /// Parses SAM CIGAR text; `*` yields an empty CIGAR.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Cigar::default());
        }
        if s.is_empty() {
            return Err("empty CIGAR".to_string());
        }

        let mut ops = Vec::new();
        let mut length: Option<u32> = None;
        for c in s.bytes() {
            if c.is_ascii_digit() {
                let digit = (c - b'0') as u32;
                length = Some(
                    length
                        .unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(digit))
                        .ok_or_else(|| format!("CIGAR operation length overflow in {}", s))?,
                );
            } else {
                let len = length
                    .take()
                    .ok_or_else(|| format!("CIGAR operation without length in {}", s))?;
                let op = Op::new(c, len)
                    .ok_or_else(|| format!("invalid CIGAR operation {}{}", len, c as char))?;
                ops.push(op);
            }
        }
        if length.is_some() {
            return Err(format!("CIGAR {} ends without an operation", s));
        }
        Ok(Cigar(ops))
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("*");
        }
        self.ops().try_for_each(|op| {
            write!(f, "{}{}", op.length(), op.op_type().unwrap_or('?'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cigar: Cigar = "5S10M2I3D1=1X".parse().unwrap();
        assert_eq!(cigar.len(), 6);
        assert_eq!(cigar.to_string(), "5S10M2I3D1=1X");
        assert_eq!(cigar.read_length(), 5 + 10 + 2 + 1 + 1);
        assert_eq!(cigar.reference_span(), 10 + 3 + 1 + 1);
    }

    #[test]
    fn test_star_is_empty() {
        let cigar: Cigar = "*".parse().unwrap();
        assert!(cigar.is_empty());
        assert_eq!(cigar.to_string(), "*");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("M".parse::<Cigar>().is_err());
        assert!("10".parse::<Cigar>().is_err());
        assert!("10Q".parse::<Cigar>().is_err());
        assert!("".parse::<Cigar>().is_err());
    }

    #[test]
    fn test_binary_round_trip() {
        let cigar: Cigar = "76M1N24M".parse().unwrap();
        let mut bytes = Vec::new();
        cigar.write_as_bytes(&mut bytes);
        assert_eq!(bytes.len(), 3 * U32_SIZE);
        assert_eq!(Cigar::from_bytes(&bytes).unwrap(), cigar);
    }

    #[test]
    fn test_unknown_binary_code_is_rejected() {
        let mut bytes = Vec::new();
        Cigar(vec![Op(10 << 4), Op(3 << 4 | 9)]).write_as_bytes(&mut bytes);
        assert!(Cigar::from_bytes(&bytes).unwrap_err().contains("code 9"));
        assert!(Cigar::from_bytes(&bytes[..U32_SIZE]).is_ok());
    }
}
