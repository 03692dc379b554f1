const BASES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

fn base_code(base: u8) -> Option<u8> {
    let code = match base.to_ascii_uppercase() {
        b'=' => 0,
        b'A' => 1,
        b'C' => 2,
        b'M' => 3,
        b'G' => 4,
        b'R' => 5,
        b'S' => 6,
        b'V' => 7,
        b'T' => 8,
        b'W' => 9,
        b'Y' => 10,
        b'H' => 11,
        b'K' => 12,
        b'D' => 13,
        b'B' => 14,
        b'N' => 15,
        _ => return None,
    };
    Some(code)
}

/// Whether `base` (in either case) has a 4-bit code.
pub fn is_valid_base(base: u8) -> bool {
    base_code(base).is_some()
}

/// Packs bases two per byte, high nibble first. Lowercase bases are stored as
/// uppercase. Fails with the first base outside `=ACMGRSVTWYHKDBN`.
pub fn encode_seq(bases: &[u8], dest: &mut Vec<u8>) -> Result<(), u8> {
    let code = |b: u8| base_code(b).ok_or(b);
    dest.reserve((bases.len() + 1) / 2);
    for pair in bases.chunks(2) {
        let high = code(pair[0])? << 4;
        let low = match pair.get(1) {
            Some(&b) => code(b)?,
            None => 0,
        };
        dest.push(high | low);
    }
    Ok(())
}

/// Unpacks `len` bases. The spare low nibble of an odd-length sequence is
/// ignored.
pub fn decode_seq(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut res = Vec::with_capacity(len);
    for byte in bytes {
        res.push(BASES[(byte >> 4) as usize]);
        res.push(BASES[(byte & 0xf) as usize]);
    }
    res.truncate(len);
    res
}
