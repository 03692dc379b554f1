#![allow(dead_code)]

use std::fmt::Write as _;

pub const REFERENCES: [(&str, u32); 3] = [("chr1", 200_000), ("chr2", 150_000), ("chrM", 16_299)];

const BASES: &[u8] = b"ACGT";

// Small deterministic generator so every run sees the same input.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

pub fn header_text() -> String {
    let mut text = String::from("@HD\tVN:1.6\tSO:unsorted\n");
    for (name, length) in REFERENCES {
        let _ = writeln!(text, "@SQ\tSN:{}\tLN:{}", name, length);
    }
    text.push_str("@RG\tID:grp1\tSM:sample\n@PG\tID:gen\tPN:synthetic\n");
    text
}

/// SAM text with `n` records in random coordinate order, some unmapped and
/// some carrying each kind of optional field.
pub fn synthetic_sam(n: usize, seed: u64) -> String {
    let mut rng = Lcg(seed);
    let mut text = header_text();
    for i in 0..n {
        let len = 20 + rng.below(60) as usize;
        let seq: String = (0..len).map(|_| BASES[rng.below(4) as usize] as char).collect();
        let qual: String = (0..len).map(|_| (b'!' + rng.below(41) as u8) as char).collect();
        if rng.below(10) == 0 {
            let _ = writeln!(text, "read{}\t4\t*\t0\t0\t*\t*\t0\t0\t{}\t{}\tRG:Z:grp1", i, seq, qual);
            continue;
        }
        let (rname, length) = REFERENCES[rng.below(3) as usize];
        let pos = 1 + rng.below((length as u64) - 100);
        let flag = if rng.below(2) == 0 { 0 } else { 16 };
        let _ = write!(
            text,
            "read{}\t{}\t{}\t{}\t{}\t{}M\t*\t0\t0\t{}\t{}\tRG:Z:grp1\tNM:i:{}",
            i,
            flag,
            rname,
            pos,
            rng.below(61),
            len,
            seq,
            qual,
            rng.below(5)
        );
        if i % 7 == 0 {
            let _ = write!(text, "\tXS:i:-{}\tXF:f:{}\tXB:B:S,{},{}", rng.below(300) + 1, 0.5, rng.below(65536), rng.below(9));
        }
        text.push('\n');
    }
    text
}
