//! RFC 1951 DEFLATE inflater, implemented from scratch over `BitCursorLsb`
//! (spec §4.4). No crate in the retrieval pack hand-rolls DEFLATE, so this
//! module follows RFC 1951 directly; the canonical-Huffman decode loop
//! (count/offset table walked bit-by-bit) is the standard public-domain
//! technique for decoding canonical codes without building an explicit
//! code->symbol map.

use crate::error::{Error, ErrorKind, Result};
use crate::limits::DecodeLimits;
use crate::bitcursor::BitCursorLsb;

const CODE_LENGTH_ORDER: [usize; 19] =
    [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// A canonical Huffman decode table built from per-symbol code lengths.
struct HuffmanTable {
    counts: [u16; 16],
    symbols: Vec<u16>,
}

impl HuffmanTable {
    fn build(lengths: &[u8]) -> HuffmanTable {
        let mut counts = [0u16; 16];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut offsets = [0u16; 16];
        for len in 1..16 {
            offsets[len] = offsets[len - 1] + counts[len - 1];
        }

        let mut symbols = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                symbols[offsets[len as usize] as usize] = sym as u16;
                offsets[len as usize] += 1;
            }
        }
        HuffmanTable { counts, symbols }
    }

    fn decode(&self, bits: &mut BitCursorLsb) -> Result<u16> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..16usize {
            code |= bits.read_bit()? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + (code - first)) as usize]);
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }
        Err(Error::from(ErrorKind::CorruptDeflate(
            "huffman code not found".to_string(),
        )))
    }
}

fn fixed_literal_table() -> HuffmanTable {
    let mut lengths = [0u8; 288];
    for l in lengths.iter_mut().take(144) {
        *l = 8;
    }
    for l in lengths.iter_mut().take(256).skip(144) {
        *l = 9;
    }
    for l in lengths.iter_mut().take(280).skip(256) {
        *l = 7;
    }
    for l in lengths.iter_mut().take(288).skip(280) {
        *l = 8;
    }
    HuffmanTable::build(&lengths)
}

fn fixed_distance_table() -> HuffmanTable {
    HuffmanTable::build(&[5u8; 30])
}

fn read_dynamic_tables(bits: &mut BitCursorLsb) -> Result<(HuffmanTable, HuffmanTable)> {
    let hlit = bits.read_bits(5)? as usize + 257;
    let hdist = bits.read_bits(5)? as usize + 1;
    let hclen = bits.read_bits(4)? as usize + 4;

    let mut cl_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
        cl_lengths[slot] = bits.read_bits(3)? as u8;
    }
    let cl_table = HuffmanTable::build(&cl_lengths);

    let total = hlit + hdist;
    let mut lengths: Vec<u8> = Vec::with_capacity(total);
    while lengths.len() < total {
        let sym = cl_table.decode(bits)?;
        match sym {
            0..=15 => lengths.push(sym as u8),
            16 => {
                let prev = *lengths.last().ok_or_else(|| {
                    Error::from(ErrorKind::CorruptDeflate(
                        "repeat-previous code with no previous length".to_string(),
                    ))
                })?;
                let rep = bits.read_bits(2)? + 3;
                for _ in 0..rep {
                    lengths.push(prev);
                }
            }
            17 => {
                let rep = bits.read_bits(3)? + 3;
                for _ in 0..rep {
                    lengths.push(0);
                }
            }
            18 => {
                let rep = bits.read_bits(7)? + 11;
                for _ in 0..rep {
                    lengths.push(0);
                }
            }
            _ => {
                return Err(Error::from(ErrorKind::CorruptDeflate(
                    "code-length alphabet overrun".to_string(),
                )))
            }
        }
    }
    if lengths.len() != total {
        return Err(Error::from(ErrorKind::CorruptDeflate(
            "code-length alphabet overrun".to_string(),
        )));
    }
    let lit_table = HuffmanTable::build(&lengths[..hlit]);
    let dist_table = HuffmanTable::build(&lengths[hlit..]);
    Ok((lit_table, dist_table))
}

fn inflate_stored_block(bits: &mut BitCursorLsb, out: &mut Vec<u8>) -> Result<()> {
    bits.align_to_byte();
    let len = bits.read_u16_le()?;
    let nlen = bits.read_u16_le()?;
    if len != !nlen {
        return Err(Error::from(ErrorKind::CorruptDeflate(
            "stored block LEN/NLEN mismatch".to_string(),
        )));
    }
    for _ in 0..len {
        out.push(bits.read_byte()?);
    }
    Ok(())
}

fn inflate_huffman_block(
    bits: &mut BitCursorLsb,
    lit: &HuffmanTable,
    dist: &HuffmanTable,
    out: &mut Vec<u8>,
) -> Result<()> {
    loop {
        let sym = lit.decode(bits)?;
        if sym < 256 {
            out.push(sym as u8);
            continue;
        }
        if sym == 256 {
            return Ok(());
        }
        let idx = (sym - 257) as usize;
        if idx >= LENGTH_BASE.len() {
            return Err(Error::from(ErrorKind::CorruptDeflate(
                "length symbol out of range".to_string(),
            )));
        }
        let extra = bits.read_bits(LENGTH_EXTRA[idx] as u32)?;
        let length = LENGTH_BASE[idx] as usize + extra as usize;

        let dsym = dist.decode(bits)? as usize;
        if dsym >= DIST_BASE.len() {
            return Err(Error::from(ErrorKind::CorruptDeflate(
                "distance symbol out of range".to_string(),
            )));
        }
        let dextra = bits.read_bits(DIST_EXTRA[dsym] as u32)?;
        let distance = DIST_BASE[dsym] as usize + dextra as usize;

        if distance > out.len() {
            return Err(Error::from(ErrorKind::CorruptDeflate(
                "back-reference distance larger than decoded output".to_string(),
            )));
        }
        let start = out.len() - distance;
        for i in 0..length {
            let b = out[start + i];
            out.push(b);
        }
    }
}

/// Decompresses a raw DEFLATE stream. `expected_size` bounds the initial
/// allocation; the inflater still grows `out` past it if the stream decodes
/// to more bytes than declared (the caller's declared size is a hint, not a
/// hard cap — `limits` is the hard cap).
pub fn inflate(data: &[u8], expected_size: usize, limits: &DecodeLimits) -> Result<Vec<u8>> {
    if expected_size > limits.max_uncompressed_size {
        return Err(Error::from(ErrorKind::CorruptDeflate(format!(
            "declared uncompressed size {} exceeds limit {}",
            expected_size, limits.max_uncompressed_size
        ))));
    }
    debug!("Inflating, expected size {}", expected_size);
    let mut bits = BitCursorLsb::new(data);
    let mut out = Vec::with_capacity(expected_size.min(limits.max_uncompressed_size));

    loop {
        let bfinal = bits.read_bits(1)?;
        let btype = bits.read_bits(2)?;
        debug!("Block type {}, final {}", btype, bfinal == 1);
        match btype {
            0 => inflate_stored_block(&mut bits, &mut out)?,
            1 => {
                let lit = fixed_literal_table();
                let dist = fixed_distance_table();
                inflate_huffman_block(&mut bits, &lit, &dist, &mut out)?;
            }
            2 => {
                let (lit, dist) = read_dynamic_tables(&mut bits)?;
                inflate_huffman_block(&mut bits, &lit, &dist, &mut out)?;
            }
            _ => {
                return Err(Error::from(ErrorKind::CorruptDeflate(
                    "invalid block type 3 (reserved)".to_string(),
                )))
            }
        }
        if out.len() > limits.max_uncompressed_size {
            return Err(Error::from(ErrorKind::CorruptDeflate(
                "decoded output exceeds size limit".to_string(),
            )));
        }
        if bfinal == 1 {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// "Hello" encoded as a single fixed-Huffman final block (S6).
    #[test]
    fn inflates_fixed_huffman_hello() {
        let data = [0xF3, 0xC8, 0xCC, 0xC9, 0x29, 0x06, 0x00];
        let out = inflate(&data, 5, &DecodeLimits::default()).unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn inflates_stored_block() {
        // BFINAL=1, BTYPE=00 (stored), align, LEN=5,NLEN=~5, then "Hello".
        // bit0 = 1 (BFINAL), bits 1-2 = 00 (BTYPE); rest of first byte padding.
        let mut data = vec![0b0000_0001u8];
        data.extend_from_slice(&5u16.to_le_bytes());
        data.extend_from_slice(&(!5u16).to_le_bytes());
        data.extend_from_slice(b"Hello");
        let out = inflate(&data, 5, &DecodeLimits::default()).unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn rejects_back_reference_before_any_output() {
        // BFINAL=1, BTYPE=1 (fixed), then length-symbol 257 (len 3) and
        // distance-symbol 0 (distance 1) with an empty output so far.
        let data = [0x03, 0x02];
        let result = inflate(&data, 0, &DecodeLimits::default());
        assert!(result.is_err());
    }

    #[test]
    fn rejects_reserved_block_type() {
        // BFINAL=1, BTYPE=11 (reserved): bits 1,1,1 -> byte 0b0000_0111.
        let data = [0b0000_0111u8];
        let result = inflate(&data, 0, &DecodeLimits::default());
        assert!(result.is_err());
    }
}
