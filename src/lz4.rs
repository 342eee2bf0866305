//! LZ4 block-format compression
//!
//! Implements the LZ4 block format used for per-chunk compression: a stream
//! of sequences `{token, extra literal lengths, literals, 16-bit
//! little-endian offset, extra match lengths}`. Matches reference back at
//! most 65535 bytes and are at least 4 bytes long; the final 5 bytes of the
//! input are always emitted as literals.
//!
//! This is the block format only. Frame-format headers, checksums and
//! dictionaries are out of scope here; the container wraps each compressed
//! chunk with its own uncompressed-size prefix instead.

use crate::error::{Error, Result};

/// Minimum match length in the block format
const MIN_MATCH: usize = 4;

/// Number of trailing input bytes that must be emitted as literals
const LAST_LITERALS: usize = 5;

/// Fibonacci-style multiplier for the 4-byte sequence hash
const HASH_MULTIPLIER: u32 = 2654435769;

/// Log2 of the hash table size (16-bit hashes)
const HASH_BITS: u32 = 16;

/// Compression is only worthwhile below this output/input ratio
const GATING_PERCENT: u64 = 95;

#[inline]
fn hash_sequence(seq: u32) -> usize {
    (seq.wrapping_mul(HASH_MULTIPLIER) >> (32 - HASH_BITS)) as usize
}

#[inline]
fn read_u32_le(data: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}

/// Write a length field extension: runs of 0xFF plus a final remainder byte
fn write_length_extension(out: &mut Vec<u8>, mut remaining: usize) {
    while remaining >= 255 {
        out.push(255);
        remaining -= 255;
    }
    out.push(remaining as u8);
}

/// Emit one sequence: literals followed by an optional match
fn write_sequence(out: &mut Vec<u8>, literals: &[u8], m: Option<(u16, usize)>) {
    let lit_len = literals.len();
    let match_len = m.map(|(_, len)| len - MIN_MATCH);

    let lit_nibble = lit_len.min(15) as u8;
    let match_nibble = match_len.map_or(0, |l| l.min(15)) as u8;
    out.push((lit_nibble << 4) | match_nibble);

    if lit_len >= 15 {
        write_length_extension(out, lit_len - 15);
    }
    out.extend_from_slice(literals);

    if let Some((offset, _)) = m {
        out.extend_from_slice(&offset.to_le_bytes());
        if let Some(l) = match_len {
            if l >= 15 {
                write_length_extension(out, l - 15);
            }
        }
    }
}

/// Compress `input` in LZ4 block format.
///
/// Returns `None` when the compressed output would be at least 95% of the
/// input length, signalling the caller to store the chunk uncompressed.
pub fn compress(input: &[u8]) -> Option<Vec<u8>> {
    let n = input.len();
    let mut out = Vec::with_capacity(n / 2 + 16);

    // Match end limit: the last 5 bytes stay literal
    let limit = n.saturating_sub(LAST_LITERALS);

    // Hash table of positions, offset by one so zero means empty
    let mut table = vec![0u32; 1 << HASH_BITS];

    let mut anchor = 0usize;
    let mut pos = 0usize;

    while pos + MIN_MATCH <= limit {
        let seq = read_u32_le(input, pos);
        let slot = hash_sequence(seq);
        let candidate = table[slot] as usize;
        table[slot] = (pos + 1) as u32;

        if candidate > 0 {
            let cand_pos = candidate - 1;
            let distance = pos - cand_pos;
            if distance <= u16::MAX as usize && read_u32_le(input, cand_pos) == seq {
                let mut match_len = MIN_MATCH;
                while pos + match_len < limit && input[cand_pos + match_len] == input[pos + match_len]
                {
                    match_len += 1;
                }
                write_sequence(
                    &mut out,
                    &input[anchor..pos],
                    Some((distance as u16, match_len)),
                );
                pos += match_len;
                anchor = pos;
                continue;
            }
        }
        pos += 1;
    }

    // Trailing literal-only sequence
    write_sequence(&mut out, &input[anchor..], None);

    if out.len() as u64 * 100 >= n as u64 * GATING_PERCENT {
        None
    } else {
        Some(out)
    }
}

/// Read a length field extension at `pos`, returning (extra, new_pos)
fn read_length_extension(input: &[u8], mut pos: usize) -> Result<(usize, usize)> {
    let mut extra = 0usize;
    loop {
        let b = *input
            .get(pos)
            .ok_or_else(|| Error::corrupted("LZ4 length extension past end of block"))?;
        pos += 1;
        extra += b as usize;
        if b != 255 {
            return Ok((extra, pos));
        }
    }
}

/// Decompress an LZ4 block into exactly `expected_len` bytes.
///
/// Fails with [`Error::CorruptedStream`] when a match offset points before
/// the start of the output, when a literal or match run would read past the
/// end of the block, or when the output length does not come out right.
/// Output growth is bounded against `expected_len` before every copy, so a
/// crafted block cannot force an allocation beyond the declared size.
pub fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0usize;

    while pos < input.len() {
        let token = input[pos];
        pos += 1;

        // Literals
        let mut lit_len = (token >> 4) as usize;
        if lit_len == 15 {
            let (extra, new_pos) = read_length_extension(input, pos)?;
            lit_len += extra;
            pos = new_pos;
        }
        if pos + lit_len > input.len() {
            return Err(Error::corrupted("LZ4 literal run past end of block"));
        }
        if out.len() + lit_len > expected_len {
            return Err(Error::corrupted(format!(
                "LZ4 literal run grows output past expected {} bytes",
                expected_len
            )));
        }
        out.extend_from_slice(&input[pos..pos + lit_len]);
        pos += lit_len;

        // The final sequence carries no match
        if pos == input.len() {
            break;
        }

        // Match
        if pos + 2 > input.len() {
            return Err(Error::corrupted("LZ4 match offset past end of block"));
        }
        let offset = u16::from_le_bytes([input[pos], input[pos + 1]]) as usize;
        pos += 2;
        if offset == 0 || offset > out.len() {
            return Err(Error::corrupted(format!(
                "LZ4 match offset {} outside window of {} bytes",
                offset,
                out.len()
            )));
        }

        let mut match_len = (token & 0x0F) as usize;
        if match_len == 15 {
            let (extra, new_pos) = read_length_extension(input, pos)?;
            match_len += extra;
            pos = new_pos;
        }
        match_len += MIN_MATCH;
        if out.len() + match_len > expected_len {
            return Err(Error::corrupted(format!(
                "LZ4 match of {} bytes grows output past expected {} bytes",
                match_len, expected_len
            )));
        }

        // Byte-by-byte copy; matches may overlap their own output
        let mut src = out.len() - offset;
        for _ in 0..match_len {
            let b = out[src];
            out.push(b);
            src += 1;
        }
    }

    if out.len() != expected_len {
        return Err(Error::corrupted(format!(
            "LZ4 block decompressed to {} bytes, expected {}",
            out.len(),
            expected_len
        )));
    }
    Ok(out)
}
