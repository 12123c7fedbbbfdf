use std::io::Cursor;
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt};

use crate::params::Params;

pub(crate) fn expand_array(vin: &[u8], bit_len: usize, byte_pad: usize) -> Vec<u8> {
    assert!(bit_len >= 8);
    assert!(u32::BITS as usize >= 7 + bit_len);

    let out_width = (bit_len + 7) / 8 + byte_pad;
    let out_len = 8 * out_width * vin.len() / bit_len;

    // Shortcut for parameters where expansion is a no-op
    if out_len == vin.len() {
        return vin.to_vec();
    }

    let mut vout: Vec<u8> = vec![0; out_len];
    let bit_len_mask: u32 = (1 << bit_len) - 1;

    // The acc_bits least-significant bits of acc_value represent a bit sequence
    // in big-endian order.
    let mut acc_bits = 0;
    let mut acc_value: u32 = 0;

    let mut j = 0;
    for b in vin {
        acc_value = (acc_value << 8) | u32::from(*b);
        acc_bits += 8;

        // When we have bit_len or more bits in the accumulator, write the next
        // output element.
        if acc_bits >= bit_len {
            acc_bits -= bit_len;
            for x in byte_pad..out_width {
                vout[j + x] = ((
                    // Big-endian
                    acc_value >> (acc_bits + (8 * (out_width - x - 1)))
                ) & (
                    // Apply bit_len_mask across byte boundaries
                    (bit_len_mask >> (8 * (out_width - x - 1))) & 0xFF
                )) as u8;
            }
            j += out_width;
        }
    }

    vout
}

pub(crate) fn compress_array(vin: &[u8], out_len: usize, bit_len: usize, byte_pad: usize) -> Vec<u8> {
    assert!(bit_len >= 8);
    assert!(u32::BITS as usize >= 7 + bit_len);

    let in_width = (bit_len + 7) / 8 + byte_pad;
    assert!(out_len == bit_len * vin.len() / (8 * in_width));

    let mut vout = Vec::with_capacity(out_len);
    let bit_len_mask: u32 = (1 << bit_len) - 1;

    // The acc_bits least-significant bits of acc_value represent a bit sequence
    // in big-endian order.
    let mut acc_bits: usize = 0;
    let mut acc_value: u32 = 0;

    let mut j = 0;
    for _ in 0..out_len {
        // When we have fewer than 8 bits left in the accumulator, read the next
        // input element.
        if acc_bits < 8 {
            acc_value <<= bit_len;
            for x in byte_pad..in_width {
                acc_value |= u32::from(
                    // Apply bit_len_mask across byte boundaries
                    vin[j + x] & ((bit_len_mask >> (8 * (in_width - x - 1))) & 0xFF) as u8,
                ) << (8 * (in_width - x - 1)); // Big-endian
            }
            j += in_width;
            acc_bits += bit_len;
        }

        acc_bits -= 8;
        vout.push((acc_value >> acc_bits) as u8);
    }

    vout
}

/// Returns `None` if the parameters are invalid for this minimal encoding.
pub(crate) fn indices_from_minimal(p: &Params, minimal: &[u8]) -> Option<Vec<u32>> {
    let c_bit_len = p.collision_bit_length();
    // The encoding requires an exact byte length, which k >= 3 guarantees.
    if (p.solution_width() * (c_bit_len + 1)) % 8 != 0
        || minimal.len() != (p.solution_width() * (c_bit_len + 1)) / 8
    {
        return None;
    }

    assert!(((c_bit_len + 1) + 7) / 8 <= size_of::<u32>());
    let len_indices = u32::BITS as usize * minimal.len() / (c_bit_len + 1);
    let byte_pad = size_of::<u32>() - ((c_bit_len + 1) + 7) / 8;

    let mut csr = Cursor::new(expand_array(minimal, c_bit_len + 1, byte_pad));
    let mut ret = Vec::with_capacity(len_indices);

    // Big-endian so that lexicographic array comparison is equivalent to integer
    // comparison
    while let Ok(i) = csr.read_u32::<BigEndian>() {
        ret.push(i);
    }

    Some(ret)
}

/// Packs an index tuple into the minimal byte encoding: each `(N+1)`-bit
/// index big-endian, concatenated without padding.
///
/// Returns `None` if the encoding has no exact byte length for these
/// parameters, or if the tuple is not `2^k` indices long.
pub(crate) fn minimal_from_indices(p: &Params, indices: &[u32]) -> Option<Vec<u8>> {
    let c_bit_len = p.collision_bit_length();
    if (p.solution_width() * (c_bit_len + 1)) % 8 != 0 || indices.len() != p.solution_width() {
        return None;
    }

    let index_bytes = size_of::<u32>();
    let min_len = (c_bit_len + 1) * indices.len() / 8;
    let byte_pad = index_bytes - ((c_bit_len + 1) + 7) / 8;

    // Big-endian so that lexicographic array comparison is equivalent to
    // integer comparison
    let array: Vec<u8> = indices.iter().flat_map(|i| i.to_be_bytes()).collect();

    Some(compress_array(&array, min_len, c_bit_len + 1, byte_pad))
}
