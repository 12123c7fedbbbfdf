use blake2b_simd::{Hash as Blake2bHash, Params as Blake2bParams, State as Blake2bState};
use byteorder::{LittleEndian, WriteBytesExt};

use crate::params::Params;

/// Produces the base hash state for the given parameters.
///
/// The state is personalised with the 8-byte tag `"ZcashPOW"` followed by
/// `n` and `k` as 32-bit little-endian words, and finalises to `n/8` bytes.
/// Callers absorb any block-header prefix into the returned state before
/// solving or verifying.
pub(crate) fn initialise_state(p: &Params) -> Blake2bState {
    let mut personalization: Vec<u8> = Vec::from("ZcashPOW");
    personalization.write_u32::<LittleEndian>(p.n).unwrap();
    personalization.write_u32::<LittleEndian>(p.k).unwrap();

    Blake2bParams::new()
        .hash_length(p.hash_length())
        .personal(&personalization)
        .to_state()
}

/// Derives the hash for leaf index `i`: clone the base state, absorb `i` as
/// a 32-bit little-endian word, finalise.
pub(crate) fn generate_hash(base_state: &Blake2bState, i: u32) -> Blake2bHash {
    let mut lei = [0u8; 4];
    (&mut lei[..]).write_u32::<LittleEndian>(i).unwrap();

    let mut state = base_state.clone();
    state.update(&lei);
    state.finalize()
}
