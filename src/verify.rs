//! Verification functions for the [Equihash] proof-of-work algorithm.
//!
//! [Equihash]: https://zips.z.cash/protocol/protocol.pdf#equihash

use std::fmt;

use blake2b_simd::State as Blake2bState;
use tracing::debug;

use crate::hash::initialise_state;
use crate::minimal::indices_from_minimal;
use crate::params::Params;
use crate::row::{distinct_indices, has_collision, StepRow};

/// An Equihash operation failed: the parameters are invalid, the pipeline
/// was driven with mismatched rows, or a solution failed to verify.
#[derive(Debug)]
pub struct Error(pub(crate) Kind);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    InvalidParams,
    LengthMismatch,
    Collision,
    OutOfOrder,
    DuplicateIdxs,
    NonZeroRootHash,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::InvalidParams => f.write_str("invalid parameters"),
            Kind::LengthMismatch => f.write_str("mismatched hash or index history length"),
            Kind::Collision => f.write_str("invalid collision length between StepRows"),
            Kind::OutOfOrder => f.write_str("Index tree incorrectly ordered"),
            Kind::DuplicateIdxs => f.write_str("duplicate indices"),
            Kind::NonZeroRootHash => f.write_str("root hash of tree is non-zero"),
        }
    }
}

fn validate_subtrees(p: &Params, a: &StepRow<u32>, b: &StepRow<u32>) -> Result<(), Kind> {
    if !has_collision(a, b, p.collision_byte_length()) {
        debug!("Invalid solution: invalid collision length between StepRows");
        debug!("X[i]   = {}", hex::encode(a.hash()));
        debug!("X[i+1] = {}", hex::encode(b.hash()));
        Err(Kind::Collision)
    } else if b.indices_before(a) {
        debug!("Invalid solution: Index tree incorrectly ordered");
        Err(Kind::OutOfOrder)
    } else if !distinct_indices(a, b) {
        debug!("Invalid solution: duplicate indices");
        Err(Kind::DuplicateIdxs)
    } else {
        Ok(())
    }
}

fn tree_validator(
    p: &Params,
    state: &Blake2bState,
    indices: &[u32],
) -> Result<StepRow<u32>, Error> {
    if indices.len() > 1 {
        let mid = indices.len() / 2;
        let a = tree_validator(p, state, &indices[..mid])?;
        let b = tree_validator(p, state, &indices[mid..])?;
        validate_subtrees(p, &a, &b).map_err(Error)?;
        // validate_subtrees has established the canonical order, so the
        // merge never swaps the operands.
        let mut row = StepRow::xor(&a, &b)?;
        row.trim_hash(p.collision_byte_length());
        Ok(row)
    } else {
        Ok(StepRow::leaf(state, indices[0]))
    }
}

/// Validates the collision tree implied by a `2^k`-index tuple.
///
/// The caller is responsible for checking the tuple length; recursion is
/// faster than the level-by-level rebuild and trims as it goes, so only the
/// final collision bytes of the root remain to be checked.
pub(crate) fn is_valid_indexed_solution(
    p: &Params,
    state: &Blake2bState,
    indices: &[u32],
) -> Result<(), Error> {
    let root = tree_validator(p, state, indices)?;

    if root.is_zero() {
        Ok(())
    } else {
        debug!("Invalid solution: root hash of tree is non-zero");
        Err(Error(Kind::NonZeroRootHash))
    }
}

/// Iterative variant of [`is_valid_indexed_solution`], consuming the row
/// list two at a time per level. Kept as a cross-check on the recursive
/// validator.
#[cfg(test)]
pub(crate) fn is_valid_indexed_solution_iterative(
    p: &Params,
    state: &Blake2bState,
    indices: &[u32],
) -> Result<(), Error> {
    let mut rows: Vec<StepRow<u32>> = indices.iter().map(|i| StepRow::leaf(state, *i)).collect();

    while rows.len() > 1 {
        let mut cur_rows = Vec::new();
        for pair in rows.chunks(2) {
            validate_subtrees(p, &pair[0], &pair[1]).map_err(Error)?;
            let mut row = StepRow::xor(&pair[0], &pair[1])?;
            row.trim_hash(p.collision_byte_length());
            cur_rows.push(row);
        }
        rows = cur_rows;
    }

    if rows[0].is_zero() {
        Ok(())
    } else {
        Err(Error(Kind::NonZeroRootHash))
    }
}

/// Checks whether `soln` is a valid solution for `(input, nonce)` with the
/// parameters `(n, k)`, in the minimal byte encoding.
pub fn is_valid_solution(
    n: u32,
    k: u32,
    input: &[u8],
    nonce: &[u8],
    soln: &[u8],
) -> Result<(), Error> {
    let p = Params::new(n, k).ok_or(Error(Kind::InvalidParams))?;
    let indices = indices_from_minimal(&p, soln).ok_or(Error(Kind::InvalidParams))?;

    let mut state = initialise_state(&p);
    state.update(input);
    state.update(nonce);

    is_valid_indexed_solution(&p, &state, &indices)
}
