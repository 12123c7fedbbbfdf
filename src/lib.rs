//! The [Equihash] Proof-of-Work function.
//!
//! Equihash, due to Biryukov and Khovratovich, is an asymmetric
//! proof-of-work based on the Generalized Birthday Problem: find `2^k`
//! distinct hash inputs whose outputs XOR to zero, under a tree-structured
//! collision schedule that zeroes `n/(k+1)` bits per level. This crate
//! provides the reference solver, a memory-optimised solver that truncates
//! index histories during the collision pipeline and reconstructs full
//! solutions afterwards, and solution verification.
//!
//! [Equihash]: https://zips.z.cash/protocol/protocol.pdf#equihash

mod hash;
mod minimal;
mod params;
mod row;
mod solve;
mod verify;

pub use verify::{is_valid_solution, Error};

use std::collections::BTreeSet;

use blake2b_simd::State as Blake2bState;
use tracing::debug;

use params::Params;
use verify::Kind;

/// An Equihash instance for fixed parameters `(n, k)`.
#[derive(Debug)]
pub struct Equihash {
    pub(crate) params: Params,
}

impl Equihash {
    /// Creates an instance for the given parameters.
    ///
    /// The parameters must satisfy `k < n`, `n ≡ 0 (mod 8)` and
    /// `n/(k+1) ≡ 0 (mod 8)`, with `n/(k+1) + 1 < 32` so that leaf indices
    /// fit a `u32` and `n ≤ 512` so that the hash output fits a single
    /// BLAKE2b digest.
    pub fn new(n: u32, k: u32) -> Result<Self, Error> {
        Params::new(n, k)
            .map(|params| Equihash { params })
            .ok_or(Error(Kind::InvalidParams))
    }

    /// Produces the base hash state for this instance, personalised with the
    /// parameters. Callers absorb any block-header prefix into the returned
    /// state; the solvers append only the 32-bit leaf index.
    pub fn initialise_state(&self) -> Blake2bState {
        hash::initialise_state(&self.params)
    }

    /// Runs the reference solver over full 32-bit index histories.
    ///
    /// The returned set contains each solution exactly once, in canonical
    /// order: at every internal node of the implied collision tree, the left
    /// subtree's first leaf index is smaller than the right subtree's.
    pub fn basic_solve(&self, base_state: &Blake2bState) -> Result<BTreeSet<Vec<u32>>, Error> {
        solve::basic_solve(&self.params, base_state)
    }

    /// Runs the memory-optimised solver: the collision pipeline over 8-bit
    /// truncated index histories, followed by guided tree reconstruction of
    /// each partial solution.
    ///
    /// Produces the same solution set as [`Self::basic_solve`] while keeping
    /// a quarter of its index-history memory through the pipeline.
    pub fn optimised_solve(&self, base_state: &Blake2bState) -> Result<BTreeSet<Vec<u32>>, Error> {
        solve::optimised_solve(&self.params, base_state)
    }

    /// Checks a candidate `2^k`-index solution against the base state.
    pub fn is_valid_solution(&self, base_state: &Blake2bState, soln: &[u32]) -> bool {
        if soln.len() != self.params.solution_width() {
            debug!("Invalid solution size: {}", soln.len());
            return false;
        }

        verify::is_valid_indexed_solution(&self.params, base_state, soln).is_ok()
    }

    /// Packs an index-tuple solution into the minimal byte encoding used on
    /// the wire: `2^k` big-endian `(n/(k+1) + 1)`-bit indices, concatenated
    /// without padding.
    ///
    /// Fails with `InvalidParams` if the tuple is not `2^k` indices long, or
    /// if the encoding has no exact byte length (it does whenever `k ≥ 3`).
    pub fn minimal_from_indices(&self, indices: &[u32]) -> Result<Vec<u8>, Error> {
        minimal::minimal_from_indices(&self.params, indices).ok_or(Error(Kind::InvalidParams))
    }

    /// Decodes a minimal-encoded solution into its index tuple.
    pub fn indices_from_minimal(&self, minimal: &[u8]) -> Result<Vec<u32>, Error> {
        minimal::indices_from_minimal(&self.params, minimal).ok_or(Error(Kind::InvalidParams))
    }
}
