//! The Equihash collision pipeline: the reference solver over full index
//! histories, and the memory-optimised solver that truncates histories to
//! 8 bits per leaf and reconstructs full solutions afterwards.

use std::collections::BTreeSet;

use blake2b_simd::State as Blake2bState;
use tracing::{debug, trace};

use crate::params::Params;
use crate::row::{distinct_indices, has_collision, StepRow};
use crate::verify::Error;

/// One sort-and-merge round over the row table.
///
/// Sorts the table by hash, scans for runs of rows that agree on the next
/// collision bytes, and XOR-merges every unordered pair within a run. The
/// table is compacted in place: merged rows are written back into slots the
/// scan has already consumed, a spill buffer absorbs the excess, and the
/// table is grown or truncated at the end of the round.
fn collision_round<I: Copy + Ord>(
    p: &Params,
    x: &mut Vec<StepRow<I>>,
    check_indices: bool,
) -> Result<(), Error> {
    debug!("- Sorting list");
    x.sort_unstable();

    debug!("- Finding collisions");
    let mut i = 0;
    let mut pos_free = 0;
    let mut xc: Vec<StepRow<I>> = Vec::new();
    while i + 1 < x.len() {
        // Maximal run of rows sharing the next collision bytes with x[i].
        let mut j = 1;
        while i + j < x.len() && has_collision(&x[i], &x[i + j], p.collision_byte_length()) {
            j += 1;
        }

        // Merge every unordered pair within the run. Truncated histories
        // cannot detect duplicate leaves here; those are pruned during
        // reconstruction instead.
        for l in 0..j - 1 {
            for m in l + 1..j {
                if !check_indices || distinct_indices(&x[i + l], &x[i + m]) {
                    let mut row = StepRow::xor(&x[i + l], &x[i + m])?;
                    row.trim_hash(p.collision_byte_length());
                    xc.push(row);
                }
            }
        }

        // Store merged rows in the slots consumed by the scan so far.
        while pos_free < i + j {
            match xc.pop() {
                Some(row) => {
                    x[pos_free] = row;
                    pos_free += 1;
                }
                None => break,
            }
        }

        i += j;
    }

    // The final table entry may not have been part of a run.
    while pos_free < x.len() {
        match xc.pop() {
            Some(row) => {
                x[pos_free] = row;
                pos_free += 1;
            }
            None => break,
        }
    }

    if !xc.is_empty() {
        // Residual spill overflows the table.
        x.append(&mut xc);
    } else if pos_free < x.len() {
        // Remove the unfilled slack.
        x.truncate(pos_free);
        x.shrink_to_fit();
    }

    Ok(())
}

/// The final collision round. After `k-1` rounds every row retains twice the
/// collision byte length; adjacent rows whose XOR is all-zero yield the
/// concatenated index history of a solution.
fn final_round<I: Copy + Ord>(
    p: &Params,
    x: &mut Vec<StepRow<I>>,
    check_indices: bool,
) -> Result<BTreeSet<Vec<I>>, Error> {
    let mut solns = BTreeSet::new();

    debug!("Final round:");
    if x.len() > 1 {
        debug!("- Sorting list");
        x.sort_unstable();
        debug!("- Finding collisions");
        for i in 0..x.len() - 1 {
            let res = StepRow::xor(&x[i], &x[i + 1])?;
            if res.is_zero() && (!check_indices || distinct_indices(&x[i], &x[i + 1])) {
                solns.insert(res.into_indices());
            }
        }
    } else {
        debug!("- List is empty");
    }

    Ok(solns)
}

/// Runs the reference algorithm: `2^(N+1)` leaf rows with full 32-bit index
/// histories, `k-1` collision rounds, then the final zero-XOR scan.
pub(crate) fn basic_solve(
    p: &Params,
    base_state: &Blake2bState,
) -> Result<BTreeSet<Vec<u32>>, Error> {
    debug!("Generating first list");
    let init_size = p.init_size();
    let mut x: Vec<StepRow<u32>> = Vec::with_capacity(init_size as usize);
    for i in 0..init_size {
        x.push(StepRow::leaf(base_state, i));
    }

    for r in 1..p.k {
        if x.is_empty() {
            break;
        }
        debug!("Round {}:", r);
        collision_round(p, &mut x, true)?;
    }

    final_round(p, &mut x, true)
}

/// Runs the memory-optimised algorithm.
///
/// Phase A repeats the pipeline with index histories truncated to the high
/// 8 bits of each leaf, producing partial solutions. Truncation discards
/// the information needed to test leaf distinctness, so all duplicate
/// pruning is deferred to reconstruction.
///
/// Phase B re-expands each partial solution over the `2^(N-7)` leaves per
/// truncated slot and rebuilds the collision tree with full indices.
pub(crate) fn optimised_solve(
    p: &Params,
    base_state: &Blake2bState,
) -> Result<BTreeSet<Vec<u32>>, Error> {
    debug!("Generating first list");
    let init_size = p.init_size();
    let mut xt: Vec<StepRow<u8>> = Vec::with_capacity(init_size as usize);
    for i in 0..init_size {
        xt.push(StepRow::leaf_truncated(p, base_state, i));
    }

    for r in 1..p.k {
        if xt.is_empty() {
            break;
        }
        debug!("Round {}:", r);
        collision_round(p, &mut xt, false)?;
    }

    let partial_solns = final_round(p, &mut xt, false)?;
    debug!("Found {} partial solutions", partial_solns.len());
    drop(xt);

    let mut solns = BTreeSet::new();
    for partial in partial_solns {
        solns.extend(reconstruct(p, base_state, &partial)?);
    }
    Ok(solns)
}

/// Rebuilds the full-index solutions compatible with one partial solution.
///
/// Each truncated slot fans out to the `2^(N-7)` leaves sharing its 8-bit
/// prefix. The per-slot lists are then merged pairwise up the tree,
/// enforcing distinct leaf indices at every level. A surviving row has
/// collided at all `k` levels; its remaining untrimmed bytes must also be
/// zero for the tree to XOR to zero end to end.
fn reconstruct(
    p: &Params,
    base_state: &Blake2bState,
    partial: &[u8],
) -> Result<Vec<Vec<u32>>, Error> {
    let recreate_bits = p.collision_bit_length() - 7;

    trace!("Solution: {:?}", partial);

    debug!("Generating first lists of possibilities");
    let mut x: Vec<Vec<StepRow<u32>>> = Vec::with_capacity(partial.len());
    for p_v in partial {
        let mut ic = Vec::with_capacity(1 << recreate_bits);
        for j in 0..(1u32 << recreate_bits) {
            let idx = (u32::from(*p_v) << recreate_bits) | j;
            ic.push(StepRow::leaf(base_state, idx));
        }
        x.push(ic);
    }

    while x.len() > 1 {
        trace!("{} lists remaining", x.len());
        for list in x.iter_mut() {
            list.sort_unstable();
        }

        let mut xc = Vec::with_capacity(x.len() / 2);
        for pair in x.chunks(2) {
            xc.push(cross_merge(p, &pair[0], &pair[1])?);
        }
        x = xc;
    }

    let mut solns = Vec::new();
    if let Some(list) = x.pop() {
        trace!("Number of possibilities: {}", list.len());
        for row in list {
            if row.is_zero() {
                solns.push(row.into_indices());
            }
        }
    }
    Ok(solns)
}

/// Merges two sorted lists, emitting every cross-list pair of rows that
/// collides on the next collision bytes with disjoint leaf indices.
///
/// Dual cursors walk the lists: each side expands a block of rows that
/// collide with the other side's cursor row, the Cartesian product of the
/// blocks is emitted, and both cursors advance past their blocks. When
/// neither block expands there is no collision at the cursors, and the side
/// with the smaller hash steps forward so that the walk never stalls.
fn cross_merge(
    p: &Params,
    left: &[StepRow<u32>],
    right: &[StepRow<u32>],
) -> Result<Vec<StepRow<u32>>, Error> {
    let nb = p.collision_byte_length();
    let mut out = Vec::new();

    let mut i_checked = 0;
    let mut j_checked = 0;
    while i_checked < left.len() && j_checked < right.len() {
        let mut i = 0;
        while i_checked + i < left.len()
            && has_collision(&left[i_checked + i], &right[j_checked], nb)
        {
            i += 1;
        }
        let mut j = 0;
        while j_checked + j < right.len()
            && has_collision(&left[i_checked], &right[j_checked + j], nb)
        {
            j += 1;
        }

        for l in 0..i {
            for m in 0..j {
                if distinct_indices(&left[i_checked + l], &right[j_checked + m]) {
                    let mut row = StepRow::xor(&left[i_checked + l], &right[j_checked + m])?;
                    row.trim_hash(nb);
                    out.push(row);
                }
            }
        }

        if i == 0 && j == 0 {
            if left[i_checked].hash() < right[j_checked].hash() {
                i_checked += 1;
            } else {
                j_checked += 1;
            }
        } else {
            i_checked += i;
            j_checked += j;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{basic_solve, optimised_solve};
    use crate::params::Params;
    use crate::Equihash;

    fn state_for(eq: &Equihash, header: &[u8], nonce: u32) -> blake2b_simd::State {
        let mut state = eq.initialise_state();
        state.update(header);
        state.update(&nonce.to_le_bytes());
        state
    }

    /// At every internal node of the implied tree, the left subtree's
    /// minimum index is strictly smaller than the right subtree's.
    fn assert_canonical_order(soln: &[u32]) {
        if soln.len() > 1 {
            let mid = soln.len() / 2;
            assert!(soln[..mid].iter().min() < soln[mid..].iter().min());
            assert_canonical_order(&soln[..mid]);
            assert_canonical_order(&soln[mid..]);
        }
    }

    #[test]
    fn basic_solve_48_5_solutions_validate() {
        let eq = Equihash::new(48, 5).expect("valid");
        let p = Params::new(48, 5).expect("valid");

        let mut found = 0;
        for nonce in 0u32..20 {
            let state = state_for(&eq, &[0u8; 32], nonce);
            for soln in basic_solve(&p, &state).expect("uniform rows") {
                // Solution shape: 2^k distinct indices below 2^(N+1), in
                // canonical tree order.
                assert_eq!(soln.len(), 32);
                let distinct: BTreeSet<_> = soln.iter().collect();
                assert_eq!(distinct.len(), soln.len());
                assert!(soln.iter().all(|i| *i < 512));
                assert_canonical_order(&soln);

                assert!(eq.is_valid_solution(&state, &soln));
                found += 1;
            }
        }
        assert!(found > 0, "no (48, 5) solutions in 20 nonces");
    }

    #[test]
    fn optimised_solve_matches_basic_solve() {
        let eq = Equihash::new(48, 5).expect("valid");
        let p = Params::new(48, 5).expect("valid");

        for nonce in 0u32..5 {
            let state = state_for(&eq, &[0u8; 32], nonce);
            let basic = basic_solve(&p, &state).expect("uniform rows");
            let optimised = optimised_solve(&p, &state).expect("uniform rows");
            assert_eq!(basic, optimised, "solver mismatch for nonce {}", nonce);

            for soln in optimised {
                assert!(eq.is_valid_solution(&state, &soln));
            }
        }
    }

    #[test]
    fn basic_solve_96_5_zero_header() {
        let eq = Equihash::new(96, 5).expect("valid");

        // ~1.9 solutions are expected per nonce, so ten nonces make an
        // empty result astronomically unlikely.
        let mut solutions = None;
        for nonce in 0u32..10 {
            let state = state_for(&eq, &[0u8; 32], nonce);
            let solns = eq.basic_solve(&state).expect("uniform rows");
            if !solns.is_empty() {
                solutions = Some((state, solns));
                break;
            }
        }

        let (state, solns) = solutions.expect("no (96, 5) solution in 10 nonces");
        for soln in solns {
            assert_eq!(soln.len(), 32);
            assert!(soln.iter().all(|i| *i < (1 << 17)));
            assert_canonical_order(&soln);
            assert!(eq.is_valid_solution(&state, &soln));
        }
    }

    #[test]
    fn differing_headers_solve_differently() {
        let eq = Equihash::new(48, 5).expect("valid");
        let p = Params::new(48, 5).expect("valid");

        // Base states differing only in a leaf-independent prefix must
        // produce observably different solution sets for some nonce.
        let mut diverged = false;
        for nonce in 0u32..10 {
            let a = basic_solve(&p, &state_for(&eq, &[0u8; 32], nonce)).expect("uniform rows");
            let b = basic_solve(&p, &state_for(&eq, &[1u8; 32], nonce)).expect("uniform rows");
            if a != b {
                diverged = true;
                break;
            }
        }
        assert!(diverged);
    }

    #[test]
    fn solutions_do_not_verify_under_other_headers() {
        let eq = Equihash::new(48, 5).expect("valid");
        let p = Params::new(48, 5).expect("valid");

        for nonce in 0u32..20 {
            let state = state_for(&eq, &[0u8; 32], nonce);
            let solns = basic_solve(&p, &state).expect("uniform rows");
            if let Some(soln) = solns.into_iter().next() {
                let other = state_for(&eq, &[1u8; 32], nonce);
                assert!(!eq.is_valid_solution(&other, &soln));
                return;
            }
        }
        panic!("no (48, 5) solution in 20 nonces");
    }
}
