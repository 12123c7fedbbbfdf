//! Step rows: partially-collided hashes together with the index histories
//! that produced them.

use std::cmp::Ordering;

use blake2b_simd::State as Blake2bState;

use crate::hash::generate_hash;
use crate::params::Params;
use crate::verify::{Error, Kind};

/// A row of the collision table: the remaining hash of a partial collision
/// tree, and the ordered leaf indices whose hashes XORed to produce it.
///
/// Generic over the index history element: `u32` rows carry full leaf
/// indices, `u8` rows the truncated histories of the optimised pipeline.
/// The hash buffer is allocated once at its initial width; trimming advances
/// a start offset instead of reallocating.
#[derive(Clone, Debug)]
pub(crate) struct StepRow<I> {
    hash: Vec<u8>,
    start: usize,
    indices: Vec<I>,
}

impl StepRow<u32> {
    /// The leaf row for index `i`, carrying the full 32-bit index.
    pub(crate) fn leaf(base_state: &Blake2bState, i: u32) -> Self {
        StepRow {
            hash: generate_hash(base_state, i).as_bytes().to_vec(),
            start: 0,
            indices: vec![i],
        }
    }
}

impl StepRow<u8> {
    /// The leaf row for index `i`, keeping only the high 8 bits of its
    /// `(N+1)`-bit representation in the index history.
    pub(crate) fn leaf_truncated(p: &Params, base_state: &Blake2bState, i: u32) -> Self {
        let ilen = p.collision_bit_length() + 1;
        StepRow {
            hash: generate_hash(base_state, i).as_bytes().to_vec(),
            start: 0,
            indices: vec![((i >> (ilen - 8)) & 0xff) as u8],
        }
    }
}

impl<I: Copy + Ord> StepRow<I> {
    /// The active (untrimmed) hash bytes.
    pub(crate) fn hash(&self) -> &[u8] {
        &self.hash[self.start..]
    }

    pub(crate) fn into_indices(self) -> Vec<I> {
        self.indices
    }

    /// Whether this row's subtree sorts before `other`'s in the canonical
    /// tree order.
    pub(crate) fn indices_before(&self, other: &Self) -> bool {
        self.indices[0] < other.indices[0]
    }

    /// XOR-merges two rows into a new row carrying the concatenation of
    /// their index histories, the operand with the smaller first index on
    /// the left.
    pub(crate) fn xor(a: &Self, b: &Self) -> Result<Self, Error> {
        if a.indices_before(b) {
            a.xor_with(b)
        } else {
            b.xor_with(a)
        }
    }

    fn xor_with(&self, other: &Self) -> Result<Self, Error> {
        if self.hash().len() != other.hash().len() || self.indices.len() != other.indices.len() {
            return Err(Error(Kind::LengthMismatch));
        }

        let hash = self
            .hash()
            .iter()
            .zip(other.hash())
            .map(|(a, b)| a ^ b)
            .collect();
        let mut indices = Vec::with_capacity(self.indices.len() + other.indices.len());
        indices.extend_from_slice(&self.indices);
        indices.extend_from_slice(&other.indices);

        Ok(StepRow {
            hash,
            start: 0,
            indices,
        })
    }

    /// Drops the leading `len` hash bytes (the bytes that have just collided
    /// to zero).
    pub(crate) fn trim_hash(&mut self, len: usize) {
        self.start += len;
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.hash().iter().all(|v| *v == 0)
    }
}

impl<I> PartialEq for StepRow<I> {
    fn eq(&self, other: &Self) -> bool {
        self.hash[self.start..] == other.hash[other.start..]
    }
}

impl<I> Eq for StepRow<I> {}

impl<I> PartialOrd for StepRow<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I> Ord for StepRow<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash[self.start..].cmp(&other.hash[other.start..])
    }
}

/// Do the first `len` active hash bytes of `a` and `b` agree?
pub(crate) fn has_collision<I>(a: &StepRow<I>, b: &StepRow<I>, len: usize) -> bool
where
    I: Copy + Ord,
{
    a.hash().iter().zip(b.hash()).take(len).all(|(a, b)| a == b)
}

/// Checks whether the index histories of `a` and `b` are disjoint, by
/// sorting copies of both and merge-scanning.
pub(crate) fn distinct_indices<I: Copy + Ord>(a: &StepRow<I>, b: &StepRow<I>) -> bool {
    let mut a_srt = a.indices.clone();
    let mut b_srt = b.indices.clone();
    a_srt.sort_unstable();
    b_srt.sort_unstable();

    let mut i = 0;
    for x in &b_srt {
        while a_srt[i] < *x {
            i += 1;
            if i == a_srt.len() {
                return true;
            }
        }
        if a_srt[i] == *x {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::{distinct_indices, has_collision, StepRow};
    use crate::verify::Kind;

    fn row(hash: &[u8], indices: &[u32]) -> StepRow<u32> {
        StepRow {
            hash: hash.to_vec(),
            start: 0,
            indices: indices.to_vec(),
        }
    }

    #[test]
    fn xor_merges_and_canonicalises() {
        let a = row(&[0x0f, 0x33], &[5]);
        let b = row(&[0xf0, 0x33], &[2]);

        // The operand with the smaller first index always lands on the left.
        let merged = StepRow::xor(&a, &b).expect("equal lengths");
        assert_eq!(merged.hash(), &[0xff, 0x00]);
        assert_eq!(merged.into_indices(), vec![2, 5]);

        let merged = StepRow::xor(&b, &a).expect("equal lengths");
        assert_eq!(merged.into_indices(), vec![2, 5]);
    }

    #[test]
    fn xor_rejects_mismatched_lengths() {
        let a = row(&[0x0f, 0x33], &[1]);
        let b = row(&[0xf0], &[2]);
        assert_eq!(StepRow::xor(&a, &b).unwrap_err().0, Kind::LengthMismatch);

        let c = row(&[0x0f, 0x33], &[2, 3]);
        assert_eq!(StepRow::xor(&a, &c).unwrap_err().0, Kind::LengthMismatch);
    }

    #[test]
    fn trim_is_an_offset() {
        let mut a = row(&[0x01, 0x02, 0x03], &[1]);
        a.trim_hash(1);
        assert_eq!(a.hash(), &[0x02, 0x03]);
        a.trim_hash(1);
        assert_eq!(a.hash(), &[0x03]);
        assert!(!a.is_zero());

        let mut z = row(&[0xff, 0x00], &[1]);
        z.trim_hash(1);
        assert!(z.is_zero());
    }

    #[test]
    fn rows_order_by_active_hash() {
        let a = row(&[0x01, 0xff], &[1]);
        let mut b = row(&[0xff, 0x00, 0x01], &[2]);
        b.trim_hash(1);

        // After trimming, b's active hash is [0x00, 0x01] < [0x01, 0xff].
        assert!(b < a);
        assert!(has_collision(&a, &b, 0));
        assert!(!has_collision(&a, &b, 1));
    }

    #[test]
    fn distinct_indices_detects_overlap() {
        let a = row(&[0x00], &[1, 9, 3, 7]);
        let b = row(&[0x00], &[2, 8, 4, 6]);
        assert!(distinct_indices(&a, &b));

        let c = row(&[0x00], &[2, 8, 9, 6]);
        assert!(!distinct_indices(&a, &c));

        // Overlap on the smallest element of one side.
        let d = row(&[0x00], &[0, 1, 10, 11]);
        assert!(!distinct_indices(&a, &d));
    }
}
