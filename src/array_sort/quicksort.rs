//! Sequential quicksort over index permutations (design spec §4.2.1): the
//! fallback path whenever no monotone hash is available, or the array is
//! too small for a radix pass to pay for itself.
//!
//! Operates on `indices`, a permutation of `0..keys.len()`, rather than
//! moving `(K, Vec<u8>)` records directly — the same indirection
//! `fcoreutils`'s `sort` core uses to avoid shuffling full lines during
//! comparison, here generalized from byte lines to an arbitrary `K`.
//! Ordering comes from the adapter's own `compare()`, not `K: Ord`,
//! since an adapter may override it (reverse order, numeric collation,
//! NaN handling) independently of whatever `Ord` impl `K` has — external
//! merge already goes through `adapter.compare()` the same way.

use std::cmp::Ordering;

use crate::adapter::SortAdapter;

/// Below this partition size, quicksort stops recursing and leaves the
/// range for the final insertion-sort sweep to finish off cheaply.
const INSERTION_THRESHOLD: usize = 8;

pub fn sort<K, A: SortAdapter<K>>(indices: &mut [usize], keys: &[K], adapter: &A) {
    if indices.len() <= 1 {
        return;
    }
    quicksort_loop(indices, keys, adapter);
    insertion_finish(indices, keys, adapter);
}

/// Iterative quicksort with an explicit stack bounded to `O(log n)` by
/// always recursing into the smaller partition first and pushing the
/// larger one for later (design spec §4.2.1, "bound the auxiliary stack").
fn quicksort_loop<K, A: SortAdapter<K>>(indices: &mut [usize], keys: &[K], adapter: &A) {
    let mut stack: Vec<(usize, usize)> = vec![(0, indices.len())];
    while let Some((lo, hi)) = stack.pop() {
        if hi - lo <= INSERTION_THRESHOLD {
            continue;
        }
        let mid = partition(indices, keys, lo, hi, adapter);
        let left = (lo, mid);
        let right = (mid + 1, hi);
        if left.1 - left.0 > right.1 - right.0 {
            stack.push(left);
            stack.push(right);
        } else {
            stack.push(right);
            stack.push(left);
        }
    }
}

/// Hoare-style partition around a median-of-three pivot. Returns the final
/// resting index of the pivot.
///
/// Shared with [`super::parallel`], which needs a real in-place partition
/// (not a blind midpoint bisect) before it can hand left/right sub-ranges
/// to the pool as independent tasks.
pub(super) fn partition<K, A: SortAdapter<K>>(indices: &mut [usize], keys: &[K], lo: usize, hi: usize, adapter: &A) -> usize {
    let last = hi - 1;
    let mid = lo + (hi - lo) / 2;
    let pivot_pos = median_of_three_pos(indices, keys, lo, mid, last, adapter);
    indices.swap(lo, pivot_pos);

    let pivot = indices[lo];
    let mut i = lo + 1;
    let mut j = last;
    loop {
        while i <= last && adapter.compare(&keys[indices[i]], &keys[pivot]) == Ordering::Less {
            i += 1;
        }
        while j > lo && adapter.compare(&keys[pivot], &keys[indices[j]]) == Ordering::Less {
            j -= 1;
        }
        if i >= j {
            break;
        }
        indices.swap(i, j);
        i += 1;
        if j > lo {
            j -= 1;
        }
    }
    indices.swap(lo, j);
    j
}

fn median_of_three_pos<K, A: SortAdapter<K>>(
    indices: &[usize],
    keys: &[K],
    lo: usize,
    mid: usize,
    last: usize,
    adapter: &A,
) -> usize {
    let ka = &keys[indices[lo]];
    let kb = &keys[indices[mid]];
    let kc = &keys[indices[last]];
    match (adapter.compare(ka, kb), adapter.compare(kb, kc), adapter.compare(ka, kc)) {
        (Ordering::Less, Ordering::Less, _) | (Ordering::Greater, Ordering::Greater, _) => mid,
        (Ordering::Less, _, Ordering::Less) | (Ordering::Greater, _, Ordering::Greater) => last,
        _ => lo,
    }
}

/// Final sweep: after `quicksort_loop`, no element sits more than
/// [`INSERTION_THRESHOLD`] positions from its sorted slot, so one pass of
/// insertion sort finishes the array in near-linear time.
fn insertion_finish<K, A: SortAdapter<K>>(indices: &mut [usize], keys: &[K], adapter: &A) {
    for i in 1..indices.len() {
        let mut j = i;
        while j > 0 && adapter.compare(&keys[indices[j]], &keys[indices[j - 1]]) == Ordering::Less {
            indices.swap(j, j - 1);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_sort::test_support::{OrdAdapter, RevAdapter};

    #[test]
    fn sorts_permutation_of_indices() {
        let keys = vec![5, 3, 8, 1, 9, 2, 7, 4, 6, 0];
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        sort(&mut indices, &keys, &OrdAdapter);
        let sorted_keys: Vec<i32> = indices.iter().map(|&i| keys[i]).collect();
        assert_eq!(sorted_keys, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn handles_duplicates_and_small_inputs() {
        let keys = vec![3, 3, 3, 1, 1];
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        sort(&mut indices, &keys, &OrdAdapter);
        let sorted_keys: Vec<i32> = indices.iter().map(|&i| keys[i]).collect();
        assert_eq!(sorted_keys, vec![1, 1, 3, 3, 3]);

        let mut one = [0usize];
        sort(&mut one, &keys[..1], &OrdAdapter);
        assert_eq!(one, [0]);

        let mut empty: [usize; 0] = [];
        sort(&mut empty, &keys[..0], &OrdAdapter);
    }

    #[test]
    fn already_sorted_input_stays_sorted() {
        let keys: Vec<i32> = (0..200).collect();
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        sort(&mut indices, &keys, &OrdAdapter);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn honors_an_adapter_comparator_that_disagrees_with_ord() {
        let keys = vec![5, 3, 8, 1, 9, 2];
        let mut indices: Vec<usize> = (0..keys.len()).collect();
        sort(&mut indices, &keys, &RevAdapter);
        let sorted_keys: Vec<i32> = indices.iter().map(|&i| keys[i]).collect();
        assert_eq!(sorted_keys, vec![9, 8, 5, 3, 2, 1]);
    }
}
