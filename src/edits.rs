//! Pure functions which compute edit scripts between two arrangements of the same snapshot.
//!
//! The scripts produced here are ordered lists of [`ArrayChange`]s. Every index in a script is
//! valid against the array *as it evolves* while the script is applied - not against the
//! starting array. So applying the script with [`replay`](crate::change::replay) (or appending it
//! to a log) walks the old arrangement to the new one.

use std::cmp::Ordering;
use crate::change::ArrayChange;

/// An ordered batch of changes, ready to be appended to a log.
pub type EditScript<A> = Vec<ArrayChange<A>>;

/// Map an index in `arr` to the index the same position has in `arr` filtered by `is_included`.
///
/// This is the number of included items before `index`. O(index).
pub fn filtered_index<A, P>(arr: &[A], index: usize, is_included: P) -> usize
    where P: Fn(&A) -> bool
{
    arr[..index].iter().filter(|e| is_included(e)).count()
}

/// Compute the changes which transform `snapshot` filtered by `old` into `snapshot` filtered by
/// `new`.
///
/// Items are visited in their original order. An item which leaves the filter is removed and an
/// item which joins is inserted; everything else is left alone.
pub fn filter_changes<A, P1, P2>(snapshot: &[A], old: P1, new: P2) -> EditScript<A>
    where A: Clone, P1: Fn(&A) -> bool, P2: Fn(&A) -> bool
{
    let mut result = Vec::new();

    // The position of item i in the array being rewritten. All items before i have already been
    // moved into the new filter state, so this is filtered_index(i, old) plus the net number of
    // inserts and removes emitted so far - which is just the count of earlier items in the new
    // filter.
    let mut pos = 0;

    for e in snapshot {
        let was_included = old(e);
        let is_included = new(e);

        match (was_included, is_included) {
            (true, false) => result.push(ArrayChange::Remove(pos)),
            (false, true) => result.push(ArrayChange::Insert(e.clone(), pos)),
            _ => {}
        }

        if is_included { pos += 1; }
    }

    result
}

/// The indexes of `arr`, stably sorted by the order relation. Ties keep their original order.
pub fn sorted_indices<A, F>(arr: &[A], mut cmp: F) -> Vec<usize>
    where F: FnMut(&A, &A) -> Ordering
{
    let mut idx: Vec<usize> = (0..arr.len()).collect();
    idx.sort_by(|a, b| cmp(&arr[*a], &arr[*b]));
    idx
}

/// The position `item` has in `arr` stably sorted by `cmp`, if `item` sits at index `at` in upstream
/// order. Items equal to `item` keep their upstream order, so equal items before `at` come first.
///
/// `item` is either being inserted at `at` (and isn't in `arr` yet), or it's `arr[at]` itself.
/// Both cases give the same answer. O(n).
pub fn sorted_position<A, F>(arr: &[A], item: &A, at: usize, mut cmp: F) -> usize
    where F: FnMut(&A, &A) -> Ordering
{
    arr.iter().enumerate().filter(|(j, e)| {
        match cmp(e, item) {
            Ordering::Less => true,
            Ordering::Equal => *j < at,
            Ordering::Greater => false,
        }
    }).count()
}

/// Invert a permutation. `ranks[perm[k]] == k`.
pub(crate) fn ranks_of(perm: &[usize]) -> Vec<usize> {
    let mut ranks = vec![0; perm.len()];
    for (k, i) in perm.iter().enumerate() {
        ranks[*i] = k;
    }
    ranks
}

/// Generate the changes which move each item `snapshot[i]` to position `target[i]`. `target` must
/// be a permutation of `0..snapshot.len()`.
///
/// All removes come first, in descending original position, so no remove invalidates the ones
/// after it. The moved items are then inserted in ascending target position; each insert lands in
/// an array whose prefix already matches the target.
pub fn reorder_changes<A: Clone>(snapshot: &[A], target: &[usize]) -> EditScript<A> {
    assert_eq!(snapshot.len(), target.len());

    let mut result = Vec::new();
    let mut inserts: Vec<(usize, usize)> = Vec::new(); // (target, original)

    for (i, &t) in target.iter().enumerate().rev() {
        if i != t {
            result.push(ArrayChange::Remove(i));
            inserts.push((t, i));
        }
    }

    inserts.sort_unstable_by_key(|(t, _)| *t);
    result.extend(inserts.into_iter().map(|(t, i)| {
        ArrayChange::Insert(snapshot[i].clone(), t)
    }));

    result
}

/// Compute the changes which rearrange `snapshot` into `snapshot` sorted by `cmp`.
///
/// `cmp` must be a total order. The sort is stable, so equal items keep their current relative
/// order and duplicates are handled exactly.
pub fn sort_changes<A, F>(snapshot: &[A], cmp: F) -> EditScript<A>
    where A: Clone, F: FnMut(&A, &A) -> Ordering
{
    let perm = sorted_indices(snapshot, cmp);
    reorder_changes(snapshot, &ranks_of(&perm))
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use crate::change::{replay, ArrayChange::*};
    use super::*;

    fn is_even(x: &i32) -> bool { x % 2 == 0 }
    fn is_odd(x: &i32) -> bool { x % 2 != 0 }

    #[test]
    fn filtered_index_counts_included() {
        let arr = [1, 2, 3, 4, 5];
        assert_eq!(filtered_index(&arr, 0, is_even), 0);
        assert_eq!(filtered_index(&arr, 2, is_even), 1);
        assert_eq!(filtered_index(&arr, 5, is_even), 2);
        assert_eq!(filtered_index(&arr, 3, is_odd), 2);
    }

    #[test]
    fn even_to_odd() {
        let arr = [1, 2, 3, 4, 5];
        let script = filter_changes(&arr, is_even, is_odd);
        assert_eq!(script, vec![
            Insert(1, 0), Remove(1), Insert(3, 1), Remove(2), Insert(5, 2)
        ]);

        let start: Vec<i32> = arr.iter().copied().filter(is_even).collect();
        assert_eq!(start, vec![2, 4]);
        assert_eq!(replay(&start, script), vec![1, 3, 5]);
    }

    #[test]
    fn filter_unchanged_is_empty() {
        let arr = [1, 2, 3, 4, 5];
        assert!(filter_changes(&arr, is_even, is_even).is_empty());
        assert!(filter_changes::<i32, _, _>(&[], is_even, is_odd).is_empty());
    }

    #[test]
    fn sort_small() {
        let arr = [3, 1, 2];
        let script = sort_changes(&arr, i32::cmp);
        assert_eq!(script, vec![
            Remove(2), Remove(1), Remove(0),
            Insert(1, 0), Insert(2, 1), Insert(3, 2),
        ]);
        assert_eq!(replay(&arr, script), vec![1, 2, 3]);
    }

    #[test]
    fn sort_already_sorted() {
        assert!(sort_changes(&[1, 2, 3, 4], i32::cmp).is_empty());
        // Only the two swapped items are touched. (Remove + insert each.)
        assert_eq!(sort_changes(&[1, 2, 4, 3], i32::cmp), vec![
            Remove(3), Remove(2), Insert(3, 2), Insert(4, 3)
        ]);
    }

    #[test]
    fn sort_with_duplicates() {
        let arr = [2, 1, 2, 1, 2];
        let script = sort_changes(&arr, i32::cmp);
        assert_eq!(replay(&arr, script), vec![1, 1, 2, 2, 2]);
    }

    #[test]
    fn sort_is_stable_for_ties() {
        // Sort on the first field only. Ties must keep their existing order.
        let arr = [(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')];
        let script = sort_changes(&arr, |a, b| a.0.cmp(&b.0));
        assert_eq!(replay(&arr, script), vec![(0, 'b'), (0, 'd'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn sort_script_shape() {
        let mut rng = SmallRng::seed_from_u64(321);
        for _ in 0..200 {
            let len = rng.gen_range(0..20);
            let arr: Vec<u32> = (0..len).map(|_| rng.gen_range(0..10)).collect();
            let script = sort_changes(&arr, u32::cmp);

            // All removes (descending) then all inserts (ascending).
            let split = script.iter().position(|c| c.is_insert()).unwrap_or(script.len());
            assert!(script[split..].iter().all(|c| c.is_insert()));
            assert!(script[..split].windows(2).all(|w| w[0].index() > w[1].index()));
            assert!(script[split..].windows(2).all(|w| w[0].index() < w[1].index()));

            let mut expect = arr.clone();
            expect.sort();
            assert_eq!(replay(&arr, script), expect);
        }
    }

    #[test]
    fn sorted_position_breaks_ties_by_upstream_index() {
        let arr = [(1, 'a'), (0, 'b'), (1, 'c')];
        let by_key = |a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0);
        // Stably sorted: b a c.
        assert_eq!(sorted_position(&arr, &arr[0], 0, by_key), 1);
        assert_eq!(sorted_position(&arr, &arr[1], 1, by_key), 0);
        assert_eq!(sorted_position(&arr, &arr[2], 2, by_key), 2);

        // Inserting another 1 upstream between a and b lands between a and c.
        assert_eq!(sorted_position(&arr, &(1, 'x'), 1, by_key), 2);
        assert_eq!(sorted_position(&arr, &(1, 'x'), 3, by_key), 3);
        assert_eq!(sorted_position(&arr, &(5, 'x'), 0, by_key), 3);
    }

    #[test]
    fn filter_fuzz() {
        let mut rng = SmallRng::seed_from_u64(123);
        for _ in 0..200 {
            let len = rng.gen_range(0..30);
            let arr: Vec<u32> = (0..len).map(|_| rng.gen_range(0..100)).collect();
            let a = rng.gen_range(1..5);
            let b = rng.gen_range(1..5);
            let old = |x: &u32| x % a == 0;
            let new = |x: &u32| x % b == 0;

            let start: Vec<u32> = arr.iter().copied().filter(old).collect();
            let expect: Vec<u32> = arr.iter().copied().filter(new).collect();
            assert_eq!(replay(&start, filter_changes(&arr, old, new)), expect);
        }
    }
}
