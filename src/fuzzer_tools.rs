use rand::prelude::SmallRng;
use rand::Rng;
use crate::change::ArrayChange;

/// Make a random change which is valid against `snapshot`. Inserts are slightly favored while the
/// array is small, so arrays grow to an interesting size and then hover there.
pub fn random_change(snapshot: &[u32], rng: &mut SmallRng) -> ArrayChange<u32> {
    let len = snapshot.len();
    let insert_weight = if len < 30 { 0.6 } else { 0.45 };

    if len == 0 || rng.gen_bool(insert_weight) {
        let pos = rng.gen_range(0..=len);
        ArrayChange::Insert(rng.gen_range(0..100), pos)
    } else {
        ArrayChange::Remove(rng.gen_range(0..len))
    }
}

/// Make a run of random changes, each valid after the ones before it. Returns the resulting
/// snapshot alongside the changes.
pub fn random_changes(start: &[u32], count: usize, rng: &mut SmallRng) -> (Vec<ArrayChange<u32>>, Vec<u32>) {
    use crate::change::ApplyChange;

    let mut arr = start.to_vec();
    let changes = (0..count).map(|_| {
        let c = random_change(&arr, rng);
        arr.apply(c.clone());
        c
    }).collect();
    (changes, arr)
}
