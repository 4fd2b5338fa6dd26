use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};
use crate::cell::Cell;
use crate::change::{ApplyChange, ArrayChange};
use crate::edits::{filter_changes, filtered_index};
use crate::history::ArrayWithHistory;
use crate::queue::TaskQueue;
use crate::views::{DetachOnPanic, Predicate};
use ArrayChange::*;

struct FilterState<A> {
    predicate: Predicate<A>,

    /// Shadow copy of the upstream (unfiltered) array, as of the last upstream change we've
    /// translated. Used to map upstream indexes into the filtered view.
    latest: Vec<A>,
}

impl<A: Clone> FilterState<A> {
    /// Translate one upstream change into a change to the filtered view, if it's visible there.
    fn translate(&mut self, change: &ArrayChange<A>) -> Option<ArrayChange<A>> {
        let pred = &self.predicate;
        let result = match change {
            Insert(e, i) if pred.test(e) => {
                Some(Insert(e.clone(), filtered_index(&self.latest, *i, |x| pred.test(x))))
            }
            Remove(i) if pred.test(&self.latest[*i]) => {
                Some(Remove(filtered_index(&self.latest, *i, |x| pred.test(x))))
            }
            _ => None,
        };

        self.latest.apply(change.clone());
        result
    }

    /// Switch to a new predicate, returning the edit script which moves the view across.
    fn set_predicate(&mut self, new_pred: Predicate<A>) -> Vec<ArrayChange<A>> {
        let old = &self.predicate;
        let script = filter_changes(&self.latest, |x| old.test(x), |x| new_pred.test(x));
        self.predicate = new_pred;
        script
    }
}

impl<A: Clone + 'static> ArrayWithHistory<A> {
    /// A view containing the items for which the current predicate holds, in upstream order.
    ///
    /// The view is kept in sync with both upstream changes and with changes to the predicate cell.
    /// When the predicate changes, the view's log gets the minimal set of inserts and removes to
    /// move from the old filter to the new one.
    ///
    /// The view keeps both the upstream log and the predicate cell alive, so views can be chained
    /// without holding on to the intermediate handles.
    ///
    /// If the predicate panics while the view is being updated, the view stops following its
    /// upstream. It keeps the changes it already has, and its log reports
    /// [`is_detached`](crate::AppendLog::is_detached).
    pub fn filter(&self, predicate: &Cell<Predicate<A>>) -> ArrayWithHistory<A> {
        let pred = predicate.get();
        let latest = self.latest_snapshot();
        let initial: Vec<A> = latest.iter().filter(|x| pred.test(x)).cloned().collect();
        debug!(upstream = latest.len(), filtered = initial.len(), "filter view");

        let result = ArrayWithHistory::new(initial);
        let state = Rc::new(RefCell::new(FilterState { predicate: pred, latest }));
        let queue = TaskQueue::new();

        let on_predicate = {
            let (state, queue, out) = (state.clone(), queue.clone(), result.changes.downgrade());
            predicate.subscribe(move |new_pred: &Predicate<A>| {
                let (state, out, new_pred) = (state.clone(), out.clone(), new_pred.clone());
                queue.run(move || {
                    let Some(out) = out.upgrade() else { return; };
                    let _detach = DetachOnPanic(&out);
                    let script = state.borrow_mut().set_predicate(new_pred);
                    debug!(changes = script.len(), "filter predicate changed");
                    out.concat(script);
                });
            })
        };

        // Only changes made after this point are interesting. Everything before is already
        // baked into the initial snapshot.
        let on_upstream = {
            let (state, out) = (state, result.changes.downgrade());
            self.changes.subscribe_from(self.changes.len(), move |change: &ArrayChange<A>| {
                let (state, out, change) = (state.clone(), out.clone(), change.clone());
                queue.run(move || {
                    let Some(out) = out.upgrade() else { return; };
                    let _detach = DetachOnPanic(&out);
                    let translated = state.borrow_mut().translate(&change);
                    if let Some(c) = translated {
                        trace!(index = c.index(), insert = c.is_insert(), "filter emit");
                        out.append(c);
                    }
                });
            })
        };

        result.changes.retain(on_predicate);
        result.changes.retain(on_upstream);
        // Both sources only hold the view weakly, so the view keeps them alive.
        result.changes.retain(self.changes.clone());
        result.changes.retain(predicate.clone());
        result
    }
}

#[cfg(test)]
mod test {
    use rand::prelude::*;
    use crate::cell::Cell;
    use crate::change::ArrayChange::*;
    use crate::fuzzer_tools::random_change;
    use crate::views::Predicate;
    use crate::ArrayWithHistory;

    fn expected(arr: &ArrayWithHistory<u32>, p: &Predicate<u32>) -> Vec<u32> {
        arr.latest_snapshot().into_iter().filter(|x| p.test(x)).collect()
    }

    #[test]
    fn filter_small() {
        let arr = ArrayWithHistory::new(vec![1, 2, 3, 4, 5]);
        let even = Predicate::new(|x: &i32| x % 2 == 0);
        let odd = Predicate::new(|x: &i32| x % 2 != 0);
        let pred = Cell::new(even);

        let view = arr.filter(&pred);
        assert_eq!(view.initial(), &[2, 4]);

        arr.change(Insert(6, 5));
        arr.change(Insert(7, 0));
        arr.change(Remove(2)); // Removes the 2.
        assert_eq!(view.latest_snapshot(), vec![4, 6]);
        // The insert of 7 is invisible.
        assert_eq!(view.changes().to_vec(), vec![Insert(6, 2), Remove(0)]);

        pred.write(odd);
        assert_eq!(view.latest_snapshot(), vec![7, 1, 3, 5]);
        view.dbg_check();
    }

    #[test]
    fn switching_predicate_is_minimal() {
        let arr = ArrayWithHistory::new(vec![1, 2, 3, 4, 5]);
        let pred = Cell::new(Predicate::new(|x: &i32| x % 2 == 0));
        let view = arr.filter(&pred);
        pred.write(Predicate::new(|x: &i32| x % 2 != 0));
        assert_eq!(view.changes().to_vec(), vec![
            Insert(1, 0), Remove(1), Insert(3, 1), Remove(2), Insert(5, 2)
        ]);
        assert_eq!(view.latest_snapshot(), vec![1, 3, 5]);
    }

    #[test]
    fn writing_same_predicate_does_nothing() {
        let arr = ArrayWithHistory::new(vec![1, 2, 3]);
        let p = Predicate::new(|x: &i32| *x > 1);
        let pred = Cell::new(p.clone());
        let view = arr.filter(&pred);
        pred.write(p);
        assert!(view.changes().is_empty());
    }

    #[test]
    fn live_filter_consistency() {
        let mut rng = SmallRng::seed_from_u64(77);
        let preds: Vec<Predicate<u32>> = (1..5u32)
            .map(|m| Predicate::new(move |x: &u32| x % m == 0))
            .collect();

        let arr = ArrayWithHistory::new((0..10).collect());
        let pred = Cell::new(preds[0].clone());
        let view = arr.filter(&pred);
        let mut current = preds[0].clone();

        for _ in 0..500 {
            if rng.gen_bool(0.1) {
                current = preds[rng.gen_range(0..preds.len())].clone();
                pred.write(current.clone());
            } else {
                arr.change(random_change(&arr.latest_snapshot(), &mut rng));
            }
            assert_eq!(view.latest_snapshot(), expected(&arr, &current));
        }
        view.dbg_check();
    }

    #[test]
    fn filter_of_filter() {
        let arr = ArrayWithHistory::new(vec![1u32, 2, 3, 4, 5, 6]);
        let even = Cell::new(Predicate::new(|x: &u32| x % 2 == 0));
        let big = Cell::new(Predicate::new(|x: &u32| *x > 2));
        let view = arr.filter(&even).filter(&big);
        assert_eq!(view.latest_snapshot(), vec![4, 6]);

        arr.change(Insert(8, 0));
        big.write(Predicate::new(|x: &u32| *x > 5));
        assert_eq!(view.latest_snapshot(), vec![8, 6]);
        even.write(Predicate::all());
        assert_eq!(view.latest_snapshot(), vec![8, 6]);
        arr.change(Insert(7, 7));
        assert_eq!(view.latest_snapshot(), vec![8, 6, 7]);
    }

    #[test]
    fn predicate_write_from_upstream_callback() {
        // Both drivers fire inside the same call. The view must apply them in order.
        let arr = ArrayWithHistory::new(vec![1u32, 2, 3]);
        let pred = Cell::new(Predicate::new(|x: &u32| x % 2 == 0));
        let view = arr.filter(&pred);

        let p2 = pred.clone();
        let _d = arr.observe(|_| {}, move |c| {
            if c.element() == Some(&10) {
                p2.write(Predicate::new(|x: &u32| *x >= 3));
            }
        });
        arr.change(Insert(10, 0));
        assert_eq!(view.latest_snapshot(), vec![10, 3]);
        arr.change(Insert(1, 0));
        assert_eq!(view.latest_snapshot(), vec![10, 3]);
        view.dbg_check();
    }

    #[test]
    fn view_holds_temporary_predicate_cell() {
        let arr = ArrayWithHistory::new(vec![1u32, 2, 3, 4, 6]);
        let modulus = Cell::new(2u32);
        let view = arr.filter(&modulus.map(|m| {
            let m = *m;
            Predicate::new(move |x: &u32| x % m == 0)
        }));
        assert_eq!(view.latest_snapshot(), vec![2, 4, 6]);

        modulus.write(3);
        assert_eq!(view.latest_snapshot(), vec![3, 6]);
        arr.change(Insert(9, 0));
        assert_eq!(view.latest_snapshot(), vec![9, 3, 6]);
        view.dbg_check();
    }

    #[cfg(feature = "isolate_panics")]
    fn panicking_filter() -> (ArrayWithHistory<u32>, ArrayWithHistory<u32>) {
        let arr = ArrayWithHistory::new(vec![1u32, 2, 3]);
        let pred = Cell::new(Predicate::new(|x: &u32| {
            assert_ne!(*x, 99, "bad item");
            x % 2 == 1
        }));
        let view = arr.filter(&pred);
        arr.change(Insert(99, 0));
        (arr, view)
    }

    #[cfg(feature = "isolate_panics")]
    #[test]
    fn panicking_predicate_detaches_view() {
        let (arr, view) = panicking_filter();
        assert!(view.changes().is_detached());
        assert_eq!(arr.changes().subscriber_count(), 0);

        // The view keeps what it had, but doesn't follow along any more.
        arr.change(Insert(5, 0));
        assert_eq!(view.latest_snapshot(), vec![1, 3]);
    }

    #[cfg(feature = "isolate_panics")]
    #[test]
    #[should_panic(expected = "Log is detached")]
    fn check_catches_detached_view() {
        let (_arr, view) = panicking_filter();
        view.dbg_check();
    }
}
