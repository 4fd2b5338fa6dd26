use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, trace};
use crate::cell::Cell;
use crate::change::{ApplyChange, ArrayChange};
use crate::edits::{ranks_of, reorder_changes, sorted_indices, sorted_position, EditScript};
use crate::history::ArrayWithHistory;
use crate::queue::TaskQueue;
use crate::views::{DetachOnPanic, Order};
use ArrayChange::*;

struct SortState<A> {
    order: Order<A>,
    /// Upstream content, in upstream order.
    latest: Vec<A>,
}

impl<A: Clone> SortState<A> {
    fn translate(&mut self, change: &ArrayChange<A>) -> ArrayChange<A> {
        let order = &self.order;
        let result = match change {
            Insert(e, at) => {
                Insert(e.clone(), sorted_position(&self.latest, e, *at, |a, b| order.cmp(a, b)))
            }
            Remove(at) => {
                Remove(sorted_position(&self.latest, &self.latest[*at], *at, |a, b| order.cmp(a, b)))
            }
        };
        self.latest.apply(change.clone());
        result
    }

    /// Move the view from the current order to `new_order`.
    ///
    /// The view holds `latest` permuted by the old order. Each item is sent to its rank under the
    /// new order, with ties broken by upstream position just like in the initial sort.
    fn set_order(&mut self, new_order: Order<A>) -> EditScript<A> {
        let old_perm = sorted_indices(&self.latest, |a, b| self.order.cmp(a, b));
        let new_rank = ranks_of(&sorted_indices(&self.latest, |a, b| new_order.cmp(a, b)));

        let current: Vec<A> = old_perm.iter().map(|i| self.latest[*i].clone()).collect();
        let target: Vec<usize> = old_perm.iter().map(|i| new_rank[*i]).collect();

        self.order = new_order;
        reorder_changes(&current, &target)
    }
}

impl<A: Clone + 'static> ArrayWithHistory<A> {
    /// A view containing the array's items stably sorted by the current order.
    ///
    /// Items which compare equal stay in upstream order. Each upstream change becomes a single
    /// insert or remove at the item's sorted position. When the order cell changes, the view is
    /// rearranged with a batch of removes followed by a batch of inserts.
    ///
    /// Like [`filter`](ArrayWithHistory::filter), the view holds its upstream and the order cell,
    /// and a panic in the order function detaches the view from its upstream.
    pub fn sort(&self, order: &Cell<Order<A>>) -> ArrayWithHistory<A> {
        let ord = order.get();
        let latest = self.latest_snapshot();
        let initial: Vec<A> = sorted_indices(&latest, |a, b| ord.cmp(a, b))
            .into_iter()
            .map(|i| latest[i].clone())
            .collect();
        debug!(len = initial.len(), "sort view");

        let result = ArrayWithHistory::new(initial);
        let state = Rc::new(RefCell::new(SortState { order: ord, latest }));
        let queue = TaskQueue::new();

        let on_order = {
            let (state, queue, out) = (state.clone(), queue.clone(), result.changes.downgrade());
            order.subscribe(move |new_order: &Order<A>| {
                let (state, out, new_order) = (state.clone(), out.clone(), new_order.clone());
                queue.run(move || {
                    let Some(out) = out.upgrade() else { return; };
                    let _detach = DetachOnPanic(&out);
                    let script = state.borrow_mut().set_order(new_order);
                    debug!(changes = script.len(), "sort order changed");
                    out.concat(script);
                });
            })
        };

        let on_upstream = {
            let (state, out) = (state, result.changes.downgrade());
            self.changes.subscribe_from(self.changes.len(), move |change: &ArrayChange<A>| {
                let (state, out, change) = (state.clone(), out.clone(), change.clone());
                queue.run(move || {
                    let Some(out) = out.upgrade() else { return; };
                    let _detach = DetachOnPanic(&out);
                    let c = state.borrow_mut().translate(&change);
                    trace!(index = c.index(), insert = c.is_insert(), "sort emit");
                    out.append(c);
                });
            })
        };

        result.changes.retain(on_order);
        result.changes.retain(on_upstream);
        // Both sources only hold the view weakly, so the view keeps them alive.
        result.changes.retain(self.changes.clone());
        result.changes.retain(order.clone());
        result
    }
}
