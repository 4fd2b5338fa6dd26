//! An append-only log with resumable subscribers.
//!
//! Entries are stored in a flat arena and addressed by their position. Once an entry has been
//! written it never changes, so a position handed out earlier stays valid forever and the
//! materialized prefix of the log never changes. The only mutation is pushing a new entry at the
//! tail.
//!
//! Subscribers are stored in a resumption table. Each slot in the table remembers the position of
//! the next entry it will consume. When the log grows, the table is drained: every subscriber is
//! walked forward one entry at a time (in the order entries were appended) until everyone has
//! caught up. This happens synchronously inside `append` - so by the time `append` returns, every
//! live subscriber has seen the new entry.
//!
//! The log assumes a single writer. Nothing stops two callers appending to the same log, but the
//! positions in their entries will be nonsense.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use tracing::trace;
use crate::cell::{Cell, Disposable};

type Step<T> = Box<dyn FnMut(&T)>;

struct Slot<T> {
    /// The position of the next entry this subscriber will consume.
    next: usize,
    /// None while the step function is running.
    step: Option<Step<T>>,
}

struct Subscribers<T> {
    slots: BTreeMap<u64, Slot<T>>,
    next_id: u64,
    draining: bool,
}

struct LogInner<T> {
    entries: RefCell<Vec<T>>,
    subs: RefCell<Subscribers<T>>,

    /// Upstream subscriptions feeding this log. These are dropped (and thus cancelled) along with
    /// the log.
    retained: RefCell<Vec<Box<dyn Any>>>,

    /// Set when the process feeding this log died with a panic. The log won't grow any more.
    detached: std::cell::Cell<bool>,
}

pub struct AppendLog<T>(Rc<LogInner<T>>);

pub struct WeakLog<T>(Weak<LogInner<T>>);

impl<T> Clone for AppendLog<T> {
    fn clone(&self) -> Self { AppendLog(self.0.clone()) }
}

impl<T> Clone for WeakLog<T> {
    fn clone(&self) -> Self { WeakLog(self.0.clone()) }
}

impl<T> WeakLog<T> {
    pub fn upgrade(&self) -> Option<AppendLog<T>> {
        self.0.upgrade().map(AppendLog)
    }
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        AppendLog(Rc::new(LogInner {
            entries: RefCell::new(Vec::new()),
            subs: RefCell::new(Subscribers {
                slots: BTreeMap::new(),
                next_id: 0,
                draining: false,
            }),
            retained: RefCell::new(Vec::new()),
            detached: std::cell::Cell::new(false),
        }))
    }
}

impl<T: Debug> Debug for AppendLog<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AppendLog").field(&*self.0.entries.borrow()).finish()
    }
}

/// Logs compare by identity. Two logs are equal if they're both empty or if they're the same log.
///
/// Two distinct logs with the same entries are *not* equal: they're separate histories which may
/// diverge on the next append.
impl<T> PartialEq for AppendLog<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || (self.is_empty() && other.is_empty())
    }
}

/// Call `f`, catching any panic. Returns false if `f` panicked.
#[cfg(feature = "isolate_panics")]
pub(crate) fn run_isolated<F: FnOnce()>(f: F) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!("Subscriber panicked. Removing it");
            false
        }
    }
}

#[cfg(not(feature = "isolate_panics"))]
pub(crate) fn run_isolated<F: FnOnce()>(f: F) -> bool {
    f();
    true
}

/// Clears the draining flag even if a subscriber panics.
struct DrainGuard<'a, T>(&'a RefCell<Subscribers<T>>);

impl<'a, T> Drop for DrainGuard<'a, T> {
    fn drop(&mut self) {
        self.0.borrow_mut().draining = false;
    }
}

impl<T> AppendLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.borrow().is_empty()
    }

    pub fn downgrade(&self) -> WeakLog<T> {
        WeakLog(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Run `f` over the materialized entries. `f` must not append to this log.
    pub fn with_entries<R, F: FnOnce(&[T]) -> R>(&self, f: F) -> R {
        f(&self.0.entries.borrow())
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().slots.len()
    }

    /// Keep `value` alive for as long as this log is alive.
    pub fn retain<V: Any>(&self, value: V) {
        self.0.retained.borrow_mut().push(Box::new(value));
    }

    /// True if the translation feeding this log panicked. A detached log keeps its entries, but
    /// won't follow its upstream any more.
    pub fn is_detached(&self) -> bool {
        self.0.detached.get()
    }

    pub(crate) fn mark_detached(&self) {
        tracing::warn!("Log detached from its upstream after a panic");
        self.0.detached.set(true);
    }

    #[allow(unused)]
    pub(crate) fn dbg_check(&self) {
        assert!(!self.is_detached(), "Log is detached from its upstream");
        let len = self.len();
        let subs = self.0.subs.borrow();
        assert!(!subs.draining);
        for (id, slot) in subs.slots.iter() {
            assert!(slot.next <= len, "Subscriber {id} is past the end of the log");
            // Everyone should be caught up once the log is idle.
            assert_eq!(slot.next, len);
            assert!(slot.step.is_some());
        }
    }
}

impl<T: Clone + 'static> AppendLog<T> {
    pub fn get(&self, pos: usize) -> Option<T> {
        self.0.entries.borrow().get(pos).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.entries.borrow().clone()
    }

    /// Iterate over a snapshot of the entries in the log right now. Entries appended while
    /// iterating aren't included.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    /// Append an entry at the tail of the log, and bring every subscriber up to date.
    pub fn append(&self, entry: T) {
        let pos = {
            let mut entries = self.0.entries.borrow_mut();
            entries.push(entry);
            entries.len() - 1
        };
        trace!(pos, "append");
        self.drain();
    }

    /// Append a batch of entries. Subscribers see them one at a time, in order.
    pub fn concat<I: IntoIterator<Item=T>>(&self, entries: I) {
        let added = {
            let mut e = self.0.entries.borrow_mut();
            let start = e.len();
            e.extend(entries);
            e.len() - start
        };
        if added == 0 { return; }

        trace!(added, "concat");
        self.drain();
    }

    fn drain(&self) {
        let subs = &self.0.subs;
        {
            let mut s = subs.borrow_mut();
            // Someone further up the stack is draining this log. They'll see the new entries.
            if s.draining { return; }
            s.draining = true;
        }
        let _guard = DrainGuard(subs);

        loop {
            let len = self.len();

            // Find the subscriber which is furthest behind. Ties go to whoever subscribed first.
            // This delivers each entry to everyone before moving on to the next entry.
            let work = {
                let mut s = subs.borrow_mut();
                let found = s.slots.iter_mut()
                    .filter(|(_, slot)| slot.next < len && slot.step.is_some())
                    .min_by_key(|(_, slot)| slot.next)
                    .and_then(|(id, slot)| {
                        let pos = slot.next;
                        slot.next += 1;
                        slot.step.take().map(|step| (*id, pos, step))
                    });
                found
            };
            let Some((id, pos, step)) = work else { break; };
            self.run_step(id, pos, step);
        }
    }

    /// Bring a single subscriber up to the tail. Used when a subscriber attaches while the log is
    /// being drained further up the stack, so it doesn't have to wait for that drain to get to it.
    fn catch_up(&self, id: u64) {
        loop {
            let len = self.len();
            let work = {
                let mut s = self.0.subs.borrow_mut();
                let found = match s.slots.get_mut(&id) {
                    Some(slot) if slot.next < len && slot.step.is_some() => {
                        let pos = slot.next;
                        slot.next += 1;
                        slot.step.take().map(|step| (pos, step))
                    }
                    _ => None,
                };
                found
            };
            let Some((pos, step)) = work else { break; };
            self.run_step(id, pos, step);
        }
    }

    /// Call a step function with the entry at `pos`, then put it back in its slot.
    fn run_step(&self, id: u64, pos: usize, mut step: Step<T>) {
        let entry = self.0.entries.borrow()[pos].clone();
        let ok = run_isolated(|| step(&entry));

        let dropped = {
            let mut s = self.0.subs.borrow_mut();
            if !ok {
                s.slots.remove(&id);
                Some(step)
            } else if let Some(slot) = s.slots.get_mut(&id) {
                slot.step = Some(step);
                None
            } else { Some(step) } // Cancelled while it was running.
        };
        // The step might own other subscriptions. Drop it outside the borrow.
        drop(dropped);
    }

    /// Attach a subscriber which will consume entries starting at `pos`. Any entries already
    /// in the log at or after `pos` are delivered before this returns.
    ///
    /// Attaching at [`len()`](AppendLog::len) is O(1) and only delivers future entries.
    pub fn subscribe_from<F>(&self, pos: usize, step: F) -> Disposable where F: FnMut(&T) + 'static {
        debug_assert!(pos <= self.len());
        let id = {
            let mut s = self.0.subs.borrow_mut();
            let id = s.next_id;
            s.next_id += 1;
            s.slots.insert(id, Slot { next: pos, step: Some(Box::new(step)) });
            id
        };

        if pos < self.len() {
            let draining = self.0.subs.borrow().draining;
            if draining { self.catch_up(id); } else { self.drain(); }
        }

        let weak = Rc::downgrade(&self.0);
        Disposable::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.subs.borrow_mut().slots.remove(&id);
                drop(removed);
            }
        })
    }

    /// Incrementally fold the log into `destination`.
    ///
    /// The entries currently in the log are folded immediately and the result is written to the
    /// destination cell. After that, each appended entry is combined with the accumulator and the
    /// new value is written again. Already consumed entries are never revisited.
    ///
    /// The fold lives as long as the returned handle. (See [`reduce`](AppendLog::reduce) for a
    /// variant which ties the fold to the lifetime of its output cell.)
    pub fn fold<B, F>(&self, destination: &Cell<B>, init: B, mut combine: F) -> Disposable
        where B: Clone + 'static, F: FnMut(&T, B) -> B + 'static
    {
        let mut acc = init;
        let mut pos = 0;
        // Walk by position, not by iterator. combine is allowed to look at the log.
        while let Some(entry) = self.get(pos) {
            acc = combine(&entry, acc);
            pos += 1;
        }
        destination.write(acc.clone());

        let target = destination.downgrade();
        let mut acc = Some(acc);
        self.subscribe_from(pos, move |entry| {
            let Some(prev) = acc.take() else { return; };
            let next = combine(entry, prev);
            trace!("fold step");
            if let Some(target) = target.upgrade() {
                target.write(next.clone());
            }
            acc = Some(next);
        })
    }

    /// Fold the log into a new cell. The fold stays alive for as long as the cell does.
    pub fn reduce<B, E, F>(&self, eq: E, init: B, combine: F) -> Cell<B>
        where B: Clone + 'static, E: Fn(&B, &B) -> bool + 'static, F: FnMut(&T, B) -> B + 'static
    {
        let result = Cell::with_eq(init.clone(), eq);
        let handle = self.fold(&result, init, combine);
        result.retain(handle);
        result
    }

    /// Make a new log whose entries are `f` applied to the entries of this log. The new log is
    /// kept up to date as this log grows.
    pub fn map<U, F>(&self, f: F) -> AppendLog<U> where U: Clone + 'static, F: Fn(&T) -> U + 'static {
        let result = AppendLog::new();
        let target = result.downgrade();

        // subscribe_from(0) will deliver the existing entries straight away.
        let handle = self.subscribe_from(0, move |entry| {
            if let Some(target) = target.upgrade() {
                target.append(f(entry));
            }
        });
        result.retain(handle);
        // Nothing else might be holding the source. It only holds us weakly.
        result.retain(self.clone());
        result
    }
}
