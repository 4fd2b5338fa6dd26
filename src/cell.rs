//! A minimal single threaded reactive cell.
//!
//! This is the substrate the rest of the crate is built on. A cell holds a value and a list of
//! observers. Writing a value which differs (according to the cell's equality function) from the
//! current value notifies every observer synchronously, before `write` returns.
//!
//! Cells are shared handles - cloning a cell gives you another reference to the same value.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use smallvec::SmallVec;
use tracing::trace;
use crate::log::run_isolated;

/// A cancelable token returned from subscriptions. Calling [`dispose`](Disposable::dispose) (or
/// dropping the token) stops all future deliveries to the subscriber.
#[must_use = "Dropping a Disposable cancels the subscription"]
pub struct Disposable(Option<Box<dyn FnOnce()>>);

impl Disposable {
    pub fn new<F: FnOnce() + 'static>(f: F) -> Self {
        Disposable(Some(Box::new(f)))
    }

    /// A token which doesn't cancel anything.
    pub fn empty() -> Self {
        Disposable(None)
    }

    pub fn dispose(mut self) {
        if let Some(f) = self.0.take() { f(); }
    }

    /// Detach the token. The subscription will live for as long as its source does.
    pub fn forget(mut self) {
        self.0 = None;
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() { f(); }
    }
}

impl Debug for Disposable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable").field("live", &self.0.is_some()).finish()
    }
}

type Observer<T> = Box<dyn FnMut(&T)>;

struct ObserverSlot<T> {
    /// The version of the value this observer has seen.
    seen: u64,
    /// None while the observer is being called.
    f: Option<Observer<T>>,
}

struct Observers<T> {
    slots: BTreeMap<u64, ObserverSlot<T>>,
    next_id: u64,
    /// Bumped on every write which isn't suppressed by the equality function.
    version: u64,
    notifying: bool,
}

struct CellInner<T> {
    value: RefCell<T>,
    eq: Box<dyn Fn(&T, &T) -> bool>,
    observers: RefCell<Observers<T>>,

    /// Things which need to live as long as this cell. Usually folds or subscriptions writing into
    /// it.
    retained: RefCell<Vec<Box<dyn Any>>>,
}

pub struct Cell<T>(Rc<CellInner<T>>);

/// A weak reference to a cell. Used by subscriptions which write into a cell, so the writer
/// doesn't keep the cell alive.
pub struct WeakCell<T>(Weak<CellInner<T>>);

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self { Cell(self.0.clone()) }
}

impl<T> Clone for WeakCell<T> {
    fn clone(&self) -> Self { WeakCell(self.0.clone()) }
}

impl<T> WeakCell<T> {
    pub fn upgrade(&self) -> Option<Cell<T>> {
        self.0.upgrade().map(Cell)
    }
}

impl<T: Debug> Debug for Cell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cell").field(&*self.0.value.borrow()).finish()
    }
}

/// Resets the notifying flag even if an observer panics.
struct NotifyGuard<'a, T>(&'a RefCell<Observers<T>>);

impl<'a, T> Drop for NotifyGuard<'a, T> {
    fn drop(&mut self) {
        self.0.borrow_mut().notifying = false;
    }
}

impl<T: PartialEq + 'static> Cell<T> {
    pub fn new(value: T) -> Self {
        Self::with_eq(value, |a, b| a == b)
    }
}

impl<T: 'static> Cell<T> {
    /// Create a cell with a custom equality function. Writes for which `eq(old, new)` holds are
    /// dropped, and don't notify anyone.
    pub fn with_eq<E>(value: T, eq: E) -> Self where E: Fn(&T, &T) -> bool + 'static {
        Cell(Rc::new(CellInner {
            value: RefCell::new(value),
            eq: Box::new(eq),
            observers: RefCell::new(Observers {
                slots: BTreeMap::new(),
                next_id: 0,
                version: 0,
                notifying: false,
            }),
            retained: RefCell::new(Vec::new()),
        }))
    }

    /// A cell whose value never changes. Writes to a constant cell are ignored.
    pub fn constant(value: T) -> Self {
        Self::with_eq(value, |_, _| true)
    }

    pub fn downgrade(&self) -> WeakCell<T> {
        WeakCell(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Run `f` with a reference to the current value. Don't write to this cell from inside `f`.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
        f(&self.0.value.borrow())
    }

    /// Keep `value` alive for as long as this cell is alive.
    pub fn retain<V: Any>(&self, value: V) {
        self.0.retained.borrow_mut().push(Box::new(value));
    }

    pub fn observer_count(&self) -> usize {
        self.0.observers.borrow().slots.len()
    }

    fn add_observer(&self, f: Observer<T>) -> Disposable {
        let id = {
            let mut obs = self.0.observers.borrow_mut();
            let id = obs.next_id;
            obs.next_id += 1;
            let seen = obs.version;
            obs.slots.insert(id, ObserverSlot { seen, f: Some(f) });
            id
        };

        let weak = Rc::downgrade(&self.0);
        Disposable::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.observers.borrow_mut().slots.remove(&id);
                // Dropped outside the borrow. The observer might own other subscriptions.
                drop(removed);
            }
        })
    }
}

impl<T: Clone + 'static> Cell<T> {
    pub fn get(&self) -> T {
        self.0.value.borrow().clone()
    }

    /// Replace the value. Observers are notified unless the cell's equality function says the new
    /// value is the same as the old one.
    pub fn write(&self, value: T) {
        {
            let mut current = self.0.value.borrow_mut();
            if (self.0.eq)(&current, &value) { return; }
            *current = value;
        }
        self.0.observers.borrow_mut().version += 1;
        self.notify();
    }

    fn notify(&self) {
        let observers = &self.0.observers;
        {
            let mut obs = observers.borrow_mut();
            // The outer notify loop will pick up the new version.
            if obs.notifying { return; }
            obs.notifying = true;
        }
        let _guard = NotifyGuard(observers);

        loop {
            let version = observers.borrow().version;
            let value = self.get();

            let ids: SmallVec<[u64; 8]> = observers.borrow().slots.iter()
                .filter(|(_, slot)| slot.seen < version)
                .map(|(id, _)| *id)
                .collect();

            if ids.is_empty() { break; }
            trace!(version, observers = ids.len(), "notifying cell observers");

            for id in ids {
                // An observer wrote to this cell. Start again with the newer value.
                if observers.borrow().version != version { break; }

                let f = {
                    let mut obs = observers.borrow_mut();
                    let taken = match obs.slots.get_mut(&id) {
                        Some(slot) if slot.seen < version => {
                            slot.seen = version;
                            slot.f.take()
                        }
                        _ => None,
                    };
                    taken
                };
                let Some(mut f) = f else { continue; };

                let ok = run_isolated(|| f(&value));

                let dropped = {
                    let mut obs = observers.borrow_mut();
                    if !ok {
                        obs.slots.remove(&id);
                        Some(f)
                    } else if let Some(slot) = obs.slots.get_mut(&id) {
                        slot.f = Some(f);
                        None
                    } else { Some(f) } // Disposed while running.
                };
                drop(dropped);
            }
        }
    }

    /// Subscribe to the cell. `f` is called with the current value immediately, then again with
    /// every new value.
    pub fn read<F>(&self, mut f: F) -> Disposable where F: FnMut(&T) + 'static {
        let current = self.get();
        f(&current);
        self.add_observer(Box::new(f))
    }

    /// Like [`read`](Cell::read), but only future values are delivered.
    pub fn subscribe<F>(&self, f: F) -> Disposable where F: FnMut(&T) + 'static {
        self.add_observer(Box::new(f))
    }

    /// Make a new cell which tracks `f(value)`.
    pub fn map<U, F>(&self, f: F) -> Cell<U>
        where U: Clone + PartialEq + 'static, F: Fn(&T) -> U + 'static
    {
        let result = Cell::new(self.with(&f));
        let target = result.downgrade();
        let sub = self.subscribe(move |v| {
            if let Some(target) = target.upgrade() {
                target.write(f(v));
            }
        });
        result.retain(sub);
        result
    }

    /// Make a new cell which follows the cell returned by `f(value)`. When this cell changes, the
    /// old inner cell is dropped and the result follows the new one.
    pub fn flat_map<U, E, F>(&self, eq: E, f: F) -> Cell<U>
        where U: Clone + 'static, E: Fn(&U, &U) -> bool + 'static, F: Fn(&T) -> Cell<U> + 'static
    {
        let inner = self.with(&f);
        let result = Cell::with_eq(inner.get(), eq);
        let target = result.downgrade();

        fn follow<U: Clone + 'static>(inner: &Cell<U>, target: WeakCell<U>) -> Disposable {
            inner.subscribe(move |v| {
                if let Some(target) = target.upgrade() {
                    target.write(v.clone());
                }
            })
        }

        // We hold on to the inner cell too. Nothing else might.
        let current: Rc<RefCell<(Cell<U>, Disposable)>> = Rc::new(RefCell::new(
            (inner.clone(), follow(&inner, target.clone()))
        ));

        let c2 = current.clone();
        let sub = self.subscribe(move |v| {
            let Some(result) = target.upgrade() else { return; };
            let inner = f(v);
            let follower = follow(&inner, target.clone());
            let old = std::mem::replace(&mut *c2.borrow_mut(), (inner.clone(), follower));
            drop(old);
            result.write(inner.get());
        });

        result.retain(sub);
        result.retain(current);
        result
    }
}
