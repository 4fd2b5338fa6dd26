//! Derived views over an [`ArrayWithHistory`](crate::ArrayWithHistory).
//!
//! Each view is itself an `ArrayWithHistory` with its own log. The view's log is written by a
//! translation process which watches the upstream log (and, for filter and sort, a cell holding
//! the current predicate or ordering). Nobody else should write to a view's log.
//!
//! Views hold their upstream subscriptions. Dropping every handle to a view unsubscribes it.

use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use crate::log::AppendLog;

mod map;
mod filter;
mod sort;

/// Marks a view's log as detached if the translation step holding this guard panics.
struct DetachOnPanic<'a, T>(&'a AppendLog<T>);

impl<'a, T> Drop for DetachOnPanic<'a, T> {
    fn drop(&mut self) {
        if std::thread::panicking() { self.0.mark_detached(); }
    }
}

/// A shared predicate, used to drive [`filter`](crate::ArrayWithHistory::filter) views.
///
/// Predicates compare by identity. Writing a clone of the current predicate into a cell is a
/// no-op; writing a newly constructed predicate always propagates, even if it happens to behave
/// the same.
pub struct Predicate<A>(Rc<dyn Fn(&A) -> bool>);

impl<A> Clone for Predicate<A> {
    fn clone(&self) -> Self { Predicate(self.0.clone()) }
}

impl<A> PartialEq for Predicate<A> {
    fn eq(&self, other: &Self) -> bool {
        // Compare the data pointers only. Vtable pointers aren't stable across codegen units.
        Rc::as_ptr(&self.0) as *const u8 == Rc::as_ptr(&other.0) as *const u8
    }
}

impl<A> Debug for Predicate<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Predicate({:p})", Rc::as_ptr(&self.0) as *const u8)
    }
}

impl<A: 'static> Predicate<A> {
    pub fn new<F: Fn(&A) -> bool + 'static>(f: F) -> Self {
        Predicate(Rc::new(f))
    }

    /// A predicate which includes everything.
    pub fn all() -> Self {
        Self::new(|_| true)
    }
}

impl<A> Predicate<A> {
    #[inline]
    pub fn test(&self, item: &A) -> bool {
        (self.0)(item)
    }
}

/// A shared total order, used to drive [`sort`](crate::ArrayWithHistory::sort) views. Like
/// [`Predicate`], orders compare by identity.
pub struct Order<A>(Rc<dyn Fn(&A, &A) -> Ordering>);

impl<A> Clone for Order<A> {
    fn clone(&self) -> Self { Order(self.0.clone()) }
}

impl<A> PartialEq for Order<A> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.0) as *const u8 == Rc::as_ptr(&other.0) as *const u8
    }
}

impl<A> Debug for Order<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Order({:p})", Rc::as_ptr(&self.0) as *const u8)
    }
}

impl<A: 'static> Order<A> {
    pub fn new<F: Fn(&A, &A) -> Ordering + 'static>(f: F) -> Self {
        Order(Rc::new(f))
    }

    pub fn by_key<K: Ord + 'static, F: Fn(&A) -> K + 'static>(key: F) -> Self {
        Self::new(move |a, b| key(a).cmp(&key(b)))
    }

    pub fn reversed(&self) -> Self {
        let inner = self.0.clone();
        Self::new(move |a, b| inner(b, a))
    }
}

impl<A> Order<A> {
    #[inline]
    pub fn cmp(&self, a: &A, b: &A) -> Ordering {
        (self.0)(a, b)
    }
}

impl<A: Ord + 'static> Order<A> {
    /// Ascending order according to `Ord`.
    pub fn natural() -> Self {
        Self::new(A::cmp)
    }
}
