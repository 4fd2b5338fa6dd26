//! A change is a single positional edit to an array: an insert or a remove.
//!
//! The index inside a change is always relative to the array as it exists *immediately before*
//! the change is applied. So a log of changes can only be interpreted in order, starting from
//! some known snapshot.

use std::error::Error;
use std::fmt::{Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use ArrayChange::*;

#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArrayChange<A> {
    /// Insert the element so it ends up at the named index. Valid for `0..=len`.
    Insert(A, usize),
    /// Remove the element at the named index. Valid for `0..len`.
    Remove(usize),
}

impl<A> ArrayChange<A> {
    pub fn insert(element: A, at: usize) -> Self { Insert(element, at) }

    pub fn remove(at: usize) -> Self { Remove(at) }

    #[inline]
    pub fn index(&self) -> usize {
        match self {
            Insert(_, i) | Remove(i) => *i
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Insert(..))
    }

    /// The inserted element, if this is an insert. Removes don't carry their content.
    pub fn element(&self) -> Option<&A> {
        match self {
            Insert(e, _) => Some(e),
            Remove(_) => None,
        }
    }

    /// Relabel the payload. The index is left alone - this is what makes `map` views trivial.
    pub fn map<B, F: FnOnce(A) -> B>(self, f: F) -> ArrayChange<B> {
        match self {
            Insert(e, i) => Insert(f(e), i),
            Remove(i) => Remove(i),
        }
    }

    pub fn as_ref(&self) -> ArrayChange<&A> {
        match self {
            Insert(e, i) => Insert(e, *i),
            Remove(i) => Remove(*i),
        }
    }

    /// Check the change is valid for an array with `len` items.
    pub fn check_bounds(&self, len: usize) -> Result<(), ChangeError> {
        let ok = match self {
            Insert(_, i) => *i <= len,
            Remove(i) => *i < len,
        };

        if ok { Ok(()) } else {
            Err(ChangeError::IndexOutOfBounds {
                is_insert: self.is_insert(),
                index: self.index(),
                len
            })
        }
    }
}

impl<A> Display for ArrayChange<A> where A: Display {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Insert(e, i) => write!(f, "Ins({e} @ {i})"),
            Remove(i) => write!(f, "Del(@ {i})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ChangeError {
    /// The change named a position outside the array it was applied to.
    IndexOutOfBounds { is_insert: bool, index: usize, len: usize },
}

impl Display for ChangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeError::IndexOutOfBounds { is_insert: true, index, len } => {
                write!(f, "insert index {index} out of bounds for array of length {len}")
            }
            ChangeError::IndexOutOfBounds { is_insert: false, index, len } => {
                write!(f, "remove index {index} out of bounds for array of length {len}")
            }
        }
    }
}

impl Error for ChangeError {}

/// Positional application of changes to a materialized snapshot.
pub trait ApplyChange<A> {
    /// Apply the change in place.
    ///
    /// # Panics
    ///
    /// If the change's index is out of range for the current length. This is a contract violation
    /// on the caller's side - see [`try_apply`](ApplyChange::try_apply) to check first.
    fn apply(&mut self, change: ArrayChange<A>);

    fn try_apply(&mut self, change: ArrayChange<A>) -> Result<(), ChangeError>;

    /// Copying variant of [`apply`](ApplyChange::apply).
    fn applying(&self, change: ArrayChange<A>) -> Self where Self: Clone {
        let mut copy = self.clone();
        copy.apply(change);
        copy
    }
}

impl<A> ApplyChange<A> for Vec<A> {
    fn apply(&mut self, change: ArrayChange<A>) {
        if let Err(e) = change.check_bounds(self.len()) {
            panic!("Invalid change: {e}");
        }

        match change {
            Insert(e, i) => self.insert(i, e),
            Remove(i) => { self.remove(i); }
        }
    }

    fn try_apply(&mut self, change: ArrayChange<A>) -> Result<(), ChangeError> {
        change.check_bounds(self.len())?;
        self.apply(change);
        Ok(())
    }
}

/// Replay a sequence of changes on top of a snapshot.
pub fn replay<A, I>(initial: &[A], changes: I) -> Vec<A>
    where A: Clone, I: IntoIterator<Item=ArrayChange<A>>
{
    let mut result = initial.to_vec();
    for c in changes {
        result.apply(c);
    }
    result
}
