use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use tracing::trace;
use crate::cell::{Cell, Disposable};
use crate::change::{ApplyChange, ArrayChange, ChangeError};
use crate::log::AppendLog;

/// An array represented by its history: an immutable initial snapshot, and a live log of every
/// change made since.
///
/// The current state of the array is never stored. It's `initial` with every change in the log
/// applied in order - see [`latest_snapshot`](ArrayWithHistory::latest_snapshot). Cloning an
/// `ArrayWithHistory` is cheap and gives you another handle to the same history.
pub struct ArrayWithHistory<A> {
    pub(crate) initial: Rc<[A]>,
    pub(crate) changes: AppendLog<ArrayChange<A>>,
}

impl<A> Clone for ArrayWithHistory<A> {
    fn clone(&self) -> Self {
        Self {
            initial: self.initial.clone(),
            changes: self.changes.clone(),
        }
    }
}

impl<A: Debug> Debug for ArrayWithHistory<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayWithHistory")
            .field("initial", &&*self.initial)
            .field("changes", &self.changes)
            .finish()
    }
}

/// Equal if the initial snapshots match and the logs are the same log. (Logs compare by
/// identity. See [`AppendLog`].)
impl<A: PartialEq> PartialEq for ArrayWithHistory<A> {
    fn eq(&self, other: &Self) -> bool {
        self.initial == other.initial && self.changes == other.changes
    }
}

impl<A: Clone + 'static> From<Vec<A>> for ArrayWithHistory<A> {
    fn from(initial: Vec<A>) -> Self {
        Self::new(initial)
    }
}

impl<A: Clone + 'static> ArrayWithHistory<A> {
    /// Create a history with the given starting content and an empty log.
    pub fn new(initial: Vec<A>) -> Self {
        Self::from_parts(initial, AppendLog::new())
    }

    /// Pair an initial snapshot with an existing log. Every change in the log must be valid when
    /// replayed on top of `initial`.
    pub fn from_parts(initial: Vec<A>, changes: AppendLog<ArrayChange<A>>) -> Self {
        Self { initial: initial.into(), changes }
    }

    pub fn initial(&self) -> &[A] {
        &self.initial
    }

    pub fn changes(&self) -> &AppendLog<ArrayChange<A>> {
        &self.changes
    }

    /// Append a change to the log. The change's index must be valid against the array as it is
    /// right now - nothing is adjusted.
    pub fn change(&self, change: ArrayChange<A>) {
        trace!(index = change.index(), insert = change.is_insert(), "change");
        self.changes.append(change);
    }

    /// Append a whole edit script.
    pub fn concat<I: IntoIterator<Item=ArrayChange<A>>>(&self, script: I) {
        self.changes.concat(script);
    }

    /// Like [`change`](ArrayWithHistory::change), but checks the index first.
    pub fn try_change(&self, change: ArrayChange<A>) -> Result<(), ChangeError> {
        change.check_bounds(self.len())?;
        self.change(change);
        Ok(())
    }

    /// The current length of the array. This doesn't materialize the array.
    pub fn len(&self) -> usize {
        self.changes.with_entries(|entries| {
            entries.iter().fold(self.initial.len(), |len, c| {
                if c.is_insert() { len + 1 } else { len - 1 }
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay the log on top of the initial snapshot. This is O(initial + changes), every time.
    pub fn latest_snapshot(&self) -> Vec<A> {
        let mut result = self.initial.to_vec();
        self.changes.with_entries(|entries| {
            for c in entries {
                result.apply(c.clone());
            }
        });
        result
    }

    /// Observe the array. `on_initial` is called with the current content before this method
    /// returns. After that, `on_change` is called once for each change appended to the log, in
    /// order, until the returned token is disposed.
    pub fn observe<I, C>(&self, on_initial: I, on_change: C) -> Disposable
        where I: FnOnce(&[A]), C: FnMut(&ArrayChange<A>) + 'static
    {
        on_initial(&self.latest_snapshot());
        // Changes already in the log are part of the initial content. Only watch the tail.
        self.changes.subscribe_from(self.changes.len(), on_change)
    }
}

impl<A: Clone + PartialEq + 'static> ArrayWithHistory<A> {
    /// A live cell containing the current content of the array. The cell is maintained by an
    /// incremental fold over the log, so each change is applied once.
    pub fn latest(&self) -> Cell<Vec<A>> {
        self.changes.reduce(|a, b| a == b, self.initial.to_vec(), |c, mut arr| {
            arr.apply(c.clone());
            arr
        })
    }
}
