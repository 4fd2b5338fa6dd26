//! Incremental views over the history of an array.
//!
//! This crate represents a mutable array as an immutable starting snapshot plus an append-only
//! log of positional edits. Derived views (mapped, filtered and sorted copies of the array) each
//! keep their own log, which is fed by translating the edits made upstream. A view is never
//! recomputed from scratch when the upstream array changes - only the affected positions are
//! touched.
//!
//! The crate is built on three pieces:
//!
//! 1. [`ArrayChange`]: a single insert or remove, positioned against the array as it exists
//!    immediately before the change is applied.
//! 2. [`AppendLog`]: an append-only list with resumable subscribers and incremental folds.
//! 3. [`ArrayWithHistory`]: an initial snapshot paired with a log of changes.
//!
//! Predicates and orderings are supplied through [`Cell`]s, so a view can be re-filtered or
//! re-sorted while it's live. The view then receives the minimal batch of changes moving it from
//! the old arrangement to the new one.
//!
//! ## Example
//!
//! ```
//! use array_history::*;
//!
//! let todos = ArrayWithHistory::new(vec![3, 1, 2]);
//! let order = Cell::new(Order::<i32>::natural());
//! let sorted = todos.sort(&order);
//! assert_eq!(sorted.latest_snapshot(), vec![1, 2, 3]);
//!
//! todos.change(ArrayChange::Insert(0, 1));
//! assert_eq!(sorted.latest_snapshot(), vec![0, 1, 2, 3]);
//!
//! order.write(Order::<i32>::natural().reversed());
//! assert_eq!(sorted.latest_snapshot(), vec![3, 2, 1, 0]);
//! ```
//!
//! Observing an array gives you its current content once, then each change as it happens:
//!
//! ```
//! use array_history::*;
//!
//! let arr = ArrayWithHistory::new(vec!['a']);
//! let visible = arr.filter(&Cell::constant(Predicate::new(|c: &char| *c != 'x')));
//! let token = visible.observe(
//!     |initial| println!("starting with {:?}", initial),
//!     |change| println!("{:?}", change),
//! );
//! arr.change(ArrayChange::Insert('b', 1));
//! token.dispose();
//! ```
//!
//! Everything in this crate is single threaded. A log expects exactly one writer at a time.

pub mod change;
pub mod edits;
mod log;
mod cell;
mod queue;
mod history;
mod views;
mod check;

#[cfg(any(test, feature = "gen_test_data"))]
pub mod fuzzer_tools;

pub use change::{ApplyChange, ArrayChange, ChangeError};
pub use edits::{EditScript, filter_changes, filtered_index, sort_changes};
pub use log::{AppendLog, WeakLog};
pub use cell::{Cell, Disposable, WeakCell};
pub use queue::TaskQueue;
pub use history::ArrayWithHistory;
pub use views::{Order, Predicate};
