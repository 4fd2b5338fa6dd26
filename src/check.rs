use crate::change::ApplyChange;
use crate::history::ArrayWithHistory;

impl<A: Clone + PartialEq + std::fmt::Debug + 'static> ArrayWithHistory<A> {
    /// Check the internal state of the history. This is only exported for integration testing.
    /// You shouldn't have any reason to call this method.
    ///
    /// Panics if any change in the log is out of bounds for the array it applies to, if the live
    /// length disagrees with a replay, or if a subscriber is lagging behind while the log is idle.
    #[allow(unused)]
    pub fn dbg_check(&self) {
        let mut arr = self.initial.to_vec();
        self.changes.with_entries(|entries| {
            for (pos, c) in entries.iter().enumerate() {
                if let Err(e) = c.check_bounds(arr.len()) {
                    panic!("Change {pos} in the log is invalid: {e}");
                }
                arr.apply(c.clone());
            }
        });

        assert_eq!(arr.len(), self.len());
        assert_eq!(arr, self.latest_snapshot());
        self.changes.dbg_check();
    }
}
