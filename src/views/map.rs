use tracing::debug;
use crate::history::ArrayWithHistory;

impl<A: Clone + 'static> ArrayWithHistory<A> {
    /// Transform every element of the array.
    ///
    /// This is a pure relabeling: the view's initial snapshot is `f` applied to the upstream
    /// initial snapshot, and its log is the upstream log with `f` applied to each inserted
    /// element. Indexes are untouched.
    pub fn map<B, F>(&self, f: F) -> ArrayWithHistory<B>
        where B: Clone + 'static, F: Fn(&A) -> B + 'static
    {
        let initial: Vec<B> = self.initial.iter().map(&f).collect();
        let changes = self.changes.map(move |c| c.as_ref().map(&f));
        debug!(initial = initial.len(), changes = changes.len(), "map view");
        ArrayWithHistory::from_parts(initial, changes)
    }
}
