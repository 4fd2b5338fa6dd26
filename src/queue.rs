use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct QueueInner {
    tasks: VecDeque<Task>,
    running: bool,
}

/// A sequential task queue.
///
/// Derived views are driven by two independent sources (upstream changes and the predicate /
/// ordering cell). Both push their work through the view's queue, so the view's state is only
/// ever touched by one task at a time, in arrival order - even if a task re-entrantly triggers
/// more work.
#[derive(Clone, Default)]
pub struct TaskQueue(Rc<RefCell<QueueInner>>);

struct RunGuard<'a>(&'a RefCell<QueueInner>);

impl<'a> Drop for RunGuard<'a> {
    fn drop(&mut self) {
        self.0.borrow_mut().running = false;
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the task and run it. If the queue is already running (we've been called from inside
    /// another task), the task is run after the current task finishes, before this queue returns
    /// to its outermost caller.
    pub fn run<F: FnOnce() + 'static>(&self, task: F) {
        {
            let mut inner = self.0.borrow_mut();
            inner.tasks.push_back(Box::new(task));
            if inner.running { return; }
            inner.running = true;
        }
        let _guard = RunGuard(&self.0);

        loop {
            let next = self.0.borrow_mut().tasks.pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        let inner = self.0.borrow();
        !inner.running && inner.tasks.is_empty()
    }
}
