use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};

use super::scheduler::Pending;
use super::SchedulerError;

/// Lock a mutex, recovering the data if a holder panicked.
pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(e) => e.into_inner(),
    }
}

#[derive(Default)]
struct NodeState {
    complete: bool,
    dependents: Vec<Arc<Pending>>,
}

/// Completion state of one scheduled unit.
pub(super) struct Node {
    id: usize,
    state: Mutex<NodeState>,
    done: Condvar,
}

impl Node {
    pub(super) fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(NodeState::default()),
            done: Condvar::new(),
        })
    }

    /// Make `pending` wait for this node; releases it at once if the node is complete.
    pub(super) fn register(&self, pending: &Arc<Pending>) {
        let mut state = lock(&self.state);
        if state.complete {
            drop(state);
            pending.release();
        } else {
            state.dependents.push(Arc::clone(pending));
        }
    }

    /// Mark the node complete, wake every waiter and release the dependents.
    pub(super) fn finish(&self) {
        let dependents = {
            let mut state = lock(&self.state);
            state.complete = true;
            std::mem::take(&mut state.dependents)
        };
        self.done.notify_all();
        log::trace!("task {} complete, releasing {} dependents", self.id, dependents.len());
        dependents.iter().for_each(|pending| pending.release());
    }
}

/// A waitable token for the completion of a scheduled unit.
///
/// Handles are cheap to clone and can be passed as dependencies of later units.
#[derive(Clone)]
pub struct TaskHandle {
    pub(super) node: Arc<Node>,
}

impl TaskHandle {
    /// Identifier of the unit, unique per scheduler.
    pub fn id(&self) -> usize {
        self.node.id
    }

    /// Whether the unit has finished running.
    pub fn is_complete(&self) -> bool {
        lock(&self.node.state).complete
    }

    /// Block the calling thread until the unit has finished running.
    ///
    /// Must not be called from inside a scheduled unit, nor from any other worker
    /// thread of the pool the unit runs on: with every worker blocked here the unit
    /// never gets a thread.
    pub fn complete(&self) {
        let mut state = lock(&self.node.state);
        while !state.complete {
            state = match self.node.done.wait(state) {
                Ok(guard) => guard,
                Err(e) => e.into_inner(),
            };
        }
    }

    /// Block until every handle in `handles` has completed.
    pub fn complete_all(handles: &[&TaskHandle]) {
        handles.iter().for_each(|handle| handle.complete());
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// A scheduled unit together with the value it produces.
///
/// The value is only reachable through [`Task::complete`] or [`Task::into_inner`],
/// both of which wait for the unit first.
pub struct Task<T> {
    pub(super) handle: TaskHandle,
    pub(super) value: Arc<OnceLock<T>>,
}

impl<T> Task<T> {
    /// The completion handle of the unit.
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// Identifier of the unit.
    pub fn id(&self) -> usize {
        self.handle.id()
    }

    /// Whether the unit has finished running.
    pub fn is_complete(&self) -> bool {
        self.handle.is_complete()
    }

    /// Wait for the unit and borrow its value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::MissingOutput`] if the unit produced no value.
    pub fn complete(&self) -> Result<&T, SchedulerError> {
        self.handle.complete();
        self.value
            .get()
            .ok_or(SchedulerError::MissingOutput(self.id()))
    }

    /// Wait for the unit and take its value.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::MissingOutput`] if the unit produced no value and
    /// [`SchedulerError::OutputShared`] if a dependent unit still holds it.
    pub fn into_inner(self) -> Result<T, SchedulerError> {
        self.handle.complete();
        let id = self.id();
        match Arc::try_unwrap(self.value) {
            Ok(cell) => cell.into_inner().ok_or(SchedulerError::MissingOutput(id)),
            Err(_) => Err(SchedulerError::OutputShared(id)),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("handle", &self.handle).finish()
    }
}
