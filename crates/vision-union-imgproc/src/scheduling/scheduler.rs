use std::convert::Infallible;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::handle::{lock, Node};
use super::{SchedulerError, Task, TaskHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where runnable units are sent.
#[derive(Clone, Debug)]
enum Spawner {
    Global,
    Pool(Arc<rayon::ThreadPool>),
}

impl Spawner {
    fn spawn(&self, job: Job) {
        match self {
            Spawner::Global => rayon::spawn(job),
            Spawner::Pool(pool) => pool.spawn(job),
        }
    }
}

/// A unit waiting for its dependencies.
///
/// `remaining` starts at the number of dependencies plus one, the extra count
/// being held by the scheduler until every dependency is registered.
pub(super) struct Pending {
    remaining: AtomicUsize,
    job: Mutex<Option<Job>>,
    spawner: Spawner,
}

impl Pending {
    /// Drop one count; the last one sends the unit to the pool.
    pub(super) fn release(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(job) = lock(&self.job).take() {
                self.spawner.spawn(job);
            }
        }
    }
}

/// Schedules units of work with explicit dependencies on a rayon thread pool.
///
/// Cloning a scheduler shares its pool.
///
/// # Example
///
/// ```
/// use vision_union_imgproc::scheduling::Scheduler;
///
/// let scheduler = Scheduler::global();
/// let a = scheduler.spawn(|| 2);
/// let b = scheduler.then(&a, |v| v * 10);
/// let c = scheduler.spawn(|| 1);
/// let sum = scheduler.join(&[&b, &c], |vs| vs.iter().copied().sum::<i32>());
/// assert_eq!(sum.into_inner().unwrap(), 21);
/// ```
#[derive(Clone, Debug)]
pub struct Scheduler {
    spawner: Spawner,
    next_id: Arc<AtomicUsize>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::global()
    }
}

impl Scheduler {
    /// A scheduler running on the global rayon pool.
    pub fn global() -> Self {
        Self {
            spawner: Spawner::Global,
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A scheduler with its own pool of `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self, SchedulerError> {
        if num_threads == 0 {
            return Err(SchedulerError::InvalidThreadCount(num_threads));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("vision-union-{i}"))
            .build()
            .map_err(|e| SchedulerError::BuildError(e.to_string()))?;
        Ok(Self {
            spawner: Spawner::Pool(Arc::new(pool)),
            next_id: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of worker threads units run on.
    pub fn num_threads(&self) -> usize {
        match &self.spawner {
            Spawner::Global => rayon::current_num_threads(),
            Spawner::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Run `f` once every handle in `deps` has completed.
    ///
    /// `f` runs whether or not the dependencies produced a value.
    pub fn schedule<U, F>(&self, deps: &[&TaskHandle], f: F) -> Task<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce() -> U + Send + 'static,
    {
        self.schedule_into(deps, move || Some(Ok::<U, Infallible>(f())))
    }

    /// Run `f` with no dependencies.
    pub fn spawn<U, F>(&self, f: F) -> Task<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce() -> U + Send + 'static,
    {
        self.schedule(&[], f)
    }

    /// Run a fallible `f` with no dependencies; an error leaves the task without a value.
    pub fn try_spawn<U, E, F>(&self, f: F) -> Task<U>
    where
        U: Send + Sync + 'static,
        E: Display,
        F: FnOnce() -> Result<U, E> + Send + 'static,
    {
        self.schedule_into(&[], move || Some(f()))
    }

    /// Run `f` on the value of `task` once it has completed.
    pub fn then<T, U, F>(&self, task: &Task<T>, f: F) -> Task<U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.try_then(task, move |value| Ok::<U, Infallible>(f(value)))
    }

    /// Fallible [`Scheduler::then`]; an error leaves the new task without a value.
    ///
    /// `f` is skipped when `task` produced no value.
    pub fn try_then<T, U, E, F>(&self, task: &Task<T>, f: F) -> Task<U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        E: Display,
        F: FnOnce(&T) -> Result<U, E> + Send + 'static,
    {
        let input = Arc::clone(&task.value);
        self.schedule_into(&[task.handle()], move || input.get().map(f))
    }

    /// Run `f` on the values of every task in `tasks` once all of them have completed.
    pub fn join<T, U, F>(&self, tasks: &[&Task<T>], f: F) -> Task<U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: FnOnce(&[&T]) -> U + Send + 'static,
    {
        self.try_join(tasks, move |values| Ok::<U, Infallible>(f(values)))
    }

    /// Fallible [`Scheduler::join`]; an error leaves the new task without a value.
    ///
    /// `f` is skipped when any of `tasks` produced no value.
    pub fn try_join<T, U, E, F>(&self, tasks: &[&Task<T>], f: F) -> Task<U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        E: Display,
        F: FnOnce(&[&T]) -> Result<U, E> + Send + 'static,
    {
        let inputs = tasks
            .iter()
            .map(|task| Arc::clone(&task.value))
            .collect::<Vec<_>>();
        let deps = tasks.iter().map(|task| task.handle()).collect::<Vec<_>>();
        self.schedule_into(&deps, move || {
            let values = inputs
                .iter()
                .map(|input| input.get())
                .collect::<Option<Vec<&T>>>()?;
            Some(f(&values))
        })
    }

    fn schedule_into<U, E, F>(&self, deps: &[&TaskHandle], f: F) -> Task<U>
    where
        U: Send + Sync + 'static,
        E: Display,
        F: FnOnce() -> Option<Result<U, E>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let node = Node::new(id);
        let value = Arc::new(OnceLock::new());

        let job: Job = {
            let node = Arc::clone(&node);
            let value = Arc::clone(&value);
            Box::new(move || {
                match panic::catch_unwind(AssertUnwindSafe(f)) {
                    Ok(Some(Ok(output))) => {
                        let _ = value.set(output);
                    }
                    Ok(Some(Err(e))) => log::error!("task {id} failed: {e}"),
                    Ok(None) => log::warn!("task {id} skipped: a dependency produced no value"),
                    Err(_) => log::error!("task {id} panicked"),
                }
                // the caller may take the value as soon as the node is complete
                drop(value);
                node.finish();
            })
        };

        let pending = Arc::new(Pending {
            remaining: AtomicUsize::new(deps.len() + 1),
            job: Mutex::new(Some(job)),
            spawner: self.spawner.clone(),
        });
        deps.iter().for_each(|dep| dep.node.register(&pending));
        log::trace!("task {id} scheduled with {} dependencies", deps.len());
        pending.release();

        Task {
            handle: TaskHandle { node },
            value,
        }
    }
}
