//! Fixed-size worker thread pool fed from one bounded task queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::queue::BoundedQueue;
use super::task::{Task, TaskOutcome};
use crate::error::PoolError;

/// How long an idle worker waits for a task before re-checking the exit flag.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A group of OS threads executing [`Task`]s from a shared bounded queue.
///
/// Shutdown is two-step: [`notify_exit`](Self::notify_exit) raises a flag that
/// idle workers observe within one poll interval, then [`join`](Self::join)
/// waits for them and discards whatever is still queued. A task already taken
/// by a worker always runs to completion.
pub struct WorkerPool {
    name: String,
    worker_count: usize,
    queue: Arc<BoundedQueue<Task>>,
    exiting: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool of `worker_count` workers over a queue of `queue_limit` tasks.
    ///
    /// No threads exist until [`start`](Self::start).
    pub fn new(name: impl Into<String>, worker_count: usize, queue_limit: usize) -> Self {
        Self {
            name: name.into(),
            worker_count,
            queue: Arc::new(BoundedQueue::new(queue_limit)),
            exiting: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of worker threads spawned and not yet joined.
    pub fn running(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Spawn the configured number of worker threads.
    ///
    /// On a spawn failure the threads started so far keep running; the caller
    /// must treat the error as fatal for this pool.
    pub fn start(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 0..self.worker_count {
            let queue = Arc::clone(&self.queue);
            let exiting = Arc::clone(&self.exiting);
            let handle = thread::Builder::new()
                .name(format!("{}-worker-{}", self.name, i))
                .spawn(move || Self::worker_loop(queue, exiting))
                .map_err(PoolError::Spawn)?;
            workers.push(handle);
        }
        tracing::debug!("{}: started {} workers", self.name, self.worker_count);
        Ok(())
    }

    fn worker_loop(queue: Arc<BoundedQueue<Task>>, exiting: Arc<AtomicBool>) {
        let name = thread::current().name().unwrap_or("worker").to_string();
        tracing::info!("Worker thread {} running", name);

        while !exiting.load(Ordering::Acquire) {
            if let Some(task) = queue.get_timeout(WORKER_POLL_INTERVAL) {
                task.execute();
            }
        }

        tracing::info!("Worker thread {} exiting", name);
    }

    /// Queue a task for asynchronous execution.
    ///
    /// Blocks while the queue is full. Rejected once the pool is exiting; the
    /// rejected task is dropped, which completes it as discarded.
    pub fn append_task(&self, task: Task) -> Result<(), PoolError> {
        if self.is_exiting() {
            return Err(PoolError::Exiting);
        }
        self.queue.put_open(task).map_err(|_| PoolError::Exiting)
    }

    /// Queue a task and block until a worker has finished it.
    pub fn append_and_wait(&self, task: Task) -> Result<TaskOutcome, PoolError> {
        if self.is_exiting() {
            return Err(PoolError::Exiting);
        }
        match task.handle() {
            Some(handle) => {
                self.queue.put_open(task).map_err(|_| PoolError::Exiting)?;
                Ok(handle.wait())
            }
            // Callback-mode tasks carry no waitable state; run them through
            // the queue and wait on a private relay instead.
            None => {
                let relay = Task::new(move || match task.execute() {
                    TaskOutcome::Completed(code) => code,
                    TaskOutcome::Discarded => 0,
                });
                let handle = relay.handle();
                self.queue.put_open(relay).map_err(|_| PoolError::Exiting)?;
                Ok(handle.map_or(TaskOutcome::Discarded, |h| h.wait()))
            }
        }
    }

    /// Tell workers to stop once they are idle. In-flight tasks are not interrupted.
    ///
    /// Producers blocked on a full queue are released with [`PoolError::Exiting`].
    pub fn notify_exit(&self) {
        self.exiting.store(true, Ordering::Release);
        self.queue.close();
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Wait for every worker to exit, then discard tasks still queued.
    ///
    /// Returns the number of discarded tasks. Call after
    /// [`notify_exit`](Self::notify_exit), otherwise this blocks until
    /// some other thread raises the flag.
    pub fn join(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("{}: a worker thread panicked", self.name);
            }
        }

        let discarded = self.queue.drain();
        let count = discarded.len();
        if count > 0 {
            tracing::info!("{}: discarding {} unstarted tasks", self.name, count);
        }
        drop(discarded);
        count
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.running() > 0 {
            self.notify_exit();
            let handles: Vec<JoinHandle<()>> = self
                .workers
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            for handle in handles {
                let _ = handle.join();
            }
        }
        // Without a prior join, leftover work still runs so nothing is lost silently.
        let leftover = self.queue.drain();
        if !leftover.is_empty() {
            tracing::debug!(
                "{}: running {} queued tasks before teardown",
                self.name,
                leftover.len()
            );
        }
        for task in leftover {
            task.execute();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
        let counter = Arc::clone(counter);
        Task::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            0
        })
    }

    #[test]
    fn test_executes_all_tasks() {
        let pool = WorkerPool::new("test", 3, 4);
        pool.start().unwrap();
        assert_eq!(pool.running(), 3);

        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let task = counting_task(&counter);
                let handle = task.handle().unwrap();
                pool.append_task(task).unwrap();
                handle
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.wait(), TaskOutcome::Completed(0));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);

        pool.notify_exit();
        assert_eq!(pool.join(), 0);
        assert_eq!(pool.running(), 0);
    }

    #[test]
    fn test_append_and_wait_returns_outcome() {
        let pool = WorkerPool::new("test", 1, 2);
        pool.start().unwrap();
        let outcome = pool.append_and_wait(Task::new(|| 42)).unwrap();
        assert_eq!(outcome, TaskOutcome::Completed(42));
        pool.notify_exit();
        pool.join();
    }

    #[test]
    fn test_append_and_wait_with_callback_task() {
        let pool = WorkerPool::new("test", 1, 2);
        pool.start().unwrap();
        let (tx, rx) = mpsc::channel();
        let task = Task::with_callback(
            || 5,
            move |outcome| {
                tx.send(outcome).unwrap();
            },
        );
        assert_eq!(
            pool.append_and_wait(task).unwrap(),
            TaskOutcome::Completed(5)
        );
        assert_eq!(rx.recv().unwrap(), TaskOutcome::Completed(5));
        pool.notify_exit();
        pool.join();
    }

    #[test]
    fn test_rejects_tasks_after_exit() {
        let pool = WorkerPool::new("test", 1, 2);
        pool.start().unwrap();
        pool.notify_exit();

        let task = Task::new(|| 0);
        let handle = task.handle().unwrap();
        assert!(matches!(pool.append_task(task), Err(PoolError::Exiting)));
        assert_eq!(handle.wait(), TaskOutcome::Discarded);
        assert!(matches!(
            pool.append_and_wait(Task::new(|| 0)),
            Err(PoolError::Exiting)
        ));
        pool.join();
    }

    #[test]
    fn test_exit_releases_producer_blocked_on_full_queue() {
        let pool = Arc::new(WorkerPool::new("test", 1, 1));
        pool.start().unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        pool.append_task(Task::new(move || {
            started_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(100));
            0
        }))
        .unwrap();
        started_rx.recv().unwrap();
        let queued = Task::new(|| 1);
        let queued_handle = queued.handle().unwrap();
        pool.append_task(queued).unwrap();

        let producer = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.append_and_wait(Task::new(|| 7)))
        };
        std::thread::sleep(Duration::from_millis(20));
        pool.notify_exit();
        assert_eq!(pool.join(), 1);

        assert!(matches!(producer.join().unwrap(), Err(PoolError::Exiting)));
        assert_eq!(queued_handle.wait(), TaskOutcome::Discarded);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_join_discards_unstarted_tasks() {
        // Never started: nothing drains the queue.
        let pool = WorkerPool::new("test", 1, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let task = counting_task(&counter);
            handles.push(task.handle().unwrap());
            pool.append_task(task).unwrap();
        }
        pool.notify_exit();
        assert_eq!(pool.join(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        for handle in handles {
            assert_eq!(handle.wait(), TaskOutcome::Discarded);
        }
    }

    #[test]
    fn test_in_flight_task_finishes_after_exit() {
        let pool = WorkerPool::new("test", 1, 2);
        pool.start().unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let task = Task::new(move || {
            started_tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            9
        });
        let handle = task.handle().unwrap();
        pool.append_task(task).unwrap();

        started_rx.recv().unwrap();
        pool.notify_exit();
        pool.join();
        assert_eq!(handle.outcome(), Some(TaskOutcome::Completed(9)));
    }

    #[test]
    fn test_drop_without_join_runs_leftover_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new("test", 2, 8);
            for _ in 0..4 {
                pool.append_task(counting_task(&counter)).unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_worker_survives_panicking_task() {
        let pool = WorkerPool::new("test", 1, 2);
        pool.start().unwrap();
        let outcome = pool.append_and_wait(Task::new(|| panic!("bad task"))).unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Completed(crate::error::ErrorCode::ProcessingException.as_i32())
        );
        assert_eq!(
            pool.append_and_wait(Task::new(|| 1)).unwrap(),
            TaskOutcome::Completed(1)
        );
        pool.notify_exit();
        pool.join();
    }
}
