//! Prioritized, cancellable background work
//!
//! [`WorkQueue`] is the seam between the tile scheduler and whatever runs
//! generation jobs. Two implementations ship with the crate:
//!
//! * [`ThreadedWorkQueue`]: a tokio runtime whose worker loop keeps up to
//!   `max_concurrent` jobs running on the blocking pool, highest priority first.
//! * [`ManualWorkQueue`]: jobs run only when the owner calls
//!   [`ManualWorkQueue::run_next`], which makes scheduling deterministic in tests.
//!
//! Jobs report their results themselves (usually over a channel), the queue
//! only tracks which ids are pending and which are running.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::task::JoinSet;

/// Identifier of a submitted work item, unique per scheduler
pub type WorkId = u64;

/// The body of a work item
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A unit of background work
pub struct WorkItem {
    pub id: WorkId,
    /// Tag for logging and debugging
    pub name: String,
    /// Higher runs first
    pub priority: i32,
    pub job: Job,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Contract of a background work pool
pub trait WorkQueue: Send {
    /// Queue an item. Ids must not be reused while the previous item is known.
    fn enqueue(&mut self, item: WorkItem);

    /// Remove an item that has not started yet. Returns `false` if it is
    /// running or unknown; a removed item never runs.
    fn dequeue(&mut self, id: WorkId) -> bool;

    /// Change the priority of a pending item; no effect once it runs
    fn set_priority(&mut self, id: WorkId, priority: i32);

    fn is_enqueued(&self, id: WorkId) -> bool;

    fn is_active(&self, id: WorkId) -> bool;

    /// Block until the item is no longer running
    fn wait_finished(&self, id: WorkId);

    /// Anything pending or running
    fn is_working(&self) -> bool;

    fn pending_count(&self) -> usize;

    fn active_count(&self) -> usize;
}

#[derive(Default)]
struct QueueState {
    pending: Vec<(u64, WorkItem)>,
    active: HashSet<WorkId>,
    next_seq: u64,
    shutdown: bool,
}

impl QueueState {
    /// Highest priority, oldest first among equals
    fn take_next(&mut self) -> Option<WorkItem> {
        let best = self
            .pending
            .iter()
            .enumerate()
            .max_by(|(_, (sa, a)), (_, (sb, b))| a.priority.cmp(&b.priority).then(sb.cmp(sa)))
            .map(|(i, _)| i)?;
        let (_, item) = self.pending.swap_remove(best);
        self.active.insert(item.id);
        Some(item)
    }
}

#[derive(Default)]
struct SharedQueue {
    state: Mutex<QueueState>,
    finished: Condvar,
}

impl SharedQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, item: WorkItem) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push((seq, item));
    }

    fn take_next(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        if state.shutdown {
            return None;
        }
        state.take_next()
    }

    fn remove_pending(&self, id: WorkId) -> bool {
        let mut state = self.lock();
        match state.pending.iter().position(|(_, item)| item.id == id) {
            Some(pos) => {
                state.pending.remove(pos);
                true
            }
            None => false,
        }
    }

    fn set_priority(&self, id: WorkId, priority: i32) {
        let mut state = self.lock();
        if let Some((_, item)) = state.pending.iter_mut().find(|(_, item)| item.id == id) {
            item.priority = priority;
        }
    }

    fn finish(&self, id: WorkId) {
        self.lock().active.remove(&id);
        self.finished.notify_all();
    }

    fn wait_finished(&self, id: WorkId) {
        let mut state = self.lock();
        while state.active.contains(&id) {
            state = self.finished.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Marks the item finished even if the job panics
struct FinishGuard {
    shared: Arc<SharedQueue>,
    id: WorkId,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.shared.finish(self.id);
    }
}

fn run_item(shared: &Arc<SharedQueue>, item: WorkItem) {
    let WorkItem { id, name, job, .. } = item;
    let _guard = FinishGuard { shared: Arc::clone(shared), id };
    log::trace!("Running work item {id} ({name})");
    job();
}

macro_rules! delegate_queries {
    () => {
        fn is_enqueued(&self, id: WorkId) -> bool {
            self.shared.lock().pending.iter().any(|(_, item)| item.id == id)
        }

        fn is_active(&self, id: WorkId) -> bool {
            self.shared.lock().active.contains(&id)
        }

        fn wait_finished(&self, id: WorkId) {
            self.shared.wait_finished(id);
        }

        fn is_working(&self) -> bool {
            let state = self.shared.lock();
            !state.pending.is_empty() || !state.active.is_empty()
        }

        fn pending_count(&self) -> usize {
            self.shared.lock().pending.len()
        }

        fn active_count(&self) -> usize {
            self.shared.lock().active.len()
        }
    };
}

/// Thread pool backed by a dedicated tokio runtime
pub struct ThreadedWorkQueue {
    shared: Arc<SharedQueue>,
    wake: Arc<Notify>,
    runtime: Option<Runtime>,
}

impl ThreadedWorkQueue {
    /// Create a pool running at most `max_concurrent` jobs at once
    pub fn new(max_concurrent: usize) -> std::io::Result<Self> {
        let max_concurrent = max_concurrent.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_concurrent)
            .thread_name("terratile-worker")
            .enable_all()
            .build()?;

        let shared = Arc::new(SharedQueue::default());
        let wake = Arc::new(Notify::new());

        runtime.spawn(Self::worker_loop(Arc::clone(&shared), Arc::clone(&wake), max_concurrent));
        log::debug!("Started work queue with {max_concurrent} workers");

        Ok(Self { shared, wake, runtime: Some(runtime) })
    }

    /// Worker loop that starts jobs with concurrency control
    async fn worker_loop(shared: Arc<SharedQueue>, wake: Arc<Notify>, max_concurrent: usize) {
        let mut running: JoinSet<()> = JoinSet::new();

        loop {
            // Start new jobs while there is capacity
            while running.len() < max_concurrent {
                let Some(item) = shared.take_next() else { break };
                let shared = Arc::clone(&shared);
                running.spawn_blocking(move || run_item(&shared, item));
            }

            if shared.lock().shutdown && running.is_empty() {
                break;
            }

            tokio::select! {
                _ = wake.notified() => {}

                Some(result) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = result {
                        log::error!("Work item panicked: {e}");
                    }
                }
            }
        }
    }
}

impl WorkQueue for ThreadedWorkQueue {
    fn enqueue(&mut self, item: WorkItem) {
        self.shared.push(item);
        self.wake.notify_one();
    }

    fn dequeue(&mut self, id: WorkId) -> bool {
        self.shared.remove_pending(id)
    }

    fn set_priority(&mut self, id: WorkId, priority: i32) {
        self.shared.set_priority(id, priority);
    }

    delegate_queries!();
}

impl Drop for ThreadedWorkQueue {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.pending.clear();
        }
        self.wake.notify_one();

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Queue whose jobs run only when asked to
///
/// Clones share the same queue, so a test can hand one clone to the
/// scheduler and drive jobs with another, from any thread.
#[derive(Clone, Default)]
pub struct ManualWorkQueue {
    shared: Arc<SharedQueue>,
}

impl ManualWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the highest priority pending job on the calling thread.
    /// Returns `false` if nothing was pending.
    pub fn run_next(&self) -> bool {
        match self.shared.take_next() {
            Some(item) => {
                run_item(&self.shared, item);
                true
            }
            None => false,
        }
    }

    /// Run jobs until none are pending, returning how many ran
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }

    /// Names of pending jobs in the order they would run
    pub fn pending_names(&self) -> Vec<String> {
        let state = self.shared.lock();
        let mut items: Vec<&(u64, WorkItem)> = state.pending.iter().collect();
        items.sort_by(|(sa, a), (sb, b)| b.priority.cmp(&a.priority).then(sa.cmp(sb)));
        items.into_iter().map(|(_, item)| item.name.clone()).collect()
    }
}

impl WorkQueue for ManualWorkQueue {
    fn enqueue(&mut self, item: WorkItem) {
        self.shared.push(item);
    }

    fn dequeue(&mut self, id: WorkId) -> bool {
        self.shared.remove_pending(id)
    }

    fn set_priority(&mut self, id: WorkId, priority: i32) {
        self.shared.set_priority(id, priority);
    }

    delegate_queries!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn item(id: WorkId, priority: i32, log: &Arc<Mutex<Vec<WorkId>>>) -> WorkItem {
        let log = Arc::clone(log);
        WorkItem {
            id,
            name: format!("job {id}"),
            priority,
            job: Box::new(move || log.lock().unwrap().push(id)),
        }
    }

    #[test]
    fn test_manual_runs_by_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = ManualWorkQueue::new();
        queue.enqueue(item(1, -300, &log));
        queue.enqueue(item(2, 500, &log));
        queue.enqueue(item(3, -100, &log));
        queue.enqueue(item(4, -100, &log));

        assert_eq!(queue.pending_names(), vec!["job 2", "job 3", "job 4", "job 1"]);
        assert_eq!(queue.run_all(), 4);
        assert_eq!(*log.lock().unwrap(), vec![2, 3, 4, 1]);
        assert!(!queue.is_working());
    }

    #[test]
    fn test_dequeued_item_never_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = ManualWorkQueue::new();
        queue.enqueue(item(1, 0, &log));
        queue.enqueue(item(2, 0, &log));

        assert!(queue.dequeue(1));
        assert!(!queue.dequeue(1));
        queue.run_all();
        assert_eq!(*log.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_set_priority_reorders() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = ManualWorkQueue::new();
        queue.enqueue(item(1, 0, &log));
        queue.enqueue(item(2, 0, &log));
        queue.set_priority(2, 10);
        queue.run_all();
        assert_eq!(*log.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_active_tracking_and_wait() {
        let mut queue = ManualWorkQueue::new();
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(AtomicUsize::new(0));

        let (s, r) = (Arc::clone(&started), Arc::clone(&release));
        queue.enqueue(WorkItem {
            id: 7,
            name: "blocking".into(),
            priority: 0,
            job: Box::new(move || {
                s.store(1, Ordering::SeqCst);
                while r.load(Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }),
        });

        let runner = queue.clone();
        let handle = std::thread::spawn(move || runner.run_next());

        while started.load(Ordering::SeqCst) == 0 {
            std::thread::yield_now();
        }
        assert!(queue.is_active(7));
        assert!(!queue.is_enqueued(7));
        assert!(!queue.dequeue(7));

        release.store(1, Ordering::SeqCst);
        queue.wait_finished(7);
        assert!(!queue.is_active(7));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_threaded_runs_all_jobs() {
        let mut queue = ThreadedWorkQueue::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for id in 0..20 {
            let counter = Arc::clone(&counter);
            queue.enqueue(WorkItem {
                id,
                name: format!("count {id}"),
                priority: id as i32,
                job: Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            });
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while queue.is_working() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_threaded_respects_concurrency_limit() {
        let mut queue = ThreadedWorkQueue::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for id in 0..8 {
            let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
            queue.enqueue(WorkItem {
                id,
                name: "sleep".into(),
                priority: 0,
                job: Box::new(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                }),
            });
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while queue.is_working() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(!queue.is_working());
    }
}
