//! Reference scheduler backed by a pool of OS threads.
//!
//! Work units are fed through a lock-free injector queue; timed units wait in
//! a binary heap serviced by a dedicated timer thread. Interruption is a
//! per-unit flag that the unit's body polls through
//! [`Scheduler::interrupt_requested`].

use crate::config::CoreConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::scheduler::{Scheduler, Work};
use crate::types::UnitId;
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex, RwLock};
use std::cell::Cell;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

thread_local! {
    static CURRENT_UNIT: Cell<Option<UnitId>> = const { Cell::new(None) };
}

/// How long an idle worker parks before re-checking the injector.
const IDLE_PARK: Duration = Duration::from_millis(100);

/// How long the timer thread parks when no timed units are queued.
const TIMER_PARK: Duration = Duration::from_millis(500);

struct Job {
    unit: UnitId,
    work: Work,
}

struct TimedJob {
    at: Instant,
    seq: u64,
    job: Job,
}

// BinaryHeap is a max-heap; order timed jobs so the earliest deadline (and
// lowest sequence number among equal deadlines) surfaces first.
impl Ord for TimedJob {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimedJob {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimedJob {}

struct UnitEntry {
    interrupted: Arc<AtomicBool>,
}

struct PoolShared {
    injector: SegQueue<Job>,
    idle: Mutex<()>,
    idle_cond: Condvar,
    timer: Mutex<BinaryHeap<TimedJob>>,
    timer_cond: Condvar,
    units: RwLock<HashMap<UnitId, UnitEntry>>,
    next_unit: AtomicU64,
    next_seq: AtomicU64,
    shutdown: AtomicBool,
}

impl PoolShared {
    fn allocate_unit(&self) -> UnitId {
        let unit = UnitId::from_raw(self.next_unit.fetch_add(1, Ordering::Relaxed));
        self.units.write().insert(
            unit,
            UnitEntry {
                interrupted: Arc::new(AtomicBool::new(false)),
            },
        );
        unit
    }

    fn enqueue(&self, job: Job) {
        self.injector.push(job);
        // Take the idle lock briefly so a worker between its empty-check and
        // its park cannot miss the notification.
        drop(self.idle.lock());
        self.idle_cond.notify_one();
    }

    fn run_job(&self, job: Job) {
        let unit = job.unit;
        CURRENT_UNIT.with(|c| c.set(Some(unit)));
        let outcome = catch_unwind(AssertUnwindSafe(job.work));
        CURRENT_UNIT.with(|c| c.set(None));
        self.units.write().remove(&unit);
        if outcome.is_err() {
            tracing::error!(%unit, "scheduler unit panicked");
        } else {
            tracing::trace!(%unit, "scheduler unit finished");
        }
    }

    fn worker_loop(self: &Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if let Some(job) = self.injector.pop() {
                self.run_job(job);
                continue;
            }
            let mut guard = self.idle.lock();
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if self.injector.is_empty() {
                self.idle_cond.wait_for(&mut guard, IDLE_PARK);
            }
        }
    }

    fn timer_loop(self: &Arc<Self>) {
        loop {
            let mut heap = self.timer.lock();
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match heap.peek().map(|t| t.at) {
                Some(at) if at <= Instant::now() => {
                    if let Some(timed) = heap.pop() {
                        drop(heap);
                        self.enqueue(timed.job);
                    }
                }
                Some(at) => {
                    self.timer_cond.wait_until(&mut heap, at);
                }
                None => {
                    self.timer_cond.wait_for(&mut heap, TIMER_PARK);
                }
            }
        }
    }
}

/// Scheduler backed by a fixed pool of OS threads plus a timer thread.
///
/// Dropping the last handle shuts the pool down: workers finish their current
/// unit and exit; queued units that never ran are discarded.
pub struct ThreadScheduler {
    shared: Arc<PoolShared>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadScheduler {
    /// Starts the pool and returns it as a [`SchedulerHandle`].
    ///
    /// Fails with a `SchedulingFailed` error if worker threads cannot be
    /// created.
    pub fn try_start(config: &CoreConfig) -> Result<Arc<Self>> {
        let shared = Arc::new(PoolShared {
            injector: SegQueue::new(),
            idle: Mutex::new(()),
            idle_cond: Condvar::new(),
            timer: Mutex::new(BinaryHeap::new()),
            timer_cond: Condvar::new(),
            units: RwLock::new(HashMap::new()),
            next_unit: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        });

        let mut threads = Vec::with_capacity(config.worker_threads + 1);
        for index in 0..config.worker_threads {
            let worker = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{}-{index}", config.thread_name_prefix))
                .spawn(move || worker.worker_loop())
                .map_err(|e| {
                    Error::scheduling_failed("failed to spawn worker thread").with_source(e)
                })?;
            threads.push(handle);
        }
        let timer = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("{}-timer", config.thread_name_prefix))
            .spawn(move || timer.timer_loop())
            .map_err(|e| Error::scheduling_failed("failed to spawn timer thread").with_source(e))?;
        threads.push(handle);

        Ok(Arc::new(Self {
            shared,
            threads: Mutex::new(threads),
        }))
    }

    /// [`try_start`](Self::try_start) as a [`SchedulerHandle`], panicking on
    /// thread creation failure. Intended for examples and tests.
    #[must_use]
    pub fn start(config: &CoreConfig) -> crate::scheduler::SchedulerHandle {
        match Self::try_start(config) {
            Ok(pool) => pool,
            Err(e) => panic!("failed to start thread scheduler: {e}"),
        }
    }

    fn check_running(&self) -> Result<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::scheduling_failed("scheduler is shut down"));
        }
        Ok(())
    }
}

impl Scheduler for ThreadScheduler {
    fn spawn(&self, work: Work) -> Result<UnitId> {
        self.check_running()?;
        let unit = self.shared.allocate_unit();
        tracing::trace!(%unit, "spawn unit");
        self.shared.enqueue(Job { unit, work });
        Ok(unit)
    }

    fn spawn_at(&self, at: Instant, work: Work) -> Result<UnitId> {
        self.check_running()?;
        let unit = self.shared.allocate_unit();
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%unit, "spawn timed unit");
        {
            let mut heap = self.shared.timer.lock();
            heap.push(TimedJob {
                at,
                seq,
                job: Job { unit, work },
            });
        }
        self.shared.timer_cond.notify_one();
        Ok(unit)
    }

    fn interrupt(&self, unit: UnitId) -> Result<()> {
        let units = self.shared.units.read();
        match units.get(&unit) {
            Some(entry) => {
                entry.interrupted.store(true, Ordering::Release);
                tracing::debug!(%unit, "interrupt requested");
                Ok(())
            }
            None => Err(Error::new(ErrorKind::InterruptFailed)
                .with_message(format!("unit {unit} is not running"))),
        }
    }

    fn current_unit(&self) -> Option<UnitId> {
        CURRENT_UNIT.with(Cell::get)
    }

    fn interrupt_requested(&self, unit: UnitId) -> bool {
        self.shared
            .units
            .read()
            .get(&unit)
            .is_some_and(|entry| entry.interrupted.load(Ordering::Acquire))
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        {
            drop(self.shared.idle.lock());
            self.shared.idle_cond.notify_all();
        }
        {
            drop(self.shared.timer.lock());
            self.shared.timer_cond.notify_all();
        }
        let current = thread::current().id();
        for handle in self.threads.lock().drain(..) {
            // The last handle can be released from inside one of our own
            // units; joining that worker's own thread would deadlock, so it
            // is detached and unwinds on its own once the loop sees the
            // shutdown flag.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn pool(workers: usize) -> Arc<ThreadScheduler> {
        let config = CoreConfig::default().with_worker_threads(workers);
        ThreadScheduler::try_start(&config).expect("pool start")
    }

    #[test]
    fn spawn_runs_work() {
        let scheduler = pool(2);
        let (tx, rx) = mpsc::channel();
        scheduler
            .spawn(Box::new(move || tx.send(42).expect("send")))
            .expect("spawn");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).expect("recv"), 42);
    }

    #[test]
    fn spawn_at_waits_for_deadline() {
        let scheduler = pool(1);
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();
        scheduler
            .spawn_at(
                start + Duration::from_millis(50),
                Box::new(move || tx.send(()).expect("send")),
            )
            .expect("spawn_at");
        rx.recv_timeout(Duration::from_secs(5)).expect("recv");
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn current_unit_visible_only_inside_unit() {
        let scheduler = pool(1);
        assert!(scheduler.current_unit().is_none());

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&scheduler);
        scheduler
            .spawn(Box::new(move || {
                tx.send(inner.current_unit()).expect("send");
            }))
            .expect("spawn");
        let seen = rx.recv_timeout(Duration::from_secs(5)).expect("recv");
        assert!(seen.is_some());
    }

    #[test]
    fn interrupt_unknown_unit_fails() {
        let scheduler = pool(1);
        let err = scheduler.interrupt(UnitId::from_raw(9999)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InterruptFailed);
    }

    #[test]
    fn interrupt_flag_observed_by_unit() {
        let scheduler = pool(1);
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let inner = Arc::clone(&scheduler);
        let unit = scheduler
            .spawn(Box::new(move || {
                let me = inner.current_unit().expect("inside unit");
                ready_tx.send(()).expect("send ready");
                while !inner.interrupt_requested(me) {
                    thread::sleep(Duration::from_millis(1));
                }
                done_tx.send(()).expect("send done");
            }))
            .expect("spawn");

        ready_rx.recv_timeout(Duration::from_secs(5)).expect("ready");
        scheduler.interrupt(unit).expect("interrupt");
        done_rx.recv_timeout(Duration::from_secs(5)).expect("done");
    }

    #[test]
    fn releasing_last_handle_inside_a_unit_does_not_deadlock() {
        let scheduler = pool(2);
        let (go_tx, go_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let inner = Arc::clone(&scheduler);
        scheduler
            .spawn(Box::new(move || {
                go_rx.recv().expect("go");
                // this drop releases the final handle on a worker thread
                drop(inner);
                done_tx.send(()).expect("send done");
            }))
            .expect("spawn");
        drop(scheduler);
        go_tx.send(()).expect("signal");
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("shutdown completed from inside a unit");
    }

    #[test]
    fn panicking_unit_does_not_kill_worker() {
        let scheduler = pool(1);
        scheduler
            .spawn(Box::new(|| panic!("unit panic")))
            .expect("spawn");

        let (tx, rx) = mpsc::channel();
        scheduler
            .spawn(Box::new(move || tx.send(()).expect("send")))
            .expect("spawn");
        rx.recv_timeout(Duration::from_secs(5)).expect("worker survived");
    }
}
