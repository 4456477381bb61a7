//! Priority-ordered deferred-invocation queue.
//!
//! A single worker thread drains a binary heap ordered by due time,
//! then priority (higher first), then submission order. Records are
//! re-processed through the normal dispatcher contract when their
//! callback comes due. The queue depth is bounded; a full or shut-down
//! queue refuses requests, which callers treat as retry-next-scan.

use pvdb_common::error::ScheduleError;
use pvdb_engine::sched::{CallbackScheduler, EventSink, ProcessCallback};
use pvdb_engine::{ProcessContext, process};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default bound on queued callbacks.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

struct Entry {
    due: Instant,
    cb: Arc<ProcessCallback>,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap: greater means popped first. Earliest
    // due time wins, then higher priority, then FIFO.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| self.cb.priority.cmp(&other.cb.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    shutdown: bool,
}

impl QueueState {
    /// Pop the next entry to run: the highest-priority one among all
    /// entries already due, FIFO within a priority.
    ///
    /// Each request stamps its own due time, so two requests meant to
    /// be simultaneous differ by the submission gap; strict heap order
    /// would let that gap decide before priority ever could. The caller
    /// has verified the head is due.
    fn pop_due(&mut self) -> Entry {
        let now = Instant::now();
        let mut best = self.heap.pop().expect("peeked entry vanished");
        let mut rest = Vec::new();
        while let Some(head) = self.heap.peek() {
            if head.due > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry vanished");
            let wins = entry.cb.priority > best.cb.priority
                || (entry.cb.priority == best.cb.priority && entry.seq < best.seq);
            if wins {
                rest.push(std::mem::replace(&mut best, entry));
            } else {
                rest.push(entry);
            }
        }
        for entry in rest {
            self.heap.push(entry);
        }
        best
    }
}

struct Inner {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    events: Arc<dyn EventSink>,
}

impl Inner {
    fn push(&self, cb: &Arc<ProcessCallback>, due: Instant) -> Result<(), ScheduleError> {
        let mut state = self.state.lock().expect("callback queue lock poisoned");
        if state.shutdown {
            return Err(ScheduleError::ShutDown);
        }
        if state.heap.len() >= self.capacity {
            return Err(ScheduleError::QueueFull);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Entry {
            due,
            cb: Arc::clone(cb),
            seq,
        });
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn worker(self: &Arc<Self>) {
        loop {
            let entry = {
                let mut state = self.state.lock().expect("callback queue lock poisoned");
                loop {
                    if state.shutdown {
                        return;
                    }
                    let now = Instant::now();
                    match state.heap.peek() {
                        None => {
                            state = self
                                .available
                                .wait(state)
                                .expect("callback queue lock poisoned");
                        }
                        Some(head) if head.due <= now => break,
                        Some(head) => {
                            let timeout = head.due.duration_since(now);
                            let (guard, _) = self
                                .available
                                .wait_timeout(state, timeout)
                                .expect("callback queue lock poisoned");
                            state = guard;
                        }
                    }
                }
                state.pop_due()
            };

            let ctx = ProcessContext {
                scheduler: self.as_ref(),
                events: self.events.as_ref(),
            };
            if let Err(err) = process(&entry.cb.record, &ctx) {
                warn!(record = entry.cb.record.name(), %err, "callback processing failed");
            }
        }
    }
}

impl CallbackScheduler for Inner {
    fn request(&self, cb: &Arc<ProcessCallback>) -> Result<(), ScheduleError> {
        self.push(cb, Instant::now())
    }

    fn request_delayed(
        &self,
        cb: &Arc<ProcessCallback>,
        delay: Duration,
    ) -> Result<(), ScheduleError> {
        self.push(cb, Instant::now() + delay)
    }
}

/// The in-process callback scheduler.
///
/// Owns the worker thread; dropping or calling [`shutdown`] stops it.
/// Shared with the engine as `Arc<CallbackQueue>` acting as the
/// external scheduler seam.
///
/// [`shutdown`]: CallbackQueue::shutdown
pub struct CallbackQueue {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CallbackQueue {
    /// Start the queue with the default capacity.
    pub fn start(events: Arc<dyn EventSink>) -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, events)
    }

    /// Start the queue with a bounded depth.
    pub fn with_capacity(capacity: usize, events: Arc<dyn EventSink>) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            capacity,
            events,
        });
        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("pvdb-callback".into())
            .spawn(move || worker_inner.worker())
            .expect("failed to spawn callback worker");
        debug!(capacity, "callback queue started");
        Self {
            inner,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Number of callbacks currently queued.
    pub fn len(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("callback queue lock poisoned")
            .heap
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the worker; pending callbacks are discarded.
    pub fn shutdown(&self) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .expect("callback queue lock poisoned");
            state.shutdown = true;
        }
        self.inner.available.notify_all();
        if let Some(handle) = self
            .worker
            .lock()
            .expect("callback queue lock poisoned")
            .take()
        {
            let _ = handle.join();
        }
    }
}

impl CallbackScheduler for CallbackQueue {
    fn request(&self, cb: &Arc<ProcessCallback>) -> Result<(), ScheduleError> {
        self.inner.request(cb)
    }

    fn request_delayed(
        &self,
        cb: &Arc<ProcessCallback>,
        delay: Duration,
    ) -> Result<(), ScheduleError> {
        self.inner.request_delayed(cb, delay)
    }
}

impl Drop for CallbackQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvdb_common::config::Priority;
    use pvdb_common::event::{EventMask, FieldId};
    use pvdb_engine::device::{Capabilities, DeviceSupport, IoResult, IoStatus, SoftChannel};
    use pvdb_engine::{ProcessState, Record, RecordBody};

    #[derive(Default)]
    struct NamesSink {
        names: Mutex<Vec<String>>,
    }

    impl NamesSink {
        fn value_names(&self) -> Vec<String> {
            self.names.lock().unwrap().clone()
        }
    }

    impl EventSink for NamesSink {
        fn post_event(&self, record: &str, field: FieldId, _mask: EventMask) {
            if field == FieldId::Value {
                self.names.lock().unwrap().push(record.to_string());
            }
        }
    }

    fn soft_record(name: &str, value: f64, priority: Priority) -> Arc<Record> {
        Record::new(
            name,
            RecordBody {
                device: Some(Arc::new(SoftChannel)),
                value,
                udf: false,
                priority,
                ..RecordBody::default()
            },
        )
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn delayed_callback_processes_record() {
        let sink = Arc::new(NamesSink::default());
        let queue = CallbackQueue::start(sink.clone());
        let record = soft_record("pv:delayed", 1.0, Priority::Medium);
        let cb = ProcessCallback::new(Arc::clone(&record), Priority::Medium);

        queue
            .request_delayed(&cb, Duration::from_millis(20))
            .expect("queued");
        wait_for(|| record.lock().time.is_some());
        assert_eq!(record.lock().state, ProcessState::Idle);
        assert_eq!(sink.value_names(), vec!["pv:delayed".to_string()]);
        queue.shutdown();
    }

    /// Device whose read sleeps, keeping the worker busy for a while.
    struct SlowDevice(Duration);

    impl DeviceSupport for SlowDevice {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ
        }
        fn read(&self, body: &mut RecordBody) -> IoResult {
            std::thread::sleep(self.0);
            body.udf = body.value.is_nan();
            Ok(IoStatus::NoConvert)
        }
    }

    #[test]
    fn overdue_entries_run_in_priority_order() {
        let sink = Arc::new(NamesSink::default());
        let queue = CallbackQueue::start(sink.clone());

        let blocker = Record::new(
            "pv:blocker",
            RecordBody {
                device: Some(Arc::new(SlowDevice(Duration::from_millis(100)))),
                value: 1.0,
                udf: false,
                ..RecordBody::default()
            },
        );
        let low = soft_record("pv:low", 1.0, Priority::Low);
        let high = soft_record("pv:high", 1.0, Priority::High);

        // The blocker occupies the worker while both delayed entries
        // come due, so the next pop sees them due together. Low is
        // submitted first; priority must still win over submission
        // order.
        queue
            .request(&ProcessCallback::new(Arc::clone(&blocker), Priority::Medium))
            .expect("queued");
        queue
            .request_delayed(
                &ProcessCallback::new(Arc::clone(&low), Priority::Low),
                Duration::from_millis(20),
            )
            .expect("queued");
        queue
            .request_delayed(
                &ProcessCallback::new(Arc::clone(&high), Priority::High),
                Duration::from_millis(20),
            )
            .expect("queued");

        wait_for(|| sink.value_names().len() == 3);
        assert_eq!(
            sink.value_names(),
            vec![
                "pv:blocker".to_string(),
                "pv:high".to_string(),
                "pv:low".to_string()
            ]
        );
        queue.shutdown();
    }

    #[test]
    fn earlier_deadline_beats_priority() {
        let sink = Arc::new(NamesSink::default());
        let queue = CallbackQueue::start(sink.clone());

        let early = soft_record("pv:early", 1.0, Priority::Low);
        let late = soft_record("pv:late", 1.0, Priority::High);

        queue
            .request_delayed(
                &ProcessCallback::new(Arc::clone(&late), Priority::High),
                Duration::from_millis(80),
            )
            .expect("queued");
        queue
            .request_delayed(
                &ProcessCallback::new(Arc::clone(&early), Priority::Low),
                Duration::from_millis(20),
            )
            .expect("queued");

        wait_for(|| sink.value_names().len() == 2);
        assert_eq!(
            sink.value_names(),
            vec!["pv:early".to_string(), "pv:late".to_string()]
        );
        queue.shutdown();
    }

    #[test]
    fn full_queue_refuses() {
        let sink = Arc::new(NamesSink::default());
        let queue = CallbackQueue::with_capacity(1, sink);
        let record = soft_record("pv:a", 1.0, Priority::Medium);
        let cb = ProcessCallback::new(Arc::clone(&record), Priority::Medium);

        // Park both requests far enough out that the worker can't drain
        // the first before the second arrives.
        queue
            .request_delayed(&cb, Duration::from_secs(60))
            .expect("first fits");
        assert_eq!(
            queue.request_delayed(&cb, Duration::from_secs(60)),
            Err(ScheduleError::QueueFull)
        );
        queue.shutdown();
    }

    #[test]
    fn shutdown_refuses_new_requests() {
        let sink = Arc::new(NamesSink::default());
        let queue = CallbackQueue::start(sink);
        queue.shutdown();

        let record = soft_record("pv:a", 1.0, Priority::Medium);
        let cb = ProcessCallback::new(record, Priority::Medium);
        assert_eq!(queue.request(&cb), Err(ScheduleError::ShutDown));
    }
}
