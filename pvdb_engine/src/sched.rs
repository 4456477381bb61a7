//! Scheduler and event-sink seams.
//!
//! Both collaborators are external to the engine: the callback
//! scheduler re-invokes a record's dispatcher later (deferred or
//! delayed), and the event sink carries monitor publications to the
//! distribution transport. They are passed in by reference through the
//! processing context rather than reached through process-wide globals.

use crate::record::Record;
use pvdb_common::config::Priority;
use pvdb_common::error::ScheduleError;
use pvdb_common::event::{EventMask, FieldId};
use std::sync::Arc;
use std::time::Duration;

/// Deferred-invocation handle: re-processes one record when fired.
///
/// For simulation delays the handle is lazily allocated once per record
/// and reused for the record's lifetime, never freed while the record
/// lives.
pub struct ProcessCallback {
    pub record: Arc<Record>,
    pub priority: Priority,
}

impl ProcessCallback {
    pub fn new(record: Arc<Record>, priority: Priority) -> Arc<Self> {
        Arc::new(Self { record, priority })
    }
}

/// Priority-ordered deferred-invocation primitive.
///
/// The scheduler's queue and any buffers it manages are external and
/// independently thread-safe. A refusal (`Err`) means the request was
/// not queued; callers decide whether to retry on a later cycle.
pub trait CallbackScheduler: Send + Sync {
    /// Queue `cb` for invocation as soon as a worker is available.
    fn request(&self, cb: &Arc<ProcessCallback>) -> Result<(), ScheduleError>;

    /// Queue `cb` for invocation after `delay`.
    fn request_delayed(
        &self,
        cb: &Arc<ProcessCallback>,
        delay: Duration,
    ) -> Result<(), ScheduleError>;
}

/// Event-distribution sink: receives one event per affected field.
pub trait EventSink: Send + Sync {
    fn post_event(&self, record: &str, field: FieldId, mask: EventMask);
}

/// Default sink that logs events at debug level.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn post_event(&self, record: &str, field: FieldId, mask: EventMask) {
        tracing::debug!(record, ?field, ?mask, "monitor event");
    }
}
