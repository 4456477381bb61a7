//! Deadband-based monitor/event publication.
//!
//! Decides which fields changed enough to republish and emits one event
//! per affected field to the event-distribution sink. Consumes the
//! alarm evaluator's output; never computes severities itself.

use crate::record::RecordBody;
use crate::sched::EventSink;
use ahash::AHasher;
use pvdb_common::config::MonitorPolicy;
use pvdb_common::event::{EventMask, FieldId};
use std::hash::Hasher;

/// Deadband change check.
///
/// Fires (ORs `add` into `mask` and updates `last`) when the value moved
/// by more than `deadband`; a negative deadband always fires. Non-finite
/// transitions always fire: NaN↔finite, ±inf↔finite, and +inf↔-inf.
pub fn check_deadband(
    last: &mut f64,
    new: f64,
    deadband: f64,
    mask: &mut EventMask,
    add: EventMask,
) {
    let mut delta = 0.0;
    if new.is_finite() && last.is_finite() {
        delta = (*last - new).abs();
    } else if (new.is_nan() != last.is_nan()) || (new.is_infinite() != last.is_infinite()) {
        delta = f64::INFINITY;
    } else if new.is_infinite() && new != *last {
        delta = f64::INFINITY;
    }
    if delta > deadband {
        *mask |= add;
        *last = new;
    }
}

/// Hash of the array payload bytes for content-hash monitoring.
fn content_hash(elements: &[f64]) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write_usize(elements.len());
    for element in elements {
        hasher.write_u64(element.to_bits());
    }
    hasher.finish()
}

/// Publish monitor events for one completed processing cycle.
pub fn monitor(name: &str, body: &mut RecordBody, sink: &dyn EventSink) {
    let mut mask = body.reset_alarms();

    if !mask.is_empty() {
        // Alarm transition: the status/severity fields themselves are
        // monitorable and republished.
        sink.post_event(name, FieldId::Severity, EventMask::VALUE);
        sink.post_event(name, FieldId::Status, EventMask::VALUE | EventMask::ALARM);
    }

    match body.monitor_policy {
        MonitorPolicy::Deadband => {
            check_deadband(&mut body.mlst, body.value, body.mdel, &mut mask, EventMask::VALUE);
            check_deadband(
                &mut body.alst,
                body.value,
                body.adel,
                &mut mask,
                EventMask::ARCHIVE,
            );
        }
        MonitorPolicy::ContentHash => {
            // O(n) hash instead of a large payload diff; a collision
            // suppressing a publication is an accepted risk.
            let hash = content_hash(&body.elements);
            if body.last_hash != Some(hash) {
                mask |= EventMask::VALUE | EventMask::ARCHIVE;
                body.last_hash = Some(hash);
                sink.post_event(name, FieldId::ValueHash, EventMask::VALUE);
            }
        }
    }

    if !mask.is_empty() {
        sink.post_event(name, FieldId::Value, mask);
        if body.oraw != body.raw_value {
            sink.post_event(name, FieldId::RawValue, mask);
            body.oraw = body.raw_value;
        }
    }
}
