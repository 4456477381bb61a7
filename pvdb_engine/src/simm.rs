//! Simulation-mode I/O redirection.
//!
//! When a record runs in simulation mode its device I/O is replaced by
//! a transfer against the configured simulation source, always under a
//! simulation-mode alarm. A non-negative simulation delay turns the
//! transfer into a suspension identical in kind to a real asynchronous
//! device operation: the dispatcher parks the record and a delayed
//! callback re-processes it.

use crate::device::IoStatus;
use crate::process::ProcessContext;
use crate::record::{ProcessState, Record, RecordBody};
use crate::sched::ProcessCallback;
use pvdb_common::alarm::AlarmStatus;
use pvdb_common::config::SimMode;
use pvdb_common::error::ProcessError;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Read one value into the record, honoring simulation mode.
///
/// In real mode this is a straight device read. In simulation mode the
/// value comes from the simulation source record (or the configured
/// simulation value), either synchronously or after the configured
/// delay via the callback scheduler.
pub fn read_value(
    record: &Arc<Record>,
    body: &mut RecordBody,
    ctx: &ProcessContext<'_>,
) -> Result<IoStatus, ProcessError> {
    match body.simm {
        SimMode::No => {
            let device = bound_device(body)?;
            device.read(body).map_err(ProcessError::Device)
        }
        SimMode::Yes => {
            body.raise_alarm(AlarmStatus::Simm, body.sim_severity);
            if body.state == ProcessState::AwaitingCompletion || body.sim_delay < 0.0 {
                load_sim_value(body);
                body.value = body.sim_value;
                body.udf = body.value.is_nan();
                body.state = ProcessState::Idle;
                Ok(IoStatus::NoConvert)
            } else {
                schedule_sim_callback(record, body, ctx);
                Ok(IoStatus::NoConvert)
            }
        }
        SimMode::Raw => {
            body.raise_alarm(AlarmStatus::Simm, body.sim_severity);
            load_sim_value(body);
            body.udf = body.sim_value.is_nan();
            if !body.udf {
                body.raw_value = body.sim_value.floor() as i64;
            }
            // Raw simulation writes the raw value, so conversion runs.
            Ok(IoStatus::ConvertRaw)
        }
    }
}

/// Write the record's value out, honoring simulation mode.
///
/// Simulated writes land on the simulation source record (or in the
/// record's own simulation value when no source is configured).
pub fn write_value(
    record: &Arc<Record>,
    body: &mut RecordBody,
    ctx: &ProcessContext<'_>,
) -> Result<IoStatus, ProcessError> {
    match body.simm {
        SimMode::No => {
            let device = bound_device(body)?;
            device.write(body).map_err(ProcessError::Device)
        }
        SimMode::Yes | SimMode::Raw => {
            body.raise_alarm(AlarmStatus::Simm, body.sim_severity);
            if body.state == ProcessState::AwaitingCompletion || body.sim_delay < 0.0 {
                store_sim_value(body);
                body.state = ProcessState::Idle;
                Ok(IoStatus::NoConvert)
            } else {
                schedule_sim_callback(record, body, ctx);
                Ok(IoStatus::NoConvert)
            }
        }
    }
}

fn bound_device(body: &RecordBody) -> Result<Arc<dyn crate::device::DeviceSupport>, ProcessError> {
    body.device.clone().ok_or(ProcessError::MissingDeviceSupport)
}

/// Refresh `sim_value` from the simulation source record, if one is set.
///
/// The processing record's own lock is held here, so the source is
/// snapshotted without blocking: a source currently locked by another
/// cycle (or a misconfigured self/mutual link) keeps the previous
/// `sim_value` instead of deadlocking.
fn load_sim_value(body: &mut RecordBody) {
    if let Some(source) = body.sim_source.clone() {
        if let Some(src) = source.try_lock() {
            body.sim_value = src.value;
        }
    }
}

/// Deliver the record's value to the simulation target.
///
/// Same non-blocking rule as [`load_sim_value`]: a contended target
/// skips this cycle's delivery rather than deadlock.
fn store_sim_value(body: &mut RecordBody) {
    match body.sim_source.clone() {
        Some(target) => {
            if let Some(mut dst) = target.try_lock() {
                dst.value = body.value;
            }
        }
        None => body.sim_value = body.value,
    }
}

/// Ask the scheduler to re-process the record after the simulation
/// delay, parking the cycle on success.
///
/// The callback handle is allocated on first use and reused for the
/// record's lifetime. A scheduler refusal leaves the record unsuspended
/// so the transfer is retried on the next scan; the refusal is counted
/// and logged rather than silently swallowed.
fn schedule_sim_callback(record: &Arc<Record>, body: &mut RecordBody, ctx: &ProcessContext<'_>) {
    let priority = body.priority;
    let cb = body
        .sim_callback
        .get_or_insert_with(|| ProcessCallback::new(Arc::clone(record), priority))
        .clone();

    match ctx
        .scheduler
        .request_delayed(&cb, Duration::from_secs_f64(body.sim_delay))
    {
        Ok(()) => body.state = ProcessState::AwaitingCompletion,
        Err(err) => {
            body.sim_sched_failures += 1;
            warn!(
                record = record.name(),
                %err,
                failures = body.sim_sched_failures,
                "simulation callback not scheduled; retrying next scan"
            );
        }
    }
}
