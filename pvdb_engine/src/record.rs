//! Record instance data model.
//!
//! [`RecordBody`] is the mutable state block for one process variable;
//! [`Record`] wraps it in the per-record exclusive lock. Fields are
//! mutated only while the lock is held, by the owning dispatcher
//! invocation or a lock-guarded configuration change. Instances are
//! constructed once at initialization and live for the process lifetime.

use crate::device::DeviceSupport;
use crate::sched::ProcessCallback;
use pvdb_common::alarm::{AlarmStatus, Severity};
use pvdb_common::config::{
    AlarmBand, Conversion, Direction, MonitorPolicy, Priority, RecordConfig, SimMode,
};
use pvdb_common::event::EventMask;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Processing state of a record: the reentrancy flag made explicit.
///
/// `AwaitingCompletion` holds exactly between "device support requested
/// suspension" and "the completion callback re-invoked the dispatcher".
/// All data needed to resume lives in the record's fields; there is no
/// separate continuation object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    Idle,
    AwaitingCompletion,
}

/// Mutable state block for one process variable.
pub struct RecordBody {
    // ── Binding ──
    /// Transfer direction.
    pub direction: Direction,
    /// Externally-registered device support (reference, not ownership).
    pub device: Option<Arc<dyn DeviceSupport>>,
    /// Processing state (PACT).
    pub state: ProcessState,
    /// First cycle after initialization.
    pub init: bool,
    /// True until a first valid value is obtained; forces an alarm.
    pub udf: bool,

    // ── Values ──
    /// Engineering-unit value.
    pub value: f64,
    /// Raw device-domain value.
    pub raw_value: i64,
    /// Array payload for content-hash monitored records.
    pub elements: Vec<f64>,

    // ── Conversion / smoothing ──
    pub conversion: Conversion,
    /// Linear conversion slope.
    pub eslo: f64,
    /// Linear conversion offset.
    pub eoff: f64,
    /// Value smoothing coefficient in [0, 1); 0 disables.
    pub smoo: f64,

    // ── Alarm state ──
    /// Published alarm status.
    pub status: AlarmStatus,
    /// Published alarm severity.
    pub severity: Severity,
    /// Newly-computed alarm status, published by `reset_alarms`.
    pub pending_status: AlarmStatus,
    /// Newly-computed alarm severity, published by `reset_alarms`.
    pub pending_severity: Severity,
    /// Severity of the undefined-value alarm.
    pub udf_severity: Severity,
    pub hihi: AlarmBand,
    pub high: AlarmBand,
    pub low: AlarmBand,
    pub lolo: AlarmBand,
    /// Hysteresis margin around each alarm threshold.
    pub hyst: f64,
    /// Value at which the current alarm band was entered (LALM).
    pub lalm: f64,
    /// Alarm-level filter time constant in seconds (0 disables).
    pub aftc: f64,
    /// Filtered alarm level; the sign records the rounding direction.
    pub afvl: f64,

    // ── Simulation ──
    pub simm: SimMode,
    /// Simulated value (loaded from the source record when one is set).
    pub sim_value: f64,
    /// Record supplying simulated values, if any.
    pub sim_source: Option<Arc<Record>>,
    /// Simulation processing delay in seconds; negative is synchronous.
    pub sim_delay: f64,
    /// Severity of the simulation-mode alarm.
    pub sim_severity: Severity,
    /// Lazily-allocated callback handle, reused for the record lifetime.
    pub sim_callback: Option<Arc<ProcessCallback>>,
    /// Simulation callbacks the scheduler refused; retried next scan.
    pub sim_sched_failures: u64,

    // ── Monitor state ──
    pub monitor_policy: MonitorPolicy,
    /// Monitor deadband; negative always fires.
    pub mdel: f64,
    /// Archive deadband; negative always fires.
    pub adel: f64,
    /// Last value published with a VALUE event.
    pub mlst: f64,
    /// Last value published with an ARCHIVE event.
    pub alst: f64,
    /// Raw value at last publication.
    pub oraw: i64,
    /// Payload hash at last publication (content-hash mode).
    pub last_hash: Option<u64>,

    // ── Links / scheduling ──
    /// Next record to process after this cycle completes.
    pub flnk: Option<Arc<Record>>,
    /// Callback priority for deferred processing.
    pub priority: Priority,
    /// Completion time of the last cycle; drives the alarm-level filter.
    pub time: Option<Instant>,
}

impl Default for RecordBody {
    fn default() -> Self {
        Self {
            direction: Direction::Input,
            device: None,
            state: ProcessState::Idle,
            init: true,
            udf: true,
            value: 0.0,
            raw_value: 0,
            elements: Vec::new(),
            conversion: Conversion::None,
            eslo: 1.0,
            eoff: 0.0,
            smoo: 0.0,
            status: AlarmStatus::NoAlarm,
            severity: Severity::NoAlarm,
            pending_status: AlarmStatus::NoAlarm,
            pending_severity: Severity::NoAlarm,
            udf_severity: Severity::Invalid,
            hihi: AlarmBand::default(),
            high: AlarmBand::default(),
            low: AlarmBand::default(),
            lolo: AlarmBand::default(),
            hyst: 0.0,
            lalm: 0.0,
            aftc: 0.0,
            afvl: 0.0,
            simm: SimMode::No,
            sim_value: 0.0,
            sim_source: None,
            sim_delay: -1.0,
            sim_severity: Severity::NoAlarm,
            sim_callback: None,
            sim_sched_failures: 0,
            monitor_policy: MonitorPolicy::Deadband,
            mdel: 0.0,
            adel: 0.0,
            mlst: 0.0,
            alst: 0.0,
            oraw: 0,
            last_hash: None,
            flnk: None,
            priority: Priority::Medium,
            time: None,
        }
    }
}

impl RecordBody {
    /// Populate the static fields from configuration. Links and device
    /// support are bound separately by the database builder.
    pub fn from_config(cfg: &RecordConfig) -> Self {
        Self {
            direction: cfg.direction,
            conversion: cfg.conversion,
            eslo: cfg.eslo,
            eoff: cfg.eoff,
            smoo: cfg.smoo,
            udf_severity: cfg.udf_severity,
            hihi: cfg.hihi,
            high: cfg.high,
            low: cfg.low,
            lolo: cfg.lolo,
            hyst: cfg.hyst,
            aftc: cfg.aftc,
            simm: cfg.simm,
            sim_value: cfg.sim_value,
            sim_delay: cfg.sim_delay_s,
            sim_severity: cfg.sim_severity,
            monitor_policy: cfg.monitor,
            mdel: cfg.mdel,
            adel: cfg.adel,
            priority: cfg.priority,
            ..Self::default()
        }
    }

    /// Raise a pending alarm condition. Pending updates are max-wins:
    /// the highest severity raised during a cycle is the one published.
    /// Returns true when the new severity was accepted.
    pub fn raise_alarm(&mut self, status: AlarmStatus, severity: Severity) -> bool {
        if self.pending_severity < severity {
            self.pending_status = status;
            self.pending_severity = severity;
            return true;
        }
        false
    }

    /// Atomically publish the pending alarm pair into the current pair
    /// and clear it. Returns the `ALARM` event mask when the published
    /// `(status, severity)` transitioned, empty on steady state.
    pub fn reset_alarms(&mut self) -> EventMask {
        let prev_status = self.status;
        let prev_severity = self.severity;

        self.status = self.pending_status;
        self.severity = self.pending_severity;
        self.pending_status = AlarmStatus::NoAlarm;
        self.pending_severity = Severity::NoAlarm;

        if prev_status != self.status || prev_severity != self.severity {
            EventMask::ALARM
        } else {
            EventMask::empty()
        }
    }
}

/// One process variable: name plus lock-guarded state block.
///
/// The mutex is the record's dedicated exclusive lock; every dispatcher
/// invocation holds it from entry through suspension or completion. Two
/// invocations of the same record cycle may run on different threads;
/// the lock, not a thread identity, is the serialization mechanism.
pub struct Record {
    name: String,
    body: Mutex<RecordBody>,
}

impl Record {
    pub fn new(name: impl Into<String>, body: RecordBody) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            body: Mutex::new(body),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the record's exclusive lock.
    pub fn lock(&self) -> MutexGuard<'_, RecordBody> {
        self.body.lock().expect("record lock poisoned")
    }

    /// Acquire the lock only if it is free right now.
    ///
    /// Used for record-to-record value transfers that run while another
    /// record's lock is already held, where blocking could deadlock a
    /// mutually-linked pair.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, RecordBody>> {
        self.body.try_lock().ok()
    }
}
