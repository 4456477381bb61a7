//! # PVDB Engine
//!
//! Generic record processing and alarm/monitor engine: the reentrant
//! process dispatcher, the five-level hysteretic alarm evaluator (with
//! optional exponential alarm-level smoothing), the simulation-mode I/O
//! redirector, and the deadband-based monitor/event publisher.
//!
//! Records are independently-configured process variables. Each is read
//! or written through its bound device support, alarm-checked, and
//! published to subscribers, continuously and without one record's
//! failure stalling others. A record's entire processing cycle runs
//! under that record's exclusive lock; suspension for asynchronous
//! device completions is expressed through the record's processing
//! state, never through an in-function blocking wait.
//!
//! ## Module Structure
//!
//! - [`record`] - Record instance data model and alarm-state bookkeeping
//! - [`device`] - Device support trait, capability set, and registry
//! - [`process`] - The process dispatcher and forward-link chain
//! - [`alarm`] - Hysteretic alarm evaluation with level filtering
//! - [`simm`] - Simulation-mode I/O redirection
//! - [`monitor`] - Deadband/content-hash monitor publication
//! - [`database`] - Configuration → bound record construction
//! - [`sched`] - Scheduler and event-sink seams

pub mod alarm;
pub mod database;
pub mod device;
pub mod monitor;
pub mod process;
pub mod record;
pub mod sched;
pub mod simm;

pub use database::Database;
pub use process::{ProcessContext, process};
pub use record::{ProcessState, Record, RecordBody};
