//! # PVDB Scan
//!
//! Scan infrastructure for the record processing engine: the
//! priority-ordered callback queue (immediate and delayed deferred
//! invocations) and the periodic scanner (one thread per distinct scan
//! period, absolute-deadline pacing, overrun accounting).
//!
//! ## Module Structure
//!
//! - [`callback`] - Delayed/priority callback queue
//! - [`periodic`] - Periodic scan threads and statistics

pub mod callback;
pub mod periodic;

pub use callback::CallbackQueue;
pub use periodic::{PeriodicScanner, ScanStats};
