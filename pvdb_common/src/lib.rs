//! PVDB Common Library
//!
//! Shared types for the pvdb workspace: alarm severities, statuses and
//! ranges, monitor event masks, the error taxonomy, and TOML record
//! configuration.
//!
//! # Module Structure
//!
//! - [`alarm`] - Alarm severity, status, and range types
//! - [`event`] - Monitor event masks and field identifiers
//! - [`error`] - Error taxonomy shared by all crates
//! - [`config`] - Record/database configuration loading

pub mod alarm;
pub mod config;
pub mod error;
pub mod event;
