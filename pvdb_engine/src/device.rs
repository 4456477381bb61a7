//! Device support binding and registry.
//!
//! Device support is the externally-bound, per-hardware-type
//! implementation of a record's actual I/O: a trait whose optional
//! operations default to [`DeviceError::Unsupported`], paired with a
//! declared [`Capabilities`] set the dispatcher checks before invoking
//! anything. An absent required capability is a configuration error,
//! not a crash.

use crate::record::RecordBody;
use bitflags::bitflags;
use pvdb_common::error::DeviceError;
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// Operations a device support declares.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const READ        = 0x01;
        const WRITE       = 0x02;
        const INIT_RECORD = 0x04;
        const IO_INTR     = 0x08;
        const LINEAR_CONV = 0x10;
    }
}

/// Outcome of a successful device transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// Raw value stored; raw→engineering conversion still applies.
    ConvertRaw,
    /// Value stored directly in engineering units; skip conversion.
    /// Treated identically to plain success past the conversion step.
    NoConvert,
}

pub type IoResult = Result<IoStatus, DeviceError>;

/// Opaque token describing a device's interrupt source for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoInterruptInfo {
    pub source: u32,
}

/// Polymorphic per-hardware-type capability set, bound to a record at
/// configuration time and shared by every record on the same hardware.
///
/// # Suspension contract
///
/// `read`/`write` may suspend the cycle by setting the record state to
/// [`crate::record::ProcessState::AwaitingCompletion`] and returning; the dispatcher
/// then exits without side effects. The binding must later arrange for
/// the record to be reprocessed (completion callback or interrupt), at
/// which point `read`/`write` is invoked again to deliver the result.
pub trait DeviceSupport: Send + Sync {
    /// Unique registry name (e.g. "soft_channel", "gpib").
    fn name(&self) -> &'static str;

    /// Exactly the operations this binding implements.
    fn capabilities(&self) -> Capabilities;

    /// One-time per-record initialization.
    fn init_record(&self, _body: &mut RecordBody) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Read the record's value from hardware.
    fn read(&self, _body: &mut RecordBody) -> IoResult {
        Err(DeviceError::Unsupported)
    }

    /// Write the record's value to hardware.
    fn write(&self, _body: &mut RecordBody) -> IoResult {
        Err(DeviceError::Unsupported)
    }

    /// Interrupt-source info for I/O-interrupt scanned records.
    fn get_io_interrupt_info(&self, _body: &RecordBody) -> Option<IoInterruptInfo> {
        None
    }

    /// Recompute the linear-conversion slope/offset for the record.
    fn special_linear_conversion(&self, _body: &mut RecordBody) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Soft-channel device support: a loopback binding with no hardware
/// behind it. Reads leave the current value in place (marking it
/// defined), writes accept the value unconditionally.
pub struct SoftChannel;

impl DeviceSupport for SoftChannel {
    fn name(&self) -> &'static str {
        "soft_channel"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE
    }

    fn read(&self, body: &mut RecordBody) -> IoResult {
        body.udf = body.value.is_nan();
        Ok(IoStatus::NoConvert)
    }

    fn write(&self, _body: &mut RecordBody) -> IoResult {
        Ok(IoStatus::NoConvert)
    }
}

/// Registry of available device supports.
///
/// Constructed at startup, populated via `register()`, and passed by
/// reference to the database builder. No global state.
pub struct DeviceRegistry {
    supports: HashMap<&'static str, Arc<dyn DeviceSupport>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            supports: HashMap::new(),
        }
    }

    /// Register a device support under its declared name.
    ///
    /// # Panics
    /// Panics if a support with the same name is already registered.
    pub fn register(&mut self, support: Arc<dyn DeviceSupport>) {
        let name = support.name();
        if self.supports.contains_key(name) {
            panic!("Device support '{name}' is already registered");
        }
        self.supports.insert(name, support);
    }

    /// Look up a device support by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DeviceSupport>> {
        self.supports.get(name).cloned()
    }

    /// List all registered support names.
    pub fn list(&self) -> Vec<&'static str> {
        self.supports.keys().copied().collect()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
