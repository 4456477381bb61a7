//! Monitor event masks and field identifiers.
//!
//! An event mask describes the classes of change a publication carries;
//! a field identifier names the monitorable field the event refers to.

use bitflags::bitflags;

bitflags! {
    /// Event classes carried by one monitor publication.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u8 {
        /// Value changed by more than the monitor deadband.
        const VALUE    = 0x01;
        /// Value changed by more than the archive deadband.
        const ARCHIVE  = 0x02;
        /// Alarm status/severity transitioned.
        const ALARM    = 0x04;
        /// Metadata (limits, display properties) changed.
        const PROPERTY = 0x08;
    }
}

/// Monitorable field an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// Engineering-unit value.
    Value,
    /// Raw device-domain value.
    RawValue,
    /// Current alarm severity.
    Severity,
    /// Current alarm status.
    Status,
    /// Content hash of the array payload (content-hash monitor mode).
    ValueHash,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_combine() {
        let mask = EventMask::VALUE | EventMask::ARCHIVE;
        assert!(mask.contains(EventMask::VALUE));
        assert!(mask.contains(EventMask::ARCHIVE));
        assert!(!mask.contains(EventMask::ALARM));
    }
}
