//! Alarm severity, status, and range types.
//!
//! The discrete alarm range doubles as an enum tag and as the index the
//! alarm-level filter averages over. The ordinal values (`Lolo = 1`
//! through `Hihi = 5`) and the range→status table are load-bearing and
//! must not be reordered.

use serde::{Deserialize, Serialize};

/// Alarm severity, ordered from no alarm to invalid.
///
/// Pending severity updates are max-wins: a record's pending severity
/// only ever escalates within one processing cycle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    NoAlarm = 0,
    Minor = 1,
    Major = 2,
    Invalid = 3,
}

impl Severity {
    /// True for any severity above `NoAlarm`.
    #[inline]
    pub fn is_alarm(self) -> bool {
        self != Severity::NoAlarm
    }
}

/// Alarm status: which condition raised the current severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AlarmStatus {
    #[default]
    NoAlarm,
    /// Device read failed.
    Read,
    /// Device write failed.
    Write,
    /// Value at or above the HIHI threshold.
    HiHi,
    /// Value at or above the HIGH threshold.
    High,
    /// Value at or below the LOLO threshold.
    LoLo,
    /// Value at or below the LOW threshold.
    Low,
    /// Abnormal state transition.
    State,
    /// Logic/validation error (e.g. bad mode selector).
    Soft,
    /// Link resolution or transfer failed.
    Link,
    /// Value never obtained since initialization.
    Udf,
    /// Record is running in simulation mode.
    Simm,
}

/// Discrete alarm range selected by the threshold evaluation.
///
/// The ordinal is the filtered-level index consumed by the alarm-level
/// filter; `Normal` sits in the middle so that filtering drifts through
/// `Low`/`High` before reaching the outer bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlarmRange {
    Lolo = 1,
    Low = 2,
    Normal = 3,
    High = 4,
    Hihi = 5,
}

impl AlarmRange {
    /// The fixed range→status table.
    #[inline]
    pub const fn status(self) -> AlarmStatus {
        match self {
            AlarmRange::Lolo => AlarmStatus::LoLo,
            AlarmRange::Low => AlarmStatus::Low,
            AlarmRange::Normal => AlarmStatus::NoAlarm,
            AlarmRange::High => AlarmStatus::High,
            AlarmRange::Hihi => AlarmStatus::HiHi,
        }
    }

    /// Ordinal index used by the alarm-level filter.
    #[inline]
    pub const fn index(self) -> i32 {
        self as i32
    }

    /// Inverse of [`AlarmRange::index`], clamped to the valid band range.
    #[inline]
    pub fn from_index(index: i32) -> Self {
        match index {
            i32::MIN..=1 => AlarmRange::Lolo,
            2 => AlarmRange::Low,
            3 => AlarmRange::Normal,
            4 => AlarmRange::High,
            _ => AlarmRange::Hihi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_escalation() {
        assert!(Severity::NoAlarm < Severity::Minor);
        assert!(Severity::Minor < Severity::Major);
        assert!(Severity::Major < Severity::Invalid);
    }

    #[test]
    fn range_status_table_is_fixed() {
        assert_eq!(AlarmRange::Hihi.status(), AlarmStatus::HiHi);
        assert_eq!(AlarmRange::High.status(), AlarmStatus::High);
        assert_eq!(AlarmRange::Normal.status(), AlarmStatus::NoAlarm);
        assert_eq!(AlarmRange::Low.status(), AlarmStatus::Low);
        assert_eq!(AlarmRange::Lolo.status(), AlarmStatus::LoLo);
    }

    #[test]
    fn range_index_round_trips() {
        for range in [
            AlarmRange::Lolo,
            AlarmRange::Low,
            AlarmRange::Normal,
            AlarmRange::High,
            AlarmRange::Hihi,
        ] {
            assert_eq!(AlarmRange::from_index(range.index()), range);
        }
    }

    #[test]
    fn range_from_index_clamps_out_of_band() {
        assert_eq!(AlarmRange::from_index(0), AlarmRange::Lolo);
        assert_eq!(AlarmRange::from_index(9), AlarmRange::Hihi);
    }
}
