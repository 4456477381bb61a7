//! Five-level hysteretic alarm evaluation.
//!
//! Selects the highest-priority satisfied alarm band for the current
//! value, with hysteresis anchored at the value the band was entered at,
//! and optionally low-pass filters the discrete band index before
//! reporting. Runs inside the record lock on every cycle: it never
//! blocks and never allocates.

use crate::record::RecordBody;
use pvdb_common::alarm::{AlarmRange, AlarmStatus, Severity};
use std::time::Duration;

/// Rounding hysteresis for the alarm-level filter: 1 - 1/e.
const FILTER_THRESHOLD: f64 = 0.6321;

/// Evaluate alarm state for one processing cycle.
///
/// `elapsed` is the time since the previous completed cycle and drives
/// the optional alarm-level filter. Results land in the record's
/// pending alarm pair; `lalm` is re-anchored only when the computed
/// severity is accepted as a transition.
pub fn check_alarms(body: &mut RecordBody, elapsed: Duration) {
    // An undefined value preempts all threshold evaluation and resets
    // the filter state.
    if body.udf {
        body.raise_alarm(AlarmStatus::Udf, body.udf_severity);
        body.afvl = 0.0;
        return;
    }

    let val = body.value;
    let hyst = body.hyst;
    let lalm = body.lalm;

    // Band check order is fixed: HIHI, LOLO, HIGH, LOW, NORMAL. The
    // order only matters when thresholds overlap, but deployed
    // configurations rely on this precedence exactly.
    let mut range;
    let mut severity;
    let mut level;
    if body.hihi.severity.is_alarm()
        && (val >= body.hihi.threshold
            || (lalm == body.hihi.threshold && val >= body.hihi.threshold - hyst))
    {
        range = AlarmRange::Hihi;
        severity = body.hihi.severity;
        level = body.hihi.threshold;
    } else if body.lolo.severity.is_alarm()
        && (val <= body.lolo.threshold
            || (lalm == body.lolo.threshold && val <= body.lolo.threshold + hyst))
    {
        range = AlarmRange::Lolo;
        severity = body.lolo.severity;
        level = body.lolo.threshold;
    } else if body.high.severity.is_alarm()
        && (val >= body.high.threshold
            || (lalm == body.high.threshold && val >= body.high.threshold - hyst))
    {
        range = AlarmRange::High;
        severity = body.high.severity;
        level = body.high.threshold;
    } else if body.low.severity.is_alarm()
        && (val <= body.low.threshold
            || (lalm == body.low.threshold && val <= body.low.threshold + hyst))
    {
        range = AlarmRange::Low;
        severity = body.low.severity;
        level = body.low.threshold;
    } else {
        range = AlarmRange::Normal;
        severity = Severity::NoAlarm;
        level = val;
    }

    let mut afvl = 0.0;
    if body.aftc > 0.0 {
        // Level filtering: afvl tracks an exponential moving average of
        // the discrete range index. The first alarming cycle seeds it.
        afvl = body.afvl;
        if afvl == 0.0 {
            afvl = range.index() as f64;
        } else {
            let t = elapsed.as_secs_f64();
            let alpha = body.aftc / (t + body.aftc);

            // The sign of afvl selects the rounding direction, which is
            // what gives the filter its hysteresis: positive floors to
            // the lower alarm level, negative to the higher.
            afvl = alpha * afvl
                + if afvl > 0.0 {
                    (1.0 - alpha) * range.index() as f64
                } else {
                    (alpha - 1.0) * range.index() as f64
                };
            if afvl - afvl.floor() > FILTER_THRESHOLD {
                afvl = -afvl; // reverse rounding
            }

            // floor() of a negative level rounds the magnitude up, so a
            // negative afvl is sticky toward the higher band.
            range = AlarmRange::from_index(afvl.floor().abs() as i32);
            match range {
                AlarmRange::Hihi => {
                    severity = body.hihi.severity;
                    level = body.hihi.threshold;
                }
                AlarmRange::High => {
                    severity = body.high.severity;
                    level = body.high.threshold;
                }
                AlarmRange::Normal => {
                    severity = Severity::NoAlarm;
                }
                AlarmRange::Low => {
                    severity = body.low.severity;
                    level = body.low.threshold;
                }
                AlarmRange::Lolo => {
                    severity = body.lolo.severity;
                    level = body.lolo.threshold;
                }
            }
        }
    }
    body.afvl = afvl;

    if severity.is_alarm() {
        // Store LALM only when the new severity is accepted, anchoring
        // hysteresis at the value the band was entered with.
        if body.raise_alarm(range.status(), severity) {
            body.lalm = level;
        }
    } else {
        // No alarm condition: keep hysteresis anchored to the most
        // recent sample.
        body.lalm = val;
    }
}
