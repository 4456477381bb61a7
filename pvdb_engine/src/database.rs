//! Record database construction.
//!
//! Materializes bound record instances from the externally-loaded
//! configuration: device-support lookup, forward-link and
//! simulation-source resolution, per-record device initialization, and
//! monitor-state seeding. Construction happens once at startup; the
//! resulting records live for the process lifetime.

use crate::device::{Capabilities, DeviceRegistry};
use crate::record::{Record, RecordBody};
use pvdb_common::config::{ConfigError, Conversion, DatabaseConfig, ScanMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// All constructed records plus the periodic scan schedule.
pub struct Database {
    records: HashMap<String, Arc<Record>>,
    periodic: Vec<(Duration, Vec<Arc<Record>>)>,
}

impl Database {
    /// Build every record from configuration against the registry.
    pub fn build(config: &DatabaseConfig, registry: &DeviceRegistry) -> Result<Self, ConfigError> {
        config.validate()?;

        // First pass: construct bodies and bind device support.
        let mut records: HashMap<String, Arc<Record>> = HashMap::new();
        for rc in &config.records {
            let device = registry.get(&rc.device).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "record '{}': unknown device support '{}'",
                    rc.name, rc.device
                ))
            })?;
            let mut body = RecordBody::from_config(rc);
            body.device = Some(device);
            records.insert(rc.name.clone(), Record::new(rc.name.clone(), body));
        }

        // Second pass: resolve record-to-record links. Validation has
        // already established every target exists.
        for rc in &config.records {
            let record = &records[&rc.name];
            let mut body = record.lock();
            if let Some(target) = &rc.flnk {
                body.flnk = records.get(target).cloned();
            }
            if let Some(source) = &rc.sim_source {
                body.sim_source = records.get(source).cloned();
            }
        }

        // Third pass: device init and monitor/hysteresis seeding.
        for (name, record) in &records {
            let mut body = record.lock();
            if let Some(device) = body.device.clone() {
                let caps = device.capabilities();
                if caps.contains(Capabilities::INIT_RECORD) {
                    device.init_record(&mut body).map_err(|e| {
                        ConfigError::Validation(format!("record '{name}': {e}"))
                    })?;
                }
                if body.conversion == Conversion::Linear && caps.contains(Capabilities::LINEAR_CONV)
                {
                    device.special_linear_conversion(&mut body).map_err(|e| {
                        ConfigError::Validation(format!("record '{name}': {e}"))
                    })?;
                }
            }
            body.mlst = body.value;
            body.alst = body.value;
            body.lalm = body.value;
            debug!(record = name.as_str(), "record initialized");
        }

        // Group periodic records by period for the scan threads.
        let mut by_period: HashMap<u64, Vec<Arc<Record>>> = HashMap::new();
        for rc in &config.records {
            if rc.scan == ScanMode::Periodic {
                let period_us = (rc.period_s * 1e6) as u64;
                by_period
                    .entry(period_us)
                    .or_default()
                    .push(Arc::clone(&records[&rc.name]));
            }
        }
        let mut periodic: Vec<(Duration, Vec<Arc<Record>>)> = by_period
            .into_iter()
            .map(|(us, recs)| (Duration::from_micros(us), recs))
            .collect();
        periodic.sort_by_key(|(period, _)| *period);

        info!(
            records = records.len(),
            scan_groups = periodic.len(),
            "database built"
        );
        Ok(Self { records, periodic })
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<Arc<Record>> {
        self.records.get(name).cloned()
    }

    /// Iterate all records.
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Periodic scan groups, one entry per distinct period.
    pub fn periodic_groups(&self) -> &[(Duration, Vec<Arc<Record>>)] {
        &self.periodic
    }
}
