//! ==============================================================================
//! alerts.rs - edge-triggered alert detection over the bulk feed
//! ==============================================================================
//!
//! purpose:
//!     every slow tick the whole of data.txt is swept line by line. each device
//!     is either CLEAR or ALERTING, and the log only hears about changes:
//!
//!         CLEAR    --alert=1-->  ALERTING   log "P1 ALERT detected - ..."
//!         ALERTING --alert=1-->  ALERTING   (nothing)
//!         ALERTING --alert!=1->  CLEAR      log "P1 Alert CLEARED"
//!         CLEAR    --alert!=1->  CLEAR      (nothing)
//!
//!     a sustained alert therefore produces one onset line, not one per sweep.
//!
//! robustness:
//!     lines are decoded independently. blank lines, bad json and unknown ids
//!     are skipped without stopping the sweep. only a failed log write stops it.
//!
//! ==============================================================================

use crate::domain::{fmt_reading, DeviceId, SnapshotPatch};
use crate::log_store::{AlertLog, KeyValueStore, StoreError};

use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Raised {
        device: DeviceId,
        temperature: Option<f64>,
        pressure: Option<f64>,
        battery: Option<f64>,
    },
    Cleared {
        device: DeviceId,
    },
}

impl AlertTransition {
    pub fn device(&self) -> DeviceId {
        match self {
            AlertTransition::Raised { device, .. } | AlertTransition::Cleared { device } => *device,
        }
    }

    /// The log line body, without timestamp.
    pub fn message(&self) -> String {
        match self {
            AlertTransition::Raised { device, temperature, pressure, battery } => format!(
                "{} ALERT detected - Temp: {}°C, Pressure: {}hPa, Battery: {}%",
                device,
                fmt_reading(*temperature),
                fmt_reading(*pressure),
                fmt_reading(*battery),
            ),
            AlertTransition::Cleared { device } => format!("{device} Alert CLEARED"),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// lines decoded for a recognised device
    pub processed: usize,
    /// blank, malformed or foreign lines
    pub skipped: usize,
    pub transitions: Vec<AlertTransition>,
    /// true when at least one append reached the log; the list needs a redraw
    pub log_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AlertEdgeDetector {
    active: BTreeSet<DeviceId>,
    persist: bool,
}

impl AlertEdgeDetector {
    /// All devices CLEAR; state lives in memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a previously saved active set and keep saving it.
    pub fn persistent(active: BTreeSet<DeviceId>) -> Self {
        Self { active, persist: true }
    }

    pub fn is_alerting(&self, device: DeviceId) -> bool {
        self.active.contains(&device)
    }

    pub fn active(&self) -> &BTreeSet<DeviceId> {
        &self.active
    }

    /// Advance one device's state machine with one observation.
    pub fn observe(&mut self, reading: &SnapshotPatch) -> Option<AlertTransition> {
        let device = reading.id;
        match (reading.is_alerting(), self.active.contains(&device)) {
            (true, false) => {
                self.active.insert(device);
                Some(AlertTransition::Raised {
                    device,
                    temperature: reading.temperature,
                    pressure: reading.pressure,
                    battery: reading.battery,
                })
            }
            (false, true) => {
                self.active.remove(&device);
                Some(AlertTransition::Cleared { device })
            }
            _ => None,
        }
    }

    pub fn sweep<S: KeyValueStore>(
        &mut self,
        body: &str,
        log: &mut AlertLog<S>,
    ) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        for (line_no, line) in body.trim().split('\n').enumerate() {
            if line.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            let reading = match SnapshotPatch::decode(line) {
                Ok(reading) => reading,
                Err(e) => {
                    debug!(line = line_no + 1, error = %e, "Skipping bulk line.");
                    report.skipped += 1;
                    continue;
                }
            };
            report.processed += 1;

            if let Some(transition) = self.observe(&reading) {
                let message = transition.message();
                info!(device = %transition.device(), %message, "Alert state changed.");
                if log.append(transition.device(), &message)? {
                    report.log_changed = true;
                }
                report.transitions.push(transition);
            }
        }

        if self.persist && !report.transitions.is_empty() {
            log.save_alert_state(&self.active)?;
        }
        Ok(report)
    }
}
