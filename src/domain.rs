//! ==============================================================================
//! domain.rs - device ids, snapshots and the wire decode step
//! ==============================================================================
//!
//! purpose:
//!     the typed vocabulary shared by every other module.
//!     - DeviceId: the closed set of recognised LoRa nodes (p1, p2)
//!     - SnapshotPatch: one decoded wire record, every reading optional
//!     - DeviceSnapshot: the merged, latest-known state of one device
//!     - Coordinates: a lat/lon pair plus the validity rule for map placement
//!
//! wire format:
//!     the producer overwrites latest.txt with a single json object and appends
//!     the same shape to data.txt, one object per line:
//!
//!         {"id":"P1","temperature":"25.3","pressure":"921.4","altitude":"799.2",
//!          "latitude":12.9241,"longitude":77.4991,"battery":47,"alert":0}
//!
//!     note that some readings arrive as strings and some as numbers, so every
//!     numeric field is decoded leniently.
//!
//! ==============================================================================

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Display value for a reading that has never been reported.
pub const UNKNOWN_READING: &str = "--";

/// Local time at second resolution, e.g. `3/14/2026, 9:05:07 PM`.
pub const DISPLAY_TIME_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not a valid record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has no device id")]
    MissingId,
    #[error("unrecognised device id {0:?}")]
    UnknownDevice(String),
}

// ==============================================================================
// device ids
// ==============================================================================

/// The two sensor nodes the dashboard knows about.
///
/// Lower case (`p1`) is the index key, upper case (`P1`) is what users see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceId {
    P1,
    P2,
}

impl DeviceId {
    pub const ALL: [DeviceId; 2] = [DeviceId::P1, DeviceId::P2];

    pub fn key(self) -> &'static str {
        match self {
            DeviceId::P1 => "p1",
            DeviceId::P2 => "p2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviceId::P1 => "P1",
            DeviceId::P2 => "P2",
        }
    }
}

impl FromStr for DeviceId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p1" => Ok(DeviceId::P1),
            "p2" => Ok(DeviceId::P2),
            _ => Err(DecodeError::UnknownDevice(s.to_string())),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ==============================================================================
// coordinates
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// A position is usable only if both halves are finite and neither is
    /// exactly zero (the producer writes 0.0 when it has no gps fix).
    pub fn from_reported(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let (lat, lon) = (latitude?, longitude?);
        if !lat.is_finite() || !lon.is_finite() || lat == 0.0 || lon == 0.0 {
            return None;
        }
        Some(Self::new(lat, lon))
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

// ==============================================================================
// wire decode
// ==============================================================================

#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    altitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    battery: Option<f64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    alert: Option<bool>,
    #[serde(default, deserialize_with = "lenient_number")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    longitude: Option<f64>,
}

/// Only called for keys that are present. A present value that is not a
/// number (`"no-fix"`, `null`) becomes NaN so it still overwrites the
/// previous reading; absent keys stay `None`.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(Some(match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }))
}

/// `1`, `1.0` and `"1"` mean "alerting"; anything else present, booleans
/// included, means "not alerting".
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::Number(n) => Some(n.as_f64().map(f64::trunc) == Some(1.0)),
        Value::String(s) => Some(leading_integer(&s) == Some(1)),
        _ => Some(false),
    })
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// One decoded wire record. Only `id` is guaranteed; every reading is a
/// partial update. `Some(NAN)` means "sent, but unreadable".
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPatch {
    pub id: DeviceId,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub altitude: Option<f64>,
    pub battery: Option<f64>,
    pub alert: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl SnapshotPatch {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            temperature: None,
            pressure: None,
            altitude: None,
            battery: None,
            alert: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let record: WireRecord = serde_json::from_str(raw.trim())?;
        let id = record.id.ok_or(DecodeError::MissingId)?.parse()?;
        Ok(Self {
            id,
            temperature: record.temperature,
            pressure: record.pressure,
            altitude: record.altitude,
            battery: record.battery,
            alert: record.alert,
            latitude: record.latitude,
            longitude: record.longitude,
        })
    }

    /// Missing flags count as "not alerting".
    pub fn is_alerting(&self) -> bool {
        self.alert.unwrap_or(false)
    }
}

// ==============================================================================
// merged snapshot
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub altitude: Option<f64>,
    pub battery: Option<f64>,
    /// 0 or 1
    pub alert: u8,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_updated: Option<DateTime<Local>>,
}

impl DeviceSnapshot {
    /// The "--" card every device shows before its first reading.
    pub fn placeholder(id: DeviceId) -> Self {
        Self {
            id,
            temperature: None,
            pressure: None,
            altitude: None,
            battery: None,
            alert: 0,
            latitude: None,
            longitude: None,
            last_updated: None,
        }
    }

    pub fn is_alerting(&self) -> bool {
        self.alert == 1
    }

    /// Shallow overwrite: fields the patch leaves unset keep their value.
    pub fn apply(&mut self, patch: &SnapshotPatch, now: DateTime<Local>) {
        fn take(slot: &mut Option<f64>, value: Option<f64>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.temperature, patch.temperature);
        take(&mut self.pressure, patch.pressure);
        take(&mut self.altitude, patch.altitude);
        take(&mut self.battery, patch.battery);
        take(&mut self.latitude, patch.latitude);
        take(&mut self.longitude, patch.longitude);
        if let Some(alert) = patch.alert {
            self.alert = u8::from(alert);
        }
        self.last_updated = Some(now);
    }

    pub fn reported_position(&self) -> Option<Coordinates> {
        Coordinates::from_reported(self.latitude, self.longitude)
    }
}

/// Render a reading the way the cards and log lines show it.
pub fn fmt_reading(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => UNKNOWN_READING.to_string(),
    }
}
