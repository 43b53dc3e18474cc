//! ==============================================================================
//! sink.rs - presentation sink contract and the dashboard view
//! ==============================================================================
//!
//! purpose:
//!     the core never draws anything itself. it calls three operations on a
//!     PresentationSink:
//!     - place_or_move_marker: put a labelled point on the map
//!     - render_device_card:   redraw one device's status card
//!     - render_log_list:      redraw the alert log
//!
//!     DashboardSink implements them by updating a DashboardView that web.rs
//!     serves as html and json. the view is a projection only; it is rebuilt
//!     from sink calls and holds no state the core depends on.
//!
//! ==============================================================================

use crate::domain::{fmt_reading, Coordinates, DeviceId, DeviceSnapshot, DISPLAY_TIME_FORMAT};

use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// How long a card stays highlighted after an update.
pub const GLOW_MS: i64 = 3000;

pub trait PresentationSink: Send {
    fn place_or_move_marker(&mut self, device: DeviceId, position: Coordinates, popup: &MarkerPopup);
    fn render_device_card(&mut self, snapshot: &DeviceSnapshot);
    fn render_log_list(&mut self, entries: &[String]);
}

/// Everything the marker popup shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerPopup {
    pub device: String,
    pub temperature: String,
    pub pressure: String,
    pub altitude: String,
    pub battery: String,
    /// the placed position, not necessarily the reported one
    pub coordinates: String,
    pub alert: bool,
}

impl MarkerPopup {
    pub fn new(snapshot: &DeviceSnapshot, position: Coordinates) -> Self {
        Self {
            device: snapshot.id.label().to_string(),
            temperature: fmt_reading(snapshot.temperature),
            pressure: fmt_reading(snapshot.pressure),
            altitude: fmt_reading(snapshot.altitude),
            battery: fmt_reading(snapshot.battery),
            coordinates: position.to_string(),
            alert: snapshot.is_alerting(),
        }
    }
}

// ==============================================================================
// view model
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl BatteryLevel {
    pub fn from_percent(percent: Option<f64>) -> Self {
        match percent.filter(|p| p.is_finite()) {
            Some(p) if p > 60.0 => BatteryLevel::High,
            Some(p) if p > 30.0 => BatteryLevel::Medium,
            Some(_) => BatteryLevel::Low,
            None => BatteryLevel::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatteryLevel::High => "high",
            BatteryLevel::Medium => "medium",
            BatteryLevel::Low => "low",
            BatteryLevel::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    pub device: String,
    pub temperature: String,
    pub pressure: String,
    pub altitude: String,
    pub battery: String,
    /// bar width, 0-100
    pub battery_fill: f64,
    pub battery_level: BatteryLevel,
    pub alert: bool,
    pub last_updated: Option<String>,
    /// unix millis until which the card is highlighted
    pub glow_until_ms: Option<i64>,
}

impl CardView {
    pub fn new(snapshot: &DeviceSnapshot) -> Self {
        Self {
            device: snapshot.id.label().to_string(),
            temperature: fmt_reading(snapshot.temperature),
            pressure: fmt_reading(snapshot.pressure),
            altitude: fmt_reading(snapshot.altitude),
            battery: fmt_reading(snapshot.battery),
            battery_fill: snapshot
                .battery
                .filter(|b| b.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 100.0),
            battery_level: BatteryLevel::from_percent(snapshot.battery),
            alert: snapshot.is_alerting(),
            last_updated: snapshot
                .last_updated
                .map(|t| t.format(DISPLAY_TIME_FORMAT).to_string()),
            glow_until_ms: snapshot
                .last_updated
                .map(|t| t.timestamp_millis() + GLOW_MS),
        }
    }

    pub fn is_glowing(&self, now_ms: i64) -> bool {
        self.glow_until_ms.is_some_and(|until| now_ms < until)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub latitude: f64,
    pub longitude: f64,
    pub popup: MarkerPopup,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    /// keyed by lower-case device id
    pub cards: BTreeMap<String, CardView>,
    pub markers: BTreeMap<String, MarkerView>,
    /// oldest first
    pub log: Vec<String>,
    /// set once, the first time every device has a marker
    pub fit_bounds: bool,
    pub updated_at: Option<String>,
}

// ==============================================================================
// dashboard sink
// ==============================================================================

/// Cloneable handle; the session holds one, the web server reads another.
#[derive(Debug, Clone, Default)]
pub struct DashboardSink {
    view: Arc<RwLock<DashboardView>>,
}

impl DashboardSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current view.
    pub fn snapshot(&self) -> DashboardView {
        self.view.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut DashboardView)) {
        let mut view = self.view.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut view);
        view.updated_at = Some(Local::now().to_rfc3339());
    }
}

impl PresentationSink for DashboardSink {
    fn place_or_move_marker(&mut self, device: DeviceId, position: Coordinates, popup: &MarkerPopup) {
        self.update(|view| {
            view.markers.insert(
                device.key().to_string(),
                MarkerView {
                    latitude: position.latitude,
                    longitude: position.longitude,
                    popup: popup.clone(),
                },
            );
            if !view.fit_bounds && view.markers.len() >= DeviceId::ALL.len() {
                view.fit_bounds = true;
            }
        });
    }

    fn render_device_card(&mut self, snapshot: &DeviceSnapshot) {
        let card = CardView::new(snapshot);
        self.update(|view| {
            view.cards.insert(snapshot.id.key().to_string(), card);
        });
    }

    fn render_log_list(&mut self, entries: &[String]) {
        self.update(|view| view.log = entries.to_vec());
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Marker(DeviceId, Coordinates),
        Card(DeviceSnapshot),
        Log(Vec<String>),
    }

    /// Remembers every call in order.
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub calls: Vec<SinkCall>,
    }

    impl PresentationSink for RecordingSink {
        fn place_or_move_marker(&mut self, device: DeviceId, position: Coordinates, _popup: &MarkerPopup) {
            self.calls.push(SinkCall::Marker(device, position));
        }

        fn render_device_card(&mut self, snapshot: &DeviceSnapshot) {
            self.calls.push(SinkCall::Card(snapshot.clone()));
        }

        fn render_log_list(&mut self, entries: &[String]) {
            self.calls.push(SinkCall::Log(entries.to_vec()));
        }
    }
}
