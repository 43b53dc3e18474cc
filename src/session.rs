//! ==============================================================================
//! session.rs - the one owner of dashboard state
//! ==============================================================================
//!
//! purpose:
//!     ties the pieces together without globals. a DashboardSession is built
//!     once in main, shared with the scheduler and web server behind a mutex,
//!     and dropped at shutdown.
//!
//!     fast path:  raw latest.txt -> ChangeDetector -> SnapshotPatch
//!                 -> DeviceRegistry::merge -> sink (marker + card)
//!     slow path:  raw data.txt -> AlertEdgeDetector::sweep -> AlertLog
//!                 -> sink (log list, only when the log changed)
//!
//! ==============================================================================

use crate::alerts::{AlertEdgeDetector, SweepReport};
use crate::change::ChangeDetector;
use crate::config::DashboardConfig;
use crate::domain::{fmt_reading, Coordinates, DecodeError, DeviceSnapshot, SnapshotPatch};
use crate::log_store::{AlertLog, KeyValueStore, StoreError};
use crate::registry::{placement, DeviceRegistry, DEFAULT_FALLBACK};
use crate::sink::{MarkerPopup, PresentationSink};

use chrono::{DateTime, Local};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fallback: Coordinates,
    pub persist_alert_state: bool,
    pub show_sensor_data: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fallback: DEFAULT_FALLBACK,
            persist_alert_state: true,
            show_sensor_data: false,
        }
    }
}

impl From<&DashboardConfig> for SessionOptions {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            fallback: config.map.fallback(),
            persist_alert_state: config.alerts.persist_state,
            show_sensor_data: config.logging.show_sensor_data,
        }
    }
}

/// Result of feeding one fast-poll payload.
#[derive(Debug)]
pub enum FastOutcome {
    /// same bytes as last time; nothing downstream ran
    Unchanged,
    Rejected(DecodeError),
    Merged(DeviceSnapshot),
}

pub struct DashboardSession<S, K> {
    changes: ChangeDetector,
    registry: DeviceRegistry,
    alerts: AlertEdgeDetector,
    log: AlertLog<S>,
    sink: K,
    options: SessionOptions,
}

impl<S: KeyValueStore, K: PresentationSink> DashboardSession<S, K> {
    pub fn new(log: AlertLog<S>, sink: K, options: SessionOptions) -> Self {
        let alerts = if options.persist_alert_state {
            let active = log.load_alert_state();
            if !active.is_empty() {
                info!(devices = ?active, "Resuming with devices already alerting.");
            }
            AlertEdgeDetector::persistent(active)
        } else {
            AlertEdgeDetector::new()
        };

        Self {
            changes: ChangeDetector::new(),
            registry: DeviceRegistry::new(),
            alerts,
            log,
            sink,
            options,
        }
    }

    /// First paint: placeholder cards and whatever log survived the restart.
    pub fn start(&mut self) {
        for snapshot in self.registry.snapshots() {
            self.sink.render_device_card(snapshot);
        }
        let entries = self.log.load();
        self.sink.render_log_list(&entries);
    }

    pub fn ingest_latest(&mut self, raw: &str) -> FastOutcome {
        self.ingest_latest_at(raw, Local::now())
    }

    pub fn ingest_latest_at(&mut self, raw: &str, now: DateTime<Local>) -> FastOutcome {
        if !self.changes.has_changed(raw) {
            return FastOutcome::Unchanged;
        }

        let patch = match SnapshotPatch::decode(raw) {
            Ok(patch) => patch,
            Err(e) => {
                debug!(error = %e, "Ignoring latest payload.");
                return FastOutcome::Rejected(e);
            }
        };

        let snapshot = self.registry.merge(&patch, now);
        let position = placement(&snapshot, self.options.fallback);
        if self.options.show_sensor_data {
            info!(
                device = %snapshot.id,
                temperature = %fmt_reading(snapshot.temperature),
                pressure = %fmt_reading(snapshot.pressure),
                battery = %fmt_reading(snapshot.battery),
                alert = snapshot.alert,
                position = %position,
                "Reading merged."
            );
        }

        let popup = MarkerPopup::new(&snapshot, position);
        self.sink.place_or_move_marker(snapshot.id, position, &popup);
        self.sink.render_device_card(&snapshot);
        FastOutcome::Merged(snapshot)
    }

    pub fn ingest_bulk(&mut self, raw: &str) -> Result<SweepReport, StoreError> {
        let report = self.alerts.sweep(raw, &mut self.log)?;
        debug!(
            processed = report.processed,
            skipped = report.skipped,
            transitions = report.transitions.len(),
            "Alert sweep finished."
        );
        if report.log_changed {
            let entries = self.log.load();
            self.sink.render_log_list(&entries);
        }
        Ok(report)
    }

    pub fn clear_log(&mut self) -> Result<(), StoreError> {
        self.log.clear()?;
        info!(key = self.log.key(), "Alert log cleared.");
        self.sink.render_log_list(&[]);
        Ok(())
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.load()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn alerts(&self) -> &AlertEdgeDetector {
        &self.alerts
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceId;
    use crate::log_store::{FileStore, MemoryStore, DEFAULT_LOG_KEY, MAX_ENTRIES};
    use crate::sink::testing::{RecordingSink, SinkCall};

    type TestSession = DashboardSession<MemoryStore, RecordingSink>;

    fn session() -> TestSession {
        DashboardSession::new(
            AlertLog::new(MemoryStore::default(), DEFAULT_LOG_KEY, MAX_ENTRIES),
            RecordingSink::default(),
            SessionOptions::default(),
        )
    }

    const LATEST: &str = r#"{"id":"P1","temperature":"25.3","pressure":"921.4","altitude":"799.2","latitude":12.9241,"longitude":77.4991,"battery":47,"alert":0}"#;

    #[test]
    fn test_start_renders_placeholders_and_log() {
        let mut session = session();
        session.start();
        let calls = &session.sink().calls;
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], SinkCall::Card(s) if s.id == DeviceId::P1 && s.temperature.is_none()));
        assert_eq!(calls[2], SinkCall::Log(vec![]));
    }

    #[test]
    fn test_new_payload_is_merged_and_rendered() {
        let mut session = session();
        let snapshot = match session.ingest_latest(LATEST) {
            FastOutcome::Merged(snapshot) => snapshot,
            other => panic!("expected a merge, got {other:?}"),
        };
        assert_eq!(snapshot.temperature, Some(25.3));

        let calls = &session.sink().calls;
        assert_eq!(calls[0], SinkCall::Marker(DeviceId::P1, Coordinates::new(12.9241, 77.4991)));
        assert_eq!(calls[1], SinkCall::Card(snapshot));
    }

    #[test]
    fn test_identical_payload_skips_merge_and_sink() {
        let mut session = session();
        let first = Local::now();
        session.ingest_latest_at(LATEST, first);
        let calls_after_first = session.sink().calls.len();

        let later = first + chrono::Duration::seconds(1);
        assert!(matches!(session.ingest_latest_at(LATEST, later), FastOutcome::Unchanged));
        assert_eq!(session.sink().calls.len(), calls_after_first);
        let stored = session.registry().get(DeviceId::P1).unwrap();
        assert_eq!(stored.last_updated, Some(first));
    }

    #[test]
    fn test_rejected_payloads_touch_nothing() {
        let mut session = session();
        assert!(matches!(session.ingest_latest("not-json"), FastOutcome::Rejected(_)));
        assert!(matches!(
            session.ingest_latest(r#"{"id":"p7","alert":1}"#),
            FastOutcome::Rejected(DecodeError::UnknownDevice(_))
        ));
        assert!(session.sink().calls.is_empty());
    }

    #[test]
    fn test_zero_position_is_placed_at_fallback() {
        let mut session = session();
        session.ingest_latest(r#"{"id":"P2","latitude":0.0,"longitude":0.0,"battery":50}"#);

        assert_eq!(session.sink().calls[0], SinkCall::Marker(DeviceId::P2, DEFAULT_FALLBACK));
        let stored = session.registry().get(DeviceId::P2).unwrap();
        assert_eq!((stored.latitude, stored.longitude), (Some(0.0), Some(0.0)));
    }

    #[test]
    fn test_lost_fix_moves_marker_to_fallback() {
        let mut session = session();
        session.ingest_latest(r#"{"id":"P1","latitude":12.95,"longitude":77.55}"#);
        session.ingest_latest(r#"{"id":"P1","latitude":"no-fix","longitude":null}"#);

        let markers: Vec<_> = session
            .sink()
            .calls
            .iter()
            .filter(|call| matches!(call, SinkCall::Marker(..)))
            .collect();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0], &SinkCall::Marker(DeviceId::P1, Coordinates::new(12.95, 77.55)));
        assert_eq!(markers[1], &SinkCall::Marker(DeviceId::P1, DEFAULT_FALLBACK));

        let stored = session.registry().get(DeviceId::P1).unwrap();
        assert!(stored.latitude.is_some_and(f64::is_nan));
        assert_eq!(stored.reported_position(), None);
    }

    #[test]
    fn test_fast_path_never_touches_alert_state() {
        let mut session = session();
        session.ingest_latest(r#"{"id":"P1","alert":1}"#);
        assert!(session.registry().get(DeviceId::P1).unwrap().is_alerting());
        assert!(!session.alerts().is_alerting(DeviceId::P1));
        assert!(session.log_entries().is_empty());
    }

    #[test]
    fn test_bulk_redraws_log_only_when_it_changed() {
        let mut session = session();
        let alerting = r#"{"id":"p1","alert":1,"temperature":30,"pressure":920,"battery":40}"#;

        session.ingest_bulk(alerting).unwrap();
        assert!(matches!(session.sink().calls.last(), Some(SinkCall::Log(entries)) if entries.len() == 1));

        let calls = session.sink().calls.len();
        session.ingest_bulk(alerting).unwrap();
        assert_eq!(session.sink().calls.len(), calls);
    }

    #[test]
    fn test_clear_log() {
        let mut session = session();
        session
            .ingest_bulk(r#"{"id":"p2","alert":1,"temperature":30,"pressure":920,"battery":40}"#)
            .unwrap();
        session.clear_log().unwrap();
        assert!(session.log_entries().is_empty());
        assert_eq!(session.sink().calls.last(), Some(&SinkCall::Log(vec![])));
    }

    #[test]
    fn test_restart_during_sustained_alert() {
        let dir = tempfile::tempdir().unwrap();
        let alerting = r#"{"id":"p1","alert":1,"temperature":30,"pressure":920,"battery":40}"#;
        let open = |persist: bool| {
            DashboardSession::new(
                AlertLog::new(FileStore::open(dir.path()).unwrap(), DEFAULT_LOG_KEY, MAX_ENTRIES),
                RecordingSink::default(),
                SessionOptions { persist_alert_state: persist, ..SessionOptions::default() },
            )
        };

        open(true).ingest_bulk(alerting).unwrap();

        let mut resumed = open(true);
        assert!(resumed.alerts().is_alerting(DeviceId::P1));
        let report = resumed.ingest_bulk(alerting).unwrap();
        assert!(report.transitions.is_empty());

        // without persistence the restarted session sees a fresh onset
        let mut forgetful = open(false);
        let report = forgetful.ingest_bulk(alerting).unwrap();
        assert_eq!(report.transitions.len(), 1);
    }
}
