//! ==============================================================================
//! lib.rs - lora telemetry dashboard core
//! ==============================================================================
//!
//! modules, leaf first:
//!     - domain:    device ids, wire decode, snapshots, coordinates
//!     - log_store: persisted, bounded, deduplicated alert log
//!     - change:    fingerprint gate for the fast poll
//!     - registry:  latest known snapshot per device
//!     - alerts:    edge-triggered alert state machine
//!     - sink:      presentation contract + dashboard view
//!     - session:   the one owner of all of the above
//!     - source:    file / http poll sources
//!     - scheduler: fast and slow poll loops
//!     - web:       axum dashboard and json api
//!     - config:    dashboard.toml
//!
//! ==============================================================================

pub mod alerts;
pub mod change;
pub mod config;
pub mod domain;
pub mod log_store;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod source;
pub mod web;
