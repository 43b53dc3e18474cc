//! ==============================================================================
//! web.rs - dashboard http surface
//! ==============================================================================
//!
//! routes:
//!     GET  /                 server-rendered dashboard (cards, markers, log)
//!     GET  /api              json view model
//!     GET  /api/log          persisted alert log, oldest first
//!     POST /api/log/clear    wipe the persisted log
//!
//! the page reads only from the DashboardSink view. the log routes go through
//! the session so they see exactly what is on disk.
//!
//! ==============================================================================

use crate::log_store::KeyValueStore;
use crate::scheduler::SharedSession;
use crate::sink::{DashboardSink, DashboardView};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::Local;
use std::fmt::Write as _;
use tower_http::cors::CorsLayer;
use tracing::error;

pub struct WebState<S> {
    pub session: SharedSession<S, DashboardSink>,
    pub view: DashboardSink,
}

impl<S> Clone for WebState<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            view: self.view.clone(),
        }
    }
}

pub fn router<S: KeyValueStore + 'static>(state: WebState<S>) -> Router {
    Router::new()
        .route("/", get(dashboard_handler::<S>))
        .route("/api", get(api_handler::<S>))
        .route("/api/log", get(log_handler::<S>))
        .route("/api/log/clear", post(clear_log_handler::<S>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<S: KeyValueStore + 'static>(bind: &str, state: WebState<S>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind dashboard on {bind}"))?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn dashboard_handler<S: KeyValueStore>(State(state): State<WebState<S>>) -> Html<String> {
    Html(render_dashboard(&state.view.snapshot(), Local::now().timestamp_millis()))
}

/// json api endpoint for programmatic access
async fn api_handler<S: KeyValueStore>(State(state): State<WebState<S>>) -> Json<DashboardView> {
    Json(state.view.snapshot())
}

async fn log_handler<S: KeyValueStore>(State(state): State<WebState<S>>) -> Json<Vec<String>> {
    Json(state.session.lock().await.log_entries())
}

async fn clear_log_handler<S: KeyValueStore>(State(state): State<WebState<S>>) -> impl IntoResponse {
    match state.session.lock().await.clear_log() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))),
        Err(e) => {
            error!(error = %e, "Failed to clear alert log.");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"status": "error", "message": e.to_string()})),
            )
        }
    }
}

// ==============================================================================
// html rendering
// ==============================================================================

pub fn render_dashboard(view: &DashboardView, now_ms: i64) -> String {
    let mut cards = String::new();
    for (key, card) in &view.cards {
        let glow = if card.is_glowing(now_ms) { " glow" } else { "" };
        let alert = if card.alert {
            r#"<div class="alert-banner">⚠ ALERT ACTIVE</div>"#
        } else {
            ""
        };
        let battery_class = card.battery_level.as_str();
        let _ = write!(
            cards,
            r#"<section class="card{glow}" id="dashboard-{key}">
  <h2>Device {device}</h2>{alert}
  <div class="metric">Temperature <b>{temperature}</b> °C</div>
  <div class="metric">Pressure <b>{pressure}</b> hPa</div>
  <div class="metric">Altitude <b>{altitude}</b> m</div>
  <div class="metric">Battery <b>{battery}%</b>
    <div class="battery"><div class="battery-fill {battery_class}" style="width:{fill}%"></div></div>
  </div>
  <div class="updated">{updated}</div>
</section>
"#,
            key = html_escape(key),
            device = html_escape(&card.device),
            temperature = html_escape(&card.temperature),
            pressure = html_escape(&card.pressure),
            altitude = html_escape(&card.altitude),
            battery = html_escape(&card.battery),
            fill = card.battery_fill,
            updated = html_escape(card.last_updated.as_deref().unwrap_or("waiting for data")),
        );
    }

    let mut markers = String::new();
    for marker in view.markers.values() {
        let popup = &marker.popup;
        let status = if popup.alert {
            r#"<span class="active">ACTIVE</span>"#
        } else {
            r#"<span class="normal">Normal</span>"#
        };
        let _ = write!(
            markers,
            "<tr><td>{}</td><td>{}</td><td>{}°C</td><td>{} hPa</td><td>{} m</td><td>{}%</td><td>{}</td></tr>\n",
            html_escape(&popup.device),
            html_escape(&popup.coordinates),
            html_escape(&popup.temperature),
            html_escape(&popup.pressure),
            html_escape(&popup.altitude),
            html_escape(&popup.battery),
            status,
        );
    }

    let log = if view.log.is_empty() {
        r#"<p id="log-empty">No alerts yet</p>"#.to_string()
    } else {
        let items: String = view
            .log
            .iter()
            .rev()
            .map(|entry| format!("<li>{}</li>\n", html_escape(entry)))
            .collect();
        format!(r#"<ul id="alert-log">{items}</ul>"#)
    };

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="2">
<title>LoRa Telemetry Dashboard</title>
<style>
body {{ font-family: Inter, system-ui, sans-serif; background: #0f172a; color: #e2e8f0; padding: 1.5rem; }}
.cards {{ display: flex; gap: 1rem; flex-wrap: wrap; }}
.card {{ background: #1e293b; border-radius: 12px; padding: 1rem 1.5rem; min-width: 260px; }}
.card.glow {{ box-shadow: 0 0 20px rgba(99, 102, 241, 0.3); border-left: 4px solid #6366f1; }}
.alert-banner {{ color: #f87171; font-weight: bold; }}
.battery {{ background: #334155; height: 6px; border-radius: 3px; }}
.battery-fill {{ height: 6px; border-radius: 3px; }}
.battery-fill.high {{ background: #22c55e; }}
.battery-fill.medium {{ background: #eab308; }}
.battery-fill.low {{ background: #ef4444; }}
.active {{ color: red; font-weight: bold; }}
.normal {{ color: green; }}
table {{ border-collapse: collapse; margin-top: 1rem; }}
td, th {{ padding: 0.25rem 0.75rem; border-bottom: 1px solid #334155; }}
</style>
</head>
<body>
<h1>LoRa Telemetry Dashboard</h1>
<div class="cards">
{cards}</div>
<h2>Map Markers</h2>
<table>
<tr><th>Device</th><th>Coords</th><th>Temp</th><th>Pressure</th><th>Altitude</th><th>Battery</th><th>Alert</th></tr>
{markers}</table>
<h2>Alert Log</h2>
<form method="post" action="/api/log/clear"><button id="clear-log-btn">Clear Log</button></form>
{log}
</body>
</html>"#
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
