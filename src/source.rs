//! ==============================================================================
//! source.rs - where polled payloads come from
//! ==============================================================================
//!
//! purpose:
//!     the producer overwrites latest.txt and appends to data.txt. the host
//!     either reads them straight off disk or fetches them from whatever web
//!     server exposes them to the browser dashboard.
//!
//!     - FileSource: tokio::fs read of a local path
//!     - HttpSource: reqwest GET, optionally with a "_=<millis>" cache buster
//!
//! relationships:
//!     - used by: scheduler.rs (one source per poll loop)
//!     - created by: main.rs via from_location()
//!
//! ==============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait PollSource: Send + Sync {
    async fn fetch(&self) -> Result<String>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PollSource for FileSource {
    async fn fetch(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct HttpSource {
    client: reqwest::Client,
    url: reqwest::Url,
    cache_bust: bool,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration, cache_bust: bool) -> Result<Self> {
        let url = reqwest::Url::parse(url).with_context(|| format!("Invalid source url {url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build http client")?;
        Ok(Self { client, url, cache_bust })
    }

    fn request_url(&self) -> reqwest::Url {
        let mut url = self.url.clone();
        if self.cache_bust {
            url.query_pairs_mut()
                .append_pair("_", &chrono::Utc::now().timestamp_millis().to_string());
        }
        url
    }
}

#[async_trait]
impl PollSource for HttpSource {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(self.request_url())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.url))?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// `http://` and `https://` locations become HttpSource, anything else a
/// file path.
pub fn from_location(location: &str, timeout: Duration, cache_bust: bool) -> Result<Arc<dyn PollSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Arc::new(HttpSource::new(location, timeout, cache_bust)?))
    } else {
        Ok(Arc::new(FileSource::new(location)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_file_source_reads_latest_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.txt");
        std::fs::write(&path, "first").unwrap();
        let source = FileSource::new(&path);
        assert_eq!(source.fetch().await.unwrap(), "first");

        std::fs::write(&path, "second").unwrap();
        assert_eq!(source.fetch().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.txt"));
        assert!(source.fetch().await.is_err());
    }

    #[test]
    fn test_location_dispatch() {
        let timeout = Duration::from_secs(1);
        let http = from_location("http://127.0.0.1:8080/latest.txt", timeout, true).unwrap();
        assert_eq!(http.describe(), "http://127.0.0.1:8080/latest.txt");
        let file = from_location("feeds/data.txt", timeout, false).unwrap();
        assert_eq!(file.describe(), "feeds/data.txt");
        assert!(HttpSource::new("http://", timeout, false).is_err());
    }

    #[test]
    fn test_cache_buster_is_appended() {
        let source = HttpSource::new("http://localhost/latest.txt", Duration::from_secs(1), true).unwrap();
        let url = source.request_url();
        assert!(url.query_pairs().any(|(k, v)| k == "_" && v.parse::<i64>().is_ok()));

        let plain = HttpSource::new("http://localhost/data.txt", Duration::from_secs(1), false).unwrap();
        assert_eq!(plain.request_url().query(), None);
    }

    #[tokio::test]
    async fn test_http_source_fetches_body() {
        let app = Router::new()
            .route(
                "/latest.txt",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    if params.contains_key("_") {
                        r#"{"id":"P1"}"#.to_string()
                    } else {
                        "stale".to_string()
                    }
                }),
            )
            .route("/missing", get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = HttpSource::new(&format!("http://{addr}/latest.txt"), Duration::from_secs(2), true).unwrap();
        assert_eq!(source.fetch().await.unwrap(), r#"{"id":"P1"}"#);

        let missing = HttpSource::new(&format!("http://{addr}/missing"), Duration::from_secs(2), false).unwrap();
        assert!(missing.fetch().await.is_err());
    }
}
