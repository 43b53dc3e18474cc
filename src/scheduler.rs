//! ==============================================================================
//! scheduler.rs - the two poll loops
//! ==============================================================================
//!
//! purpose:
//!     drives the session from two independent timers:
//!
//!     ┌──────────────────────┐         ┌──────────────────────┐
//!     │ fast loop (1s)       │         │ slow loop (5s)       │
//!     │ fetch latest.txt     │         │ fetch data.txt       │
//!     │ session.ingest_latest│         │ session.ingest_bulk  │
//!     └──────────┬───────────┘         └──────────┬───────────┘
//!                └──────────┐      ┌──────────────┘
//!                       Arc<Mutex<DashboardSession>>
//!
//!     fetches run outside the lock, so a slow network never stalls the other
//!     loop. the lock is only held while a payload is processed.
//!
//! failure handling:
//!     - fetch errors: logged at debug, tick skipped, nothing carried over
//!     - store write errors: fatal. the failing loop cancels the token, both
//!       loops exit and join() returns the error.
//!
//! ==============================================================================

use crate::log_store::KeyValueStore;
use crate::session::{DashboardSession, FastOutcome};
use crate::sink::PresentationSink;
use crate::source::PollSource;

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub type SharedSession<S, K> = Arc<Mutex<DashboardSession<S, K>>>;

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub fast: Duration,
    pub slow: Duration,
}

pub struct PollScheduler {
    token: CancellationToken,
    fast: JoinHandle<Result<()>>,
    slow: JoinHandle<Result<()>>,
}

impl PollScheduler {
    /// Spawn both loops. They run until `token` is cancelled.
    pub fn start<S, K>(
        session: SharedSession<S, K>,
        latest: Arc<dyn PollSource>,
        bulk: Arc<dyn PollSource>,
        intervals: PollIntervals,
        token: CancellationToken,
    ) -> Self
    where
        S: KeyValueStore + 'static,
        K: PresentationSink + 'static,
    {
        info!(
            latest = %latest.describe(),
            bulk = %bulk.describe(),
            fast_ms = intervals.fast.as_millis() as u64,
            slow_ms = intervals.slow.as_millis() as u64,
            "Starting poll loops."
        );
        let fast = tokio::spawn(run_fast(session.clone(), latest, intervals.fast, token.clone()));
        let slow = tokio::spawn(run_slow(session, bulk, intervals.slow, token.clone()));
        Self { token, fast, slow }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for both loops. Returns the first fatal error, if any.
    pub async fn join(self) -> Result<()> {
        let fast = self.fast.await.map_err(|e| anyhow!("fast poll task failed: {e}"));
        let slow = self.slow.await.map_err(|e| anyhow!("slow poll task failed: {e}"));
        fast??;
        slow??;
        Ok(())
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel();
        self.join().await
    }
}

async fn fetch_or_cancel(source: &dyn PollSource, token: &CancellationToken) -> Option<Result<String>> {
    tokio::select! {
        _ = token.cancelled() => None,
        body = source.fetch() => Some(body),
    }
}

async fn run_fast<S, K>(
    session: SharedSession<S, K>,
    source: Arc<dyn PollSource>,
    period: Duration,
    token: CancellationToken,
) -> Result<()>
where
    S: KeyValueStore,
    K: PresentationSink,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let body = match fetch_or_cancel(source.as_ref(), &token).await {
            None => break,
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                debug!(source = %source.describe(), error = %e, "Latest fetch failed.");
                continue;
            }
        };
        if let FastOutcome::Merged(snapshot) = session.lock().await.ingest_latest(&body) {
            debug!(device = %snapshot.id, "Latest reading applied.");
        }
    }
    debug!("Fast poll loop stopped.");
    Ok(())
}

async fn run_slow<S, K>(
    session: SharedSession<S, K>,
    source: Arc<dyn PollSource>,
    period: Duration,
    token: CancellationToken,
) -> Result<()>
where
    S: KeyValueStore,
    K: PresentationSink,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let body = match fetch_or_cancel(source.as_ref(), &token).await {
            None => break,
            Some(Ok(body)) => body,
            Some(Err(e)) => {
                debug!(source = %source.describe(), error = %e, "Bulk fetch failed.");
                continue;
            }
        };
        let result = session.lock().await.ingest_bulk(&body);
        if let Err(e) = result {
            error!(error = %e, "Alert log write failed, stopping poll loops.");
            token.cancel();
            return Err(e.into());
        }
    }
    debug!("Slow poll loop stopped.");
    Ok(())
}
