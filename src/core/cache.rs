//! Last-known rate table with TTL, bounded retry and single-flight refresh.

use crate::core::currency::Currency;
use crate::core::error::{ConversionError, ConversionResult};
use crate::core::rates::{RateSource, RateTable, detect_changes};
use crate::core::retry::with_retry;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    /// Absolute rate movement worth logging after a refresh.
    pub change_threshold: f64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            change_threshold: 0.01,
        }
    }
}

/// One successfully fetched table and when it was fetched.
#[derive(Debug)]
pub struct RateSnapshot {
    pub table: RateTable,
    pub fetched_at: DateTime<Utc>,
    fetched: Instant,
}

impl RateSnapshot {
    fn new(table: RateTable) -> Self {
        Self {
            table,
            fetched_at: Utc::now(),
            fetched: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched.elapsed()
    }
}

/// Outcome of checking the cached table against the TTL.
#[derive(Debug, Clone)]
pub enum Freshness {
    Fresh(Arc<RateSnapshot>),
    StaleButUsable(Arc<RateSnapshot>),
    Unavailable,
}

type RefreshFlight = Shared<BoxFuture<'static, ConversionResult<Arc<RateSnapshot>>>>;

struct CacheInner {
    source: Arc<dyn RateSource>,
    policy: CachePolicy,
    current: RwLock<Option<Arc<RateSnapshot>>>,
    in_flight: Mutex<Option<RefreshFlight>>,
}

/// Shared handle to the process-wide rate cache. Clones share state.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<CacheInner>,
}

impl RateCache {
    pub fn new(source: Arc<dyn RateSource>, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                policy,
                current: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    /// Current snapshot regardless of age. Never waits on a refresh.
    pub async fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.inner.current.read().await.clone()
    }

    /// Cached rate of `currency` in base units. The base currency is 1.
    pub async fn get(&self, currency: Currency) -> ConversionResult<f64> {
        if currency.is_base() {
            return Ok(1.0);
        }
        let snapshot = self
            .snapshot()
            .await
            .ok_or(ConversionError::RatesUnavailable)?;
        match snapshot.table.get(currency) {
            Some(rate) => {
                debug!(%currency, rate, "Cache HIT");
                Ok(rate)
            }
            None => {
                debug!(%currency, "No cached rate");
                Err(ConversionError::RatesUnavailable)
            }
        }
    }

    pub async fn freshness(&self) -> Freshness {
        match self.snapshot().await {
            Some(snapshot) if snapshot.age() < self.inner.policy.ttl => {
                Freshness::Fresh(snapshot)
            }
            Some(snapshot) => Freshness::StaleButUsable(snapshot),
            None => Freshness::Unavailable,
        }
    }

    /// Refreshes when the table is missing or older than the TTL.
    pub async fn ensure_fresh(&self) -> ConversionResult<()> {
        match self.freshness().await {
            Freshness::Fresh(_) => Ok(()),
            Freshness::StaleButUsable(_) | Freshness::Unavailable => {
                self.refresh_now().await.map(|_| ())
            }
        }
    }

    /// Unconditional refresh, joined by any concurrent refresh caller.
    pub async fn refresh_now(&self) -> ConversionResult<Arc<RateSnapshot>> {
        let flight = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(flight) => {
                    debug!("Joining in-flight refresh");
                    flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight = async move {
                        let result = inner.refresh().await;
                        inner.in_flight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    pub async fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().await.is_some()
    }

    /// Snapshot to serve a conversion from.
    ///
    /// A stale table is revalidated synchronously unless a refresh is already
    /// running, and is still served if that revalidation fails.
    pub async fn usable_snapshot(&self) -> ConversionResult<Arc<RateSnapshot>> {
        match self.freshness().await {
            Freshness::Fresh(snapshot) => Ok(snapshot),
            Freshness::StaleButUsable(stale) => {
                if self.is_refreshing().await {
                    debug!("Serving stale rates while refresh is in flight");
                    return Ok(stale);
                }
                match self.refresh_now().await {
                    Ok(snapshot) => Ok(snapshot),
                    Err(e) => {
                        warn!(
                            error = %e,
                            age_secs = stale.age().as_secs(),
                            "Serving stale rates"
                        );
                        Ok(stale)
                    }
                }
            }
            Freshness::Unavailable => self
                .refresh_now()
                .await
                .map_err(|_| ConversionError::RatesUnavailable),
        }
    }
}

impl CacheInner {
    async fn refresh(&self) -> ConversionResult<Arc<RateSnapshot>> {
        let policy = &self.policy;
        let table = with_retry(
            || self.source.fetch(),
            policy.retry_attempts,
            policy.retry_delay,
        )
        .await
        .map_err(|(e, attempts)| {
            error!(attempts, error = %e, "Rate refresh failed");
            ConversionError::RefreshFailed {
                attempts,
                reason: format!("{e:#}"),
            }
        })?;

        let snapshot = Arc::new(RateSnapshot::new(table));
        let mut current = self.current.write().await;
        if let Some(previous) = current.as_ref() {
            let changes = detect_changes(&previous.table, &snapshot.table, policy.change_threshold);
            for change in changes {
                info!(
                    currency = %change.currency,
                    old = change.old,
                    new = change.new,
                    "Rate changed: {:+.2} ({:+.2}%)",
                    change.diff(),
                    change.percent()
                );
            }
        }
        *current = Some(Arc::clone(&snapshot));
        info!(currencies = snapshot.table.len(), "Rates refreshed");
        Ok(snapshot)
    }
}
