use crate::core::config::AppConfig;
use crate::core::engine::ConversionEngine;
use crate::core::notify::{DailyDigest, Notifier, UserDirectory};
use crate::core::scheduler::{run_daily, run_refresh_loop};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the background service until Ctrl-C.
pub async fn run(
    config: &AppConfig,
    engine: ConversionEngine,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        shutdown.cancel();
    });
    serve(config, engine, directory, notifier, cancel).await
}

/// Primes the cache, then drives the refresh loop and the daily digest until
/// `cancel` fires. Returns once both tasks have stopped.
pub async fn serve(
    config: &AppConfig,
    engine: ConversionEngine,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) -> Result<()> {
    let schedule = config.notification.schedule()?;
    let cache = engine.cache().clone();

    match cache.refresh_now().await {
        Ok(snapshot) => info!(currencies = snapshot.table.len(), "Rates primed"),
        Err(e) => warn!(error = %e, "Initial rate fetch failed, continuing without rates"),
    }

    let refresh = tokio::spawn(run_refresh_loop(
        cache.clone(),
        config.cache.refresh_interval(),
        cancel.clone(),
    ));

    let digest = Arc::new(DailyDigest::new(
        cache,
        directory,
        notifier,
        schedule.timezone,
        config.notification.send_delay(),
    ));
    let daily = tokio::spawn(run_daily(schedule, cancel.clone(), move || {
        let digest = Arc::clone(&digest);
        async move {
            digest.dispatch().await;
        }
    }));

    let (refresh, daily) = tokio::join!(refresh, daily);
    refresh?;
    daily?;
    info!("Service stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::RateCache;
    use crate::core::currency::Currency;
    use crate::core::rates::{RateSource, RateTable};
    use crate::providers::telegram::LogNotifier;
    use crate::store::MemorySubscriberStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch(&self) -> anyhow::Result<RateTable> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RateTable::new([(Currency::Usd, 12700.0)]))
        }
    }

    fn fixture(source: Arc<CountingSource>) -> (AppConfig, ConversionEngine) {
        let config = AppConfig::default();
        let cache = RateCache::new(source, config.cache.policy());
        (config, ConversionEngine::new(cache))
    }

    #[tokio::test]
    async fn test_serve_primes_cache_and_stops_on_cancel() {
        let source = Arc::new(CountingSource::default());
        let (config, engine) = fixture(Arc::clone(&source));
        let cancel = CancellationToken::new();
        cancel.cancel();

        serve(
            &config,
            engine.clone(),
            Arc::new(MemorySubscriberStore::new()),
            Arc::new(LogNotifier),
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert!(engine.cache().snapshot().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_keeps_refreshing_until_cancelled() {
        let source = Arc::new(CountingSource::default());
        let (config, engine) = fixture(Arc::clone(&source));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                serve(
                    &config,
                    engine,
                    Arc::new(MemorySubscriberStore::new()),
                    Arc::new(LogNotifier),
                    cancel,
                )
                .await
            })
        };

        tokio::time::sleep(Duration::from_secs(601)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // Prime plus the ticks at 300s and 600s; a digest round may add more.
        assert!(source.0.load(Ordering::SeqCst) >= 3);
    }
}
