//! Pairwise and cross-rate computation on top of the rate cache.

use crate::core::cache::RateCache;
use crate::core::currency::Currency;
use crate::core::error::{ConversionError, ConversionResult};
use crate::core::rates::RateTable;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// A rate together with the fetch time of the table it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}

/// Units of `to` per one unit of `from`, derived through the base currency.
pub fn cross_rate(table: &RateTable, from: Currency, to: Currency) -> ConversionResult<f64> {
    if from == to {
        return Ok(1.0);
    }
    let base_rate = |currency: Currency| -> ConversionResult<f64> {
        if currency.is_base() {
            return Ok(1.0);
        }
        match table.get(currency) {
            Some(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
            _ => Err(ConversionError::RatesUnavailable),
        }
    };

    let rate = if to.is_base() {
        base_rate(from)?
    } else if from.is_base() {
        1.0 / base_rate(to)?
    } else {
        base_rate(from)? / base_rate(to)?
    };

    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(ConversionError::RatesUnavailable)
    }
}

/// Conversion entry point exposed to transports and sessions.
#[derive(Clone)]
pub struct ConversionEngine {
    cache: RateCache,
}

impl ConversionEngine {
    pub fn new(cache: RateCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    #[instrument(name = "Quote", skip(self), fields(from = %from, to = %to))]
    pub async fn quote(&self, from: Currency, to: Currency) -> ConversionResult<Quote> {
        let snapshot = self.cache.usable_snapshot().await?;
        let rate = cross_rate(&snapshot.table, from, to)?;
        debug!(rate, "Computed rate");
        Ok(Quote {
            rate,
            as_of: snapshot.fetched_at,
        })
    }

    /// Quotes `from` into every target from one snapshot, in target order.
    ///
    /// At most one refresh cycle runs. When no table is usable, every target
    /// carries that same failure.
    #[instrument(
        name = "QuoteMany",
        skip(self, targets),
        fields(from = %from, targets = targets.len())
    )]
    pub async fn quote_many(
        &self,
        from: Currency,
        targets: &[Currency],
    ) -> Vec<ConversionResult<Quote>> {
        match self.cache.usable_snapshot().await {
            Ok(snapshot) => targets
                .iter()
                .map(|&to| {
                    cross_rate(&snapshot.table, from, to).map(|rate| Quote {
                        rate,
                        as_of: snapshot.fetched_at,
                    })
                })
                .collect(),
            Err(e) => targets.iter().map(|_| Err(e.clone())).collect(),
        }
    }

    pub async fn rate(&self, from: Currency, to: Currency) -> ConversionResult<f64> {
        self.quote(from, to).await.map(|q| q.rate)
    }

    /// `amount` is expected to be validated by the caller.
    pub async fn convert(&self, amount: f64, from: Currency, to: Currency) -> ConversionResult<f64> {
        self.rate(from, to).await.map(|rate| amount * rate)
    }

    /// String-coded variant of [`ConversionEngine::rate`] for transports.
    pub async fn rate_for_codes(&self, from: &str, to: &str) -> ConversionResult<f64> {
        let from: Currency = from.parse()?;
        let to: Currency = to.parse()?;
        self.rate(from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CachePolicy;
    use crate::core::rates::RateSource;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EPS: f64 = 1e-9;

    fn sample_table() -> RateTable {
        RateTable::new([
            (Currency::Usd, 12700.0),
            (Currency::Eur, 13600.0),
            (Currency::Gbp, 16150.25),
            (Currency::Rub, 140.37),
            (Currency::Jpy, 84.12),
        ])
    }

    fn supported(table: &RateTable) -> Vec<Currency> {
        std::iter::once(Currency::BASE)
            .chain(table.iter().map(|(c, _)| c))
            .collect()
    }

    fn close(a: f64, b: f64) -> bool {
        ((a - b) / b).abs() < EPS
    }

    #[test]
    fn test_direct_and_inverse_rates() {
        let table = sample_table();
        assert_eq!(cross_rate(&table, Currency::Usd, Currency::Uzs), Ok(12700.0));
        assert_eq!(
            cross_rate(&table, Currency::Uzs, Currency::Usd),
            Ok(1.0 / 12700.0)
        );
        assert_eq!(cross_rate(&table, Currency::Uzs, Currency::Uzs), Ok(1.0));
        assert_eq!(cross_rate(&table, Currency::Eur, Currency::Eur), Ok(1.0));
    }

    #[test]
    fn test_reciprocal_consistency() {
        let table = sample_table();
        for from in supported(&table) {
            for to in supported(&table) {
                let forward = cross_rate(&table, from, to).unwrap();
                let backward = cross_rate(&table, to, from).unwrap();
                assert!(close(forward, 1.0 / backward), "{from}->{to}");
            }
        }
    }

    #[test]
    fn test_cross_rate_consistency() {
        let table = sample_table();
        let all = supported(&table);
        for &a in &all {
            for &b in &all {
                for &c in &all {
                    if a == b || b == c || a == c {
                        continue;
                    }
                    let direct = cross_rate(&table, a, c).unwrap();
                    let via = cross_rate(&table, a, b).unwrap() * cross_rate(&table, b, c).unwrap();
                    assert!(close(direct, via), "{a}->{b}->{c}");
                }
            }
        }
    }

    #[test]
    fn test_missing_entry_is_unavailable_not_infinite() {
        let table = RateTable::new([(Currency::Usd, 12700.0)]);
        assert_eq!(
            cross_rate(&table, Currency::Usd, Currency::Eur),
            Err(ConversionError::RatesUnavailable)
        );
        assert_eq!(
            cross_rate(&table, Currency::Uzs, Currency::Eur),
            Err(ConversionError::RatesUnavailable)
        );
    }

    struct FixedSource {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RateSource for FixedSource {
        async fn fetch(&self) -> Result<RateTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("unreachable"));
            }
            Ok(RateTable::new([(Currency::Usd, 12700.0), (Currency::Eur, 13600.0)]))
        }
    }

    fn engine(fail: bool) -> (ConversionEngine, Arc<FixedSource>) {
        let source = Arc::new(FixedSource {
            calls: AtomicUsize::new(0),
            fail,
        });
        let policy = CachePolicy {
            retry_delay: std::time::Duration::ZERO,
            ..CachePolicy::default()
        };
        let cache = RateCache::new(Arc::clone(&source) as Arc<dyn RateSource>, policy);
        (ConversionEngine::new(cache), source)
    }

    #[tokio::test]
    async fn test_convert_usd_to_eur() {
        let (engine, source) = engine(false);
        let value = engine.convert(100.0, Currency::Usd, Currency::Eur).await.unwrap();
        assert!((value - 93.38).abs() < 0.01);
        assert!(close(value, 100.0 * 12700.0 / 13600.0));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        // Second conversion is served from the fresh table
        engine.convert(1.0, Currency::Eur, Currency::Usd).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_conversion() {
        let (engine, _) = engine(false);
        for amount in [0.0, 1.0, 50.5, 1e12] {
            assert_eq!(
                engine.convert(amount, Currency::Usd, Currency::Usd).await,
                Ok(amount)
            );
        }
    }

    #[tokio::test]
    async fn test_base_round_trip() {
        let (engine, _) = engine(false);
        for currency in [Currency::Usd, Currency::Eur] {
            let there = engine.rate(Currency::BASE, currency).await.unwrap();
            let back = engine.rate(currency, Currency::BASE).await.unwrap();
            assert!(close(there * back, 1.0));
        }
    }

    #[tokio::test]
    async fn test_unavailable_without_any_table() {
        let (engine, source) = engine(true);
        assert_eq!(
            engine.rate(Currency::Usd, Currency::Eur).await,
            Err(ConversionError::RatesUnavailable)
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_for_codes_rejects_unknown_currency() {
        let (engine, source) = engine(false);
        assert_eq!(
            engine.rate_for_codes("USD", "XAU").await,
            Err(ConversionError::InvalidCurrency("XAU".to_string()))
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(engine.rate_for_codes("usd", "uzs").await.is_ok());
    }
}
