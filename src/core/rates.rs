//! Rate table and the provider abstraction that produces it.

use crate::core::currency::Currency;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Immutable table of base-currency units per one unit of each foreign currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: HashMap<Currency, f64>,
}

impl RateTable {
    /// Builds a table, keeping only foreign currencies with a positive finite rate.
    pub fn new(entries: impl IntoIterator<Item = (Currency, f64)>) -> Self {
        let rates = entries
            .into_iter()
            .filter(|(currency, rate)| !currency.is_base() && rate.is_finite() && *rate > 0.0)
            .collect();
        Self { rates }
    }

    pub fn get(&self, currency: Currency) -> Option<f64> {
        self.rates.get(&currency).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Entries in [`Currency::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, f64)> + '_ {
        Currency::foreign().filter_map(|c| self.get(c).map(|rate| (c, rate)))
    }
}

/// A rate that moved by at least the reporting threshold between two tables.
#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub currency: Currency,
    pub old: f64,
    pub new: f64,
}

impl RateChange {
    pub fn diff(&self) -> f64 {
        self.new - self.old
    }

    pub fn percent(&self) -> f64 {
        self.diff() / self.old * 100.0
    }
}

/// Currencies present in both tables whose rate changed by `threshold` or more.
pub fn detect_changes(old: &RateTable, new: &RateTable, threshold: f64) -> Vec<RateChange> {
    new.iter()
        .filter_map(|(currency, new_rate)| {
            let old_rate = old.get(currency)?;
            ((new_rate - old_rate).abs() >= threshold).then_some(RateChange {
                currency,
                old: old_rate,
                new: new_rate,
            })
        })
        .collect()
}

/// Fetches the latest rate table from an external provider. No caching, no retry.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self) -> Result<RateTable>;
}
