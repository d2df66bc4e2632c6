//! Daily rate digest fan-out to active users.

use crate::core::cache::{RateCache, RateSnapshot};
use crate::core::currency::Currency;
use crate::core::format::format_amount;
use crate::core::session::UserId;
use anyhow::Result;
use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Source of users that receive broadcasts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_active_user_ids(&self) -> Result<Vec<UserId>>;
}

/// Delivers a text message to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, user: UserId, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: usize,
    pub failed: usize,
}

/// Renders the rate summary sent by the daily digest.
pub fn render_digest(snapshot: &RateSnapshot, timezone: Tz) -> String {
    let mut text = String::from("Exchange rates (Central Bank of Uzbekistan):\n");
    for (currency, rate) in snapshot.table.iter() {
        text.push_str(&format!(
            "\n1 {} = {} {}",
            currency,
            format_amount(rate),
            Currency::BASE
        ));
    }
    text.push_str(&format!(
        "\n\nUpdated: {}",
        snapshot.fetched_at.with_timezone(&timezone).format("%H:%M")
    ));
    text
}

pub struct DailyDigest {
    cache: RateCache,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
    send_delay: Duration,
}

impl DailyDigest {
    pub fn new(
        cache: RateCache,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        timezone: Tz,
        send_delay: Duration,
    ) -> Self {
        Self {
            cache,
            directory,
            notifier,
            timezone,
            send_delay,
        }
    }

    /// Refreshes rates and sends the digest to every active user.
    ///
    /// Uses the last good table when the refresh fails; skips the round when
    /// there is none. Per-recipient failures are counted, never propagated.
    pub async fn dispatch(&self) -> DispatchStats {
        let snapshot = match self.cache.refresh_now().await {
            Ok(snapshot) => snapshot,
            Err(e) => match self.cache.snapshot().await {
                Some(stale) => {
                    warn!(error = %e, "Daily digest uses last known rates");
                    stale
                }
                None => {
                    error!(error = %e, "No rates for daily digest, skipping");
                    return DispatchStats::default();
                }
            },
        };
        let text = render_digest(&snapshot, self.timezone);

        let users = match self.directory.list_active_user_ids().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "Failed to list users for daily digest");
                return DispatchStats::default();
            }
        };

        let mut stats = DispatchStats::default();
        for (i, user) in users.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            match self.notifier.send(*user, &text).await {
                Ok(()) => stats.sent += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(user, error = %e, "Failed to deliver daily digest");
                }
            }
        }
        info!(sent = stats.sent, failed = stats.failed, "Daily digest dispatched");
        stats
    }
}
