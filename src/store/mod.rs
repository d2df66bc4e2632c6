//! Subscriber persistence for the daily digest.

pub mod disk;
pub mod memory;

use crate::core::notify::UserDirectory;
use crate::core::session::UserId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use disk::DiskSubscriberStore;
pub use memory::MemorySubscriberStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: UserId,
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}

/// Keeps track of who receives broadcasts.
#[async_trait]
pub trait SubscriberStore: UserDirectory {
    /// Marks the user active. Returns `false` when they already were.
    async fn subscribe(&self, user: UserId) -> Result<bool>;

    /// Marks the user inactive. Returns `false` when they were not active.
    async fn unsubscribe(&self, user: UserId) -> Result<bool>;

    /// Every known subscriber, active or not, ordered by user id.
    async fn list(&self) -> Result<Vec<Subscriber>>;
}

/// Active ids in ascending order.
pub(crate) fn active_ids(subscribers: &[Subscriber]) -> Vec<UserId> {
    subscribers
        .iter()
        .filter(|s| s.active)
        .map(|s| s.user_id)
        .collect()
}
