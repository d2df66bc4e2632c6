use super::{Subscriber, SubscriberStore, active_ids};
use crate::core::notify::UserDirectory;
use crate::core::session::UserId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// In-memory subscriber list, lost on exit.
#[derive(Default)]
pub struct MemorySubscriberStore {
    inner: Mutex<BTreeMap<UserId, Subscriber>>,
}

impl MemorySubscriberStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_active(users: impl IntoIterator<Item = UserId>) -> Self {
        let store = Self::new();
        for user in users {
            store.inner.lock().await.insert(
                user,
                Subscriber {
                    user_id: user,
                    active: true,
                    joined_at: Utc::now(),
                },
            );
        }
        store
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn subscribe(&self, user: UserId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let subscriber = inner.entry(user).or_insert_with(|| Subscriber {
            user_id: user,
            active: false,
            joined_at: Utc::now(),
        });
        let changed = !subscriber.active;
        subscriber.active = true;
        Ok(changed)
    }

    async fn unsubscribe(&self, user: UserId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.get_mut(&user) {
            Some(subscriber) if subscriber.active => {
                subscriber.active = false;
                true
            }
            _ => false,
        })
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        Ok(self.inner.lock().await.values().cloned().collect())
    }
}

#[async_trait]
impl UserDirectory for MemorySubscriberStore {
    async fn list_active_user_ids(&self) -> Result<Vec<UserId>> {
        Ok(active_ids(&self.list().await?))
    }
}
