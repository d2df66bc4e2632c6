use super::{Subscriber, SubscriberStore, active_ids};
use crate::core::notify::UserDirectory;
use crate::core::session::UserId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "subscribers";

/// Subscribers persisted in a fjall keyspace, one record per user id.
pub struct DiskSubscriberStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskSubscriberStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path.join("subscribers"))
            .open()
            .with_context(|| format!("Failed to open subscriber store at {}", path.display()))?;
        let partition = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened subscriber store at {}", path.display());
        Ok(Self {
            keyspace,
            partition,
        })
    }

    fn read(&self, user: UserId) -> Result<Option<Subscriber>> {
        match self.partition.get(user.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn write(&self, subscriber: &Subscriber) -> Result<()> {
        let key = subscriber.user_id.to_be_bytes();
        self.partition
            .insert(&key[..], serde_json::to_vec(subscriber)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

#[async_trait]
impl SubscriberStore for DiskSubscriberStore {
    async fn subscribe(&self, user: UserId) -> Result<bool> {
        let subscriber = match self.read(user)? {
            Some(existing) if existing.active => return Ok(false),
            Some(existing) => Subscriber {
                active: true,
                ..existing
            },
            None => Subscriber {
                user_id: user,
                active: true,
                joined_at: Utc::now(),
            },
        };
        self.write(&subscriber)?;
        debug!(user, "Subscribed");
        Ok(true)
    }

    async fn unsubscribe(&self, user: UserId) -> Result<bool> {
        let Some(existing) = self.read(user)?.filter(|s| s.active) else {
            return Ok(false);
        };
        self.write(&Subscriber {
            active: false,
            ..existing
        })?;
        debug!(user, "Unsubscribed");
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<Subscriber>> {
        let mut subscribers = Vec::new();
        for item in self.partition.iter() {
            let (_, value) = item?;
            let subscriber: Subscriber = serde_json::from_slice(&value)
                .context("Corrupt subscriber record")?;
            subscribers.push(subscriber);
        }
        // Big-endian keys put negative ids after positive ones.
        subscribers.sort_by_key(|s| s.user_id);
        Ok(subscribers)
    }
}

#[async_trait]
impl UserDirectory for DiskSubscriberStore {
    async fn list_active_user_ids(&self) -> Result<Vec<UserId>> {
        Ok(active_ids(&self.list().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_subscribe_and_list() {
        let dir = tempdir().unwrap();
        let store = DiskSubscriberStore::open(dir.path()).unwrap();

        assert!(store.subscribe(42).await.unwrap());
        assert!(store.subscribe(-100).await.unwrap());
        assert!(store.subscribe(7).await.unwrap());
        assert!(!store.subscribe(42).await.unwrap());

        assert_eq!(store.list_active_user_ids().await.unwrap(), vec![-100, 7, 42]);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_join_date() {
        let dir = tempdir().unwrap();
        let store = DiskSubscriberStore::open(dir.path()).unwrap();

        store.subscribe(42).await.unwrap();
        let joined_at = store.list().await.unwrap()[0].joined_at;

        assert!(store.unsubscribe(42).await.unwrap());
        assert!(!store.unsubscribe(42).await.unwrap());
        assert!(!store.unsubscribe(99).await.unwrap());
        assert!(store.list_active_user_ids().await.unwrap().is_empty());

        assert!(store.subscribe(42).await.unwrap());
        let subscribers = store.list().await.unwrap();
        assert_eq!(subscribers.len(), 1);
        assert!(subscribers[0].active);
        assert_eq!(subscribers[0].joined_at, joined_at);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = DiskSubscriberStore::open(dir.path()).unwrap();
            store.subscribe(1).await.unwrap();
            store.subscribe(2).await.unwrap();
            store.unsubscribe(1).await.unwrap();
        }

        let store = DiskSubscriberStore::open(dir.path()).unwrap();
        assert_eq!(store.list_active_user_ids().await.unwrap(), vec![2]);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
