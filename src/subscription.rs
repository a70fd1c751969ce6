use crate::classify::{classify, Classification};
use crate::warning::WarningEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// The most recent warning a subscription was told about.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LastNotified {
    pub date: DateTime<Utc>,
    pub identifier: String,
    pub onset: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub fingerprint: String,
}

impl From<&WarningEntry> for LastNotified {
    fn from(entry: &WarningEntry) -> Self {
        Self {
            date: entry.sent,
            identifier: entry.identifier.clone(),
            onset: entry.onset(),
            expires: entry.expires(),
            fingerprint: entry.fingerprint.clone(),
        }
    }
}

/// Durable storage of [`LastNotified`] records, keyed per subscription.
pub trait LastNotifiedStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<LastNotified>>;
    fn save(&self, key: &str, record: &LastNotified) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, LastNotified>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastNotifiedStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<LastNotified>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn save(&self, key: &str, record: &LastNotified) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(key.to_owned(), record.clone());
        Ok(())
    }
}

/// Receives every warning routed to one subscribed location.
pub trait WarningHandler: Send + Sync {
    fn deliver(&self, entry: &WarningEntry) -> Result<()>;
}

/// What a subscriber is told. Never built for unchanged warnings.
#[derive(Debug)]
pub struct Notification<'a> {
    pub classification: Classification,
    pub entry: &'a WarningEntry,
    pub previous: Option<&'a LastNotified>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification<'_>) -> Result<()>;
}

/// Classifies each delivered warning against the subscriber's last
/// notification, passes it on when needed and records it.
pub struct Subscription<N, S> {
    key: String,
    notifier: N,
    store: Arc<S>,
    last: Mutex<Option<LastNotified>>,
}

impl<N: Notifier, S: LastNotifiedStore> Subscription<N, S> {
    pub fn new(key: impl Into<String>, notifier: N, store: Arc<S>) -> Result<Self> {
        let key = key.into();
        let last = store
            .load(&key)
            .with_context(|| format!("Failed to load last notification for {key}"))?;
        Ok(Self {
            key,
            notifier,
            store,
            last: Mutex::new(last),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_notified(&self) -> Option<LastNotified> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<N: Notifier, S: LastNotifiedStore> WarningHandler for Subscription<N, S> {
    fn deliver(&self, entry: &WarningEntry) -> Result<()> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let classification = classify(entry, last.as_ref());
        if classification.is_notifiable() {
            debug!(
                "{} warning {} for {}",
                classification, entry.identifier, self.key
            );
            self.notifier.notify(&Notification {
                classification,
                entry,
                previous: last.as_ref(),
            })?;
        } else {
            debug!(
                "Warning {} unchanged for {}, skipping notification",
                entry.identifier, self.key
            );
        }

        let record = LastNotified::from(entry);
        self.store
            .save(&self.key, &record)
            .with_context(|| format!("Failed to save last notification for {}", self.key))?;
        *last = Some(record);
        Ok(())
    }
}
