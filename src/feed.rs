use crate::index::normalize_code;
use crate::warning::{Provider, WarningEntry};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem::take;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::thread;
use tracing::{debug, error, warn};

/// Fetches the current warnings of one provider.
pub trait FeedSource: Send + Sync {
    fn fetch(&self, provider: Provider) -> Result<Vec<WarningEntry>>;
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpdateCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
}

/// The last known warnings of every configured provider.
pub struct FeedStore<F> {
    source: F,
    providers: Vec<Provider>,
    feeds: RwLock<BTreeMap<Provider, Vec<WarningEntry>>>,
    loaded: AtomicBool,
}

impl<F: FeedSource> FeedStore<F> {
    pub fn new(source: F, providers: Vec<Provider>) -> Self {
        let feeds = providers.iter().map(|p| (*p, Vec::new())).collect();
        Self {
            source,
            providers,
            feeds: RwLock::new(feeds),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Whether any update has succeeded yet
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Number of warnings currently known across all providers
    pub fn len(&self) -> usize {
        self.read_feeds().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update only if nothing has been loaded yet.
    pub fn get(&self, on_change: impl FnMut(&WarningEntry)) -> UpdateCounts {
        if self.is_loaded() {
            return UpdateCounts::default();
        }
        self.update(on_change)
    }

    /// Fetch every provider concurrently and apply the differences to the
    /// stored feeds. `on_change` sees every added warning and every warning
    /// whose content or expiry changed. Warnings that disappeared are dropped
    /// without a callback. A provider that fails keeps its previous feed.
    pub fn update(&self, mut on_change: impl FnMut(&WarningEntry)) -> UpdateCounts {
        debug!("Updating warning feeds");
        let fetched: Vec<(Provider, Result<Vec<WarningEntry>>)> = thread::scope(|s| {
            let handles: Vec<_> = self
                .providers
                .iter()
                .map(|&provider| (provider, s.spawn(move || self.source.fetch(provider))))
                .collect();
            handles
                .into_iter()
                .map(|(provider, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("fetch thread panicked")));
                    (provider, result)
                })
                .collect()
        });

        let mut counts = UpdateCounts::default();
        let mut changed = Vec::new();
        {
            let mut feeds = self.feeds.write().unwrap_or_else(PoisonError::into_inner);
            for (provider, result) in fetched {
                match result {
                    Ok(entries) => {
                        let feed = feeds.entry(provider).or_default();
                        apply_feed(feed, entries, &mut counts, &mut changed);
                    }
                    Err(err) => {
                        error!("Failed to update {provider} feed: {err:#}");
                        counts.failed += 1;
                    }
                }
            }
        }

        if counts.failed < self.providers.len() || self.providers.is_empty() {
            self.loaded.store(true, Ordering::Release);
        }
        debug!(
            "added: {}, updated: {}, removed: {}, failed: {}",
            counts.added, counts.updated, counts.removed, counts.failed
        );

        for entry in &changed {
            on_change(entry);
        }
        counts
    }

    /// Every known warning with a geocode equal to `code`
    pub fn items_for_geocode(&self, code: &str) -> Vec<WarningEntry> {
        self.items_where(|entry| entry.geocodes().any(|g| g == code))
    }

    /// Every known warning targeting the same district as `code`
    pub fn items_for_district(&self, code: &str) -> Vec<WarningEntry> {
        let district = normalize_code(code);
        self.items_where(|entry| entry.geocodes().any(|g| normalize_code(g) == district))
    }

    fn items_where(&self, predicate: impl Fn(&WarningEntry) -> bool) -> Vec<WarningEntry> {
        self.read_feeds()
            .values()
            .flatten()
            .filter(|entry| predicate(entry))
            .cloned()
            .collect()
    }

    fn read_feeds(&self) -> RwLockReadGuard<'_, BTreeMap<Provider, Vec<WarningEntry>>> {
        self.feeds.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_feed(
    feed: &mut Vec<WarningEntry>,
    entries: Vec<WarningEntry>,
    counts: &mut UpdateCounts,
    changed: &mut Vec<WarningEntry>,
) {
    let mut previous: HashMap<String, WarningEntry> = take(feed)
        .into_iter()
        .map(|e| (e.identifier.clone(), e))
        .collect();
    let mut seen = HashSet::with_capacity(entries.len());

    for entry in entries {
        if !seen.insert(entry.identifier.clone()) {
            warn!(
                "Skipping duplicate {} warning {}",
                entry.provider, entry.identifier
            );
            continue;
        }
        match previous.remove(&entry.identifier) {
            Some(old) if !old.differs_from(&entry) => feed.push(old),
            Some(_) => {
                counts.updated += 1;
                changed.push(entry.clone());
                feed.push(entry);
            }
            None => {
                counts.added += 1;
                changed.push(entry.clone());
                feed.push(entry);
            }
        }
    }
    counts.removed += previous.len();
}
