use crate::feed::{FeedSource, FeedStore, UpdateCounts};
use crate::subscription::WarningHandler;
use crate::warning::WarningEntry;
use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use tracing::{debug, error, info};

/// Length of an official regional key (Amtlicher Regionalschlüssel)
pub const REGIONAL_KEY_LEN: usize = 12;
/// Trailing digits below district level
const MUNICIPALITY_DIGITS: usize = 7;

/// Collapse a location code to its district so every code within one
/// district shares a routing key. Short codes are padded to a full
/// regional key first, e.g. "09172000000" becomes "091720000000".
pub fn normalize_code(code: &str) -> String {
    let padded = format!("{:0<width$}", code.trim(), width = REGIONAL_KEY_LEN);
    let keep = padded.chars().count().saturating_sub(MUNICIPALITY_DIGITS);
    let mut normalized: String = padded.chars().take(keep).collect();
    normalized.extend(std::iter::repeat('0').take(MUNICIPALITY_DIGITS));
    normalized
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub code: String,
    pub identifier: String,
    pub error: anyhow::Error,
}

impl Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to deliver {} to {}: {:#}",
            self.identifier, self.code, self.error
        )
    }
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub counts: UpdateCounts,
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

type Handlers = Vec<Arc<dyn WarningHandler>>;

/// Routes changed warnings to the handlers subscribed to their districts.
pub struct GeocodeIndex<F> {
    store: FeedStore<F>,
    locations: RwLock<HashMap<String, Handlers>>,
}

impl<F: FeedSource> GeocodeIndex<F> {
    pub fn new(store: FeedStore<F>) -> Self {
        Self {
            store,
            locations: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &FeedStore<F> {
        &self.store
    }

    /// Register `handler` for the district of `code`. With `warn_now` the
    /// handler immediately receives every known warning for that district,
    /// loading the feeds first if that has not happened yet. Delivery
    /// failures of that bootstrap are returned.
    pub fn subscribe(
        &self,
        code: &str,
        handler: Arc<dyn WarningHandler>,
        warn_now: bool,
        is_initial: bool,
    ) -> Result<()> {
        let code = normalize_code(code);

        if warn_now {
            let mut failures = Vec::new();
            self.store.get(|entry| failures.extend(self.fan_out(entry).1));
            for failure in failures {
                error!("{failure}");
            }
        }

        self.write_locations()
            .entry(code.clone())
            .or_default()
            .push(handler.clone());

        if !is_initial {
            self.log_subscriptions();
        }

        if warn_now {
            self.warn_now(&code, handler.as_ref())?;
        }
        Ok(())
    }

    fn warn_now(&self, code: &str, handler: &dyn WarningHandler) -> Result<usize> {
        let mut items = self.store.items_for_district(code);
        items.sort_by_key(|entry| entry.sent);

        let mut failed = 0;
        let mut first_error = None;
        for entry in &items {
            if let Err(err) = handler.deliver(entry) {
                error!("Failed to deliver {} to {code}: {err:#}", entry.identifier);
                failed += 1;
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err.context(format!(
                "{failed} of {} warnings for {code} could not be delivered",
                items.len()
            ))),
            None => Ok(items.len()),
        }
    }

    /// Remove `handler` from the district of `code`. Unknown codes and
    /// handlers are ignored.
    pub fn unsubscribe(&self, code: &str, handler: &Arc<dyn WarningHandler>) {
        let code = normalize_code(code);
        {
            let mut locations = self.write_locations();
            if let Some(handlers) = locations.get_mut(&code) {
                if let Some(pos) = handlers.iter().position(|h| same_handler(h, handler)) {
                    handlers.remove(pos);
                }
                if handlers.is_empty() {
                    locations.remove(&code);
                }
            }
        }
        self.log_subscriptions();
    }

    /// Update the feeds once and hand every changed warning to its
    /// subscribers.
    pub fn run_cycle(&self) -> CycleReport {
        let mut delivered = 0;
        let mut failures = Vec::new();
        let counts = self.store.update(|entry| {
            let (count, failed) = self.fan_out(entry);
            delivered += count;
            failures.extend(failed);
        });
        CycleReport {
            counts,
            delivered,
            failures,
        }
    }

    /// Deliver `entry` to every handler of every district it targets, each
    /// handler once and on its own thread.
    fn fan_out(&self, entry: &WarningEntry) -> (usize, Vec<DeliveryFailure>) {
        let codes: BTreeSet<String> = entry.geocodes().map(normalize_code).collect();

        // Handlers are copied out so the registry is never locked while
        // delivering.
        let mut targets: Vec<(String, Arc<dyn WarningHandler>)> = Vec::new();
        {
            let locations = self.read_locations();
            for code in &codes {
                let Some(handlers) = locations.get(code) else {
                    continue;
                };
                for handler in handlers {
                    if !targets.iter().any(|(_, t)| same_handler(t, handler)) {
                        targets.push((code.clone(), handler.clone()));
                    }
                }
            }
        }
        if targets.is_empty() {
            return (0, Vec::new());
        }

        let mut delivered = 0;
        let mut failures = Vec::new();
        thread::scope(|s| {
            let handles: Vec<_> = targets
                .iter()
                .map(|(code, handler)| (code, s.spawn(move || handler.deliver(entry))))
                .collect();
            for (code, handle) in handles {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("handler panicked")));
                match result {
                    Ok(()) => delivered += 1,
                    Err(error) => failures.push(DeliveryFailure {
                        code: code.clone(),
                        identifier: entry.identifier.clone(),
                        error,
                    }),
                }
            }
        });
        debug!("Delivered {} to {delivered} subscriptions", entry.identifier);
        (delivered, failures)
    }

    pub fn subscription_count(&self) -> usize {
        self.read_locations().values().map(Vec::len).sum()
    }

    pub fn location_count(&self) -> usize {
        self.read_locations().len()
    }

    pub fn log_subscriptions(&self) {
        let locations = self.read_locations();
        for (code, handlers) in locations.iter() {
            debug!("{code}: {} subscriptions", handlers.len());
        }
        info!(
            "Number of subscriptions: {} in {} districts",
            locations.values().map(Vec::len).sum::<usize>(),
            locations.len()
        );
    }

    fn read_locations(&self) -> RwLockReadGuard<'_, HashMap<String, Handlers>> {
        self.locations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_locations(&self) -> RwLockWriteGuard<'_, HashMap<String, Handlers>> {
        self.locations.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_handler(a: &Arc<dyn WarningHandler>, b: &Arc<dyn WarningHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
