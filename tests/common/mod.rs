//! Fakes for driving the monitor without network access or a database.

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use nina_watch::classify::Classification;
use nina_watch::client::parse_feed;
use nina_watch::feed::FeedSource;
use nina_watch::subscription::{Notification, Notifier};
use nina_watch::warning::{Provider, WarningEntry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Serves JSON feeds the way the provider endpoints do.
#[derive(Clone, Default)]
pub struct JsonFeeds {
    feeds: Arc<Mutex<HashMap<Provider, Value>>>,
}

impl JsonFeeds {
    pub fn publish(&self, provider: Provider, feed: Value) {
        self.feeds.lock().unwrap().insert(provider, feed);
    }
}

impl FeedSource for JsonFeeds {
    fn fetch(&self, provider: Provider) -> Result<Vec<WarningEntry>> {
        let feed = self
            .feeds
            .lock()
            .unwrap()
            .get(&provider)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused"))?;
        parse_feed(serde_json::from_value(feed)?, provider)
    }
}

pub fn warning_json(identifier: &str, geocode: &str, headline: &str, expires: &str) -> Value {
    json!({
        "identifier": identifier,
        "sender": "CAP@hochwasserzentralen.de",
        "sent": Utc.with_ymd_and_hms(2021, 9, 29, 16, 43, 31).unwrap().to_rfc3339(),
        "status": "Actual",
        "msgType": "Alert",
        "scope": "Public",
        "info": [{
            "language": "DE",
            "category": ["Met"],
            "event": "Hochwasser",
            "urgency": "Immediate",
            "severity": "Moderate",
            "certainty": "Observed",
            "effective": "2021-09-29T18:43:31+02:00",
            "onset": "2021-09-29T18:43:31+02:00",
            "expires": expires,
            "headline": headline,
            "description": "Die Pegelstände steigen weiter an.",
            "instruction": "Meiden Sie die Uferbereiche.",
            "web": "https://www.hnd.bayern.de",
            "area": [{
                "areaDesc": "Landkreis Kronach",
                "geocode": [{"valueName": "SHN", "value": geocode}]
            }]
        }]
    })
}

#[derive(Clone, Default)]
pub struct Inbox {
    received: Arc<Mutex<Vec<(Classification, String)>>>,
}

impl Inbox {
    pub fn take(&self) -> Vec<(Classification, String)> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }
}

impl Notifier for Inbox {
    fn notify(&self, notification: &Notification<'_>) -> Result<()> {
        self.received.lock().unwrap().push((
            notification.classification,
            notification.entry.identifier.clone(),
        ));
        Ok(())
    }
}
