//! Fixtures shared by the unit tests.

use crate::classify::Classification;
use crate::feed::FeedSource;
use crate::subscription::{Notification, Notifier, WarningHandler};
use crate::warning::{Geocode, Provider, WarningArea, WarningData, WarningEntry, WarningInfo};
use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn warning_data(identifier: &str, geocode: &str) -> WarningData {
    let sent = Utc.with_ymd_and_hms(2021, 9, 29, 16, 43, 31).unwrap();
    WarningData {
        identifier: identifier.into(),
        sent,
        status: "Actual".into(),
        msg_type: "Update".into(),
        info: vec![WarningInfo {
            event: "Gefahrenmitteilung".into(),
            urgency: "Immediate".into(),
            severity: "Severe".into(),
            certainty: "Observed".into(),
            headline: "Verunreinigung der Rodach".into(),
            description: "Schadstoffwelle im Fluss<br/>Kontakt meiden".into(),
            instruction: "Informieren Sie sich in den Medien.".into(),
            web: None,
            effective: Some(sent),
            onset: Some(sent),
            expires: Some(Utc.with_ymd_and_hms(2021, 9, 29, 16, 51, 31).unwrap()),
            area: vec![WarningArea {
                area_desc: "Landkreis Kronach".into(),
                geocode: vec![Geocode {
                    value_name: "AGS".into(),
                    value: geocode.into(),
                }],
            }],
        }],
    }
}

pub fn entry(identifier: &str, geocode: &str) -> WarningEntry {
    WarningEntry::new(warning_data(identifier, geocode), Provider::Mowas).unwrap()
}

/// Serves whatever feeds were last set; unset providers fail.
#[derive(Default)]
pub struct FakeSource {
    feeds: Mutex<HashMap<Provider, Vec<WarningData>>>,
    fetches: Mutex<usize>,
}

impl FakeSource {
    pub fn set(&self, provider: Provider, feed: Vec<WarningData>) {
        self.feeds.lock().unwrap().insert(provider, feed);
    }

    pub fn fail(&self, provider: Provider) {
        self.feeds.lock().unwrap().remove(&provider);
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

impl FeedSource for Arc<FakeSource> {
    fn fetch(&self, provider: Provider) -> Result<Vec<WarningEntry>> {
        *self.fetches.lock().unwrap() += 1;
        let feeds = self.feeds.lock().unwrap();
        let feed = feeds
            .get(&provider)
            .ok_or_else(|| anyhow!("{provider} unreachable"))?;
        feed.iter()
            .map(|data| WarningEntry::new(data.clone(), provider))
            .collect()
    }
}

#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub delivered: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn identifiers(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

impl WarningHandler for RecordingHandler {
    fn deliver(&self, entry: &WarningEntry) -> Result<()> {
        self.delivered.lock().unwrap().push(entry.identifier.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notified: Arc<Mutex<Vec<Classification>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn classifications(&self) -> Vec<Classification> {
        self.notified.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification<'_>) -> Result<()> {
        if self.fail {
            return Err(anyhow!("room gone"));
        }
        self.notified
            .lock()
            .unwrap()
            .push(notification.classification);
        Ok(())
    }
}
