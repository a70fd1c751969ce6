use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error};

pub trait Ping {
    fn ping(&self, url: &str) -> Result<()>;
}

/// Periodically reports liveness to an external health check URL.
pub struct HealthPing {
    pinger: Box<dyn Ping + Send>,
    url: String,
    interval: Duration,
    next_ping_due: Option<DateTime<Utc>>,
}

impl HealthPing {
    pub fn new(pinger: impl Ping + Send + 'static, url: &str, interval: Duration) -> Self {
        Self {
            pinger: Box::new(pinger),
            url: url.to_owned(),
            interval,
            next_ping_due: None,
        }
    }

    pub fn ping_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.next_ping_due.is_some_and(|due| now < due) {
            return false;
        }
        match self.pinger.ping(&self.url) {
            Ok(()) => debug!("Health ping successful"),
            Err(err) => error!("Health ping failed: {err:#}"),
        }
        self.next_ping_due = Some(now + self.interval);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counter(Arc<AtomicUsize>);

    impl Ping for Counter {
        fn ping(&self, _url: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("503"))
        }
    }

    #[test]
    fn pings_every_interval_even_after_failure() {
        let counter = Counter::default();
        let mut health = HealthPing::new(
            counter.clone(),
            "https://hc.example/ping",
            Duration::minutes(5),
        );
        let start = Utc.with_ymd_and_hms(2021, 10, 1, 12, 0, 0).unwrap();

        assert!(health.ping_if_due(start));
        assert!(!health.ping_if_due(start + Duration::minutes(4)));
        assert!(health.ping_if_due(start + Duration::minutes(5)));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
