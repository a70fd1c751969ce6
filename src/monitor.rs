use crate::feed::FeedSource;
use crate::health::HealthPing;
use crate::index::{CycleReport, GeocodeIndex};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: std::time::Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }
}

/// Runs a refresh cycle of the index whenever one is due.
pub struct Monitor<F, C = SystemClock> {
    index: Arc<GeocodeIndex<F>>,
    clock: C,
    interval: Duration,
    next_update_due: Option<DateTime<Utc>>,
    health: Option<HealthPing>,
}

impl<F: FeedSource, C: Clock> Monitor<F, C> {
    pub fn new(index: Arc<GeocodeIndex<F>>, clock: C, interval: Duration) -> Self {
        Self {
            index,
            clock,
            interval,
            next_update_due: None,
            health: None,
        }
    }

    pub fn with_health_ping(mut self, health: HealthPing) -> Self {
        self.health = Some(health);
        self
    }

    pub fn index(&self) -> &Arc<GeocodeIndex<F>> {
        &self.index
    }

    pub fn next_update_due(&self) -> Option<DateTime<Utc>> {
        self.next_update_due
    }

    /// Run one cycle if it is due. The first tick always runs.
    pub fn tick(&mut self) -> Option<CycleReport> {
        let now = self.clock.now();
        if let Some(health) = self.health.as_mut() {
            health.ping_if_due(now);
        }
        if self.next_update_due.is_some_and(|due| now < due) {
            return None;
        }

        let report = self.index.run_cycle();
        for failure in &report.failures {
            error!("{failure}");
        }
        self.next_update_due = Some(now + self.interval);
        debug!(
            "Delivered {} warnings. Next update in {} minutes",
            report.delivered,
            self.interval.num_minutes()
        );
        Some(report)
    }

    /// Refresh immediately, then keep refreshing every interval. Never returns.
    pub fn start(mut self) -> ! {
        info!(
            "Monitoring {} districts every {} minutes",
            self.index.location_count(),
            self.interval.num_minutes()
        );
        loop {
            self.tick();
            self.clock.sleep(std::time::Duration::from_secs(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedStore;
    use crate::testing::{warning_data, FakeSource};
    use crate::warning::Provider;
    use chrono::TimeZone;
    use std::cell::Cell;

    struct FakeClock {
        now: Cell<DateTime<Utc>>,
    }

    impl FakeClock {
        fn advance(&self, minutes: i64) {
            self.now.set(self.now.get() + Duration::minutes(minutes));
        }
    }

    impl Clock for &FakeClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }

        fn sleep(&self, duration: std::time::Duration) {
            self.now
                .set(self.now.get() + Duration::from_std(duration).unwrap());
        }
    }

    #[test]
    fn runs_once_per_interval() {
        let source = Arc::new(FakeSource::default());
        source.set(Provider::Dwd, vec![warning_data("A1", "091720000000")]);
        let index = Arc::new(GeocodeIndex::new(FeedStore::new(
            source.clone(),
            vec![Provider::Dwd],
        )));
        let clock = FakeClock {
            now: Cell::new(Utc.with_ymd_and_hms(2021, 10, 1, 12, 0, 0).unwrap()),
        };
        let mut monitor = Monitor::new(index, &clock, Duration::minutes(10));

        let first = monitor.tick().unwrap();
        assert_eq!(first.counts.added, 1);
        assert_eq!(source.fetches(), 1);

        clock.advance(9);
        assert!(monitor.tick().is_none());

        clock.advance(1);
        assert!(monitor.tick().is_some());
        assert_eq!(source.fetches(), 2);
        assert_eq!(
            monitor.next_update_due(),
            Some(Utc.with_ymd_and_hms(2021, 10, 1, 12, 20, 0).unwrap())
        );
    }
}
