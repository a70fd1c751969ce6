use crate::config::MainConfig;
use crate::feed::FeedSource;
use crate::health::Ping;
use crate::warning::{Provider, WarningData, WarningEntry, DEFAULT_FEED_BASE_URL};
use anyhow::{anyhow, Result};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, error, warn};
use ureq::{Agent, AgentBuilder, Error};

const USER_AGENT: &str = concat!("nina-watch/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct Client {
    client: Agent,
    base_url: String,
    retry_limit: u64,
    retry_delay: u64,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, retry_limit: u64, retry_delay: u64) -> Client {
        let client = AgentBuilder::new()
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(USER_AGENT)
            .build();
        Client {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            retry_limit,
            retry_delay,
        }
    }

    pub fn from_config(config: &MainConfig) -> Client {
        Self::new(
            &config.feed_base_url,
            config.request_timeout.to_std().unwrap_or(Duration::from_secs(10)),
            config.retry_limit,
            config.retry_delay.num_seconds().max(0) as u64,
        )
    }

    fn call(&self, url: &str) -> Result<ureq::Response> {
        debug!("Fetching {url}");
        let mut retries = 0;
        loop {
            match self.client.get(url).call() {
                Ok(response) => return Ok(response),
                Err(Error::Status(code, response)) => match code {
                    503 | 429 | 408 => {
                        if retries >= self.retry_limit {
                            return Err(anyhow!("Retry limit exceeded for {url}: {code}"));
                        }
                        let retry = match response.header("retry-after") {
                            Some(header) => header.parse().unwrap_or(self.retry_delay),
                            None => self.retry_delay,
                        };
                        error!("{} for {}, retry in {}", code, url, retry);
                        retries += 1;
                        sleep(Duration::from_secs(retry));
                    }
                    _ => {
                        let error = response.into_string()?;
                        error!("{code}: {error}");
                        return Err(anyhow!("{code} for {url}: {error}"));
                    }
                },
                Err(err) => {
                    let error = err.to_string();
                    error!("{error}");
                    return Err(anyhow!("{error}"));
                }
            }
        }
    }

    fn get(&self, url: &str) -> Result<serde_json::Value> {
        Ok(self.call(url)?.into_json()?)
    }

    pub fn feed_url(&self, provider: Provider) -> String {
        format!("{}{}", self.base_url, provider.feed_path())
    }

    pub fn get_warnings(&self, provider: Provider) -> Result<Vec<WarningEntry>> {
        let url = self.feed_url(provider);
        let items: Vec<serde_json::Value> = serde_json::from_value(self.get(&url)?)?;
        parse_feed(items, provider)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_BASE_URL, Duration::from_secs(10), 3, 7)
    }
}

impl FeedSource for Client {
    fn fetch(&self, provider: Provider) -> Result<Vec<WarningEntry>> {
        self.get_warnings(provider)
    }
}

impl Ping for Client {
    fn ping(&self, url: &str) -> Result<()> {
        self.call(url)?;
        Ok(())
    }
}

/// Decode every item of a feed on its own so one malformed warning doesn't
/// take the rest of the feed down with it.
pub fn parse_feed(items: Vec<serde_json::Value>, provider: Provider) -> Result<Vec<WarningEntry>> {
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<WarningData>(item) {
            Ok(data) => entries.push(WarningEntry::new(data, provider)?),
            Err(err) => warn!("Skipping malformed {provider} warning: {err}"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn malformed_items_are_skipped() {
        let items = vec![
            json!({
                "identifier": "dwdmap.2.49.0.1.276.0.DWD.PVW.1633082040000",
                "sent": "2021-10-01T12:34:00+02:00",
                "status": "Actual",
                "msgType": "Alert",
                "info": [{"headline": "Amtliche WARNUNG vor STURMBÖEN", "area": []}]
            }),
            json!({"identifier": "broken"}),
            json!("not even an object"),
        ];
        let entries = parse_feed(items, Provider::Dwd).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].provider, Provider::Dwd);
        assert_eq!(entries[0].headline(), "Amtliche WARNUNG vor STURMBÖEN");
    }

    /// Answers every request with 503 and counts them.
    fn unavailable_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        thread::spawn(move || {
            for mut stream in listener.incoming().flatten() {
                let mut buf = [0; 4096];
                let _ = stream.read(&mut buf);
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\nRetry-After: 0\r\n\
                      Content-Length: 0\r\nConnection: close\r\n\r\n",
                );
            }
        });
        (url, requests)
    }

    #[test]
    fn retry_limit_counts_retries() {
        let (url, requests) = unavailable_server();
        let client = Client::new(&url, Duration::from_secs(5), 0, 0);
        let err = client.get_warnings(Provider::Dwd).unwrap_err();
        assert!(err.to_string().contains("Retry limit exceeded"));
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        let (url, requests) = unavailable_server();
        let client = Client::new(&url, Duration::from_secs(5), 2, 0);
        assert!(client.get_warnings(Provider::Dwd).is_err());
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn feed_urls() {
        let client = Client::new("http://localhost:8080/", Duration::from_secs(1), 1, 1);
        assert_eq!(
            client.feed_url(Provider::Mowas),
            "http://localhost:8080/bbk.mowas/gefahrendurchsagen.json"
        );
        assert_eq!(
            Client::default().feed_url(Provider::Lhp),
            "https://warnung.bund.de/bbk.lhp/hochwassermeldungen.json"
        );
    }
}
