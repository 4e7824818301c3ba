// src/repository/mod.rs

//! Repository access and synchronization
//!
//! This module provides:
//! - The [`Fetcher`] seam every network read goes through
//! - An HTTP implementation with timeout and retry support
//! - Mirror `lastsync` probing
//! - The worker pool and sync orchestrator that build the catalog
//! - The contributed-source RPC client

pub mod aur;
pub mod jobs;
pub mod sync;

pub use jobs::JobPool;
pub use sync::{SyncMode, Synchronizer};

use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default attempts for failed requests
pub const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// Byte-stream source for a URL
pub trait Fetcher: Send + Sync {
    /// Open `url` for reading
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>>;

    /// Read `url` completely
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.fetch(url)?.read_to_end(&mut body)?;
        Ok(body)
    }
}

/// HTTP client wrapper with retry support
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and retry count
    pub fn new() -> Result<Self> {
        Self::with_policy(HTTP_TIMEOUT, MAX_RETRIES)
    }

    pub fn with_policy(timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("archdeps/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        debug!("Fetching {}", url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(Box::new(response));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        if e.is_timeout() {
                            return Err(Error::Timeout(format!(
                                "{} after {} attempts",
                                url, attempt
                            )));
                        }
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

/// Ask each server for its `lastsync` timestamp; first answer wins
pub fn probe_lastsync(fetcher: &dyn Fetcher, servers: &[String]) -> Option<i64> {
    for server in servers {
        let url = format!("{}/lastsync", server.trim_end_matches('/'));
        let body = match fetcher.fetch_bytes(&url) {
            Ok(body) => body,
            Err(e) => {
                debug!("No lastsync from {}: {}", server, e);
                continue;
            }
        };
        match String::from_utf8_lossy(&body).trim().parse::<i64>() {
            Ok(stamp) => {
                info!("Mirror {} last synced at {}", server, format_timestamp(stamp));
                return Some(stamp);
            }
            Err(e) => debug!("Unreadable lastsync from {}: {}", server, e),
        }
    }
    warn!("Unable to get lastsync from any mirror");
    None
}

/// Render a Unix timestamp as RFC 3339 for logs
pub fn format_timestamp(stamp: i64) -> String {
    chrono::DateTime::from_timestamp(stamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| stamp.to_string())
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryFetcher;
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        assert!(HttpFetcher::new().is_ok());
        assert!(HttpFetcher::with_policy(Duration::from_secs(1), 0).is_ok());
    }

    #[test]
    fn test_probe_lastsync_first_success() {
        let fetcher = MemoryFetcher::default()
            .with("https://b.example.org/lastsync", "1718000000\n")
            .with("https://c.example.org/lastsync", "1719000000\n");
        let servers = vec![
            "https://a.example.org".to_string(),
            "https://b.example.org/".to_string(),
            "https://c.example.org".to_string(),
        ];

        assert_eq!(probe_lastsync(&fetcher, &servers), Some(1718000000));
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[test]
    fn test_probe_lastsync_garbage() {
        let fetcher = MemoryFetcher::default().with("https://a.example.org/lastsync", "<html>");
        let servers = vec!["https://a.example.org".to_string()];
        assert_eq!(probe_lastsync(&fetcher, &servers), None);
        assert_eq!(probe_lastsync(&fetcher, &[]), None);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
    }
}
