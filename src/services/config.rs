//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default AMap REST endpoint root.
pub const DEFAULT_AMAP_BASE_URL: &str = "https://restapi.amap.com/v3";

/// Configuration for the upstream POI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("amap" or "mock").
    pub provider: String,

    /// AMap web-service key, sent as the `key` query parameter.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// REST root, without a trailing slash.
    pub base_url: String,

    /// Timeout for place-search requests.
    pub timeout: Duration,

    /// Timeout for geocoding requests.
    pub geocode_timeout: Duration,

    /// Results requested per page (AMap caps this at 25).
    pub page_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: "amap".to_string(),
            api_key: None,
            base_url: DEFAULT_AMAP_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            geocode_timeout: Duration::from_secs(5),
            page_size: 20,
        }
    }
}

impl ProviderConfig {
    /// Creates a new configuration.
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    /// Builder: set API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder: set base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builder: set search timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set geocoding timeout.
    pub fn with_geocode_timeout(mut self, timeout: Duration) -> Self {
        self.geocode_timeout = timeout;
        self
    }

    /// Builder: set page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.clamp(1, 25);
        self
    }

    /// Creates configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("POI_PROVIDER") {
            config.provider = val.to_lowercase();
        }

        if let Ok(val) = std::env::var("AMAP_API_KEY") {
            if !val.trim().is_empty() {
                config.api_key = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = std::env::var("AMAP_BASE_URL") {
            config = config.with_base_url(val);
        }

        if let Some(secs) = std::env::var("AMAP_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = std::env::var("AMAP_GEOCODE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.geocode_timeout = Duration::from_secs(secs);
        }

        if let Some(size) = std::env::var("AMAP_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config = config.with_page_size(size);
        }

        config
    }
}

/// Configuration for the background fetch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of worker tasks draining the job queue.
    pub workers: usize,

    /// Jobs that may wait in the queue before requests are rejected.
    pub queue_capacity: usize,

    /// Pause between consecutive page requests.
    pub page_delay: Duration,

    /// Upper bound on pages fetched per keyword.
    pub max_pages: u32,

    /// How long a finished job's status stays queryable.
    pub job_retention: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 16,
            page_delay: Duration::from_millis(200),
            max_pages: 100,
            job_retention: Duration::from_secs(600),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Builder: set queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Builder: set inter-page delay.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Builder: set page cap.
    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    /// Builder: set finished-job retention.
    pub fn with_job_retention(mut self, retention: Duration) -> Self {
        self.job_retention = retention;
        self
    }

    /// Creates configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = std::env::var("FETCH_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config = config.with_workers(n);
        }

        if let Some(n) = std::env::var("FETCH_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config = config.with_queue_capacity(n);
        }

        if let Some(ms) = std::env::var("AMAP_PAGE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.page_delay = Duration::from_millis(ms);
        }

        if let Some(pages) = std::env::var("AMAP_MAX_PAGES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
        {
            config = config.with_max_pages(pages);
        }

        if let Some(secs) = std::env::var("FETCH_JOB_RETENTION_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.job_retention = Duration::from_secs(secs);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.provider, "amap");
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, "https://restapi.amap.com/v3");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.geocode_timeout, Duration::from_secs(5));
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new("mock")
            .with_api_key("abc")
            .with_base_url("http://localhost:9000/v3/")
            .with_page_size(100);

        assert_eq!(config.provider, "mock");
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.base_url, "http://localhost:9000/v3");
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = ProviderConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.page_delay, Duration::from_millis(200));
        assert_eq!(config.max_pages, 100);
        assert_eq!(config.job_retention, Duration::from_secs(600));
    }

    #[test]
    fn test_fetch_config_builder_floors() {
        let config = FetchConfig::new().with_workers(0).with_queue_capacity(0);
        assert_eq!(config.workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }
}
