//! Upstream POI providers: AMap place search and geocoding, plus a mock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Coordinates, PoiRecord};

use super::config::ProviderConfig;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Http(u16),

    #[error("provider rejected request: {info} (status {status})")]
    Rejected { status: String, info: String },

    #[error("no result for {0:?}")]
    NotFound(String),

    #[error("provider misconfigured: {0}")]
    Config(String),

    #[error("mock provider configured to fail")]
    MockFailure,
}

/// A source of POIs and geocoding.
#[async_trait]
pub trait PoiProvider: Send + Sync {
    /// Fetches one page (1-based) of POIs matching `keyword` in `city`.
    /// An empty page means the results are exhausted.
    async fn search_places(
        &self,
        keyword: &str,
        city: &str,
        page: u32,
    ) -> Result<Vec<PoiRecord>, ProviderError>;

    /// Resolves a postal address to coordinates.
    async fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError>;

    /// Resolves coordinates to a formatted address.
    async fn reverse_geocode(&self, location: Coordinates) -> Result<String, ProviderError>;

    /// Gets the provider name.
    fn provider_name(&self) -> &str;
}

// =============================================================================
// AMap wire types
// =============================================================================

/// AMap encodes absent string fields as `[]`.
fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

#[derive(Debug, Deserialize)]
struct AmapEnvelope<T> {
    #[serde(default, deserialize_with = "string_or_empty")]
    status: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    info: String,
    #[serde(flatten)]
    body: T,
}

#[derive(Debug, Deserialize)]
struct PlaceTextBody {
    #[serde(default)]
    pois: Vec<AmapPoi>,
}

#[derive(Debug, Deserialize)]
struct AmapPoi {
    #[serde(default, deserialize_with = "string_or_empty")]
    id: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    name: String,
    #[serde(rename = "type", default, deserialize_with = "string_or_empty")]
    category: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    typecode: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    address: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    location: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    tel: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    pname: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    cityname: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    adname: String,
    #[serde(default, deserialize_with = "string_or_empty")]
    business_area: String,
}

impl AmapPoi {
    fn into_record(self) -> Option<PoiRecord> {
        let location: Coordinates = match self.location.parse() {
            Ok(c) => c,
            Err(_) => {
                debug!("Skipping POI {:?} with location {:?}", self.name, self.location);
                return None;
            }
        };

        Some(PoiRecord {
            id: self.id,
            name: self.name,
            category: self.category,
            typecode: self.typecode,
            address: self.address,
            lng: location.lng,
            lat: location.lat,
            phone: self.tel,
            province: self.pname,
            city: self.cityname,
            district: self.adname,
            business_area: self.business_area,
            ..Default::default()
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeBody {
    #[serde(default)]
    geocodes: Vec<AmapGeocode>,
}

#[derive(Debug, Deserialize)]
struct AmapGeocode {
    #[serde(default, deserialize_with = "string_or_empty")]
    location: String,
}

#[derive(Debug, Deserialize)]
struct RegeoBody {
    regeocode: Option<AmapRegeocode>,
}

#[derive(Debug, Deserialize)]
struct AmapRegeocode {
    #[serde(default, deserialize_with = "string_or_empty")]
    formatted_address: String,
}

// =============================================================================
// AMap Provider
// =============================================================================

/// Client for the AMap v3 web-service API.
pub struct AmapProvider {
    config: ProviderConfig,
    client: Client,
    api_key: String,
}

impl AmapProvider {
    /// Creates a new AMap provider. Fails without an API key or with an
    /// unparseable base URL.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Config("AMAP_API_KEY is not set".to_string()))?;

        url::Url::parse(&config.base_url).map_err(|e| {
            ProviderError::Config(format!("invalid base URL {:?}: {}", config.base_url, e))
        })?;

        let client = Client::builder().build()?;

        Ok(Self {
            config,
            client,
            api_key,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}/{}?key={}",
            self.config.base_url,
            path,
            urlencoding::encode(&self.api_key)
        );
        for (name, value) in params {
            url.push('&');
            url.push_str(name);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        let url = self.endpoint(path, params);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Http(response.status().as_u16()));
        }

        let envelope: AmapEnvelope<T> = response.json().await?;
        if envelope.status != "1" {
            return Err(ProviderError::Rejected {
                status: envelope.status,
                info: envelope.info,
            });
        }

        Ok(envelope.body)
    }
}

#[async_trait]
impl PoiProvider for AmapProvider {
    async fn search_places(
        &self,
        keyword: &str,
        city: &str,
        page: u32,
    ) -> Result<Vec<PoiRecord>, ProviderError> {
        let offset = self.config.page_size.to_string();
        let page = page.to_string();
        let body: PlaceTextBody = self
            .call(
                "place/text",
                &[
                    ("keywords", keyword),
                    ("city", city),
                    ("offset", &offset),
                    ("page", &page),
                    ("extensions", "all"),
                ],
                self.config.timeout,
            )
            .await?;

        Ok(body
            .pois
            .into_iter()
            .filter_map(AmapPoi::into_record)
            .collect())
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError> {
        let body: GeocodeBody = self
            .call(
                "geocode/geo",
                &[("address", address)],
                self.config.geocode_timeout,
            )
            .await?;

        body.geocodes
            .into_iter()
            .next()
            .and_then(|g| g.location.parse().ok())
            .ok_or_else(|| ProviderError::NotFound(address.to_string()))
    }

    async fn reverse_geocode(&self, location: Coordinates) -> Result<String, ProviderError> {
        let location_param = location.to_string();
        let body: RegeoBody = self
            .call(
                "geocode/regeo",
                &[("location", &location_param)],
                self.config.geocode_timeout,
            )
            .await?;

        body.regeocode
            .map(|r| r.formatted_address)
            .filter(|a| !a.is_empty())
            .ok_or(ProviderError::NotFound(location_param))
    }

    fn provider_name(&self) -> &str {
        "amap"
    }
}

// =============================================================================
// Mock Provider
// =============================================================================

/// Canned provider for tests and offline runs.
///
/// Keywords registered with [`MockPoiProvider::with_pages`] serve those
/// pages; any other keyword yields three generated POIs on page 1.
pub struct MockPoiProvider {
    pages: Mutex<HashMap<String, Vec<Vec<PoiRecord>>>>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl Default for MockPoiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPoiProvider {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a mock provider that always fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Registers the pages served for `keyword`, in order.
    pub fn with_pages(self, keyword: &str, pages: Vec<Vec<PoiRecord>>) -> Self {
        if let Ok(mut map) = self.pages.lock() {
            map.insert(keyword.to_string(), pages);
        }
        self
    }

    /// Number of search requests served so far.
    pub fn search_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Three POIs around central Beijing, named after the query.
    pub fn sample_page(keyword: &str, city: &str) -> Vec<PoiRecord> {
        (0..3)
            .map(|i| PoiRecord {
                id: format!("MOCK-{}-{}", keyword, i + 1),
                name: format!("{}{}{}", city, keyword, i + 1),
                category: "餐饮服务;中餐厅;中餐厅".to_string(),
                typecode: "050100".to_string(),
                address: format!("{}路{}号", city, i + 1),
                lng: 116.397 + 0.01 * i as f64,
                lat: 39.909 + 0.005 * i as f64,
                city: city.to_string(),
                ..Default::default()
            })
            .collect()
    }
}

#[async_trait]
impl PoiProvider for MockPoiProvider {
    async fn search_places(
        &self,
        keyword: &str,
        city: &str,
        page: u32,
    ) -> Result<Vec<PoiRecord>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.should_fail {
            return Err(ProviderError::MockFailure);
        }

        let index = page.saturating_sub(1) as usize;
        let registered = self
            .pages
            .lock()
            .ok()
            .and_then(|map| map.get(keyword).map(|pages| pages.get(index).cloned()));

        Ok(match registered {
            Some(page) => page.unwrap_or_default(),
            None if index == 0 => Self::sample_page(keyword, city),
            None => Vec::new(),
        })
    }

    async fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::MockFailure);
        }
        if address.trim().is_empty() {
            return Err(ProviderError::NotFound(address.to_string()));
        }
        Ok(Coordinates::new(116.397428, 39.90923))
    }

    async fn reverse_geocode(&self, location: Coordinates) -> Result<String, ProviderError> {
        if self.should_fail {
            return Err(ProviderError::MockFailure);
        }
        Ok(format!("北京市东城区 ({})", location))
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Factory for creating POI providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a provider based on configuration.
    pub fn create(config: ProviderConfig) -> Result<Arc<dyn PoiProvider>, ProviderError> {
        match config.provider.as_str() {
            "amap" => Ok(Arc::new(AmapProvider::new(config)?)),
            "mock" => Ok(Arc::new(MockPoiProvider::new())),
            other => {
                warn!("Unknown POI provider '{}', falling back to mock", other);
                Ok(Arc::new(MockPoiProvider::new()))
            }
        }
    }
}
