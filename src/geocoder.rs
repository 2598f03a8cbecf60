use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const STATUS_OK: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> AppResult<Coordinates>;
}

/// Fixed-delay retry policy: `max_attempts` tries in total, `delay` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.geocoder_max_attempts, config.geocoder_retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[derive(Clone)]
pub struct Geocoder {
    inner: Option<Arc<dyn GeocodeLookup>>,
    policy: RetryPolicy,
}

impl Geocoder {
    /// Builds the HTTP geocoder, or a disabled one when no API key is set.
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let policy = RetryPolicy::from_config(config);
        match config.baidu_api_key.clone() {
            Some(key) => {
                let client = BaiduGeocoder::new(
                    config.geocoder_endpoint.clone(),
                    key,
                    config.geocoder_timeout(),
                )?;
                Ok(Self::from_lookup(Arc::new(client), policy))
            }
            None => {
                warn!("BAIDU_AK not configured; rows will be stored without coordinates");
                Ok(Self::disabled())
            }
        }
    }

    pub fn from_lookup(lookup: Arc<dyn GeocodeLookup>, policy: RetryPolicy) -> Self {
        Self {
            inner: Some(lookup),
            policy,
        }
    }

    pub fn disabled() -> Self {
        Self {
            inner: None,
            policy: RetryPolicy::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Resolves an address, retrying with a fixed delay. Exhausted retries
    /// degrade to `None` instead of failing the caller.
    pub async fn resolve(&self, address: Option<&str>) -> Option<Coordinates> {
        let lookup = self.inner.as_ref()?;
        let address = address.map(str::trim).filter(|a| !a.is_empty())?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match lookup.lookup(address).await {
                Ok(coordinates) => {
                    debug!(address, attempt, ?coordinates, "address geocoded");
                    return Some(coordinates);
                }
                Err(err) if attempt < self.policy.max_attempts => {
                    warn!(
                        ?err,
                        address,
                        attempt,
                        "geocoding failed; retrying after {:?}",
                        self.policy.delay
                    );
                    sleep(self.policy.delay).await;
                }
                Err(err) => {
                    warn!(
                        ?err,
                        address, attempt, "geocoding retries exhausted; storing without coordinates"
                    );
                    return None;
                }
            }
        }
    }
}

pub struct BaiduGeocoder {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl BaiduGeocoder {
    pub fn new(endpoint: String, api_key: SecretString, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl GeocodeLookup for BaiduGeocoder {
    async fn lookup(&self, address: &str) -> AppResult<Coordinates> {
        #[derive(Deserialize)]
        struct Response {
            status: i64,
            #[serde(alias = "msg")]
            message: Option<String>,
            result: Option<ResponseResult>,
        }

        #[derive(Deserialize)]
        struct ResponseResult {
            location: Option<ResponseLocation>,
        }

        #[derive(Deserialize)]
        struct ResponseLocation {
            lat: f64,
            lng: f64,
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("address", address),
                ("output", "json"),
                ("ak", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let parsed: Response = response.json().await?;
        if parsed.status != STATUS_OK {
            return Err(AppError::Geocode {
                status: parsed.status,
                message: parsed.message.unwrap_or_else(|| "unknown error".into()),
            });
        }

        let location = parsed
            .result
            .and_then(|result| result.location)
            .ok_or_else(|| AppError::Geocode {
                status: parsed.status,
                message: "response missing result.location".into(),
            })?;

        Ok(Coordinates {
            lat: location.lat,
            lng: location.lng,
        })
    }
}
