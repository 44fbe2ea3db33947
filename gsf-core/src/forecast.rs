//! Per-location solar forecasts.
//!
//! A [`ForecastClient`] turns a country's representative point and installed
//! capacity into an hourly power series. The service is asked for a site whose
//! capacity is the country's capacity in kWp, so its kW output reads directly
//! as the country's output once divided by 1e6 (GW).

use crate::cache::{CacheKey, ForecastCache};
use crate::error::FetchError;
use crate::geometry::LocationRecord;
use crate::transport::ForecastTransport;
use chrono::{DateTime, Duration, Utc};
use gsf_utils::dates::{floor_to_hour, format_request_timestamp, parse_timestamp};
use gsf_utils::signal::{smooth_nonnegative, DEFAULT_POLYORDER, DEFAULT_WINDOW};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Public forecast endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://open.quartz.solar/forecast/";

/// Seconds before a forecast request is abandoned.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Minutes a successful forecast is reused for.
pub const DEFAULT_CACHE_TTL_MINS: i64 = 60;

/// kWp per GW.
pub const KWP_PER_GW: f64 = 1_000_000.0;

/// One hour of forecast output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub power_kw: f64,
}

impl ForecastPoint {
    pub fn power_gw(&self) -> f64 {
        self.power_kw / KWP_PER_GW
    }
}

/// The PV site the service forecasts for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SiteParameters {
    pub latitude: f64,
    pub longitude: f64,
    pub capacity_kwp: f64,
    /// Panel tilt in degrees: half the absolute latitude
    pub tilt: f64,
    /// Panel azimuth in degrees: 180 (south) in the northern hemisphere,
    /// 0 (north) otherwise
    pub orientation: f64,
}

impl SiteParameters {
    pub fn new(latitude: f64, longitude: f64, capacity_gw: f64) -> Self {
        Self {
            latitude,
            longitude,
            capacity_kwp: capacity_gw * KWP_PER_GW,
            tilt: latitude.abs() / 2.0,
            orientation: if latitude > 0.0 { 180.0 } else { 0.0 },
        }
    }
}

/// Body of a forecast request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRequest {
    pub site: SiteParameters,
    /// Naive UTC, "YYYY-MM-DDTHH:MM:SS"
    pub timestamp: String,
}

impl ForecastRequest {
    pub fn new(site: SiteParameters, as_of: &DateTime<Utc>) -> Self {
        Self {
            site,
            timestamp: format_request_timestamp(as_of),
        }
    }
}

/// One prediction in the row-oriented response form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionRow {
    pub power_kw: Option<f64>,
    #[serde(default, alias = "datetime")]
    pub timestamp: Option<String>,
}

/// Column-oriented response form: `{"power_kw": {"<timestamp>": value}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionColumns {
    pub power_kw: BTreeMap<String, Option<f64>>,
}

/// The service answers with either shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Predictions {
    Rows(Vec<PredictionRow>),
    Columns(PredictionColumns),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForecastResponse {
    pub predictions: Predictions,
}

impl ForecastResponse {
    /// Convert the response into points sorted by time. Rows that carry no
    /// timestamp are placed hourly from `as_of`. Each hour may appear once.
    pub fn into_points(self, as_of: &DateTime<Utc>) -> Result<Vec<ForecastPoint>, FetchError> {
        let raw: Vec<(Option<String>, Option<f64>)> = match self.predictions {
            Predictions::Rows(rows) => rows.into_iter().map(|r| (r.timestamp, r.power_kw)).collect(),
            Predictions::Columns(columns) => columns
                .power_kw
                .into_iter()
                .map(|(ts, value)| (Some(ts), value))
                .collect(),
        };
        if raw.is_empty() {
            return Err(FetchError::Payload("no predictions".to_string()));
        }

        let mut points = Vec::with_capacity(raw.len());
        for (i, (timestamp, power_kw)) in raw.into_iter().enumerate() {
            let power_kw = match power_kw {
                Some(value) if value.is_finite() => value,
                other => {
                    return Err(FetchError::Payload(format!(
                        "prediction {} has power {:?}",
                        i, other
                    )))
                }
            };
            let timestamp = match timestamp {
                Some(ts) => parse_timestamp(&ts).map_err(|e| FetchError::Payload(e.to_string()))?,
                None => *as_of + Duration::hours(i as i64),
            };
            points.push(ForecastPoint { timestamp, power_kw });
        }
        points.sort_by_key(|p| p.timestamp);
        if let Some(pair) = points.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
            return Err(FetchError::Payload(format!(
                "duplicate prediction for {}",
                pair[0].timestamp
            )));
        }
        Ok(points)
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub endpoint: String,
    pub timeout: std::time::Duration,
    /// Smooth the series before returning it
    pub smoothing: bool,
    pub cache_ttl: Duration,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            smoothing: true,
            cache_ttl: Duration::minutes(DEFAULT_CACHE_TTL_MINS),
        }
    }
}

/// Fetches, smooths and caches per-location forecasts.
#[derive(Debug)]
pub struct ForecastClient<T> {
    transport: T,
    config: ForecastConfig,
    cache: Mutex<ForecastCache>,
}

impl<T: ForecastTransport> ForecastClient<T> {
    pub fn new(transport: T, config: ForecastConfig) -> Self {
        let cache = Mutex::new(ForecastCache::new(config.cache_ttl));
        Self {
            transport,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn cache(&self) -> MutexGuard<'_, ForecastCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forecast for one country, or `None` when there is nothing to forecast
    /// or the request failed. Failures are logged.
    pub async fn fetch(
        &self,
        name: &str,
        location: &LocationRecord,
        capacity_gw: f64,
        as_of: &DateTime<Utc>,
    ) -> Option<Vec<ForecastPoint>> {
        match self.try_fetch(name, location, capacity_gw, as_of).await {
            Ok(points) => points,
            Err(e) => {
                warn!("Forecast for {} failed: {}", name, e);
                None
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but reports why a request failed.
    ///
    /// `Ok(None)` means no request was made: zero capacity or no usable
    /// location.
    pub async fn try_fetch(
        &self,
        name: &str,
        location: &LocationRecord,
        capacity_gw: f64,
        as_of: &DateTime<Utc>,
    ) -> Result<Option<Vec<ForecastPoint>>, FetchError> {
        if !(capacity_gw > 0.0 && capacity_gw.is_finite()) {
            debug!("Skipping {}: capacity {} GW", name, capacity_gw);
            return Ok(None);
        }
        if !location.is_usable() {
            warn!("Skipping {}: no location", name);
            return Ok(None);
        }

        let as_of = floor_to_hour(as_of);
        let key = CacheKey::new(location.latitude, location.longitude, capacity_gw, &as_of);
        if let Some(points) = self.cache().get(&key, Utc::now()) {
            debug!("Cache hit for {}", name);
            return Ok(Some(points));
        }

        let site = SiteParameters::new(location.latitude, location.longitude, capacity_gw);
        let request = ForecastRequest::new(site, &as_of);
        info!(
            "Requesting forecast for {} at ({:.4}, {:.4}), {} kWp",
            name, site.latitude, site.longitude, site.capacity_kwp
        );
        let response = self.transport.post(&request).await?;
        let mut points = response.into_points(&as_of)?;
        if self.config.smoothing {
            let raw: Vec<f64> = points.iter().map(|p| p.power_kw).collect();
            let smoothed = smooth_nonnegative(&raw, DEFAULT_WINDOW, DEFAULT_POLYORDER);
            for (point, value) in points.iter_mut().zip(smoothed) {
                point.power_kw = value;
            }
        }

        self.cache().insert(key, points.clone(), Utc::now());
        Ok(Some(points))
    }
}
