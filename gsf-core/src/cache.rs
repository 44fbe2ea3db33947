//! Hour-bucketed forecast cache.

use crate::forecast::ForecastPoint;
use chrono::{DateTime, Duration, Utc};
use gsf_utils::dates::hour_bucket;
use std::collections::HashMap;

/// Coordinates are keyed at this many decimal places.
const COORDINATE_SCALE: f64 = 1e4;

/// Identifies one forecast request: site, capacity and the UTC hour asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    latitude: i64,
    longitude: i64,
    capacity_bits: u64,
    hour: i64,
}

impl CacheKey {
    pub fn new(latitude: f64, longitude: f64, capacity_gw: f64, as_of: &DateTime<Utc>) -> Self {
        Self {
            latitude: (latitude * COORDINATE_SCALE).round() as i64,
            longitude: (longitude * COORDINATE_SCALE).round() as i64,
            capacity_bits: capacity_gw.to_bits(),
            hour: hour_bucket(as_of),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    points: Vec<ForecastPoint>,
    stored_at: DateTime<Utc>,
}

/// Successful forecasts kept for a fixed time to live.
#[derive(Debug, Clone)]
pub struct ForecastCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl ForecastCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The cached series for `key` if it is younger than the TTL at `now`.
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Vec<ForecastPoint>> {
        self.entries
            .get(key)
            .filter(|entry| now - entry.stored_at < self.ttl)
            .map(|entry| entry.points.clone())
    }

    /// Store a series, dropping every expired entry first.
    pub fn insert(&mut self, key: CacheKey, points: Vec<ForecastPoint>, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.stored_at < ttl);
        self.entries.insert(key, CacheEntry { points, stored_at: now });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
