//! Combining per-country forecasts into one long-form table.

use chrono::{DateTime, Utc};
use gsf_core::capacity::CapacityTable;
use gsf_core::error::FetchError;
use gsf_core::forecast::{ForecastClient, ForecastPoint};
use gsf_core::geometry::GeometryIndex;
use gsf_core::transport::ForecastTransport;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How values are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    /// Gigawatts
    #[default]
    Absolute,
    /// Percent of the country's installed capacity
    Percentage,
}

/// One country at one hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub country_code: String,
    pub timestamp: DateTime<Utc>,
    pub power_gw: f64,
    pub power_percentage: f64,
}

impl ForecastRow {
    fn new(country_code: &str, point: &ForecastPoint, capacity_gw: f64) -> Self {
        let power_gw = point.power_gw();
        Self {
            country_code: country_code.to_string(),
            timestamp: point.timestamp,
            power_gw,
            power_percentage: power_gw / capacity_gw * 100.0,
        }
    }

    pub fn value(&self, mode: Normalization) -> f64 {
        match mode {
            Normalization::Absolute => self.power_gw,
            Normalization::Percentage => self.power_percentage,
        }
    }
}

/// Why a country is missing from, or flagged in, the aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    ZeroCapacity,
    NoLocation,
    FetchFailed(FetchError),
    /// The country's timestamps differ from the first country fetched
    MisalignedHorizon,
}

/// A per-country message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchNotice {
    pub country_code: String,
    pub country_name: String,
    pub kind: NoticeKind,
}

impl FetchNotice {
    /// Whether the country contributed no rows.
    pub fn is_excluded(&self) -> bool {
        !matches!(self.kind, NoticeKind::MisalignedHorizon)
    }
}

impl fmt::Display for FetchNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = format!("{} ({})", self.country_name, self.country_code);
        match &self.kind {
            NoticeKind::ZeroCapacity => write!(f, "{}: no installed capacity, skipped", label),
            NoticeKind::NoLocation => write!(f, "{}: no known location, skipped", label),
            NoticeKind::FetchFailed(e) => write!(f, "{}: {}", label, e),
            NoticeKind::MisalignedHorizon => {
                write!(f, "{}: forecast hours differ from other countries", label)
            }
        }
    }
}

/// Long-form forecast for many countries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedForecast {
    rows: Vec<ForecastRow>,
    capacities: BTreeMap<String, f64>,
    notices: Vec<FetchNotice>,
}

impl AggregatedForecast {
    /// Rows ordered by country code, then timestamp.
    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    pub fn notices(&self) -> &[FetchNotice] {
        &self.notices
    }

    /// Capacity of every country that contributed rows.
    pub fn capacities(&self) -> &BTreeMap<String, f64> {
        &self.capacities
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct timestamps, ascending. Index into this to pick a horizon.
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows
            .iter()
            .map(|r| r.timestamp)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sum of power over every country reporting at `timestamp`, in GW.
    pub fn total_at(&self, timestamp: &DateTime<Utc>) -> f64 {
        self.rows
            .iter()
            .filter(|r| r.timestamp == *timestamp)
            .map(|r| r.power_gw)
            .sum()
    }

    /// Global total for every timestamp.
    pub fn totals(&self) -> Vec<(DateTime<Utc>, f64)> {
        let mut totals: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
        for r in &self.rows {
            *totals.entry(r.timestamp).or_insert(0.0) += r.power_gw;
        }
        totals.into_iter().collect()
    }

    fn row(&self, country_code: &str, timestamp: &DateTime<Utc>) -> Option<&ForecastRow> {
        self.rows
            .iter()
            .find(|r| r.country_code == country_code && r.timestamp == *timestamp)
    }

    pub fn power_at(&self, country_code: &str, timestamp: &DateTime<Utc>) -> Option<f64> {
        self.row(country_code, timestamp).map(|r| r.power_gw)
    }

    pub fn percentage_at(&self, country_code: &str, timestamp: &DateTime<Utc>) -> Option<f64> {
        self.row(country_code, timestamp).map(|r| r.power_percentage)
    }

    /// Every country's value at one timestamp, in country code order.
    pub fn snapshot(&self, timestamp: &DateTime<Utc>, mode: Normalization) -> Vec<(&str, f64)> {
        self.rows
            .iter()
            .filter(|r| r.timestamp == *timestamp)
            .map(|r| (r.country_code.as_str(), r.value(mode)))
            .collect()
    }

    pub fn country_series<'a>(&'a self, country_code: &'a str) -> impl Iterator<Item = &'a ForecastRow> + 'a {
        self.rows.iter().filter(move |r| r.country_code == country_code)
    }

    /// Codes of the countries that contributed rows.
    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.capacities.keys().map(String::as_str)
    }

    /// Installed capacity behind the aggregate, in GW.
    pub fn total_capacity(&self) -> f64 {
        self.capacities.values().sum()
    }

    /// Write the long-form table as CSV:
    /// country_code,timestamp,power_gw,power_percentage
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Fetches a forecast for each country and merges the results.
pub struct ForecastAggregator<'a, T> {
    client: &'a ForecastClient<T>,
    capacities: &'a CapacityTable,
    geometry: &'a GeometryIndex,
}

impl<'a, T: ForecastTransport> ForecastAggregator<'a, T> {
    pub fn new(client: &'a ForecastClient<T>, capacities: &'a CapacityTable, geometry: &'a GeometryIndex) -> Self {
        Self {
            client,
            capacities,
            geometry,
        }
    }

    /// Aggregate every country in the capacity table.
    pub async fn build_all(&self, as_of: &DateTime<Utc>) -> AggregatedForecast {
        let codes: Vec<String> = self.capacities.codes().map(String::from).collect();
        self.build(codes, as_of).await
    }

    /// Aggregate the given countries, one request each, in code order.
    ///
    /// Countries without capacity or a location are skipped and failed
    /// requests are dropped; each case leaves a notice. Timestamps are not
    /// required to line up across countries: all rows are kept and a
    /// country whose hours differ from the first one fetched is flagged.
    pub async fn build<I, S>(&self, codes: I, as_of: &DateTime<Utc>) -> AggregatedForecast
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes: BTreeSet<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let total = codes.len();
        let mut aggregate = AggregatedForecast::default();
        let mut reference_grid: Option<Vec<DateTime<Utc>>> = None;

        for (i, code) in codes.iter().enumerate() {
            let name = self
                .capacities
                .get(code)
                .map_or_else(|| code.clone(), |r| r.country_name.clone());
            let notice = |kind| FetchNotice {
                country_code: code.clone(),
                country_name: name.clone(),
                kind,
            };

            let capacity_gw = self.capacities.capacity_gw(code);
            if !(capacity_gw > 0.0 && capacity_gw.is_finite()) {
                aggregate.notices.push(notice(NoticeKind::ZeroCapacity));
                continue;
            }
            let location = self.geometry.locate(code);
            if !location.is_usable() {
                warn!("No location for {} ({}), skipping", name, code);
                aggregate.notices.push(notice(NoticeKind::NoLocation));
                continue;
            }

            info!("Fetching forecast for {} ({}/{})", name, i + 1, total);
            let points = match self.client.try_fetch(&name, &location, capacity_gw, as_of).await {
                Ok(Some(points)) => points,
                Ok(None) => {
                    aggregate.notices.push(notice(NoticeKind::ZeroCapacity));
                    continue;
                }
                Err(e) => {
                    warn!("Forecast for {} failed: {}", name, e);
                    aggregate.notices.push(notice(NoticeKind::FetchFailed(e)));
                    continue;
                }
            };

            let grid: Vec<DateTime<Utc>> = points.iter().map(|p| p.timestamp).collect();
            match &reference_grid {
                None => reference_grid = Some(grid),
                Some(reference) if *reference != grid => {
                    warn!("Forecast hours for {} differ from the first country", name);
                    aggregate.notices.push(notice(NoticeKind::MisalignedHorizon));
                }
                Some(_) => {}
            }

            aggregate
                .rows
                .extend(points.iter().map(|p| ForecastRow::new(code, p, capacity_gw)));
            aggregate.capacities.insert(code.clone(), capacity_gw);
        }

        aggregate
            .rows
            .sort_by(|a, b| (&a.country_code, a.timestamp).cmp(&(&b.country_code, b.timestamp)));
        info!(
            "Aggregated {} countries, {} rows, {} notices",
            aggregate.capacities.len(),
            aggregate.rows.len(),
            aggregate.notices.len()
        );
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gsf_core::capacity::CapacityRecord;
    use gsf_core::forecast::{ForecastConfig, ForecastRequest, ForecastResponse, PredictionRow, Predictions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with `hours` hourly points of the site's full capacity, or
    /// fails for sites at a latitude listed in `failing`.
    struct FlatTransport {
        hours: usize,
        failing: Vec<f64>,
        short: Vec<f64>,
        repeated: Vec<f64>,
        calls: AtomicUsize,
    }

    impl FlatTransport {
        fn new(hours: usize) -> Self {
            Self {
                hours,
                failing: Vec::new(),
                short: Vec::new(),
                repeated: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ForecastTransport for FlatTransport {
        async fn post(&self, request: &ForecastRequest) -> Result<ForecastResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&request.site.latitude) {
                return Err(FetchError::Timeout);
            }
            let hours = if self.short.contains(&request.site.latitude) {
                self.hours - 1
            } else {
                self.hours
            };
            let timestamp = self
                .repeated
                .contains(&request.site.latitude)
                .then(|| "2025-03-01T09:00:00".to_string());
            let rows = (0..hours)
                .map(|_| PredictionRow {
                    power_kw: Some(1_000_000.0),
                    timestamp: timestamp.clone(),
                })
                .collect();
            Ok(ForecastResponse {
                predictions: Predictions::Rows(rows),
            })
        }
    }

    fn record(code: &str, capacity_gw: f64) -> CapacityRecord {
        CapacityRecord {
            country_code: code.to_string(),
            country_name: format!("Country {}", code),
            capacity_gw,
            source: "test".to_string(),
        }
    }

    fn config() -> ForecastConfig {
        ForecastConfig {
            smoothing: false,
            ..ForecastConfig::default()
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 15, 0).unwrap()
    }

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_totals_and_percentages() {
        let capacities = CapacityTable::from_records([record("CCC", 5.0), record("AAA", 2.0), record("BBB", 3.0)]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0), ("BBB", 20.0, 0.0), ("CCC", 30.0, 0.0)]);
        let client = ForecastClient::new(FlatTransport::new(1), config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build_all(&as_of()).await;
        assert_eq!(aggregate.timestamps(), vec![hour()]);
        assert!((aggregate.total_at(&hour()) - 3.0).abs() < 1e-12);
        assert_eq!(aggregate.percentage_at("AAA", &hour()), Some(50.0));
        assert!((aggregate.percentage_at("CCC", &hour()).unwrap() - 20.0).abs() < 1e-12);
        assert_eq!(aggregate.total_capacity(), 10.0);
        assert!(aggregate.notices().is_empty());

        let codes: Vec<&str> = aggregate.rows().iter().map(|r| r.country_code.as_str()).collect();
        assert_eq!(codes, vec!["AAA", "BBB", "CCC"]);
        let snapshot = aggregate.snapshot(&hour(), Normalization::Percentage);
        assert_eq!(snapshot[0], ("AAA", 50.0));
    }

    #[tokio::test]
    async fn test_single_country_end_to_end() {
        let capacities = CapacityTable::from_records([record("USA", 100.0)]);
        let geometry = GeometryIndex::from_points([("USA", 39.8, -98.6)]);
        let client = ForecastClient::new(FlatTransport::new(48), config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build(["USA"], &as_of()).await;
        assert_eq!(aggregate.len(), 48);
        assert_eq!(aggregate.timestamps().len(), 48);
        assert_eq!(aggregate.timestamps()[47], hour() + Duration::hours(47));
        for row in aggregate.country_series("USA") {
            assert_eq!(aggregate.total_at(&row.timestamp), row.power_gw);
            assert_eq!(row.power_percentage, row.power_gw / 100.0 * 100.0);
            assert_eq!(row.value(Normalization::Absolute), row.power_gw);
        }
        assert_eq!(aggregate.totals().len(), 48);
        assert_eq!(aggregate.countries().collect::<Vec<_>>(), vec!["USA"]);
    }

    #[tokio::test]
    async fn test_skips_and_failures_are_isolated() {
        let capacities = CapacityTable::from_records([
            record("AAA", 1.0),
            record("BBB", 1.0),
            record("ZZZ", 0.0),
            record("XXX", 2.0),
        ]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0), ("BBB", 20.0, 0.0), ("ZZZ", 30.0, 0.0)]);
        let mut transport = FlatTransport::new(3);
        transport.failing.push(20.0);
        let client = ForecastClient::new(transport, config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build_all(&as_of()).await;
        assert_eq!(aggregate.countries().collect::<Vec<_>>(), vec!["AAA"]);
        assert_eq!(aggregate.len(), 3);

        let kinds: Vec<(&str, &NoticeKind)> = aggregate
            .notices()
            .iter()
            .map(|n| (n.country_code.as_str(), &n.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("BBB", &NoticeKind::FetchFailed(FetchError::Timeout)),
                ("XXX", &NoticeKind::NoLocation),
                ("ZZZ", &NoticeKind::ZeroCapacity),
            ]
        );
        assert!(aggregate.notices().iter().all(FetchNotice::is_excluded));
        assert_eq!(client_calls(&client), 2);
    }

    fn client_calls(client: &ForecastClient<FlatTransport>) -> usize {
        client.transport().calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_misaligned_horizon_is_kept_and_flagged() {
        let capacities = CapacityTable::from_records([record("AAA", 1.0), record("BBB", 1.0)]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0), ("BBB", 20.0, 0.0)]);
        let mut transport = FlatTransport::new(4);
        transport.short.push(20.0);
        let client = ForecastClient::new(transport, config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build_all(&as_of()).await;
        assert_eq!(aggregate.len(), 7);
        let last = hour() + Duration::hours(3);
        assert_eq!(aggregate.total_at(&last), 1.0);
        assert_eq!(aggregate.power_at("BBB", &last), None);
        assert_eq!(aggregate.notices().len(), 1);
        assert_eq!(aggregate.notices()[0].kind, NoticeKind::MisalignedHorizon);
        assert!(!aggregate.notices()[0].is_excluded());
    }

    #[tokio::test]
    async fn test_repeated_hours_are_not_double_counted() {
        let capacities = CapacityTable::from_records([record("AAA", 2.0), record("BBB", 2.0)]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0), ("BBB", 20.0, 0.0)]);
        let mut transport = FlatTransport::new(2);
        transport.repeated.push(20.0);
        let client = ForecastClient::new(transport, config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build_all(&as_of()).await;
        assert_eq!(aggregate.countries().collect::<Vec<_>>(), vec!["AAA"]);
        assert_eq!(aggregate.total_at(&hour()), 1.0);
        assert_eq!(aggregate.percentage_at("AAA", &hour()), Some(50.0));
        assert_eq!(aggregate.power_at("BBB", &hour()), None);
        assert_eq!(aggregate.notices().len(), 1);
        assert_eq!(aggregate.notices()[0].country_code, "BBB");
        assert!(matches!(
            aggregate.notices()[0].kind,
            NoticeKind::FetchFailed(FetchError::Payload(_))
        ));
    }

    #[tokio::test]
    async fn test_non_finite_capacity_leaves_a_notice() {
        let capacities = CapacityTable::from_records([record("AAA", f64::NAN), record("BBB", f64::INFINITY)]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0), ("BBB", 20.0, 0.0)]);
        let client = ForecastClient::new(FlatTransport::new(1), config());
        let aggregator = ForecastAggregator::new(&client, &capacities, &geometry);

        let aggregate = aggregator.build_all(&as_of()).await;
        assert!(aggregate.is_empty());
        let kinds: Vec<&NoticeKind> = aggregate.notices().iter().map(|n| &n.kind).collect();
        assert_eq!(kinds, vec![&NoticeKind::ZeroCapacity, &NoticeKind::ZeroCapacity]);
        assert_eq!(client_calls(&client), 0);
    }

    #[tokio::test]
    async fn test_write_csv() {
        let capacities = CapacityTable::from_records([record("AAA", 2.0)]);
        let geometry = GeometryIndex::from_points([("AAA", 10.0, 0.0)]);
        let client = ForecastClient::new(FlatTransport::new(1), config());
        let aggregate = ForecastAggregator::new(&client, &capacities, &geometry)
            .build_all(&as_of())
            .await;
        let mut out = Vec::new();
        aggregate.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("country_code,timestamp,power_gw,power_percentage"));
        assert_eq!(lines.next(), Some("AAA,2025-03-01T09:00:00Z,1.0,50.0"));
    }
}
