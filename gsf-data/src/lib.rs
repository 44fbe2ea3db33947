//! Aggregation of per-country solar forecasts.
//!
//! This crate merges the series fetched for each country into one table
//! suitable for global totals, percentage views and horizon snapshots.

pub mod aggregate;

pub use aggregate::{AggregatedForecast, FetchNotice, ForecastAggregator, ForecastRow, Normalization, NoticeKind};
