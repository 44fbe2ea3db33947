//! Global forecast: every country, summed.

use crate::Options;
use anyhow::Context;
use chrono::{DateTime, Utc};
use gsf_data::{AggregatedForecast, ForecastAggregator, Normalization};
use log::{info, warn};
use std::path::Path;

/// Forecast every country in the capacity table, print the global series
/// and the per-country snapshot at `horizon` hours from now.
pub async fn run_global(
    options: &Options,
    normalized: bool,
    horizon: usize,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let capacities = options.load_capacities()?;
    let geometry = options.load_geometry()?;
    let client = options.client()?;
    let mode = if normalized {
        Normalization::Percentage
    } else {
        Normalization::Absolute
    };

    info!("Forecasting {} countries", capacities.len());
    let aggregate = ForecastAggregator::new(&client, &capacities, &geometry)
        .build_all(&Utc::now())
        .await;

    for notice in aggregate.notices() {
        println!("Notice: {}", notice);
    }
    let timestamps = aggregate.timestamps();
    let Some(selected) = horizon_timestamp(&timestamps, horizon) else {
        println!("No forecast data available");
        return Ok(());
    };

    // The global series is only meaningful in GW.
    if mode == Normalization::Absolute {
        println!(
            "Global solar forecast, {} countries, {:.1} GW installed",
            aggregate.capacities().len(),
            aggregate.total_capacity()
        );
        for (timestamp, total) in aggregate.totals() {
            println!("{}  {}", timestamp.format("%Y-%m-%d %H:%M UTC"), format_value(total, mode));
        }
        println!();
    }

    print_snapshot(&aggregate, &selected, mode);

    if let Some(path) = output {
        let file = std::fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
        aggregate.write_csv(file)?;
        info!("Wrote {} rows to {}", aggregate.len(), path.display());
    }
    Ok(())
}

fn print_snapshot(aggregate: &AggregatedForecast, timestamp: &DateTime<Utc>, mode: Normalization) {
    println!("Per-country forecast at {}", timestamp.format("%Y-%m-%d %H:%M UTC"));
    for (code, value) in aggregate.snapshot(timestamp, mode) {
        println!("{}  {}", code, format_value(value, mode));
    }
}

/// The timestamp `horizon` steps into the forecast, clamped to the last one.
pub fn horizon_timestamp(timestamps: &[DateTime<Utc>], horizon: usize) -> Option<DateTime<Utc>> {
    let last = timestamps.len().checked_sub(1)?;
    if horizon > last {
        warn!("Horizon {} is past the forecast end, showing hour {}", horizon, last);
    }
    timestamps.get(horizon.min(last)).copied()
}

pub fn format_value(value: f64, mode: Normalization) -> String {
    match mode {
        Normalization::Absolute => format!("{:.3} GW", value),
        Normalization::Percentage => format!("{:.1} %", value),
    }
}
