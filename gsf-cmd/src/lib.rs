//! Command implementations for the GSF CLI.
//!
//! Provides subcommands for the global and per-country solar forecasts and
//! for maintaining the capacity dataset.

use anyhow::Context;
use clap::{Args, Subcommand};
use gsf_core::capacity::CapacityTable;
use gsf_core::forecast::{
    ForecastClient, ForecastConfig, DEFAULT_CACHE_TTL_MINS, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS,
};
use gsf_core::geometry::GeometryIndex;
use gsf_core::transport::HttpTransport;
use log::warn;
use std::path::PathBuf;

pub mod capacities;
pub mod country;
pub mod global;

/// File name of the capacity dataset inside the data directory.
pub const CAPACITIES_FILE: &str = "solar_capacities.csv";

/// File name of the country polygons inside the data directory.
pub const GEOMETRY_FILE: &str = "countries.geojson";

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Options {
    /// Directory holding the capacity and geometry datasets
    #[arg(long, env = "GSF_DATA_DIR", default_value = "fixtures", global = true)]
    pub data_dir: PathBuf,

    /// Capacity CSV (defaults to <data-dir>/solar_capacities.csv)
    #[arg(long, global = true)]
    pub capacities: Option<PathBuf>,

    /// Country polygons GeoJSON (defaults to <data-dir>/countries.geojson)
    #[arg(long, global = true)]
    pub geometry: Option<PathBuf>,

    /// Forecast service endpoint
    #[arg(long, env = "GSF_FORECAST_URL", default_value = DEFAULT_ENDPOINT, global = true)]
    pub forecast_url: String,

    /// Seconds before a forecast request is abandoned
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// Return the raw service output without smoothing
    #[arg(long, global = true)]
    pub no_smoothing: bool,

    /// Minutes a forecast is reused for
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_MINS, global = true)]
    pub cache_ttl_mins: i64,
}

impl Options {
    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            endpoint: self.forecast_url.clone(),
            timeout: std::time::Duration::from_secs(self.timeout_secs),
            smoothing: !self.no_smoothing,
            cache_ttl: chrono::Duration::minutes(self.cache_ttl_mins),
        }
    }

    pub fn capacities_path(&self) -> PathBuf {
        self.capacities
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CAPACITIES_FILE))
    }

    /// Load the capacity dataset. A missing or malformed file is fatal.
    pub fn load_capacities(&self) -> anyhow::Result<CapacityTable> {
        let path = self.capacities_path();
        CapacityTable::load(&path).with_context(|| {
            format!(
                "Cannot load capacities from {} (run build-capacities to create it)",
                path.display()
            )
        })
    }

    /// Load the country polygons. An explicitly given file must load; when
    /// the default file is absent only the fallback coordinates are used.
    pub fn load_geometry(&self) -> anyhow::Result<GeometryIndex> {
        match &self.geometry {
            Some(path) => GeometryIndex::load(path)
                .with_context(|| format!("Cannot load geometry from {}", path.display())),
            None => {
                let path = self.data_dir.join(GEOMETRY_FILE);
                if path.exists() {
                    GeometryIndex::load(&path)
                        .with_context(|| format!("Cannot load geometry from {}", path.display()))
                } else {
                    warn!(
                        "{} not found, locating countries from fallback coordinates only",
                        path.display()
                    );
                    Ok(GeometryIndex::empty())
                }
            }
        }
    }

    pub fn client(&self) -> anyhow::Result<ForecastClient<HttpTransport>> {
        let config = self.forecast_config();
        let transport = HttpTransport::new(&config).context("Cannot build the HTTP client")?;
        Ok(ForecastClient::new(transport, config))
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Forecast every country and print the global total
    Global {
        /// Report percent of installed capacity instead of GW
        #[arg(long)]
        normalized: bool,

        /// Forecast hour to show the per-country snapshot for (0 = now)
        #[arg(long, default_value_t = 0)]
        horizon: usize,

        /// Output path for the long-form per-country forecast CSV
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Forecast one country in its local time
    Country {
        /// Alpha-3 code or a "CODE - Name" label
        country: String,
    },

    /// List the capacity dataset
    Capacities,

    /// Build the capacity dataset from the Ember release plus manual overrides
    BuildCapacities {
        /// Ember data year to extract
        #[arg(long, default_value_t = 2024)]
        year: i32,

        /// Output path for the capacity CSV
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Manual overrides CSV (defaults to the embedded list)
        #[arg(long)]
        manual: Option<PathBuf>,
    },
}

pub async fn run(options: Options, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Global {
            normalized,
            horizon,
            output,
        } => global::run_global(&options, normalized, horizon, output.as_deref()).await,
        Command::Country { country } => country::run_country(&options, &country).await,
        Command::Capacities => capacities::run_capacities(&options),
        Command::BuildCapacities {
            year,
            output,
            manual,
        } => capacities::run_build_capacities(year, &output, manual.as_deref()).await,
    }
}
