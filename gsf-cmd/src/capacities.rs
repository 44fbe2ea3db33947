//! Listing and building the capacity dataset.

use crate::Options;
use anyhow::Context;
use gsf_core::capacity::{CapacityTable, EMBER_YEARLY_URL};
use log::info;
use std::path::Path;

/// The Ember release is a large file; it gets more time than a forecast.
const EMBER_TIMEOUT_SECS: u64 = 300;

/// Print every capacity record and the total.
pub fn run_capacities(options: &Options) -> anyhow::Result<()> {
    let table = options.load_capacities()?;
    for (label, record) in table.selector_labels().iter().zip(table.iter()) {
        println!("{:<40} {:>10.3} GW  {}", label, record.capacity_gw, record.source);
    }
    println!("{} countries, {:.3} GW total", table.len(), table.total_capacity());
    Ok(())
}

/// Download the Ember release, extract solar capacity for `year`, apply
/// the manual overrides and write the capacity CSV.
pub async fn run_build_capacities(
    year: i32,
    output: &Path,
    manual: Option<&Path>,
) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(EMBER_TIMEOUT_SECS))
        .build()?;
    info!("Downloading {}", EMBER_YEARLY_URL);
    let response = client.get(EMBER_YEARLY_URL).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Ember download failed with status {}", response.status());
    }
    let body = response.text().await?;

    let manual = match manual {
        Some(path) => CapacityTable::load(path)?,
        None => CapacityTable::manual()?,
    };
    let table = build_capacity_table(&body, year, manual)?;

    let file = std::fs::File::create(output).with_context(|| format!("Cannot create {}", output.display()))?;
    table.write_csv(file)?;
    info!(
        "Wrote {} countries ({:.3} GW) to {}",
        table.len(),
        table.total_capacity(),
        output.display()
    );
    Ok(())
}

/// Ember extract with the manual records applied on top.
pub fn build_capacity_table(ember_csv: &str, year: i32, manual: CapacityTable) -> anyhow::Result<CapacityTable> {
    let mut table = CapacityTable::from_ember_csv(ember_csv, year)?;
    if table.is_empty() {
        anyhow::bail!("The Ember release has no solar capacity for {}", year);
    }
    table.merge(manual);
    Ok(table)
}
