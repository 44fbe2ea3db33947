//! Single-country forecast in local time.

use crate::Options;
use chrono::Utc;
use chrono_tz::Tz;
use gsf_core::capacity::code_from_selector_label;
use gsf_core::country::CountryRegistry;
use gsf_core::forecast::ForecastPoint;
use gsf_core::timezone::{TimezoneResolver, ZoneResolution};
use gsf_utils::dates::to_local;

/// Forecast one country, given as an alpha-3 code or a "CODE - Name" label.
pub async fn run_country(options: &Options, country: &str) -> anyhow::Result<()> {
    let code = code_from_selector_label(country).to_uppercase();
    let capacities = options.load_capacities()?;
    let geometry = options.load_geometry()?;
    let Some(record) = capacities.get(&code) else {
        anyhow::bail!("{} is not in the capacity dataset", code);
    };

    let resolver = TimezoneResolver::new(CountryRegistry::embedded()?);
    let zone = resolve_zone(&resolver, &code, &record.country_name);
    let location = geometry.locate(&code);
    let client = options.client()?;

    println!(
        "{} ({}): {:.3} GW installed, times in {}",
        record.country_name,
        code,
        record.capacity_gw,
        zone.name()
    );
    match client
        .try_fetch(&record.country_name, &location, record.capacity_gw, &Utc::now())
        .await
    {
        Ok(Some(points)) => {
            for point in &points {
                println!("{}", format_local_row(point, record.capacity_gw, &zone));
            }
        }
        Ok(None) if !location.is_usable() => println!("Notice: no known location for {}", code),
        Ok(None) => println!("Notice: {} has no installed solar capacity", code),
        Err(e) => println!("Notice: forecast for {} failed: {}", record.country_name, e),
    }
    Ok(())
}

/// Zone for a country: by code first, then by its display name.
pub fn resolve_zone(resolver: &TimezoneResolver, code: &str, name: &str) -> Tz {
    match resolver.resolve_code(code) {
        ZoneResolution::Unresolved => resolver.resolve_detailed(name).zone(),
        resolved => resolved.zone(),
    }
}

pub fn format_local_row(point: &ForecastPoint, capacity_gw: f64, zone: &Tz) -> String {
    let power_gw = point.power_gw();
    format!(
        "{}  {:.3} GW  {:.1} %",
        to_local(&point.timestamp, zone).format("%Y-%m-%d %H:%M %Z"),
        power_gw,
        power_gw / capacity_gw * 100.0
    )
}
