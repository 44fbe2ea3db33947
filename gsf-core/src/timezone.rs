//! Display name to IANA time zone resolution.

use crate::country::CountryRegistry;
use chrono_tz::Tz;
use log::warn;

/// Aggregate regions that have no single zone; they are shown in UTC.
pub const REGIONS: [&str; 13] = [
    "Africa",
    "ASEAN",
    "Asia",
    "EU",
    "Europe",
    "G20",
    "G7",
    "Latin America and Caribbean",
    "Middle East",
    "North America",
    "Oceania",
    "OECD",
    "World",
];

/// Names used by the capacity data that the ISO registry spells differently.
const ALIASES: [(&str, &str); 9] = [
    ("United States of America", "United States"),
    ("Russian Federation (the)", "Russian Federation"),
    ("Philippines (the)", "Philippines"),
    ("Dominican Republic (the)", "Dominican Republic"),
    ("Iran (Islamic Republic of)", "Iran"),
    ("Czechia", "Czech Republic"),
    ("Bosnia Herzegovina", "Bosnia and Herzegovina"),
    ("Viet Nam", "Vietnam"),
    ("Dem. Rep. Congo", "Congo, The Democratic Republic of the"),
];

/// Zone to show for countries spanning several, keyed by alpha-2.
const PREFERRED_ZONES: [(&str, &str); 12] = [
    ("US", "America/New_York"),
    ("RU", "Europe/Moscow"),
    ("AU", "Australia/Sydney"),
    ("BR", "America/Sao_Paulo"),
    ("CA", "America/Toronto"),
    ("MX", "America/Mexico_City"),
    ("AR", "America/Argentina/Buenos_Aires"),
    ("CL", "America/Santiago"),
    ("KZ", "Asia/Almaty"),
    ("MN", "Asia/Ulaanbaatar"),
    ("CD", "Africa/Kinshasa"),
    ("ID", "Asia/Jakarta"),
];

/// Outcome of resolving a display name.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneResolution {
    /// An aggregate region, shown in UTC
    Region,
    /// A country and the zone chosen for it
    Resolved { alpha_2: String, zone: Tz },
    /// Nothing matched; UTC is used
    Unresolved,
}

impl ZoneResolution {
    pub fn zone(&self) -> Tz {
        match self {
            ZoneResolution::Resolved { zone, .. } => *zone,
            ZoneResolution::Region | ZoneResolution::Unresolved => Tz::UTC,
        }
    }
}

/// Resolves country display names to time zones using an ISO registry.
#[derive(Debug, Clone)]
pub struct TimezoneResolver {
    registry: CountryRegistry,
}

impl TimezoneResolver {
    pub fn new(registry: CountryRegistry) -> Self {
        Self { registry }
    }

    /// IANA id for a display name; "UTC" for regions and unknown names.
    pub fn resolve(&self, display_name: &str) -> String {
        self.resolve_detailed(display_name).zone().name().to_string()
    }

    pub fn resolve_detailed(&self, display_name: &str) -> ZoneResolution {
        let name = display_name.trim();
        if REGIONS.iter().any(|region| region.eq_ignore_ascii_case(name)) {
            return ZoneResolution::Region;
        }
        let name = ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map_or(name, |(_, canonical)| *canonical);
        match self.registry.lookup(name) {
            Some(country) => self.zone_for(&country.alpha_2),
            None => {
                warn!("No time zone known for '{}', using UTC", display_name);
                ZoneResolution::Unresolved
            }
        }
    }

    /// Resolve from an alpha-3 code.
    pub fn resolve_code(&self, alpha_3: &str) -> ZoneResolution {
        match self.registry.by_alpha_3(alpha_3.trim()) {
            Some(country) => self.zone_for(&country.alpha_2),
            None => {
                warn!("No country with code '{}', using UTC", alpha_3);
                ZoneResolution::Unresolved
            }
        }
    }

    fn zone_for(&self, alpha_2: &str) -> ZoneResolution {
        let zone_id = PREFERRED_ZONES
            .iter()
            .find(|(code, _)| *code == alpha_2)
            .map(|(_, zone)| *zone)
            .or_else(|| self.registry.zones(alpha_2).first().map(String::as_str));
        let Some(id) = zone_id else {
            warn!("No zone listed for {}, using UTC", alpha_2);
            return ZoneResolution::Unresolved;
        };
        let zone = id.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Unknown zone id '{}' for {}, using UTC", id, alpha_2);
            Tz::UTC
        });
        ZoneResolution::Resolved {
            alpha_2: alpha_2.to_string(),
            zone,
        }
    }
}
