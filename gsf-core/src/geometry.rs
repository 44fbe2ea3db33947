//! Representative points for countries.
//!
//! Centroids are computed once, when the polygon dataset is loaded. Rings are
//! projected to Web Mercator (EPSG:3857) before the area-weighted centroid is
//! taken, and the result is projected back to latitude/longitude.

use crate::error::{DataLoadError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, f64::consts::PI, path::Path};

/// WGS84 semi-major axis used by Web Mercator, in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the Web Mercator square.
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Feature properties that may hold the alpha-3 code, in priority order.
const CODE_PROPERTIES: [&str; 4] = ["adm0_a3", "ADM0_A3", "iso_a3", "ISO_A3"];

/// Hand-picked points for micro-states and territories the polygon dataset
/// leaves out: (alpha-3, latitude, longitude).
pub const FALLBACK_COORDINATES: &[(&str, f64, f64)] = &[
    ("HKG", 22.3193, 114.1694),
    ("SGP", 1.3521, 103.8198),
    ("MAC", 22.1987, 113.5439),
    ("MDV", 3.2028, 73.2207),
    ("AND", 42.5462, 1.6016),
    ("LUX", 49.6117, 6.1319),
    ("MCO", 43.7384, 7.4246),
    ("SMR", 43.9336, 12.4508),
    ("VAT", 41.9029, 12.4534),
    ("NRU", -0.5228, 166.9315),
    ("TUV", -7.1095, 177.6493),
    ("KIR", 1.8709, 157.3630),
    ("PLW", 7.5149, 134.5825),
    ("WSM", -13.7590, -172.1046),
    ("ATG", 17.0608, -61.7964),
    ("BHS", 25.0343, -77.3963),
    ("BRB", 13.1939, -59.5432),
    ("BLZ", 17.1899, -88.4976),
    ("DMA", 15.4150, -61.3710),
    ("GRD", 12.1165, -61.6790),
    ("KNA", 17.3578, -62.7830),
    ("LCA", 13.9094, -60.9789),
    ("VCT", 13.2528, -61.1971),
    ("SYC", -4.6796, 55.4920),
    ("COM", -11.6455, 43.3333),
    ("STP", 0.1864, 6.6131),
    ("TLS", -8.8742, 125.7275),
    ("FJI", -17.7134, 178.0650),
    ("TON", -21.1789, -175.1982),
    ("VUT", -15.3767, 166.9592),
    ("SLB", -9.6457, 160.1562),
    ("MHL", 7.1315, 171.1845),
    ("FSM", 6.8878, 158.2150),
    ("CPV", 14.9177, -23.5090),
    ("BRN", 4.5353, 114.7277),
    ("BHR", 26.0667, 50.5577),
    ("DJI", 11.8251, 42.5903),
    ("GNB", 11.8037, -15.1804),
    ("SWZ", -26.5225, 31.4659),
    ("LSO", -29.6099, 28.2336),
    ("ATA", -82.8628, 135.0000),
    ("ATF", -49.2800, 69.3500),
    ("FLK", -51.7963, -59.5236),
    ("GRL", 71.7069, -42.6043),
    ("NCL", -21.5511, 165.6180),
    ("COK", -21.2367, -159.7777),
    ("NIU", -19.0544, -169.8672),
    ("PYF", -17.6797, -149.4068),
    ("ASM", -14.2706, -170.1322),
    ("GUM", 13.4443, 144.7937),
    ("TKL", -9.2002, -171.8480),
    ("MLT", 35.9375, 14.3754),
    ("ESH", 24.2155, -12.8858),
];

/// Where a location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationSource {
    /// Centroid of the country's polygons
    Geometry,
    /// Hand-picked coordinate
    Fallback,
    /// Nothing known; coordinates are the (0, 0) sentinel
    Unknown,
}

/// A country's representative point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub source: LocationSource,
}

impl LocationRecord {
    pub fn new(country_code: &str, latitude: f64, longitude: f64, source: LocationSource) -> Self {
        Self {
            country_code: country_code.to_string(),
            latitude,
            longitude,
            source,
        }
    }

    /// The "no usable location" sentinel.
    pub fn unknown(country_code: &str) -> Self {
        Self::new(country_code, 0.0, 0.0, LocationSource::Unknown)
    }

    /// False for the (0, 0) sentinel, which must never be forecast for.
    pub fn is_usable(&self) -> bool {
        self.source != LocationSource::Unknown
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    #[serde(other)]
    Other,
}

/// Running area and first moments of projected polygons.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    area: f64,
    mx: f64,
    my: f64,
    vertex_x: f64,
    vertex_y: f64,
    vertices: usize,
}

impl Moments {
    fn add_polygon(&mut self, rings: &[Vec<Vec<f64>>]) {
        for (i, ring) in rings.iter().enumerate() {
            let projected: Vec<(f64, f64)> = ring
                .iter()
                .filter(|position| position.len() >= 2)
                .map(|position| project(position[0], position[1]))
                .collect();
            let (area, mx, my) = ring_moments(&projected);
            // Exterior rings add, holes subtract, whatever their winding.
            let sign = (if i == 0 { 1.0 } else { -1.0 }) * area.signum();
            self.area += sign * area;
            self.mx += sign * mx;
            self.my += sign * my;
            if i == 0 {
                for (x, y) in projected {
                    self.vertex_x += x;
                    self.vertex_y += y;
                    self.vertices += 1;
                }
            }
        }
    }

    /// Centroid as (latitude, longitude).
    fn centroid(&self) -> Option<(f64, f64)> {
        if self.area.abs() > f64::EPSILON {
            Some(unproject(self.mx / self.area, self.my / self.area))
        } else if self.vertices > 0 {
            let n = self.vertices as f64;
            Some(unproject(self.vertex_x / n, self.vertex_y / n))
        } else {
            None
        }
    }
}

/// Project (lon, lat) in degrees to Web Mercator metres.
fn project(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = EARTH_RADIUS_M * lon.to_radians();
    let y = EARTH_RADIUS_M * (PI / 4.0 + lat / 2.0).tan().ln();
    (x, y)
}

/// Web Mercator metres back to (lat, lon) in degrees.
fn unproject(x: f64, y: f64) -> (f64, f64) {
    let lat = 2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0;
    let lon = x / EARTH_RADIUS_M;
    (lat.to_degrees(), lon.to_degrees())
}

/// Shoelace area and first moments (area * centroid) of a closed ring.
fn ring_moments(ring: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = ring.len();
    if n < 3 {
        return (0.0, 0.0, 0.0);
    }
    let (mut twice_area, mut cx, mut cy) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        let cross = x0 * y1 - x1 * y0;
        twice_area += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
    }
    (twice_area / 2.0, cx / 6.0, cy / 6.0)
}

fn feature_code(properties: &Map<String, Value>) -> Option<String> {
    CODE_PROPERTIES
        .iter()
        .filter_map(|key| properties.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|code| !code.is_empty() && *code != "-99")
        .map(String::from)
}

/// Precomputed country centroids with a curated fallback table.
#[derive(Debug, Clone, Default)]
pub struct GeometryIndex {
    centroids: HashMap<String, (f64, f64)>,
}

impl GeometryIndex {
    /// An index with no polygons; only the fallback table resolves.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from precomputed (code, lat, lon) points.
    pub fn from_points<'a, I: IntoIterator<Item = (&'a str, f64, f64)>>(points: I) -> Self {
        Self {
            centroids: points
                .into_iter()
                .map(|(code, lat, lon)| (code.to_string(), (lat, lon)))
                .collect(),
        }
    }

    /// Load a GeoJSON FeatureCollection of country polygons.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let geojson = std::fs::read_to_string(path).map_err(|source| DataLoadError::Missing {
            path: path.display().to_string(),
            source,
        })?;
        let index = Self::from_geojson_str(&geojson)?;
        info!("Computed {} country centroids from {}", index.len(), path.display());
        Ok(index)
    }

    /// Parse GeoJSON and compute one centroid per country code. Features that
    /// share a code are combined.
    pub fn from_geojson_str(geojson: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(geojson)?;
        let mut moments: HashMap<String, Moments> = HashMap::new();
        for feature in collection.features {
            let Some(code) = feature.properties.as_ref().and_then(feature_code) else {
                debug!("Skipping feature without a country code");
                continue;
            };
            let entry = moments.entry(code).or_default();
            match feature.geometry {
                Some(Geometry::Polygon { coordinates }) => entry.add_polygon(&coordinates),
                Some(Geometry::MultiPolygon { coordinates }) => {
                    for polygon in &coordinates {
                        entry.add_polygon(polygon);
                    }
                }
                Some(Geometry::Other) | None => {}
            }
        }
        let centroids = moments
            .into_iter()
            .filter_map(|(code, m)| m.centroid().map(|point| (code, point)))
            .collect();
        Ok(Self { centroids })
    }

    /// Representative point: polygon centroid, else the fallback table, else
    /// the `Unknown` (0, 0) sentinel.
    pub fn locate(&self, country_code: &str) -> LocationRecord {
        if let Some(&(lat, lon)) = self.centroids.get(country_code) {
            return LocationRecord::new(country_code, lat, lon, LocationSource::Geometry);
        }
        if let Some(&(_, lat, lon)) = FALLBACK_COORDINATES
            .iter()
            .find(|(code, _, _)| *code == country_code)
        {
            return LocationRecord::new(country_code, lat, lon, LocationSource::Fallback);
        }
        LocationRecord::unknown(country_code)
    }

    /// (latitude, longitude) of a country; (0, 0) when unknown.
    pub fn centroid(&self, country_code: &str) -> (f64, f64) {
        let location = self.locate(country_code);
        (location.latitude, location.longitude)
    }

    /// Whether the polygon dataset has this country.
    pub fn contains(&self, country_code: &str) -> bool {
        self.centroids.contains_key(country_code)
    }

    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rectangle(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> String {
        format!(
            "[[[{lon0},{lat0}],[{lon1},{lat0}],[{lon1},{lat1}],[{lon0},{lat1}],[{lon0},{lat0}]]]"
        )
    }

    fn collection(features: &[(&str, &str, String)]) -> String {
        let body: Vec<String> = features
            .iter()
            .map(|(code, kind, coordinates)| {
                format!(
                    r#"{{"type":"Feature","properties":{{"adm0_a3":"{code}"}},"geometry":{{"type":"{kind}","coordinates":{coordinates}}}}}"#
                )
            })
            .collect();
        format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, body.join(","))
    }

    #[test]
    fn test_centroid_is_taken_in_mercator() {
        let geojson = collection(&[("AAA", "Polygon", rectangle(0.0, 40.0, 10.0, 60.0))]);
        let index = GeometryIndex::from_geojson_str(&geojson).unwrap();
        let (lat, lon) = index.centroid("AAA");
        assert!((lon - 5.0).abs() < 1e-9);
        // Mercator stretches the north, so the centroid sits above 50N.
        assert!((lat - 51.0652).abs() < 1e-3, "lat was {}", lat);
    }

    #[test]
    fn test_multipolygon_parts_are_area_weighted() {
        let parts = format!(
            "[{},{}]",
            rectangle(0.0, 0.0, 2.0, 2.0),
            rectangle(10.0, 0.0, 12.0, 2.0)
        );
        let geojson = collection(&[("BBB", "MultiPolygon", parts)]);
        let index = GeometryIndex::from_geojson_str(&geojson).unwrap();
        let (lat, lon) = index.centroid("BBB");
        assert!((lon - 6.0).abs() < 1e-9);
        assert!(lat > 0.9 && lat < 1.1);
    }

    #[test]
    fn test_holes_are_subtracted() {
        let with_hole = "[[[0,0],[10,0],[10,10],[0,10],[0,0]],[[0,0],[0,10],[5,10],[5,0],[0,0]]]".to_string();
        let geojson = collection(&[("CCC", "Polygon", with_hole)]);
        let index = GeometryIndex::from_geojson_str(&geojson).unwrap();
        let (_, lon) = index.centroid("CCC");
        assert!((lon - 7.5).abs() < 1e-6, "lon was {}", lon);
    }

    #[test]
    fn test_fallback_chain() {
        let geojson = collection(&[("LUX", "Polygon", rectangle(5.7, 49.4, 6.5, 50.2))]);
        let index = GeometryIndex::from_geojson_str(&geojson).unwrap();

        let lux = index.locate("LUX");
        assert_eq!(lux.source, LocationSource::Geometry);

        let sgp = index.locate("SGP");
        assert_eq!(sgp.source, LocationSource::Fallback);
        assert_eq!((sgp.latitude, sgp.longitude), (1.3521, 103.8198));

        let unknown = index.locate("XYZ");
        assert_eq!(unknown.source, LocationSource::Unknown);
        assert_eq!(index.centroid("XYZ"), (0.0, 0.0));
        assert!(!unknown.is_usable());
        assert!(sgp.is_usable());
    }

    #[test]
    fn test_features_without_codes_or_polygons_are_ignored() {
        let geojson = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"adm0_a3":"-99"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
            {"type":"Feature","properties":{"name":"nowhere"},"geometry":null},
            {"type":"Feature","properties":{"iso_a3":"PTS"},"geometry":{"type":"Point","coordinates":[1,2]}}
        ]}"#;
        let index = GeometryIndex::from_geojson_str(geojson).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_malformed_geojson_is_a_load_error() {
        assert!(matches!(
            GeometryIndex::from_geojson_str("{not json"),
            Err(DataLoadError::JsonParse(_))
        ));
        assert!(matches!(
            GeometryIndex::load("/definitely/not/here.geojson"),
            Err(DataLoadError::Missing { .. })
        ));
    }
}
