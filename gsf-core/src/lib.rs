//! Reference data and forecast retrieval for the global solar forecast.

pub mod cache;
pub mod capacity;
pub mod country;
pub mod error;
pub mod forecast;
pub mod geometry;
pub mod timezone;
pub mod transport;
