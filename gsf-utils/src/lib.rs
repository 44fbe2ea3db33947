//! Shared utility functions for GSF crates.

/// Date and time helpers for hour-aligned forecast horizons.
pub mod dates {
    use crate::error::TimestampError;
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use chrono_tz::Tz;

    /// Seconds in one forecast step.
    pub const SECONDS_PER_HOUR: i64 = 3600;

    /// Naive formats accepted from the forecast service, tried in order.
    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];

    /// Truncate an instant to the start of its UTC hour.
    pub fn floor_to_hour(instant: &DateTime<Utc>) -> DateTime<Utc> {
        let secs = instant.timestamp();
        let floored = secs - secs.rem_euclid(SECONDS_PER_HOUR);
        DateTime::from_timestamp(floored, 0).unwrap_or(*instant)
    }

    /// Number of whole hours since the epoch; two instants in the same UTC
    /// hour share a bucket.
    pub fn hour_bucket(instant: &DateTime<Utc>) -> i64 {
        instant.timestamp().div_euclid(SECONDS_PER_HOUR)
    }

    /// Format an instant the way the forecast service expects it:
    /// naive UTC, "YYYY-MM-DDTHH:MM:SS".
    pub fn format_request_timestamp(instant: &DateTime<Utc>) -> String {
        instant.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    /// Parse a timestamp returned by the forecast service.
    ///
    /// RFC 3339 strings keep their offset; naive strings are taken as UTC.
    pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimestampError> {
        let trimmed = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(dt.with_timezone(&Utc));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
        Err(TimestampError(trimmed.to_string()))
    }

    /// Convert a UTC instant to wall-clock time in `zone`.
    pub fn to_local(instant: &DateTime<Utc>, zone: &Tz) -> DateTime<Tz> {
        instant.with_timezone(zone)
    }

}

/// Local polynomial smoothing for power series.
pub mod signal {
    /// Window length used for forecast smoothing.
    pub const DEFAULT_WINDOW: usize = 10;

    /// Polynomial order used for forecast smoothing.
    pub const DEFAULT_POLYORDER: usize = 2;

    /// Savitzky-Golay style filter: every output sample is the value at that
    /// sample of a least-squares polynomial of `polyorder` fitted over the
    /// `window` samples around it. Near the edges the window is pinned to the
    /// first or last `window` samples. A series shorter than the window is
    /// fitted as a whole; one too short to fit is returned unchanged.
    pub fn savgol_filter(values: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
        let n = values.len();
        let window = window.min(n);
        if window == 0 {
            return values.to_vec();
        }
        let order = polyorder.min(window - 1);
        let half = window / 2;

        (0..n)
            .map(|i| {
                let start = i.saturating_sub(half).min(n - window);
                let offset = (i - start) as f64;
                fit_at(&values[start..start + window], offset, order).unwrap_or(values[i])
            })
            .collect()
    }

    /// Smooth a non-negative power series.
    ///
    /// Samples that were exactly zero stay exactly zero and the result never
    /// goes below zero.
    pub fn smooth_nonnegative(values: &[f64], window: usize, polyorder: usize) -> Vec<f64> {
        savgol_filter(values, window, polyorder)
            .into_iter()
            .zip(values)
            .map(|(smoothed, &raw)| if raw == 0.0 { 0.0 } else { smoothed.max(0.0) })
            .collect()
    }

    /// Fit a polynomial of `order` to `ys` (sampled at 0, 1, 2, ...) and
    /// evaluate it at `at`. Positions are shifted so `at` is the origin, which
    /// makes the answer the constant coefficient.
    fn fit_at(ys: &[f64], at: f64, order: usize) -> Option<f64> {
        let size = order + 1;
        let mut normal = vec![vec![0.0; size + 1]; size];
        for (k, &y) in ys.iter().enumerate() {
            let t = k as f64 - at;
            let mut powers = vec![1.0; 2 * size - 1];
            for p in 1..powers.len() {
                powers[p] = powers[p - 1] * t;
            }
            for (row, coefficients) in normal.iter_mut().enumerate() {
                for col in 0..size {
                    coefficients[col] += powers[row + col];
                }
                coefficients[size] += powers[row] * y;
            }
        }
        solve(normal).map(|solution| solution[0])
    }

    /// Gaussian elimination with partial pivoting on an augmented matrix.
    fn solve(mut m: Vec<Vec<f64>>) -> Option<Vec<f64>> {
        let size = m.len();
        for col in 0..size {
            let pivot = (col..size).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
            if m[pivot][col].abs() < 1e-12 {
                return None;
            }
            m.swap(col, pivot);
            let pivot_row = m[col].clone();
            for row in m.iter_mut().skip(col + 1) {
                let factor = row[col] / pivot_row[col];
                for k in col..=size {
                    row[k] -= factor * pivot_row[k];
                }
            }
        }
        let mut solution = vec![0.0; size];
        for row in (0..size).rev() {
            let tail: f64 = (row + 1..size).map(|k| m[row][k] * solution[k]).sum();
            solution[row] = (m[row][size] - tail) / m[row][row];
        }
        Some(solution)
    }

}

/// Error types
pub mod error {
    use thiserror::Error;

    /// A timestamp string matched none of the accepted formats
    #[derive(Error, Debug, Clone, PartialEq)]
    #[error("Unrecognised timestamp: {0}")]
    pub struct TimestampError(pub String);
}
