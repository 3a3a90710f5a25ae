//! Parser for `rrdtool fetch` output.
//!
//! ```text
//!                           in          out
//!
//! 1700000000: 1.2000000000e+01 -nan
//! 1700000060: 1.3500000000e+01 4.0000000000e+00
//! ```
//!
//! The first non-empty line names the columns; each following line is a
//! timestamp and one value per column. Unknown values (`nan`, `-nan`,
//! `NaN`) come back as `None`.

use serde::Serialize;

use crate::error::{InfoError, Result};

/// One row of fetched data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRow {
    /// End of the consolidation interval, in epoch seconds.
    pub timestamp: u64,
    /// One value per column, `None` when unknown.
    pub values: Vec<Option<f64>>,
}

/// Consolidated data returned by `fetch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchResult {
    /// Column (data-source) names in engine order.
    pub names: Vec<String>,
    /// Rows in time order.
    pub rows: Vec<FetchRow>,
}

/// Spellings the engine uses for an unknown value.
const UNKNOWN_TOKENS: [&str; 4] = ["nan", "-nan", "NaN", "-NaN"];

/// Parses one value cell. The outer `None` means the token is not a
/// number; the inner `None` means unknown.
fn parse_value(raw: &str) -> Option<Option<f64>> {
    if UNKNOWN_TOKENS.contains(&raw) {
        return Some(None);
    }
    let value = raw.parse::<f64>().ok()?;
    Some((!value.is_nan()).then_some(value))
}

impl FetchResult {
    /// Parses the body of a `fetch` reply.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError::MalformedRow`] if a row has no `timestamp:`
    /// prefix, a bad timestamp, an unparsable value, or the wrong number of
    /// values.
    pub fn parse<'a, I>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = Self::default();
        let mut header_seen = false;

        for (n, line) in lines.into_iter().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !header_seen {
                result.names = line.split_whitespace().map(str::to_string).collect();
                header_seen = true;
                continue;
            }

            let malformed = |reason: String| InfoError::MalformedRow { line: n + 1, reason };

            let (ts, rest) = line
                .split_once(':')
                .ok_or_else(|| malformed("missing 'timestamp:' prefix".to_string()))?;
            let timestamp = ts
                .trim()
                .parse::<u64>()
                .map_err(|e| malformed(format!("bad timestamp '{ts}': {e}")))?;

            let mut values = Vec::with_capacity(result.names.len());
            for raw in rest.split_whitespace() {
                let value =
                    parse_value(raw).ok_or_else(|| malformed(format!("bad value '{raw}'")))?;
                values.push(value);
            }
            if values.len() != result.names.len() {
                return Err(malformed(format!(
                    "expected {} values, found {}",
                    result.names.len(),
                    values.len()
                ))
                .into());
            }

            result.rows.push(FetchRow { timestamp, values });
        }

        Ok(result)
    }

    /// Returns `(timestamp, value)` pairs for one column.
    pub fn column(&self, name: &str) -> Option<Vec<(u64, Option<f64>)>> {
        let index = self.names.iter().position(|n| n == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| (row.timestamp, row.values.get(index).copied().flatten()))
                .collect(),
        )
    }

    /// Spacing between rows in seconds, if there are at least two rows.
    pub fn resolution(&self) -> Option<u64> {
        match self.rows.as_slice() {
            [first, second, ..] => second.timestamp.checked_sub(first.timestamp),
            _ => None,
        }
    }

    /// Returns `true` if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
