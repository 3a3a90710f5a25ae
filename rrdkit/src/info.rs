//! Parser for `rrdtool info` output.
//!
//! The engine dumps a database header as `key = value` lines:
//!
//! ```text
//! filename = "disk.rrd"
//! step = 22
//! last_update = 1700000000
//! ds[gb_used].type = "GAUGE"
//! ds[gb_used].minimal_heartbeat = 63
//! ds[gb_used].min = NaN
//! rra[0].cf = "AVERAGE"
//! rra[0].pdp_per_row = 10
//! rra[0].cdp_prep[0].value = NaN
//! ```
//!
//! Lines are matched against a small set of patterns and grouped into
//! attribute maps per data source and per archive. Nested keys such as
//! `rra[0].cdp_prep[0].value` carry per-row state the client has no use for
//! and are skipped.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::definition::{Archive, ConsolidationFn, DataSource, DataSourceKind};
use crate::error::{InfoError, Result};

macro_rules! pattern {
    ($re:literal) => {
        LazyLock::new(|| Regex::new($re).unwrap_or_else(|e| unreachable!("static pattern: {e}")))
    };
}

static STEP: LazyLock<Regex> = pattern!(r"^step = ([0-9]+)$");
static DS_LINE: LazyLock<Regex> = pattern!(r"^ds\[([A-Za-z0-9_]+)\]\.([a-z_]+) = (.*)$");
static RRA_LINE: LazyLock<Regex> = pattern!(r"^rra\[([A-Za-z0-9_]+)\]\.([a-z_]+) = (.*)$");
static TOP_LINE: LazyLock<Regex> = pattern!(r"^([a-z_]+) = (.*)$");

/// Removes one pair of surrounding double quotes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parses a numeric attribute; `NaN` and unknown markers become `None`.
fn number(value: &str) -> Option<f64> {
    match value.parse::<f64>() {
        Ok(v) if v.is_nan() => None,
        Ok(v) => Some(v),
        Err(_) => None,
    }
}

/// Parsed `info` output for one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RrdInfo {
    /// Top-level attributes (`filename`, `rrd_version`, `last_update`, ...).
    pub attributes: BTreeMap<String, String>,
    /// Base step in seconds.
    pub step: Option<u64>,
    /// Data sources in the order the engine listed them.
    pub data_sources: Vec<DataSourceInfo>,
    /// Archives in the order the engine listed them.
    pub archives: Vec<ArchiveInfo>,
}

/// Attributes of one data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataSourceInfo {
    /// Data-source name.
    pub name: String,
    /// Unquoted attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, String>,
}

/// Attributes of one archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveInfo {
    /// Archive index as printed by the engine.
    pub index: String,
    /// Unquoted attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, String>,
}

impl RrdInfo {
    /// Parses `info` output.
    ///
    /// Unrecognised lines are ignored. Attributes for the same data source
    /// or archive are merged even if the engine interleaves them.
    pub fn parse<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut info = Self::default();

        for line in lines {
            let line = line.trim_end();
            if let Some(caps) = STEP.captures(line) {
                info.step = caps[1].parse().ok();
                info.attributes.insert("step".to_string(), caps[1].to_string());
            } else if let Some(caps) = DS_LINE.captures(line) {
                let ds = match info.data_sources.iter().position(|d| d.name == caps[1]) {
                    Some(i) => &mut info.data_sources[i],
                    None => {
                        info.data_sources.push(DataSourceInfo {
                            name: caps[1].to_string(),
                            attributes: BTreeMap::new(),
                        });
                        let last = info.data_sources.len() - 1;
                        &mut info.data_sources[last]
                    }
                };
                ds.attributes
                    .insert(caps[2].to_string(), unquote(&caps[3]).to_string());
            } else if let Some(caps) = RRA_LINE.captures(line) {
                let rra = match info.archives.iter().position(|a| a.index == caps[1]) {
                    Some(i) => &mut info.archives[i],
                    None => {
                        info.archives.push(ArchiveInfo {
                            index: caps[1].to_string(),
                            attributes: BTreeMap::new(),
                        });
                        let last = info.archives.len() - 1;
                        &mut info.archives[last]
                    }
                };
                rra.attributes
                    .insert(caps[2].to_string(), unquote(&caps[3]).to_string());
            } else if let Some(caps) = TOP_LINE.captures(line) {
                info.attributes
                    .insert(caps[1].to_string(), unquote(&caps[2]).to_string());
            }
        }

        info
    }

    /// Parses `info` output held in one string.
    pub fn parse_str(text: &str) -> Self {
        Self::parse(text.lines())
    }

    /// The database file name as the engine reports it.
    pub fn filename(&self) -> Option<&str> {
        self.attributes.get("filename").map(String::as_str)
    }

    /// The on-disk format version.
    pub fn version(&self) -> Option<&str> {
        self.attributes.get("rrd_version").map(String::as_str)
    }

    /// Time of the last update, in epoch seconds.
    pub fn last_update(&self) -> Option<u64> {
        self.attributes.get("last_update")?.parse().ok()
    }

    /// Header size in bytes.
    pub fn header_size(&self) -> Option<u64> {
        self.attributes.get("header_size")?.parse().ok()
    }

    /// Looks up a data source by name.
    pub fn data_source(&self, name: &str) -> Option<&DataSourceInfo> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }

    /// Rebuilds definitions for every data source.
    ///
    /// # Errors
    ///
    /// Returns the first [`InfoError`] from
    /// [`DataSourceInfo::to_definition`].
    pub fn data_source_definitions(&self) -> Result<Vec<DataSource>> {
        self.data_sources
            .iter()
            .map(DataSourceInfo::to_definition)
            .collect()
    }

    /// Rebuilds definitions for every archive.
    ///
    /// # Errors
    ///
    /// Returns the first [`InfoError`] from [`ArchiveInfo::to_definition`].
    pub fn archive_definitions(&self) -> Result<Vec<Archive>> {
        self.archives.iter().map(ArchiveInfo::to_definition).collect()
    }
}

impl DataSourceInfo {
    fn entry(&self) -> String {
        format!("ds[{}]", self.name)
    }

    fn required(&self, attribute: &str) -> Result<&str> {
        self.attributes
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| {
                InfoError::MissingAttribute {
                    entry: self.entry(),
                    attribute: attribute.to_string(),
                }
                .into()
            })
    }

    /// The data-source kind.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `type` is missing or unknown.
    pub fn kind(&self) -> Result<DataSourceKind> {
        let raw = self.required("type")?;
        raw.parse::<DataSourceKind>()
            .map_err(|kind| InfoError::UnknownKind(kind).into())
    }

    /// The heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `minimal_heartbeat` is missing or not a
    /// whole number of seconds.
    pub fn heartbeat(&self) -> Result<Duration> {
        let raw = self.required("minimal_heartbeat")?;
        let secs = raw.parse::<u64>().map_err(|_| InfoError::InvalidValue {
            entry: self.entry(),
            attribute: "minimal_heartbeat".to_string(),
            value: raw.to_string(),
        })?;
        Ok(Duration::from_secs(secs))
    }

    /// Lower bound, `None` when unbounded.
    pub fn min(&self) -> Option<f64> {
        number(self.attributes.get("min")?)
    }

    /// Upper bound, `None` when unbounded.
    pub fn max(&self) -> Option<f64> {
        number(self.attributes.get("max")?)
    }

    /// Last raw value the engine received, as text (`U` when unknown).
    pub fn last_ds(&self) -> Option<&str> {
        self.attributes.get("last_ds").map(String::as_str)
    }

    /// Seconds of the current step for which the value is unknown.
    pub fn unknown_sec(&self) -> Option<u64> {
        self.attributes.get("unknown_sec")?.parse().ok()
    }

    /// Rebuilds the definition of this data source.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if the type, heartbeat or expression is
    /// missing or malformed.
    pub fn to_definition(&self) -> Result<DataSource> {
        let mut ds = match self.kind()? {
            DataSourceKind::Compute => {
                return Ok(DataSource::compute(self.name.clone(), self.required("cdef")?));
            }
            DataSourceKind::Gauge => DataSource::gauge(self.name.clone(), self.heartbeat()?),
            DataSourceKind::Counter => DataSource::counter(self.name.clone(), self.heartbeat()?),
            DataSourceKind::Derive => DataSource::derive(self.name.clone(), self.heartbeat()?),
            DataSourceKind::Absolute => DataSource::absolute(self.name.clone(), self.heartbeat()?),
        };
        if let Some(min) = self.min() {
            ds = ds.with_min(min);
        }
        if let Some(max) = self.max() {
            ds = ds.with_max(max);
        }
        Ok(ds)
    }
}

impl ArchiveInfo {
    fn entry(&self) -> String {
        format!("rra[{}]", self.index)
    }

    fn required(&self, attribute: &str) -> Result<&str> {
        self.attributes
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| {
                InfoError::MissingAttribute {
                    entry: self.entry(),
                    attribute: attribute.to_string(),
                }
                .into()
            })
    }

    fn integer(&self, attribute: &str) -> Result<u32> {
        let raw = self.required(attribute)?;
        raw.parse().map_err(|_| {
            InfoError::InvalidValue {
                entry: self.entry(),
                attribute: attribute.to_string(),
                value: raw.to_string(),
            }
            .into()
        })
    }

    /// The consolidation function.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `cf` is missing or not one of
    /// AVERAGE/MIN/MAX/LAST.
    pub fn cf(&self) -> Result<ConsolidationFn> {
        let raw = self.required("cf")?;
        raw.parse::<ConsolidationFn>()
            .map_err(|cf| InfoError::UnknownConsolidation(cf).into())
    }

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `rows` is missing or malformed.
    pub fn rows(&self) -> Result<u32> {
        self.integer("rows")
    }

    /// Primary data points per row.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `pdp_per_row` is missing or malformed.
    pub fn pdp_per_row(&self) -> Result<u32> {
        self.integer("pdp_per_row")
    }

    /// The x-files factor.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if `xff` is missing or not a number.
    pub fn xff(&self) -> Result<f64> {
        let raw = self.required("xff")?;
        number(raw).ok_or_else(|| {
            InfoError::InvalidValue {
                entry: self.entry(),
                attribute: "xff".to_string(),
                value: raw.to_string(),
            }
            .into()
        })
    }

    /// Current row pointer.
    pub fn cur_row(&self) -> Option<u64> {
        self.attributes.get("cur_row")?.parse().ok()
    }

    /// Rebuilds the definition of this archive.
    ///
    /// # Errors
    ///
    /// Returns [`InfoError`] if any of `cf`, `pdp_per_row`, `rows` or `xff`
    /// is missing or malformed.
    pub fn to_definition(&self) -> Result<Archive> {
        Ok(Archive::new(self.cf()?, self.pdp_per_row()?, self.rows()?).with_xff(self.xff()?))
    }
}
