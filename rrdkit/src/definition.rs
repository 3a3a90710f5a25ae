//! Database definitions for `rrdtool create`.
//!
//! These types describe the data sources and archives of a round-robin
//! database. They are validated locally and then rendered into the
//! `DS:` and `RRA:` tokens the engine expects; the engine itself does the
//! storage and consolidation.
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use std::time::Duration;
//! use rrdkit::definition::{DataSource, DatabaseDefinition};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = DatabaseDefinition::builder()
//!     .step(Duration::from_secs(22))
//!     .data_source(DataSource::gauge("gb_used", Duration::from_secs(63)))
//!     .average(10, 20)
//!     .build()?;
//!
//! assert_eq!(
//!     definition.create_args(Path::new("/tmp/disk.rrd")),
//!     vec![
//!         "/tmp/disk.rrd",
//!         "--step",
//!         "22",
//!         "DS:gb_used:GAUGE:63:U:U",
//!         "RRA:AVERAGE:0.5:10:20",
//!     ],
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, Result};
use crate::time::{TimeSpec, secs_serde};

/// Default x-files factor for archives.
pub const DEFAULT_XFF: f64 = 0.5;

static DS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{1,19}$").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Returns `true` if `name` is a legal data-source name.
///
/// The engine accepts 1 to 19 characters from `[A-Za-z0-9_]`.
pub fn is_valid_name(name: &str) -> bool {
    DS_NAME.is_match(name)
}

/// The kind of a data source, as the engine names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Stores the value as-is.
    Gauge,
    /// A monotonically increasing counter; the engine stores its rate.
    Counter,
    /// Like a counter but may decrease.
    Derive,
    /// A counter that resets on every read.
    Absolute,
    /// Computed from other data sources with an RPN expression.
    Compute,
}

impl DataSourceKind {
    /// The engine token for this kind.
    pub fn token(self) -> &'static str {
        match self {
            Self::Gauge => "GAUGE",
            Self::Counter => "COUNTER",
            Self::Derive => "DERIVE",
            Self::Absolute => "ABSOLUTE",
            Self::Compute => "COMPUTE",
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GAUGE" => Ok(Self::Gauge),
            "COUNTER" => Ok(Self::Counter),
            "DERIVE" => Ok(Self::Derive),
            "ABSOLUTE" => Ok(Self::Absolute),
            "COMPUTE" => Ok(Self::Compute),
            _ => Err(s.to_string()),
        }
    }
}

/// Heartbeat and value bounds shared by every non-computed data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Longest gap between updates before the value becomes unknown.
    #[serde(with = "secs_serde")]
    pub heartbeat: Duration,

    /// Values below this are stored as unknown. `None` is unbounded.
    #[serde(default)]
    pub min: Option<f64>,

    /// Values above this are stored as unknown. `None` is unbounded.
    #[serde(default)]
    pub max: Option<f64>,
}

/// What a data source records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataSourceSpec {
    /// A gauge.
    Gauge(Limits),
    /// A counter.
    Counter(Limits),
    /// A derive.
    Derive(Limits),
    /// An absolute counter.
    Absolute(Limits),
    /// A computed data source.
    Compute {
        /// RPN expression over other data sources of the same database.
        expression: String,
    },
}

impl DataSourceSpec {
    /// Returns the kind of this spec.
    pub fn kind(&self) -> DataSourceKind {
        match self {
            Self::Gauge(_) => DataSourceKind::Gauge,
            Self::Counter(_) => DataSourceKind::Counter,
            Self::Derive(_) => DataSourceKind::Derive,
            Self::Absolute(_) => DataSourceKind::Absolute,
            Self::Compute { .. } => DataSourceKind::Compute,
        }
    }

    /// Returns the limits of a non-computed spec.
    pub fn limits(&self) -> Option<&Limits> {
        match self {
            Self::Gauge(l) | Self::Counter(l) | Self::Derive(l) | Self::Absolute(l) => Some(l),
            Self::Compute { .. } => None,
        }
    }

    fn limits_mut(&mut self) -> Option<&mut Limits> {
        match self {
            Self::Gauge(l) | Self::Counter(l) | Self::Derive(l) | Self::Absolute(l) => Some(l),
            Self::Compute { .. } => None,
        }
    }
}

/// A named metric definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Data-source name, unique within a database.
    pub name: String,

    /// Kind and parameters.
    #[serde(flatten)]
    pub spec: DataSourceSpec,
}

impl DataSource {
    fn with_limits(name: impl Into<String>, kind: DataSourceKind, heartbeat: Duration) -> Self {
        let limits = Limits {
            heartbeat,
            min: None,
            max: None,
        };
        let spec = match kind {
            DataSourceKind::Gauge => DataSourceSpec::Gauge(limits),
            DataSourceKind::Counter => DataSourceSpec::Counter(limits),
            DataSourceKind::Derive => DataSourceSpec::Derive(limits),
            DataSourceKind::Absolute => DataSourceSpec::Absolute(limits),
            DataSourceKind::Compute => DataSourceSpec::Compute {
                expression: String::new(),
            },
        };
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Creates a gauge with unbounded min/max.
    pub fn gauge(name: impl Into<String>, heartbeat: Duration) -> Self {
        Self::with_limits(name, DataSourceKind::Gauge, heartbeat)
    }

    /// Creates a counter with unbounded min/max.
    pub fn counter(name: impl Into<String>, heartbeat: Duration) -> Self {
        Self::with_limits(name, DataSourceKind::Counter, heartbeat)
    }

    /// Creates a derive with unbounded min/max.
    pub fn derive(name: impl Into<String>, heartbeat: Duration) -> Self {
        Self::with_limits(name, DataSourceKind::Derive, heartbeat)
    }

    /// Creates an absolute counter with unbounded min/max.
    pub fn absolute(name: impl Into<String>, heartbeat: Duration) -> Self {
        Self::with_limits(name, DataSourceKind::Absolute, heartbeat)
    }

    /// Creates a computed data source.
    pub fn compute(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: DataSourceSpec::Compute {
                expression: expression.into(),
            },
        }
    }

    /// Sets the lower bound. Has no effect on computed data sources.
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        if let Some(limits) = self.spec.limits_mut() {
            limits.min = Some(min);
        }
        self
    }

    /// Sets the upper bound. Has no effect on computed data sources.
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        if let Some(limits) = self.spec.limits_mut() {
            limits.max = Some(max);
        }
        self
    }

    /// Returns the kind of this data source.
    pub fn kind(&self) -> DataSourceKind {
        self.spec.kind()
    }

    /// Returns `true` for computed data sources, which cannot be updated.
    pub fn is_computed(&self) -> bool {
        matches!(self.spec, DataSourceSpec::Compute { .. })
    }

    /// Validates this data source.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] if the name is illegal, the heartbeat is
    /// under one second, `min > max`, or a computed expression is empty.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(DefinitionError::InvalidName {
                name: self.name.clone(),
            }
            .into());
        }

        match &self.spec {
            DataSourceSpec::Compute { expression } => {
                if expression.trim().is_empty() {
                    return Err(DefinitionError::EmptyExpression {
                        name: self.name.clone(),
                    }
                    .into());
                }
            }
            DataSourceSpec::Gauge(limits)
            | DataSourceSpec::Counter(limits)
            | DataSourceSpec::Derive(limits)
            | DataSourceSpec::Absolute(limits) => {
                if limits.heartbeat.as_secs() == 0 {
                    return Err(DefinitionError::ZeroHeartbeat {
                        name: self.name.clone(),
                    }
                    .into());
                }
                if let (Some(min), Some(max)) = (limits.min, limits.max)
                    && min > max
                {
                    return Err(DefinitionError::InvalidRange {
                        name: self.name.clone(),
                        min,
                        max,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.spec {
            DataSourceSpec::Compute { expression } => {
                write!(f, "DS:{}:COMPUTE:{}", self.name, expression)
            }
            DataSourceSpec::Gauge(limits)
            | DataSourceSpec::Counter(limits)
            | DataSourceSpec::Derive(limits)
            | DataSourceSpec::Absolute(limits) => {
                write!(
                    f,
                    "DS:{}:{}:{}:{}:{}",
                    self.name,
                    self.kind(),
                    limits.heartbeat.as_secs(),
                    Bound(limits.min),
                    Bound(limits.max),
                )
            }
        }
    }
}

/// Renders an optional bound, `U` when unbounded.
struct Bound(Option<f64>);

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) if v.is_finite() => write!(f, "{v}"),
            _ => f.write_str("U"),
        }
    }
}

/// Function the engine uses to consolidate primary data points into an
/// archive row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationFn {
    /// Arithmetic mean.
    Average,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Last value.
    Last,
}

impl ConsolidationFn {
    /// The engine token for this function.
    pub fn token(self) -> &'static str {
        match self {
            Self::Average => "AVERAGE",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Last => "LAST",
        }
    }
}

impl fmt::Display for ConsolidationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ConsolidationFn {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVERAGE" => Ok(Self::Average),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            "LAST" => Ok(Self::Last),
            _ => Err(s.to_string()),
        }
    }
}

fn default_xff() -> f64 {
    DEFAULT_XFF
}

/// A consolidation policy with a retention depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    /// Consolidation function.
    pub cf: ConsolidationFn,

    /// Fraction of a consolidation interval that may be unknown while the
    /// consolidated value is still considered known. In `[0, 1)`.
    #[serde(default = "default_xff")]
    pub xff: f64,

    /// Primary data points per archive row.
    pub steps: u32,

    /// Rows kept by the archive.
    pub rows: u32,
}

impl Archive {
    /// Creates an archive with the default x-files factor.
    pub fn new(cf: ConsolidationFn, steps: u32, rows: u32) -> Self {
        Self {
            cf,
            xff: DEFAULT_XFF,
            steps,
            rows,
        }
    }

    /// Sets the x-files factor.
    #[must_use]
    pub fn with_xff(mut self, xff: f64) -> Self {
        self.xff = xff;
        self
    }

    /// Validates this archive.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidArchive`] if `xff` is outside
    /// `[0, 1)` or `steps`/`rows` is zero.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.xff) {
            return Err(DefinitionError::InvalidArchive {
                reason: format!("xff {} must be in [0, 1)", self.xff),
            }
            .into());
        }
        if self.steps == 0 {
            return Err(DefinitionError::InvalidArchive {
                reason: "steps must be at least 1".to_string(),
            }
            .into());
        }
        if self.rows == 0 {
            return Err(DefinitionError::InvalidArchive {
                reason: "rows must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RRA:{}:{}:{}:{}",
            self.cf, self.xff, self.steps, self.rows
        )
    }
}

/// Everything needed to create a database.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatabaseDefinition {
    /// Time of the first value. The engine defaults to `now-10s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimeSpec>,

    /// Base interval between primary data points. The engine defaults to
    /// 300 seconds.
    #[serde(
        default,
        with = "secs_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub step: Option<Duration>,

    /// Refuse to overwrite an existing file.
    #[serde(default)]
    pub no_overwrite: bool,

    /// Data sources in engine order.
    #[serde(default)]
    pub data_sources: Vec<DataSource>,

    /// Archives in engine order.
    #[serde(default)]
    pub archives: Vec<Archive>,
}

impl DatabaseDefinition {
    /// Starts building a definition.
    pub fn builder() -> DefinitionBuilder {
        DefinitionBuilder::default()
    }

    /// Loads a definition from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Load`] if the file cannot be read or
    /// parsed, or any validation error from [`validate`](Self::validate).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| DefinitionError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let definition: Self = serde_json::from_str(&data).map_err(|e| DefinitionError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] if there are no data sources or no
    /// archives, a name repeats, the step is zero, or any data source or
    /// archive is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data_sources.is_empty() {
            return Err(DefinitionError::NoDataSources.into());
        }
        if self.archives.is_empty() {
            return Err(DefinitionError::NoArchives.into());
        }
        if let Some(step) = self.step
            && step.as_secs() == 0
        {
            return Err(DefinitionError::ZeroStep.into());
        }

        let mut seen = HashSet::new();
        for ds in &self.data_sources {
            ds.validate()?;
            if !seen.insert(ds.name.as_str()) {
                return Err(DefinitionError::DuplicateName {
                    name: ds.name.clone(),
                }
                .into());
            }
        }

        for archive in &self.archives {
            archive.validate()?;
        }

        Ok(())
    }

    /// Produces the argument list for `rrdtool create`.
    ///
    /// The path comes first, then options, then data sources and archives
    /// in insertion order. Call [`validate`](Self::validate) first; this
    /// method renders whatever it is given.
    pub fn create_args(&self, path: &Path) -> Vec<String> {
        let mut args = vec![path.to_string_lossy().into_owned()];
        if let Some(start) = &self.start {
            args.push("--start".to_string());
            args.push(start.to_string());
        }
        if let Some(step) = self.step {
            args.push("--step".to_string());
            args.push(step.as_secs().to_string());
        }
        if self.no_overwrite {
            args.push("--no-overwrite".to_string());
        }
        args.extend(self.data_sources.iter().map(ToString::to_string));
        args.extend(self.archives.iter().map(ToString::to_string));
        args
    }
}

/// Accumulates data sources and archives for a [`DatabaseDefinition`].
#[derive(Debug, Default)]
pub struct DefinitionBuilder {
    definition: DatabaseDefinition,
}

impl DefinitionBuilder {
    /// Sets the start time.
    #[must_use]
    pub fn start(mut self, start: impl Into<TimeSpec>) -> Self {
        self.definition.start = Some(start.into());
        self
    }

    /// Sets the step.
    #[must_use]
    pub fn step(mut self, step: Duration) -> Self {
        self.definition.step = Some(step);
        self
    }

    /// Refuses to overwrite an existing file.
    #[must_use]
    pub fn no_overwrite(mut self) -> Self {
        self.definition.no_overwrite = true;
        self
    }

    /// Adds a data source.
    #[must_use]
    pub fn data_source(mut self, ds: DataSource) -> Self {
        self.definition.data_sources.push(ds);
        self
    }

    /// Adds an unbounded gauge.
    #[must_use]
    pub fn gauge(self, name: impl Into<String>, heartbeat: Duration) -> Self {
        self.data_source(DataSource::gauge(name, heartbeat))
    }

    /// Adds an unbounded counter.
    #[must_use]
    pub fn counter(self, name: impl Into<String>, heartbeat: Duration) -> Self {
        self.data_source(DataSource::counter(name, heartbeat))
    }

    /// Adds an unbounded derive.
    #[must_use]
    pub fn derive(self, name: impl Into<String>, heartbeat: Duration) -> Self {
        self.data_source(DataSource::derive(name, heartbeat))
    }

    /// Adds an unbounded absolute counter.
    #[must_use]
    pub fn absolute(self, name: impl Into<String>, heartbeat: Duration) -> Self {
        self.data_source(DataSource::absolute(name, heartbeat))
    }

    /// Adds a computed data source.
    #[must_use]
    pub fn compute(self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.data_source(DataSource::compute(name, expression))
    }

    /// Adds an archive.
    #[must_use]
    pub fn archive(mut self, archive: Archive) -> Self {
        self.definition.archives.push(archive);
        self
    }

    /// Adds an AVERAGE archive with the default x-files factor.
    #[must_use]
    pub fn average(self, steps: u32, rows: u32) -> Self {
        self.archive(Archive::new(ConsolidationFn::Average, steps, rows))
    }

    /// Adds a MIN archive with the default x-files factor.
    #[must_use]
    pub fn min(self, steps: u32, rows: u32) -> Self {
        self.archive(Archive::new(ConsolidationFn::Min, steps, rows))
    }

    /// Adds a MAX archive with the default x-files factor.
    #[must_use]
    pub fn max(self, steps: u32, rows: u32) -> Self {
        self.archive(Archive::new(ConsolidationFn::Max, steps, rows))
    }

    /// Adds a LAST archive with the default x-files factor.
    #[must_use]
    pub fn last(self, steps: u32, rows: u32) -> Self {
        self.archive(Archive::new(ConsolidationFn::Last, steps, rows))
    }

    /// Validates and returns the definition.
    ///
    /// # Errors
    ///
    /// Returns any error from [`DatabaseDefinition::validate`].
    pub fn build(self) -> Result<DatabaseDefinition> {
        self.definition.validate()?;
        Ok(self.definition)
    }
}
