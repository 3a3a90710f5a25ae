//! Time values understood by the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timestamp attached to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateTime {
    /// Let the engine use its current time (`N`).
    #[default]
    Now,
    /// An explicit time in seconds since the Unix epoch.
    At(u64),
}

impl fmt::Display for UpdateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str("N"),
            Self::At(secs) => write!(f, "{secs}"),
        }
    }
}

impl From<u64> for UpdateTime {
    fn from(secs: u64) -> Self {
        Self::At(secs)
    }
}

/// Engine keyword for its current time.
const NOW: &str = "now";

/// A point in time for `--start`/`--end` style arguments.
///
/// The engine accepts both raw epoch seconds and its own AT-style
/// expressions such as `now-1d` or `end-2h`; expressions are passed through
/// untouched. A bare `now` is always [`TimeSpec::Now`].
///
/// In JSON a time is either an integer (epoch seconds) or a string.
///
/// ```rust
/// use rrdkit::time::TimeSpec;
///
/// assert_eq!(TimeSpec::from(1_700_000_000).to_string(), "1700000000");
/// assert_eq!(TimeSpec::from("now-1h").to_string(), "now-1h");
/// assert_eq!(TimeSpec::from("now"), TimeSpec::Now);
/// assert_eq!(TimeSpec::Now.to_string(), "now");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "TimeSpecRepr", into = "TimeSpecRepr")]
pub enum TimeSpec {
    /// The engine's current time.
    Now,
    /// Seconds since the Unix epoch.
    Epoch(u64),
    /// An engine time expression.
    Expr(String),
}

/// Wire form of [`TimeSpec`].
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TimeSpecRepr {
    Epoch(u64),
    Expr(String),
}

impl From<TimeSpecRepr> for TimeSpec {
    fn from(repr: TimeSpecRepr) -> Self {
        match repr {
            TimeSpecRepr::Epoch(secs) => Self::Epoch(secs),
            TimeSpecRepr::Expr(expr) => Self::from(expr),
        }
    }
}

impl From<TimeSpec> for TimeSpecRepr {
    fn from(spec: TimeSpec) -> Self {
        match spec {
            TimeSpec::Now => Self::Expr(NOW.to_string()),
            TimeSpec::Epoch(secs) => Self::Epoch(secs),
            TimeSpec::Expr(expr) => Self::Expr(expr),
        }
    }
}

impl TimeSpec {
    /// The engine's current time.
    pub fn now() -> Self {
        Self::Now
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str(NOW),
            Self::Epoch(secs) => write!(f, "{secs}"),
            Self::Expr(expr) => f.write_str(expr),
        }
    }
}

impl From<u64> for TimeSpec {
    fn from(secs: u64) -> Self {
        Self::Epoch(secs)
    }
}

impl From<&str> for TimeSpec {
    fn from(expr: &str) -> Self {
        if expr == NOW {
            Self::Now
        } else {
            Self::Expr(expr.to_string())
        }
    }
}

impl From<String> for TimeSpec {
    fn from(expr: String) -> Self {
        if expr == NOW { Self::Now } else { Self::Expr(expr) }
    }
}

/// Serde support for whole-second `Duration` fields.
///
/// The engine only deals in whole seconds, so durations are written as
/// integer seconds and any sub-second part is dropped.
pub(crate) mod secs_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(|d| d.as_secs()).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let seconds = Option::<u64>::deserialize(deserializer)?;
            Ok(seconds.map(Duration::from_secs))
        }
    }
}
