//! Engine configuration.
//!
//! An [`EngineConfig`] names the `rrdtool` binary every other module shells
//! out to. Values come from, in order of precedence: explicit setters, a
//! JSON configuration file, the `RRDKIT_RRDTOOL` environment variable, and
//! the default of `rrdtool` resolved through `PATH`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Environment variable that overrides the engine binary.
pub const BINARY_ENV: &str = "RRDKIT_RRDTOOL";

/// Binary name used when nothing else is configured.
pub const DEFAULT_BINARY: &str = "rrdtool";

/// Configuration for locating and running the engine.
///
/// # Example
///
/// ```rust
/// use rrdkit::config::EngineConfig;
///
/// let config = EngineConfig::default().with_binary("/usr/local/bin/rrdtool");
/// assert_eq!(config.binary.to_str(), Some("/usr/local/bin/rrdtool"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path (or bare name, looked up on `PATH`) of the engine binary.
    pub binary: PathBuf,

    /// Working directory for engine processes. Relative database paths are
    /// resolved against it by the engine.
    pub working_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            working_dir: None,
        }
    }
}

/// Fields as written in a configuration file; absent keys stay `None` so
/// they fall through to the environment.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    binary: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Builds a configuration from the environment.
    ///
    /// Uses `RRDKIT_RRDTOOL` when it is set and non-empty, otherwise the
    /// default binary name.
    pub fn from_env() -> Self {
        Self::with_env_binary(std::env::var_os(BINARY_ENV))
    }

    fn with_env_binary(binary: Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(binary) = binary
            && !binary.is_empty()
        {
            config.binary = PathBuf::from(binary);
        }
        config
    }

    /// Loads a configuration from a JSON file.
    ///
    /// Keys present in the file win. Missing keys come from
    /// [`from_env`](Self::from_env), so `{}` is a valid file and a file
    /// that only sets `working_dir` still honours `RRDKIT_RRDTOOL`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid JSON for this type.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_env().overlay_file(path.as_ref())
    }

    /// Applies the keys set in `path` on top of `self`.
    fn overlay_file(mut self, path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        if let Some(binary) = file.binary {
            self.binary = binary;
        }
        if let Some(dir) = file.working_dir {
            self.working_dir = Some(dir);
        }
        Ok(self)
    }

    /// Replaces the engine binary.
    #[must_use]
    pub fn with_binary<P: Into<PathBuf>>(mut self, binary: P) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sets the working directory for engine processes.
    #[must_use]
    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary() {
        let config = EngineConfig::default();
        assert_eq!(config.binary, PathBuf::from("rrdtool"));
        assert!(config.working_dir.is_none());
    }

    #[test]
    fn test_env_binary() {
        let config = EngineConfig::with_env_binary(Some("/opt/custom/rrdtool".into()));
        assert_eq!(config.binary, PathBuf::from("/opt/custom/rrdtool"));
        assert!(config.working_dir.is_none());

        // Unset and empty both mean the default binary.
        assert_eq!(EngineConfig::with_env_binary(None), EngineConfig::default());
        assert_eq!(
            EngineConfig::with_env_binary(Some(OsString::new())),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_file_overlays_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let env = EngineConfig::with_env_binary(Some("/opt/custom/rrdtool".into()));

        // A file without a binary keeps the environment's choice.
        std::fs::write(&path, r#"{"working_dir": "/var/lib/rrd"}"#).unwrap();
        let config = env.clone().overlay_file(&path).unwrap();
        assert_eq!(config.binary, PathBuf::from("/opt/custom/rrdtool"));
        assert_eq!(config.working_dir, Some(PathBuf::from("/var/lib/rrd")));

        // A binary in the file beats the environment.
        std::fs::write(&path, r#"{"binary": "/opt/rrdtool/bin/rrdtool"}"#).unwrap();
        let config = env.clone().overlay_file(&path).unwrap();
        assert_eq!(config.binary, PathBuf::from("/opt/rrdtool/bin/rrdtool"));
        assert!(config.working_dir.is_none());

        std::fs::write(&path, "{}").unwrap();
        assert_eq!(env.clone().overlay_file(&path).unwrap(), env);
        assert_eq!(
            EngineConfig::default().overlay_file(&path).unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = EngineConfig::from_file(&missing).unwrap_err();
        assert!(matches!(
            err,
            crate::RrdError::Config(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        let err = EngineConfig::from_file(&bad).unwrap_err();
        assert!(matches!(
            err,
            crate::RrdError::Config(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_binary("/bin/rrd")
            .with_working_dir("/var/lib/rrd");
        assert_eq!(config.binary, PathBuf::from("/bin/rrd"));
        assert_eq!(config.working_dir, Some(PathBuf::from("/var/lib/rrd")));
    }
}
