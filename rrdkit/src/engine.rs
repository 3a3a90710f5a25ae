//! Engine process invocation.
//!
//! Two ways of running the engine are supported:
//!
//! - [`Engine::exec`] runs one command in a fresh process and captures its
//!   stdout. Used for `create` and `graph`, whose output is either nothing
//!   or binary image data.
//! - [`Engine::spawn_session`] starts the engine in pipe mode and returns a
//!   [`Session`] for many line-oriented commands over one process.

use std::process::{Command, Stdio};

use tracing::debug;

use crate::command::CommandLine;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::session::Session;

/// Handle for launching the engine binary.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine handle from a configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Creates an engine handle configured from the environment.
    ///
    /// See [`EngineConfig::from_env`].
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Runs one command in a new engine process and returns its stdout.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Spawn`] if the binary cannot be started.
    /// - [`EngineError::Exit`] if it exits unsuccessfully; the message is
    ///   the engine's stderr with any `ERROR: ` prefix removed.
    pub fn exec(&self, command: &CommandLine) -> Result<Vec<u8>> {
        debug!(
            binary = %self.config.binary.display(),
            "exec: {command}"
        );

        let output = self
            .command()
            .args(command.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| EngineError::Spawn {
                binary: self.config.binary.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            let message = message.strip_prefix("ERROR:").unwrap_or(message).trim();
            return Err(EngineError::Exit {
                command: command.command().to_string(),
                status: output.status.to_string(),
                message: message.to_string(),
            }
            .into());
        }

        debug!(
            command = command.command(),
            bytes = output.stdout.len(),
            "exec finished"
        );
        Ok(output.stdout)
    }

    /// Starts the engine in pipe mode (`<binary> -`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Spawn`] if the binary cannot be started.
    pub fn spawn_session(&self) -> Result<Session> {
        let child = self
            .command()
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                binary: self.config.binary.clone(),
                source: e,
            })?;

        debug!(
            binary = %self.config.binary.display(),
            pid = child.id(),
            "engine session started"
        );
        Session::from_child(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RrdError;

    #[test]
    fn test_missing_binary() {
        let engine = Engine::new(
            EngineConfig::default().with_binary("/nonexistent/rrdkit-test/rrdtool"),
        );

        let err = engine.exec(&CommandLine::new("last").arg("x.rrd")).unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Spawn { .. })));

        let err = engine.spawn_session().unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Spawn { .. })));
    }
}
