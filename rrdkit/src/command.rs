//! Engine command lines.
//!
//! A [`CommandLine`] is an engine sub-command plus its arguments. It can be
//! handed to a one-shot process as argv, or encoded as a single line for the
//! pipe protocol, where the engine splits on whitespace and honours single
//! and double quotes (without escapes).

use std::fmt;
use std::path::Path;

use crate::definition::{ConsolidationFn, DatabaseDefinition};
use crate::error::{CommandError, Result};
use crate::time::{TimeSpec, UpdateTime};

/// One engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    command: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Creates a command with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The engine sub-command (`update`, `info`, ...).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The arguments, without the sub-command.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns argv for a one-shot invocation: the sub-command followed by
    /// its arguments, unquoted.
    pub fn to_args(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Encodes the command as one pipe-protocol line, without the trailing
    /// newline.
    ///
    /// Arguments with whitespace are wrapped in single quotes, or double
    /// quotes when they contain a single quote.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if an argument is empty, contains a line
    /// break, or holds whitespace together with both quote characters.
    pub fn to_pipe_line(&self) -> Result<String> {
        let mut line = self.command.clone();
        for (index, arg) in self.args.iter().enumerate() {
            line.push(' ');
            line.push_str(&self.quote(index, arg)?);
        }
        Ok(line)
    }

    fn quote(&self, index: usize, arg: &str) -> Result<String> {
        if arg.is_empty() {
            return Err(CommandError::EmptyArgument {
                command: self.command.clone(),
                index,
            }
            .into());
        }
        if arg.contains(['\n', '\r']) {
            return Err(CommandError::LineBreak {
                command: self.command.clone(),
                index,
            }
            .into());
        }

        let needs_quotes = arg.chars().any(char::is_whitespace) || arg.contains(['\'', '"']);
        if !needs_quotes {
            return Ok(arg.to_string());
        }
        if !arg.contains('\'') {
            Ok(format!("'{arg}'"))
        } else if !arg.contains('"') {
            Ok(format!("\"{arg}\""))
        } else {
            Err(CommandError::Unquotable {
                command: self.command.clone(),
                index,
                argument: arg.to_string(),
            }
            .into())
        }
    }

    /// `create <path> [options] DS:... RRA:...`
    pub fn create(path: &Path, definition: &DatabaseDefinition) -> Self {
        Self::new("create").args(definition.create_args(path))
    }

    /// `update <path> --template a:b <time>:<va>:<vb>`
    ///
    /// `NaN` values are sent as `U` (unknown).
    pub fn update<S: AsRef<str>>(path: &Path, time: UpdateTime, values: &[(S, f64)]) -> Self {
        let template = values
            .iter()
            .map(|(name, _)| name.as_ref())
            .collect::<Vec<_>>()
            .join(":");
        let mut sample = time.to_string();
        for (_, value) in values {
            sample.push(':');
            if value.is_nan() {
                sample.push('U');
            } else {
                sample.push_str(&value.to_string());
            }
        }
        Self::new("update")
            .arg(path_arg(path))
            .args(["--template".to_string(), template, sample])
    }

    /// `last <path>`
    pub fn last(path: &Path) -> Self {
        Self::new("last").arg(path_arg(path))
    }

    /// `first <path> --rraindex <n>`
    pub fn first(path: &Path, rra_index: usize) -> Self {
        Self::new("first")
            .arg(path_arg(path))
            .args(["--rraindex".to_string(), rra_index.to_string()])
    }

    /// `info <path>`
    pub fn info(path: &Path) -> Self {
        Self::new("info").arg(path_arg(path))
    }

    /// `fetch <path> <CF> [--resolution r] [--start s] [--end e]`
    pub fn fetch(
        path: &Path,
        cf: ConsolidationFn,
        start: Option<&TimeSpec>,
        end: Option<&TimeSpec>,
        resolution: Option<u64>,
    ) -> Self {
        let mut cmd = Self::new("fetch").arg(path_arg(path)).arg(cf.token());
        if let Some(resolution) = resolution {
            cmd = cmd.args(["--resolution".to_string(), resolution.to_string()]);
        }
        if let Some(start) = start {
            cmd = cmd.args(["--start".to_string(), start.to_string()]);
        }
        if let Some(end) = end {
            cmd = cmd.args(["--end".to_string(), end.to_string()]);
        }
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Renders a path as a command argument.
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RrdError;

    #[test]
    fn test_update_line() {
        let cmd = CommandLine::update(
            Path::new("/tmp/disk.rrd"),
            UpdateTime::Now,
            &[("gb_used", 10.0), ("gb_free", 2.5)],
        );
        assert_eq!(
            cmd.to_pipe_line().unwrap(),
            "update /tmp/disk.rrd --template gb_used:gb_free N:10:2.5"
        );

        let cmd = CommandLine::update(
            Path::new("a.rrd"),
            UpdateTime::At(1_700_000_000),
            &[("x", f64::NAN)],
        );
        assert_eq!(
            cmd.to_args(),
            vec!["update", "a.rrd", "--template", "x", "1700000000:U"]
        );
    }

    #[test]
    fn test_pipe_quoting() {
        let cmd = CommandLine::new("info").arg("/data/my disk.rrd");
        assert_eq!(cmd.to_pipe_line().unwrap(), "info '/data/my disk.rrd'");

        let cmd = CommandLine::new("info").arg("/data/bob's disk.rrd");
        assert_eq!(cmd.to_pipe_line().unwrap(), "info \"/data/bob's disk.rrd\"");

        let cmd = CommandLine::new("info").arg("it's \"odd\"");
        assert!(matches!(
            cmd.to_pipe_line(),
            Err(RrdError::Command(CommandError::Unquotable { index: 0, .. }))
        ));
    }

    #[test]
    fn test_pipe_rejects_unencodable() {
        let cmd = CommandLine::new("info").arg("a.rrd").arg("");
        assert!(matches!(
            cmd.to_pipe_line(),
            Err(RrdError::Command(CommandError::EmptyArgument { index: 1, .. }))
        ));

        let cmd = CommandLine::new("info").arg("a.rrd\nlast b.rrd");
        assert!(matches!(
            cmd.to_pipe_line(),
            Err(RrdError::Command(CommandError::LineBreak { index: 0, .. }))
        ));
    }

    #[test]
    fn test_query_commands() {
        let path = Path::new("load.rrd");
        assert_eq!(CommandLine::last(path).to_string(), "last load.rrd");
        assert_eq!(
            CommandLine::first(path, 2).to_string(),
            "first load.rrd --rraindex 2"
        );
        assert_eq!(CommandLine::info(path).to_string(), "info load.rrd");

        let start = TimeSpec::from("now-1h");
        let cmd = CommandLine::fetch(path, ConsolidationFn::Max, Some(&start), None, Some(60));
        assert_eq!(
            cmd.to_string(),
            "fetch load.rrd MAX --resolution 60 --start now-1h"
        );
    }
}
