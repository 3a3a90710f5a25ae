//! Persistent pipe-mode session with the engine.
//!
//! In pipe mode (`rrdtool -`) the engine reads one command per line on
//! stdin and answers on stdout with zero or more body lines followed by a
//! terminator:
//!
//! ```text
//! > last /var/lib/rrd/load.rrd
//! < 1700000000
//! < OK u:0.00 s:0.00 r:0.00
//! > last /missing.rrd
//! < ERROR: opening '/missing.rrd': No such file or directory
//! ```
//!
//! A [`Session`] writes one command, then reads until `OK` or `ERROR:`.
//! Commands are strictly sequential; the `&mut self` receiver enforces one
//! in-flight command per session.

use std::io::{self, BufRead, BufReader, Write};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::command::CommandLine;
use crate::error::{EngineError, Result};

/// Prefix of a successful reply terminator.
const OK_MARKER: &str = "OK";

/// Prefix of a failed reply terminator.
const ERROR_MARKER: &str = "ERROR:";

/// How long a closed engine gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Interval between exit checks during the grace period.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// Body of a successful engine reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    lines: Vec<String>,
    timing: String,
}

impl Reply {
    /// Body lines in the order the engine printed them, without line
    /// terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the reply, returning its body lines.
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// The text after `OK` on the terminator line, usually resource usage
    /// such as `u:0.00 s:0.00 r:0.00`.
    pub fn timing(&self) -> &str {
        &self.timing
    }

    /// Returns the body as one string, lines joined with `\n`.
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns the only non-empty body line.
    pub fn single_line(&self) -> Option<&str> {
        let mut lines = self.lines.iter().filter(|l| !l.trim().is_empty());
        match (lines.next(), lines.next()) {
            (Some(line), None) => Some(line.trim()),
            _ => None,
        }
    }
}

/// A long-lived connection to an engine running in pipe mode.
pub struct Session {
    writer: Option<Box<dyn Write + Send>>,
    reader: Box<dyn BufRead + Send>,
    child: Option<Child>,
    commands_sent: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("pid", &self.pid())
            .field("commands_sent", &self.commands_sent)
            .finish()
    }
}

impl Session {
    /// Wraps a spawned engine child whose stdin and stdout are piped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] if either pipe was not captured.
    pub(crate) fn from_child(mut child: Child) -> Result<Self> {
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            // Nothing to talk to; reap the child before giving up.
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Closed.into());
        };
        Ok(Self {
            writer: Some(Box::new(stdin)),
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
            commands_sent: 0,
        })
    }

    /// Builds a session over arbitrary streams.
    ///
    /// The writer receives command lines; the reader supplies engine
    /// replies. Useful for driving the protocol without a subprocess.
    pub fn from_streams<W, R>(writer: W, reader: R) -> Self
    where
        W: Write + Send + 'static,
        R: BufRead + Send + 'static,
    {
        Self {
            writer: Some(Box::new(writer)),
            reader: Box::new(reader),
            child: None,
            commands_sent: 0,
        }
    }

    /// Returns `true` until the session is closed or the engine hangs up.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Process id of the engine, if the session owns one.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Number of commands written so far.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Sends one command and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`CommandError`](crate::error::CommandError) if the command cannot
    ///   be encoded as a single line.
    /// - [`EngineError::Command`] if the engine answers `ERROR:`.
    /// - [`EngineError::Closed`] if the session is closed, or the engine
    ///   has gone away (broken pipe on write, EOF before a terminator).
    /// - [`EngineError::Io`] on other pipe failures.
    ///
    /// A failed write closes the session.
    pub fn send(&mut self, command: &CommandLine) -> Result<Reply> {
        let line = command.to_pipe_line()?;
        let writer = self.writer.as_mut().ok_or(EngineError::Closed)?;

        debug!(command = command.command(), "pipe: {line}");
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            self.writer = None;
            return Err(match e.kind() {
                io::ErrorKind::BrokenPipe => EngineError::Closed,
                _ => EngineError::Io(e),
            }
            .into());
        }
        self.commands_sent += 1;

        let mut reply = Reply::default();
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = self.reader.read_line(&mut buf).map_err(EngineError::Io)?;
            if n == 0 {
                // The engine is gone; nothing more can be sent.
                self.writer = None;
                return Err(EngineError::Closed.into());
            }

            let text = buf.trim_end_matches(['\n', '\r']);
            debug!(command = command.command(), "reply: {text}");

            if let Some(timing) = text.strip_prefix(OK_MARKER) {
                reply.timing = timing.trim().to_string();
                return Ok(reply);
            }
            if let Some(message) = text.strip_prefix(ERROR_MARKER) {
                return Err(EngineError::Command {
                    command: command.command().to_string(),
                    message: message.trim().to_string(),
                }
                .into());
            }
            reply.lines.push(text.to_string());
        }
    }

    /// Closes the session.
    ///
    /// Closes the engine's stdin, which makes it exit, and then waits for
    /// the child. An engine still running after a short grace period is
    /// killed and reaped. Calling `close` more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if waiting for or killing the child
    /// fails.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            // Best effort; the engine may already be gone.
            let _ = writer.flush();
        }
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            let deadline = Instant::now() + EXIT_GRACE;
            loop {
                if let Some(status) = child.try_wait().map_err(EngineError::Io)? {
                    debug!(pid, %status, "engine session closed");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    break;
                }
                thread::sleep(EXIT_POLL);
            }

            warn!(pid, grace = ?EXIT_GRACE, "engine did not exit after stdin closed; killing it");
            child.kill().map_err(EngineError::Io)?;
            let status = child.wait().map_err(EngineError::Io)?;
            debug!(pid, %status, "engine session killed");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close engine session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RrdError;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// A writer whose contents stay readable after it is boxed.
    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn session(replies: &str) -> (Session, Sink) {
        let sink = Sink::default();
        let session = Session::from_streams(sink.clone(), Cursor::new(replies.to_string()));
        (session, sink)
    }

    #[test]
    fn test_reads_until_ok() {
        let (mut session, sink) = session("1700000000\nOK u:0.00 s:0.00 r:0.01\n");
        let reply = session
            .send(&CommandLine::new("last").arg("load.rrd"))
            .unwrap();

        assert_eq!(reply.lines(), ["1700000000"]);
        assert_eq!(reply.single_line(), Some("1700000000"));
        assert_eq!(reply.timing(), "u:0.00 s:0.00 r:0.01");
        assert_eq!(sink.contents(), "last load.rrd\n");
        assert_eq!(session.commands_sent(), 1);
    }

    #[test]
    fn test_sequential_commands() {
        let (mut session, sink) = session("OK u:0.00 s:0.00 r:0.00\na\nb\nOK\n");
        let first = session.send(&CommandLine::new("update").arg("x")).unwrap();
        assert!(first.lines().is_empty());

        let second = session.send(&CommandLine::new("info").arg("x")).unwrap();
        assert_eq!(second.body(), "a\nb");
        assert_eq!(second.single_line(), None);
        assert_eq!(sink.contents(), "update x\ninfo x\n");
    }

    #[test]
    fn test_error_reply() {
        let (mut session, _) = session(
            "ERROR: opening 'missing.rrd': No such file or directory\nOK u:0.00 s:0.00 r:0.00\n",
        );
        let err = session
            .send(&CommandLine::new("last").arg("missing.rrd"))
            .unwrap_err();
        match err {
            RrdError::Engine(EngineError::Command { command, message }) => {
                assert_eq!(command, "last");
                assert_eq!(message, "opening 'missing.rrd': No such file or directory");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The session survives an engine-side error.
        assert!(session.is_open());
        let reply = session.send(&CommandLine::new("last").arg("x")).unwrap();
        assert!(reply.lines().is_empty());
    }

    #[test]
    fn test_closed_pipe() {
        let (mut session, _) = session("partial\n");
        let err = session.send(&CommandLine::new("info").arg("x")).unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Closed)));
        assert!(!session.is_open());

        let err = session.send(&CommandLine::new("info").arg("x")).unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Closed)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, sink) = session("");
        session.close().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(session.send(&CommandLine::new("last").arg("x")).is_err());
        assert_eq!(sink.contents(), "");
    }

    /// A writer whose peer has hung up.
    struct HungUp(io::ErrorKind);

    impl Write for HungUp {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(self.0))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_closes_session() {
        let mut session = Session::from_streams(
            HungUp(io::ErrorKind::BrokenPipe),
            Cursor::new("OK\n".to_string()),
        );
        let err = session.send(&CommandLine::new("last").arg("x")).unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Closed)));
        assert!(!session.is_open());
        assert_eq!(session.commands_sent(), 0);

        let mut session = Session::from_streams(
            HungUp(io::ErrorKind::PermissionDenied),
            Cursor::new("OK\n".to_string()),
        );
        let err = session.send(&CommandLine::new("last").arg("x")).unwrap_err();
        assert!(matches!(err, RrdError::Engine(EngineError::Io(_))));
        assert!(!session.is_open());
    }

    #[test]
    fn test_crlf_replies() {
        let (mut session, _) = session("42\r\nOK u:0.00 s:0.00 r:0.00\r\n");
        let reply = session.send(&CommandLine::new("last").arg("x")).unwrap();
        assert_eq!(reply.lines(), ["42"]);
        assert_eq!(reply.timing(), "u:0.00 s:0.00 r:0.00");
    }
}
