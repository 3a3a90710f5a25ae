//! Database handle.
//!
//! A [`Database`] pairs a database path with a pipe-mode [`Session`] and
//! the layout learned from `info`. It is the main entry point for updating
//! and querying an existing database.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rrdkit::{ConsolidationFn, Database, DatabaseDefinition, Engine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::from_env();
//! let definition = DatabaseDefinition::builder()
//!     .step(Duration::from_secs(22))
//!     .gauge("gb_used", Duration::from_secs(63))
//!     .average(10, 20)
//!     .build()?;
//!
//! let mut db = Database::create(&engine, "/tmp/disk.rrd", &definition)?;
//! db.update(&[("gb_used", 10.0)])?;
//! println!("last update: {}", db.last()?);
//!
//! let def = db.def("used", "gb_used", ConsolidationFn::Average)?;
//! println!("{def}");
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::CommandLine;
use crate::definition::{Archive, ConsolidationFn, DataSource, DatabaseDefinition};
use crate::engine::Engine;
use crate::error::{DefinitionError, EngineError, Result};
use crate::fetch::FetchResult;
use crate::graph::Def;
use crate::info::RrdInfo;
use crate::session::Session;
use crate::time::{TimeSpec, UpdateTime};

/// An open round-robin database.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    session: Session,
    info: RrdInfo,
    data_sources: Vec<DataSource>,
    archives: Vec<Archive>,
}

impl Database {
    /// Creates a database file and opens it.
    ///
    /// The definition is validated locally, then `rrdtool create` is run as
    /// a one-shot process before a session is opened.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError`] if the definition is invalid.
    /// - [`EngineError`] if the engine fails to create or open the file.
    pub fn create<P: AsRef<Path>>(
        engine: &Engine,
        path: P,
        definition: &DatabaseDefinition,
    ) -> Result<Self> {
        let path = path.as_ref();
        definition.validate()?;
        engine.exec(&CommandLine::create(path, definition))?;
        debug!(path = %path.display(), "database created");
        Self::open(engine, path)
    }

    /// Opens an existing database.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the session cannot be started or `info`
    /// fails, and [`InfoError`](crate::error::InfoError) if the reply does
    /// not describe a usable database.
    pub fn open<P: AsRef<Path>>(engine: &Engine, path: P) -> Result<Self> {
        let session = engine.spawn_session()?;
        Self::with_session(session, path)
    }

    /// Opens a database over an existing session.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn with_session<P: AsRef<Path>>(session: Session, path: P) -> Result<Self> {
        let mut db = Self {
            path: path.as_ref().to_path_buf(),
            session,
            info: RrdInfo::default(),
            data_sources: Vec::new(),
            archives: Vec::new(),
        };
        db.reload_info()?;
        Ok(db)
    }

    /// Re-reads the layout with `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the command or the reply is
    /// malformed.
    pub fn reload_info(&mut self) -> Result<&RrdInfo> {
        let reply = self.session.send(&CommandLine::info(&self.path))?;
        let info = RrdInfo::parse(reply.lines().iter().map(String::as_str));
        self.data_sources = info.data_source_definitions()?;
        self.archives = info.archive_definitions()?;
        self.info = info;
        debug!(
            path = %self.path.display(),
            data_sources = self.data_sources.len(),
            archives = self.archives.len(),
            "loaded database info"
        );
        Ok(&self.info)
    }

    /// The database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The base step in seconds, as reported by the engine.
    pub fn step(&self) -> Option<u64> {
        self.info.step
    }

    /// The most recently loaded `info` output.
    pub fn info(&self) -> &RrdInfo {
        &self.info
    }

    /// Data sources in engine order.
    pub fn data_sources(&self) -> &[DataSource] {
        &self.data_sources
    }

    /// Archives in engine order.
    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    /// Looks up a data source by name.
    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }

    /// Mutable access to the underlying session for commands this type
    /// does not wrap.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Records values at the engine's current time.
    ///
    /// # Errors
    ///
    /// See [`update_at`](Self::update_at).
    pub fn update<S: AsRef<str>>(&mut self, values: &[(S, f64)]) -> Result<()> {
        self.update_at(UpdateTime::Now, values)
    }

    /// Records values at the given time.
    ///
    /// Values are sent with a `--template` in the order given, so callers
    /// may update any subset of data sources. `NaN` records an unknown
    /// value.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::EmptyUpdate`] if `values` is empty.
    /// - [`DefinitionError::UnknownDataSource`] for names the database
    ///   does not have.
    /// - [`DefinitionError::ComputedUpdate`] for computed data sources.
    /// - [`EngineError`] if the engine rejects the update.
    pub fn update_at<S: AsRef<str>>(&mut self, time: UpdateTime, values: &[(S, f64)]) -> Result<()> {
        if values.is_empty() {
            return Err(DefinitionError::EmptyUpdate.into());
        }
        for (name, _) in values {
            let name = name.as_ref();
            let ds = self
                .data_source(name)
                .ok_or_else(|| DefinitionError::UnknownDataSource {
                    name: name.to_string(),
                })?;
            if ds.is_computed() {
                return Err(DefinitionError::ComputedUpdate {
                    name: name.to_string(),
                }
                .into());
            }
        }

        self.session
            .send(&CommandLine::update(&self.path, time, values))?;
        Ok(())
    }

    /// Records one value for one data source at the current time.
    ///
    /// # Errors
    ///
    /// See [`update_at`](Self::update_at).
    pub fn update_one(&mut self, name: &str, value: f64) -> Result<()> {
        self.update(&[(name, value)])
    }

    fn timestamp_reply(&mut self, command: &CommandLine) -> Result<u64> {
        let reply = self.session.send(command)?;
        reply
            .single_line()
            .and_then(|line| line.parse::<u64>().ok())
            .ok_or_else(|| {
                EngineError::UnexpectedReply {
                    command: command.command().to_string(),
                    reply: reply.body(),
                }
                .into()
            })
    }

    /// Time of the last update, in epoch seconds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the command fails or the reply is not a
    /// single timestamp.
    pub fn last(&mut self) -> Result<u64> {
        let command = CommandLine::last(&self.path);
        self.timestamp_reply(&command)
    }

    /// Time of the oldest row in an archive, in epoch seconds.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the command fails or the reply is not a
    /// single timestamp.
    pub fn first(&mut self, rra_index: usize) -> Result<u64> {
        let command = CommandLine::first(&self.path, rra_index);
        self.timestamp_reply(&command)
    }

    /// Reads consolidated data.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine rejects the query and
    /// [`InfoError`](crate::error::InfoError) if the reply is malformed.
    pub fn fetch(
        &mut self,
        cf: ConsolidationFn,
        start: Option<&TimeSpec>,
        end: Option<&TimeSpec>,
        resolution: Option<u64>,
    ) -> Result<FetchResult> {
        let reply = self
            .session
            .send(&CommandLine::fetch(&self.path, cf, start, end, resolution))?;
        FetchResult::parse(reply.lines().iter().map(String::as_str))
    }

    /// Builds a graph `DEF` bound to one of this database's data sources.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::UnknownDataSource`] if `ds_name` is not
    /// a data source of this database.
    pub fn def(&self, vname: &str, ds_name: &str, cf: ConsolidationFn) -> Result<Def> {
        if self.data_source(ds_name).is_none() {
            return Err(DefinitionError::UnknownDataSource {
                name: ds_name.to_string(),
            }
            .into());
        }
        Ok(Def::new(vname, &self.path, ds_name, cf))
    }

    /// Closes the session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if waiting for the engine fails.
    pub fn close(mut self) -> Result<()> {
        self.session.close()
    }
}
