//! # rrdkit
//!
//! Typed control channel for the `rrdtool` round-robin database engine.
//!
//! rrdkit does not store or draw anything itself. It builds engine command
//! lines from typed definitions, keeps a persistent pipe to `rrdtool -`,
//! parses the engine's line-oriented replies, and assembles `rrdtool graph`
//! invocations. All storage, consolidation and rendering happen inside the
//! engine.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rrdkit::{ConsolidationFn, Database, DatabaseDefinition, Engine, TimeSpec};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // One gauge sampled every 22s, averaged 10 at a time, 20 rows kept
//! let definition = DatabaseDefinition::builder()
//!     .step(Duration::from_secs(22))
//!     .gauge("gb_used", Duration::from_secs(63))
//!     .average(10, 20)
//!     .build()?;
//!
//! let engine = Engine::from_env();
//! let mut db = Database::create(&engine, "/tmp/disk.rrd", &definition)?;
//!
//! db.update(&[("gb_used", 41.5)])?;
//! println!("last update at {}", db.last()?);
//!
//! let data = db.fetch(
//!     ConsolidationFn::Average,
//!     Some(&TimeSpec::from("now-1h")),
//!     None,
//!     None,
//! )?;
//! for row in &data.rows {
//!     println!("{}: {:?}", row.timestamp, row.values);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Engine`]: Locates the binary; one-shot `exec` and pipe-mode sessions
//! - [`Session`]: One engine process, one command and one reply at a time
//! - [`Database`]: Path, session and layout of one database file
//! - [`DatabaseDefinition`]: Data sources and archives for `create`
//! - [`Graph`]: `DEF`/`CDEF`/`VDEF` and drawing elements for `graph`
//!
//! ## Modules
//!
//! - [`definition`]: Data sources, archives, creation arguments
//! - [`command`]: Command lines and pipe quoting
//! - [`engine`]: Process invocation
//! - [`session`]: Pipe protocol
//! - [`info`]: `info` reply parser
//! - [`fetch`]: `fetch` reply parser
//! - [`database`]: Database handle
//! - [`graph`]: Graph builder
//! - [`config`]: Engine configuration
//! - [`time`]: Update and range timestamps
//! - [`error`]: Error types

pub mod command;
pub mod config;
pub mod database;
pub mod definition;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod info;
pub mod session;
pub mod time;

// Re-export primary API types at crate root for convenience.
pub use command::CommandLine;
pub use config::EngineConfig;
pub use database::Database;
pub use definition::{Archive, ConsolidationFn, DataSource, DataSourceKind, DatabaseDefinition};
pub use engine::Engine;
pub use error::{Result, RrdError};
pub use fetch::{FetchResult, FetchRow};
pub use graph::{Color, Def, Graph, RenderOptions};
pub use info::RrdInfo;
pub use session::{Reply, Session};
pub use time::{TimeSpec, UpdateTime};
