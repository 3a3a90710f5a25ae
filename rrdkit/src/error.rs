//! Error types for the rrdkit engine client.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all rrdkit operations.
///
/// This enum covers every failure the client can observe, from building a
/// definition through talking to the engine and parsing its replies.
#[derive(Error, Debug)]
pub enum RrdError {
    /// A database definition is invalid.
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// A command could not be encoded for the engine.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The engine could not be run, or it rejected a command.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// An engine reply could not be parsed.
    #[error("reply parse error: {0}")]
    Info(#[from] InfoError),

    /// A graph definition is invalid.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while validating database definitions and updates.
#[derive(Error, Debug)]
pub enum DefinitionError {
    /// No data sources were supplied.
    #[error("at least 1 data-source must be supplied")]
    NoDataSources,

    /// No archives were supplied.
    #[error("at least 1 archive must be supplied")]
    NoArchives,

    /// A data-source name does not satisfy the engine's naming rules.
    #[error("invalid data-source name '{name}': must be 1-19 characters of [A-Za-z0-9_]")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Two data sources share a name.
    #[error("duplicate data-source name '{name}'")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A data source has a zero heartbeat.
    #[error("data-source '{name}' must have a heartbeat of at least 1 second")]
    ZeroHeartbeat {
        /// The data source name.
        name: String,
    },

    /// A data source has `min > max`.
    #[error("data-source '{name}' has min {min} greater than max {max}")]
    InvalidRange {
        /// The data source name.
        name: String,
        /// The configured minimum.
        min: f64,
        /// The configured maximum.
        max: f64,
    },

    /// A computed data source has no expression.
    #[error("computed data-source '{name}' has an empty RPN expression")]
    EmptyExpression {
        /// The data source name.
        name: String,
    },

    /// An archive configuration is invalid.
    #[error("invalid archive: {reason}")]
    InvalidArchive {
        /// Description of what makes the archive invalid.
        reason: String,
    },

    /// The database step is zero.
    #[error("step must be at least 1 second")]
    ZeroStep,

    /// An update referenced a data source the database does not have.
    #[error("unknown data-source '{name}'")]
    UnknownDataSource {
        /// The name that was not found.
        name: String,
    },

    /// An update targeted a computed data source.
    #[error("data-source '{name}' is computed and cannot be updated")]
    ComputedUpdate {
        /// The data source name.
        name: String,
    },

    /// An update carried no values.
    #[error("an update needs at least one value")]
    EmptyUpdate,

    /// A definition file could not be read or parsed.
    #[error("failed to load definition from '{}': {reason}", path.display())]
    Load {
        /// The definition file path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while encoding a command line for the pipe protocol.
#[derive(Error, Debug)]
pub enum CommandError {
    /// An argument is empty and would vanish from the command line.
    #[error("argument {index} of '{command}' is empty")]
    EmptyArgument {
        /// The engine sub-command.
        command: String,
        /// Position of the argument.
        index: usize,
    },

    /// An argument contains a line break.
    #[error("argument {index} of '{command}' contains a line break")]
    LineBreak {
        /// The engine sub-command.
        command: String,
        /// Position of the argument.
        index: usize,
    },

    /// An argument has whitespace and both quote characters.
    #[error("argument {index} of '{command}' cannot be quoted: {argument}")]
    Unquotable {
        /// The engine sub-command.
        command: String,
        /// Position of the argument.
        index: usize,
        /// The offending argument.
        argument: String,
    },
}

/// Errors raised while running the engine or talking to it.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("failed to start '{}': {source}", binary.display())]
    Spawn {
        /// The binary that was executed.
        binary: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the engine failed.
    #[error("pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The engine answered a pipe command with `ERROR:`.
    #[error("'{command}' failed: {message}")]
    Command {
        /// The engine sub-command.
        command: String,
        /// The engine's error text, without the `ERROR: ` prefix.
        message: String,
    },

    /// A one-shot engine invocation exited unsuccessfully.
    #[error("'{command}' exited with {status}: {message}")]
    Exit {
        /// The engine sub-command.
        command: String,
        /// Exit status description.
        status: String,
        /// The engine's stderr, trimmed.
        message: String,
    },

    /// The pipe closed before a reply terminator was read, or the session
    /// was already closed.
    #[error("engine session is closed")]
    Closed,

    /// The engine answered with something the client did not expect.
    #[error("unexpected reply to '{command}': {reply}")]
    UnexpectedReply {
        /// The engine sub-command.
        command: String,
        /// The reply body.
        reply: String,
    },
}

/// Errors raised while parsing `info` and `fetch` replies.
#[derive(Error, Debug)]
pub enum InfoError {
    /// A data source or archive lacks an attribute the client needs.
    #[error("{entry} is missing attribute '{attribute}'")]
    MissingAttribute {
        /// Which entry (e.g. `ds[load]`).
        entry: String,
        /// The missing attribute name.
        attribute: String,
    },

    /// An attribute value could not be interpreted.
    #[error("{entry}.{attribute} has invalid value '{value}'")]
    InvalidValue {
        /// Which entry (e.g. `rra[0]`).
        entry: String,
        /// The attribute name.
        attribute: String,
        /// The raw value.
        value: String,
    },

    /// A data-source type the client does not know.
    #[error("unknown data-source type '{0}'")]
    UnknownKind(String),

    /// A consolidation function the client does not know.
    #[error("unknown consolidation function '{0}'")]
    UnknownConsolidation(String),

    /// A fetch row could not be parsed.
    #[error("malformed fetch row {line}: {reason}")]
    MalformedRow {
        /// One-based row line number in the reply body.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

/// Errors raised while building or rendering graphs.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The graph has nothing to draw.
    #[error("a graph needs at least one element")]
    NoElements,

    /// An element or expression references a variable nobody defined.
    #[error("'{context}' references undefined variable '{vname}'")]
    UndefinedVariable {
        /// The referencing element.
        context: String,
        /// The undefined variable name.
        vname: String,
    },

    /// A variable is defined twice.
    #[error("variable '{vname}' is defined more than once")]
    DuplicateVariable {
        /// The repeated variable name.
        vname: String,
    },

    /// A variable name does not satisfy the engine's naming rules.
    #[error("invalid variable name '{vname}': must be 1-255 characters of [A-Za-z0-9_-]")]
    InvalidVariable {
        /// The rejected name.
        vname: String,
    },

    /// A color string is not 6 or 8 hex digits.
    #[error("invalid color '{0}': expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),

    /// A graph definition file could not be read or parsed.
    #[error("failed to load graph from '{}': {reason}", path.display())]
    Load {
        /// The graph file path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`EngineConfig`](crate::config::EngineConfig).
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, RrdError>`.
pub type Result<T> = std::result::Result<T, RrdError>;
