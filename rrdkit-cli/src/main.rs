//! CLI for driving the rrdtool engine through rrdkit.
//!
//! Provides commands for creating databases, recording values, inspecting
//! and querying them, and rendering graphs.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use rrdkit::graph::{ImageFormat, RenderOptions};
use rrdkit::{
    ConsolidationFn, Database, DatabaseDefinition, Engine, EngineConfig, Graph, RrdInfo, TimeSpec,
    UpdateTime,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// rrdkit: typed front end for the rrdtool round-robin database engine.
#[derive(Parser)]
#[command(name = "rrdkit", version, about)]
struct Cli {
    /// Path to the rrdtool binary (overrides config file and RRDKIT_RRDTOOL).
    #[arg(long, global = true)]
    rrdtool: Option<PathBuf>,

    /// JSON engine configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log every command and reply exchanged with the engine.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a database from a JSON definition.
    Create {
        /// Path of the database file to create.
        path: PathBuf,

        /// JSON file with data sources and archives.
        #[arg(long)]
        definition: PathBuf,
    },

    /// Record values into a database.
    Update {
        /// Path to the database file.
        path: PathBuf,

        /// Epoch seconds of the sample (defaults to the engine's current time).
        #[arg(long)]
        at: Option<u64>,

        /// Values as name=value; a value of U records unknown.
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Print the time of the last update.
    Last {
        /// Path to the database file.
        path: PathBuf,
    },

    /// Print the time of the oldest row in an archive.
    First {
        /// Path to the database file.
        path: PathBuf,

        /// Archive index.
        #[arg(long, default_value = "0")]
        rra: usize,
    },

    /// Display database layout: step, data sources, and archives.
    Info {
        /// Path to the database file.
        path: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: InfoFormat,
    },

    /// Fetch consolidated data from a database.
    Fetch {
        /// Path to the database file.
        path: PathBuf,

        /// Consolidation function of the archive to read.
        #[arg(long, default_value = "average")]
        cf: ConsolidationFn,

        /// Start time (epoch seconds or engine expression, e.g. "now-1h").
        #[arg(long, default_value = "now-1h")]
        start: String,

        /// End time.
        #[arg(long, default_value = "now")]
        end: String,

        /// Preferred resolution in seconds.
        #[arg(long)]
        resolution: Option<u64>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Render a graph from a JSON definition.
    Graph {
        /// Output image file, or "-" for stdout.
        outfile: String,

        /// JSON file with definitions and elements.
        #[arg(long)]
        definition: PathBuf,

        /// Canvas width in pixels.
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height in pixels.
        #[arg(long)]
        height: Option<u32>,

        /// Start time.
        #[arg(long)]
        start: Option<String>,

        /// End time.
        #[arg(long)]
        end: Option<String>,

        /// Image format.
        #[arg(long, default_value = "png")]
        format: GraphFormat,
    },
}

/// Output format for `info`.
#[derive(Clone, ValueEnum)]
enum InfoFormat {
    /// Human-readable summary.
    Text,
    /// The parsed info dump as JSON.
    Json,
}

/// Output format for fetch results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with names and rows.
    Json,
}

/// Image format for `graph`.
#[derive(Clone, ValueEnum)]
enum GraphFormat {
    Png,
    Svg,
    Pdf,
    Eps,
}

impl From<GraphFormat> for ImageFormat {
    fn from(format: GraphFormat) -> Self {
        match format {
            GraphFormat::Png => Self::Png,
            GraphFormat::Svg => Self::Svg,
            GraphFormat::Pdf => Self::Pdf,
            GraphFormat::Eps => Self::Eps,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = engine(cli.config.as_deref(), cli.rrdtool).and_then(|engine| match cli.command {
        Commands::Create { path, definition } => cmd_create(&engine, &path, &definition),
        Commands::Update { path, at, values } => cmd_update(&engine, &path, at, &values),
        Commands::Last { path } => cmd_last(&engine, &path),
        Commands::First { path, rra } => cmd_first(&engine, &path, rra),
        Commands::Info { path, format } => cmd_info(&engine, &path, &format),
        Commands::Fetch {
            path,
            cf,
            start,
            end,
            resolution,
            format,
        } => cmd_fetch(&engine, &path, cf, start, end, resolution, &format),
        Commands::Graph {
            outfile,
            definition,
            width,
            height,
            start,
            end,
            format,
        } => {
            let options = RenderOptions {
                format: format.into(),
                width,
                height,
                start: start.map(TimeSpec::from),
                end: end.map(TimeSpec::from),
                ..RenderOptions::default()
            };
            cmd_graph(&engine, &outfile, &definition, &options)
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` applies unless
/// `--verbose` forces debug output.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves the engine configuration: `--rrdtool` beats the config file,
/// which beats the environment.
fn engine(config: Option<&Path>, rrdtool: Option<PathBuf>) -> Result<Engine, Box<dyn std::error::Error>> {
    let mut config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env(),
    };
    if let Some(binary) = rrdtool {
        config = config.with_binary(binary);
    }
    debug!(binary = %config.binary.display(), "using engine");
    Ok(Engine::new(config))
}

/// Implements `rrdkit create <path> --definition <file>`.
fn cmd_create(engine: &Engine, path: &Path, definition: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let definition = DatabaseDefinition::from_file(definition)?;
    let db = Database::create(engine, path, &definition)?;

    println!(
        "Created {} ({} data sources, {} archives)",
        path.display(),
        db.data_sources().len(),
        db.archives().len()
    );
    db.close()?;
    Ok(())
}

/// Implements `rrdkit update <path> name=value...`.
fn cmd_update(
    engine: &Engine,
    path: &Path,
    at: Option<u64>,
    values: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let values = values
        .iter()
        .map(|pair| parse_value(pair))
        .collect::<Result<Vec<_>, _>>()?;
    let time = at.map_or(UpdateTime::Now, UpdateTime::At);

    let mut db = Database::open(engine, path)?;
    db.update_at(time, &values)?;
    db.close()?;
    Ok(())
}

/// Implements `rrdkit last <path>`.
fn cmd_last(engine: &Engine, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open(engine, path)?;
    println!("{}", db.last()?);
    db.close()?;
    Ok(())
}

/// Implements `rrdkit first <path>`.
fn cmd_first(engine: &Engine, path: &Path, rra: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open(engine, path)?;
    println!("{}", db.first(rra)?);
    db.close()?;
    Ok(())
}

/// Implements `rrdkit info <path>`.
fn cmd_info(engine: &Engine, path: &Path, format: &InfoFormat) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(engine, path)?;

    match format {
        InfoFormat::Json => println!("{}", serde_json::to_string_pretty(db.info())?),
        InfoFormat::Text => print_info(path, db.info()),
    }

    db.close()?;
    Ok(())
}

fn print_info(path: &Path, info: &RrdInfo) {
    println!("Database: {}", info.filename().unwrap_or(&path.display().to_string()));
    if let Some(version) = info.version() {
        println!("  Version: {version}");
    }
    if let Some(step) = info.step {
        println!("  Step: {}", format_duration_secs(step));
    }
    if let Some(last) = info.last_update() {
        println!("  Last update: {last}");
    }
    if let Some(size) = info.header_size() {
        println!("  Header size: {size} bytes");
    }
    println!();

    println!("Data sources: {}", info.data_sources.len());
    for ds in &info.data_sources {
        match ds.to_definition() {
            Ok(definition) => println!("  {definition}"),
            Err(e) => println!("  {} (unreadable: {e})", ds.name),
        }
        if let Some(last) = ds.last_ds() {
            println!("    last_ds={last}");
        }
    }
    println!();

    println!("Archives: {}", info.archives.len());
    for rra in &info.archives {
        match rra.to_definition() {
            Ok(definition) => println!("  {}: {definition}", rra.index),
            Err(e) => println!("  {}: (unreadable: {e})", rra.index),
        }
        if let (Some(step), Ok(steps), Ok(rows)) = (info.step, rra.pdp_per_row(), rra.rows())
            && let Some((resolution, retention)) = archive_span(step, steps, rows)
        {
            println!(
                "    resolution={}, retention={}",
                format_duration_secs(resolution),
                format_duration_secs(retention)
            );
        }
    }
}

/// Implements `rrdkit fetch <path>`.
fn cmd_fetch(
    engine: &Engine,
    path: &Path,
    cf: ConsolidationFn,
    start: String,
    end: String,
    resolution: Option<u64>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = TimeSpec::from(start);
    let end = TimeSpec::from(end);

    let mut db = Database::open(engine, path)?;
    let result = db.fetch(cf, Some(&start), Some(&end), resolution)?;
    db.close()?;

    match format {
        OutputFormat::Csv => {
            println!(
                "# file={}, cf={cf}, rows={}",
                path.display(),
                result.rows.len()
            );
            println!("timestamp,{}", result.names.join(","));
            for row in &result.rows {
                let values: Vec<String> = row
                    .values
                    .iter()
                    .map(|v| v.map_or_else(String::new, |v| v.to_string()))
                    .collect();
                println!("{},{}", row.timestamp, values.join(","));
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "cf": cf.to_string(),
                "resolution": result.resolution(),
                "names": result.names,
                "rows": result.rows,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `rrdkit graph <outfile> --definition <file>`.
fn cmd_graph(
    engine: &Engine,
    outfile: &str,
    definition: &Path,
    options: &RenderOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let graph = Graph::from_file(definition)?;

    if outfile == "-" {
        let image = graph.render(engine, options)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&image)?;
        stdout.flush()?;
    } else {
        graph.render_to_file(engine, outfile, options)?;
        eprintln!("Wrote {outfile}");
    }

    Ok(())
}

/// Parses `name=value`; `U` (any case) means unknown.
fn parse_value(pair: &str) -> Result<(String, f64), String> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{pair}'"))?;
    let value = if value.eq_ignore_ascii_case("u") {
        f64::NAN
    } else {
        value
            .parse::<f64>()
            .map_err(|e| format!("invalid value for '{name}': {e}"))?
    };
    Ok((name.to_string(), value))
}

/// Seconds covered by one row and by the whole archive, or `None` if
/// either overflows.
fn archive_span(step: u64, steps: u32, rows: u32) -> Option<(u64, u64)> {
    let resolution = step.checked_mul(u64::from(steps))?;
    let retention = resolution.checked_mul(u64::from(rows))?;
    Some((resolution, retention))
}

/// Formats seconds as a human-readable duration.
fn format_duration_secs(secs: u64) -> String {
    if secs >= 86400 && secs.is_multiple_of(86400) {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs.is_multiple_of(3600) {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs.is_multiple_of(60) {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
