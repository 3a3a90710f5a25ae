//! Graph command builder for `rrdtool graph`.
//!
//! A [`Graph`] collects data definitions (`DEF`, `CDEF`, `VDEF`) and drawing
//! elements (`LINE`, `AREA`, `GPRINT`, `COMMENT`) and renders them into the
//! argument list of `rrdtool graph`. The engine does all the drawing.
//!
//! # Example
//!
//! ```rust
//! use rrdkit::definition::ConsolidationFn;
//! use rrdkit::graph::{Color, Def, Graph, Line, RenderOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::builder()
//!     .title("Disk usage")
//!     .def(Def::new("gb", "/tmp/disk.rrd", "gb_used", ConsolidationFn::Average))
//!     .line(
//!         Line::new("gb")
//!             .width(2.0)
//!             .color("#000099".parse::<Color>()?)
//!             .legend("GB Used"),
//!     )
//!     .build()?;
//!
//! let args = graph.graph_args("-", &RenderOptions::default())?;
//! assert_eq!(
//!     args,
//!     vec![
//!         "-",
//!         "--imgformat",
//!         "PNG",
//!         "--title",
//!         "Disk usage",
//!         "DEF:gb=/tmp/disk.rrd:gb_used:AVERAGE",
//!         "LINE2:gb#000099:GB Used",
//!     ]
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::command::{CommandLine, path_arg};
use crate::definition::ConsolidationFn;
use crate::engine::Engine;
use crate::error::{GraphError, Result};
use crate::time::TimeSpec;

static VNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,255}$").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Escapes colons in free text, which the engine would otherwise treat as
/// field separators.
fn escape_text(text: &str) -> String {
    text.replace(':', "\\:")
}

/// An RGB color with optional alpha.
///
/// ```rust
/// use rrdkit::graph::Color;
///
/// let c: Color = "00ff00".parse().unwrap();
/// assert_eq!(c.to_string(), "#00FF00");
/// assert_eq!(Color::from_rgba(0x0000_99ff).to_string(), "#000099FF");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    rgb: u32,
    alpha: Option<u8>,
}

impl Color {
    /// Creates an opaque color from `0xRRGGBB`; higher bits are ignored.
    pub fn from_rgb(rgb: u32) -> Self {
        Self {
            rgb: rgb & 0x00ff_ffff,
            alpha: None,
        }
    }

    /// Creates a color from `0xRRGGBBAA`.
    pub fn from_rgba(rgba: u32) -> Self {
        Self {
            rgb: rgba >> 8,
            alpha: Some(rgba.to_be_bytes()[3]),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alpha {
            Some(alpha) => write!(f, "#{:06X}{alpha:02X}", self.rgb),
            None => write!(f, "#{:06X}", self.rgb),
        }
    }
}

impl FromStr for Color {
    type Err = GraphError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let invalid = || GraphError::InvalidColor(s.to_string());
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
        match hex.len() {
            6 => Ok(Self::from_rgb(value)),
            8 => Ok(Self::from_rgba(value)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = GraphError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Parts of the graph whose color can be overridden with `--color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    /// Background.
    Back,
    /// Plot area.
    Canvas,
    /// Left and top border.
    ShadeA,
    /// Right and bottom border.
    ShadeB,
    /// Minor grid.
    Grid,
    /// Major grid.
    MGrid,
    /// Text.
    Font,
    /// Axis lines.
    Axis,
    /// Legend box frame.
    Frame,
    /// Axis arrow heads.
    Arrow,
}

impl ColorTag {
    /// The engine token for this tag.
    pub fn token(self) -> &'static str {
        match self {
            Self::Back => "BACK",
            Self::Canvas => "CANVAS",
            Self::ShadeA => "SHADEA",
            Self::ShadeB => "SHADEB",
            Self::Grid => "GRID",
            Self::MGrid => "MGRID",
            Self::Font => "FONT",
            Self::Axis => "AXIS",
            Self::Frame => "FRAME",
            Self::Arrow => "ARROW",
        }
    }
}

/// `DEF`: reads one data source of a database into a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    /// Variable name.
    pub vname: String,
    /// Database path.
    pub path: PathBuf,
    /// Data-source name inside the database.
    pub ds_name: String,
    /// Archive consolidation function to read from.
    pub cf: ConsolidationFn,
    /// Preferred resolution in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    /// Start of the data, overriding the graph start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimeSpec>,
    /// End of the data, overriding the graph end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeSpec>,
    /// Function used when the engine has to further reduce the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<ConsolidationFn>,
}

impl Def {
    /// Creates a `DEF` with no optional fields.
    pub fn new(
        vname: impl Into<String>,
        path: impl AsRef<Path>,
        ds_name: impl Into<String>,
        cf: ConsolidationFn,
    ) -> Self {
        Self {
            vname: vname.into(),
            path: path.as_ref().to_path_buf(),
            ds_name: ds_name.into(),
            cf,
            step: None,
            start: None,
            end: None,
            reduce: None,
        }
    }

    /// Sets the preferred resolution.
    #[must_use]
    pub fn step(mut self, step: u64) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the start time.
    #[must_use]
    pub fn start(mut self, start: impl Into<TimeSpec>) -> Self {
        self.start = Some(start.into());
        self
    }

    /// Sets the end time.
    #[must_use]
    pub fn end(mut self, end: impl Into<TimeSpec>) -> Self {
        self.end = Some(end.into());
        self
    }

    /// Sets the reduce function.
    #[must_use]
    pub fn reduce(mut self, reduce: ConsolidationFn) -> Self {
        self.reduce = Some(reduce);
        self
    }
}

impl fmt::Display for Def {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DEF:{}={}:{}:{}",
            self.vname,
            path_arg(&self.path).replace(':', "\\:"),
            self.ds_name,
            self.cf
        )?;
        if let Some(step) = self.step {
            write!(f, ":step={step}")?;
        }
        if let Some(start) = &self.start {
            write!(f, ":start={start}")?;
        }
        if let Some(end) = &self.end {
            write!(f, ":end={end}")?;
        }
        if let Some(reduce) = self.reduce {
            write!(f, ":reduce={reduce}")?;
        }
        Ok(())
    }
}

/// `CDEF`: a new series computed with an RPN expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cdef {
    /// Variable name.
    pub vname: String,
    /// RPN expression.
    pub rpn: String,
}

impl Cdef {
    /// Creates a `CDEF`.
    pub fn new(vname: impl Into<String>, rpn: impl Into<String>) -> Self {
        Self {
            vname: vname.into(),
            rpn: rpn.into(),
        }
    }
}

impl fmt::Display for Cdef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDEF:{}={}", self.vname, self.rpn)
    }
}

/// `VDEF`: a single value (or time) reduced from a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vdef {
    /// Variable name.
    pub vname: String,
    /// RPN expression, starting with the source variable.
    pub rpn: String,
}

impl Vdef {
    /// Creates a `VDEF`.
    pub fn new(vname: impl Into<String>, rpn: impl Into<String>) -> Self {
        Self {
            vname: vname.into(),
            rpn: rpn.into(),
        }
    }

    /// The variable the expression reduces.
    pub fn source(&self) -> &str {
        self.rpn.split(',').next().unwrap_or_default().trim()
    }
}

impl fmt::Display for Vdef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VDEF:{}={}", self.vname, self.rpn)
    }
}

/// A line through the values of a variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Line {
    /// Variable to draw.
    pub value: String,
    /// Line width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Line color; no color means the line is not drawn but still stacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Legend text; defaults to the variable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
    /// Stack on top of the previous element.
    #[serde(default)]
    pub stack: bool,
}

impl Line {
    /// Creates a line for `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the width.
    #[must_use]
    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Sets the color.
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the legend.
    #[must_use]
    pub fn legend(mut self, legend: impl Into<String>) -> Self {
        self.legend = Some(legend.into());
        self
    }

    /// Stacks on the previous element.
    #[must_use]
    pub fn stack(mut self) -> Self {
        self.stack = true;
        self
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LINE")?;
        if let Some(width) = self.width {
            write!(f, "{width}")?;
        }
        write!(f, ":{}", self.value)?;
        if let Some(color) = self.color {
            write!(f, "{color}")?;
        }
        let legend = self.legend.as_deref().unwrap_or(&self.value);
        write!(f, ":{}", escape_text(legend))?;
        if self.stack {
            f.write_str(":STACK")?;
        }
        Ok(())
    }
}

/// A filled area under the values of a variable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Area {
    /// Variable to draw.
    pub value: String,
    /// Fill color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Legend text; defaults to the variable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
    /// Stack on top of the previous element.
    #[serde(default)]
    pub stack: bool,
}

impl Area {
    /// Creates an area for `value`.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the color.
    #[must_use]
    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the legend.
    #[must_use]
    pub fn legend(mut self, legend: impl Into<String>) -> Self {
        self.legend = Some(legend.into());
        self
    }

    /// Stacks on the previous element.
    #[must_use]
    pub fn stack(mut self) -> Self {
        self.stack = true;
        self
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AREA:{}", self.value)?;
        if let Some(color) = self.color {
            write!(f, "{color}")?;
        }
        let legend = self.legend.as_deref().unwrap_or(&self.value);
        write!(f, ":{}", escape_text(legend))?;
        if self.stack {
            f.write_str(":STACK")?;
        }
        Ok(())
    }
}

/// Something drawn or printed on the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    /// `LINE`.
    Line(Line),
    /// `AREA`.
    Area(Area),
    /// `GPRINT:<vname>:<format>`, printing a `VDEF` value in the legend.
    #[serde(rename = "gprint")]
    GPrint {
        /// Variable to print; must be a `VDEF`.
        vname: String,
        /// printf-style format, e.g. `%6.2lf %S`.
        format: String,
    },
    /// `COMMENT:<text>`.
    Comment {
        /// Legend text.
        text: String,
    },
}

impl Element {
    /// The variable this element reads, if any.
    pub fn vname(&self) -> Option<&str> {
        match self {
            Self::Line(line) => Some(&line.value),
            Self::Area(area) => Some(&area.value),
            Self::GPrint { vname, .. } => Some(vname),
            Self::Comment { .. } => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Line(line) => line.fmt(f),
            Self::Area(area) => area.fmt(f),
            Self::GPrint { vname, format } => write!(f, "GPRINT:{vname}:{}", escape_text(format)),
            Self::Comment { text } => write!(f, "COMMENT:{}", escape_text(text)),
        }
    }
}

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG.
    #[default]
    Png,
    /// SVG.
    Svg,
    /// PDF.
    Pdf,
    /// EPS.
    Eps,
}

impl ImageFormat {
    /// The engine token for this format.
    pub fn token(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Svg => "SVG",
            Self::Pdf => "PDF",
            Self::Eps => "EPS",
        }
    }
}

/// Per-render settings: size, time range, format and colors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Image format.
    pub format: ImageFormat,
    /// Canvas width in pixels.
    pub width: Option<u32>,
    /// Canvas height in pixels.
    pub height: Option<u32>,
    /// Start of the graphed range.
    pub start: Option<TimeSpec>,
    /// End of the graphed range.
    pub end: Option<TimeSpec>,
    /// Lowest value on the y-axis.
    pub lower_limit: Option<f64>,
    /// Highest value on the y-axis.
    pub upper_limit: Option<f64>,
    /// Color overrides.
    pub colors: BTreeMap<ColorTag, Color>,
}

/// A complete graph definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Graph {
    /// Title above the graph.
    pub title: Option<String>,
    /// Label along the y-axis.
    pub vertical_label: Option<String>,
    /// Data definitions.
    pub defs: Vec<Def>,
    /// Computed series.
    pub cdefs: Vec<Cdef>,
    /// Reduced values.
    pub vdefs: Vec<Vdef>,
    /// Drawing and legend elements, in drawing order.
    pub elements: Vec<Element>,
}

impl Graph {
    /// Starts building a graph.
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Loads a graph definition from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Load`] if the file cannot be read or parsed,
    /// or any error from [`validate`](Self::validate).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| GraphError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let graph: Self = serde_json::from_str(&data).map_err(|e| GraphError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        graph.validate()?;
        Ok(graph)
    }

    /// Validates the graph.
    ///
    /// # Errors
    ///
    /// - [`GraphError::NoElements`] if there is nothing to draw.
    /// - [`GraphError::InvalidVariable`] for illegal variable names.
    /// - [`GraphError::DuplicateVariable`] if a name is defined twice.
    /// - [`GraphError::UndefinedVariable`] if an element or `VDEF` reads a
    ///   variable that was never defined.
    pub fn validate(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(GraphError::NoElements.into());
        }

        let names = self
            .defs
            .iter()
            .map(|d| d.vname.as_str())
            .chain(self.cdefs.iter().map(|c| c.vname.as_str()))
            .chain(self.vdefs.iter().map(|v| v.vname.as_str()));

        let mut defined = HashSet::new();
        for vname in names {
            if !VNAME.is_match(vname) {
                return Err(GraphError::InvalidVariable {
                    vname: vname.to_string(),
                }
                .into());
            }
            if !defined.insert(vname) {
                return Err(GraphError::DuplicateVariable {
                    vname: vname.to_string(),
                }
                .into());
            }
        }

        for vdef in &self.vdefs {
            let source = vdef.source();
            if !defined.contains(source) {
                return Err(GraphError::UndefinedVariable {
                    context: vdef.to_string(),
                    vname: source.to_string(),
                }
                .into());
            }
        }

        for element in &self.elements {
            if let Some(vname) = element.vname()
                && !defined.contains(vname)
            {
                return Err(GraphError::UndefinedVariable {
                    context: element.to_string(),
                    vname: vname.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Produces the argument list for `rrdtool graph`.
    ///
    /// `outfile` of `-` makes the engine write the image to stdout.
    ///
    /// # Errors
    ///
    /// Returns any error from [`validate`](Self::validate).
    pub fn graph_args(&self, outfile: &str, options: &RenderOptions) -> Result<Vec<String>> {
        self.validate()?;

        let mut args = vec![
            outfile.to_string(),
            "--imgformat".to_string(),
            options.format.token().to_string(),
        ];
        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        if let Some(title) = &self.title {
            push("--title", title.clone());
        }
        if let Some(label) = &self.vertical_label {
            push("--vertical-label", label.clone());
        }
        if let Some(width) = options.width {
            push("--width", width.to_string());
        }
        if let Some(height) = options.height {
            push("--height", height.to_string());
        }
        if let Some(start) = &options.start {
            push("--start", start.to_string());
        }
        if let Some(end) = &options.end {
            push("--end", end.to_string());
        }
        if let Some(lower) = options.lower_limit {
            push("--lower-limit", lower.to_string());
        }
        if let Some(upper) = options.upper_limit {
            push("--upper-limit", upper.to_string());
        }
        for (tag, color) in &options.colors {
            push("--color", format!("{}{color}", tag.token()));
        }

        args.extend(self.defs.iter().map(ToString::to_string));
        args.extend(self.cdefs.iter().map(ToString::to_string));
        args.extend(self.vdefs.iter().map(ToString::to_string));
        args.extend(self.elements.iter().map(ToString::to_string));
        Ok(args)
    }

    /// Renders the graph and returns the image bytes.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or [`EngineError`](crate::error::EngineError)
    /// if the engine fails.
    pub fn render(&self, engine: &Engine, options: &RenderOptions) -> Result<Vec<u8>> {
        let command = CommandLine::new("graph").args(self.graph_args("-", options)?);
        engine.exec(&command)
    }

    /// Renders the graph into a file.
    ///
    /// # Errors
    ///
    /// Returns a validation error, or [`EngineError`](crate::error::EngineError)
    /// if the engine fails.
    pub fn render_to_file<P: AsRef<Path>>(
        &self,
        engine: &Engine,
        path: P,
        options: &RenderOptions,
    ) -> Result<()> {
        let outfile = path_arg(path.as_ref());
        let command = CommandLine::new("graph").args(self.graph_args(&outfile, options)?);
        engine.exec(&command)?;
        Ok(())
    }
}

/// Accumulates definitions and elements for a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    /// Sets the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.graph.title = Some(title.into());
        self
    }

    /// Sets the y-axis label.
    #[must_use]
    pub fn vertical_label(mut self, label: impl Into<String>) -> Self {
        self.graph.vertical_label = Some(label.into());
        self
    }

    /// Adds a `DEF`.
    #[must_use]
    pub fn def(mut self, def: Def) -> Self {
        self.graph.defs.push(def);
        self
    }

    /// Adds a `CDEF`.
    #[must_use]
    pub fn cdef(mut self, vname: impl Into<String>, rpn: impl Into<String>) -> Self {
        self.graph.cdefs.push(Cdef::new(vname, rpn));
        self
    }

    /// Adds a `VDEF`.
    #[must_use]
    pub fn vdef(mut self, vname: impl Into<String>, rpn: impl Into<String>) -> Self {
        self.graph.vdefs.push(Vdef::new(vname, rpn));
        self
    }

    /// Adds a `LINE`.
    #[must_use]
    pub fn line(mut self, line: Line) -> Self {
        self.graph.elements.push(Element::Line(line));
        self
    }

    /// Adds an `AREA`.
    #[must_use]
    pub fn area(mut self, area: Area) -> Self {
        self.graph.elements.push(Element::Area(area));
        self
    }

    /// Adds a `GPRINT`.
    #[must_use]
    pub fn gprint(mut self, vname: impl Into<String>, format: impl Into<String>) -> Self {
        self.graph.elements.push(Element::GPrint {
            vname: vname.into(),
            format: format.into(),
        });
        self
    }

    /// Adds a `COMMENT`.
    #[must_use]
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.graph.elements.push(Element::Comment { text: text.into() });
        self
    }

    /// Validates and returns the graph.
    ///
    /// # Errors
    ///
    /// Returns any error from [`Graph::validate`].
    pub fn build(self) -> Result<Graph> {
        self.graph.validate()?;
        Ok(self.graph)
    }
}
