use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use topology_qa_lib::{IndexKind, MatchParameters, Orientation};

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Topology QA - find gaps, misaligned boundaries, overlaps and near vertices in WKT feature files
///
/// Input files hold one WKT geometry per line; blank lines and lines starting with `#` are
/// skipped. The line number of a geometry is its feature id.
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Gaps and slivers between neighbouring polygons of one coverage
    Gaps {
        /// Coverage file
        input: PathBuf,

        /// Only report matched segments, without indicator geometries
        #[clap(long, default_value = "false")]
        no_indicators: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Segments of a subject collection matching, but not equal to, a reference collection
    Matches {
        /// Reference file (indexed)
        reference: PathBuf,

        /// Subject file (scanned)
        subject: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Features whose interiors intersect, within one file or across two
    Overlaps {
        /// First (indexed) file
        input: PathBuf,

        /// Optional second (scanned) file
        other: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Vertices closer than the distance tolerance but not equal
    CloseVertices {
        /// First (scanned) file
        input0: PathBuf,

        /// Second (indexed) file
        input1: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },
}

impl Command {
    #[inline]
    pub fn common(&self) -> &CommonArgs {
        match self {
            Command::Gaps { common, .. }
            | Command::Matches { common, .. }
            | Command::Overlaps { common, .. }
            | Command::CloseVertices { common, .. } => common,
        }
    }

    /// Subcommand name used in the summary
    pub fn name(&self) -> &'static str {
        match self {
            Command::Gaps { .. } => "gaps",
            Command::Matches { .. } => "matches",
            Command::Overlaps { .. } => "overlaps",
            Command::CloseVertices { .. } => "close-vertices",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Maximum distance between matched segments or close vertices
    #[clap(long, default_value = "1.0")]
    pub distance_tolerance: f64,

    /// Maximum angle between matched segments, in degrees
    #[clap(long, default_value = "22.5")]
    pub angle_tolerance: f64,

    /// Required relative direction of matched segments
    #[clap(long, value_enum, default_value_t = OrientationArg::Opposite)]
    pub orientation: OrientationArg,

    /// Restrict the check to features intersecting this WKT geometry
    #[clap(long, value_name = "WKT")]
    pub fence: Option<String>,

    /// Spatial index implementation
    #[clap(long, value_enum, default_value_t = IndexArg::Rtree)]
    pub index: IndexArg,

    /// Directory to write indicator layers to (one `<name>.wkt` file each)
    #[clap(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Print the summary as JSON on stdout
    #[clap(long, default_value = "false")]
    pub json: bool,

    /// Log debug output
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn match_parameters(&self) -> MatchParameters {
        MatchParameters {
            distance_tolerance: self.distance_tolerance,
            angle_tolerance: self.angle_tolerance,
            orientation: self.orientation.into(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationArg {
    Same,
    Opposite,
    Either,
}

impl From<OrientationArg> for Orientation {
    fn from(value: OrientationArg) -> Self {
        match value {
            OrientationArg::Same => Orientation::Same,
            OrientationArg::Opposite => Orientation::Opposite,
            OrientationArg::Either => Orientation::Either,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexArg {
    Rtree,
    Quadtree,
    BruteForce,
}

impl From<IndexArg> for IndexKind {
    fn from(value: IndexArg) -> Self {
        match value {
            IndexArg::Rtree => IndexKind::RTree,
            IndexArg::Quadtree => IndexKind::Quadtree,
            IndexArg::BruteForce => IndexKind::BruteForce,
        }
    }
}
