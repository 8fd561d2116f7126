use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

/// Geodata fusion CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "hexfuse", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Data root directory (default: ./data)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// JSON config file overriding individual paths
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or verify) a source → cell weight matrix
    Matrix(MatrixArgs),

    /// Aggregate the census grid onto cells
    Population(PopulationArgs),

    /// Aggregate quarterly internet tile measurements onto cells
    Internet,

    /// Aggregate healthcare accessibility samples onto cells
    Health,

    /// Fuse the three per-cell tables into the canonical dataset
    Fuse,

    /// Run every stage in order, reusing cached artifacts
    Pipeline(PopulationArgs),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
pub enum MatrixSource {
    /// Census grid squares (EPSG:3035)
    Grid,
    /// Web-mercator internet tiles
    Quadkey,
}

#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Which source geometry family to build the matrix for
    #[arg(value_enum)]
    pub source: MatrixSource,
}

#[derive(Args, Debug)]
pub struct PopulationArgs {
    /// Census archive to extract the attribute table from first
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub zip: Option<PathBuf>,
}
