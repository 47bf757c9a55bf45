use clap::{Args, Parser, Subcommand, ValueEnum};
use gridmap_batch::ChunkRange;
use gridmap_mapping::ResolutionPolicy;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gridmap", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Map time series onto a network and write the requested outputs
    Map(MapArgs),
    /// Map a point range in parallel chunks
    Batch(BatchArgs),
    /// Show how a point range is cut into chunks
    Chunks {
        /// First point (inclusive)
        #[arg(long, default_value_t = 0)]
        first: i64,
        /// Last point (inclusive)
        #[arg(long, required_unless_present = "range")]
        last: Option<i64>,
        /// Disjoint `FIRST:LAST` ranges to cut instead of `--first`/`--last`
        #[arg(long, conflicts_with_all = ["first", "last"])]
        range: Vec<ChunkRange>,
        /// Maximum points per chunk
        #[arg(long)]
        size: i64,
        /// Only print the range of this chunk
        #[arg(long, allow_hyphen_values = true)]
        index: Option<i64>,
        /// Only print the chunk holding this point
        #[arg(long, conflicts_with = "index")]
        point: Option<i64>,
    },
    /// List the variables a time series can be mapped to
    Variables {
        /// Restrict to one equipment kind (generator, load, hvdc_line, ...)
        #[arg(long)]
        kind: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    ScaleDown,
    WidenLimits,
}

impl From<PolicyArg> for ResolutionPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::ScaleDown => ResolutionPolicy::ScaleDown,
            PolicyArg::WidenLimits => ResolutionPolicy::WidenLimits,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Csv,
    Json,
}

/// Inputs shared by `map` and `batch`.
#[derive(Args, Debug)]
pub struct MappingInputs {
    /// Network JSON file
    #[arg(long)]
    pub network: PathBuf,
    /// Time series CSV (`Time;Version;<ts>...`)
    #[arg(long)]
    pub timeseries: PathBuf,
    /// Mapping configuration (YAML or JSON)
    #[arg(long)]
    pub config: PathBuf,
    /// Mapper parameters file; flags below override its values
    #[arg(long)]
    pub parameters: Option<PathBuf>,
    /// Output directory
    #[arg(short, long)]
    pub out: PathBuf,
    /// Versions to map, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    pub versions: Vec<i32>,
    /// First point to map
    #[arg(long)]
    pub first: Option<usize>,
    /// Last point to map
    #[arg(long)]
    pub last: Option<usize>,
    /// Resolution of powers outside their limits
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
    /// Skip mappings whose equipment list is empty instead of failing
    #[arg(long)]
    pub ignore_empty_filter: bool,
    /// Evaluate every series at every point, even constant ones
    #[arg(long)]
    pub no_constant_detection: bool,
    /// Export full network snapshots: `all` or comma separated points
    #[arg(long)]
    pub snapshots: Option<String>,
}

#[derive(Args, Debug)]
pub struct MapArgs {
    #[command(flatten)]
    pub inputs: MappingInputs,
    /// Do not write delta files
    #[arg(long)]
    pub no_delta: bool,
    /// Write the balance summary
    #[arg(long)]
    pub balance: bool,
    /// Write every mapped value per version, with this file prefix
    #[arg(long)]
    pub values: Option<String>,
    /// Format of the diagnostics log
    #[arg(long, value_enum, default_value = "csv")]
    pub log_format: LogFormat,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub inputs: MappingInputs,
    /// Maximum points per chunk
    #[arg(long, default_value_t = 92)]
    pub chunk_size: i64,
    /// Worker threads (0 = one per CPU)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}
