//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use cmlink::builder::MessageFormat;

/// cmlink - use any installable CMake library from a host build
#[derive(Parser)]
#[command(name = "cmlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options accepted by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to CMakeLibs.toml (default: search upward from the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest_path: Option<PathBuf>,

    /// Build cache directory
    #[arg(long, global = true, env = "CMLINK_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every library in CMakeLibs.toml (or the named ones)
    Build(BuildArgs),

    /// Print compile/link flags for a library, building it if needed
    Flags(FlagsArgs),

    /// Print the cache fingerprint of each library variant
    Fingerprint(FingerprintArgs),

    /// Inspect and clean the build cache
    Cache(CacheArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Libraries to build (default: all); dependencies are built too
    pub libraries: Vec<String>,

    /// Parallel jobs passed to each CMake build step
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Libraries built at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Ignore cached results and build again
    #[arg(long)]
    pub rebuild: bool,

    /// Fail instead of accessing the network
    #[arg(long)]
    pub offline: bool,

    /// Timeout in seconds for each CMake invocation
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// CMake generator for libraries that don't choose one
    #[arg(short = 'G', long)]
    pub generator: Option<String>,

    /// Output format: human or json
    #[arg(long, default_value = "human", value_name = "FMT")]
    pub message_format: MessageFormat,
}

#[derive(Args)]
pub struct FlagsArgs {
    /// Library name
    pub library: String,

    /// Variant to print (default: the only variant, or `release`)
    #[arg(long)]
    pub variant: Option<String>,

    /// Only print compile flags
    #[arg(long, conflicts_with = "libs")]
    pub cflags: bool,

    /// Only print link flags
    #[arg(long)]
    pub libs: bool,

    /// Fail instead of accessing the network
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args)]
pub struct FingerprintArgs {
    /// Libraries to show (default: all)
    pub libraries: Vec<String>,

    /// Print 12-character fingerprints
    #[arg(long)]
    pub short: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cache entries
    List,

    /// Remove cache entries
    Clean(CacheCleanArgs),

    /// Print the cache directory
    Path,

    /// Show cache disk usage
    Size,
}

#[derive(Args)]
pub struct CacheCleanArgs {
    /// Fingerprints (or unique prefixes) to remove (default: everything)
    pub fingerprints: Vec<String>,

    /// Only remove entries that are invalid, corrupt or incomplete
    #[arg(long, conflicts_with = "fingerprints")]
    pub invalid: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
