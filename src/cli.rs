use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
}

/// Output format for validation and inspection results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Package XML Schema sets into compressed bundles and validate XML against them
#[derive(Parser, Debug, Clone)]
#[command(name = "xsd-bundle")]
#[command(about = "Package multi-file XSD sets into .xsdb bundles and validate XML against them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show detailed information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show critical errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Package an entrypoint schema and its imports/includes into a bundle
    Pack {
        /// Entrypoint schema: a local path or an http(s) URL
        entrypoint: String,

        /// Directory to write the bundle into
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,

        /// Exact output file name instead of the derived <uuid>.xsdb
        #[arg(long)]
        name: Option<PathBuf>,

        /// Download cache directory for remote schemas
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Validate XML files against one or more bundles
    Validate {
        /// Bundle file (repeatable)
        #[arg(short = 'b', long = "bundle", required = true)]
        bundles: Vec<PathBuf>,

        /// XML files or directories to validate
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// File extension to pick up when scanning directories
        #[arg(long, default_value = "xml")]
        extension: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the index of a bundle file
    Inspect {
        /// Bundle file
        bundle: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

impl Cli {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}
