//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ctxcrop - contextual image-crop derivatives
///
/// Computes derivative paths and URLs for contextually cropped images,
/// generates derivatives once per path, and invalidates them.
#[derive(Parser, Debug)]
#[command(name = "ctxcrop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CTXCROP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the storage path of a derivative
    Path(PathArgs),

    /// Print the public URL of a derivative
    Url(PathArgs),

    /// Decode an inbound request path
    Decode(DecodeArgs),

    /// Generate (if needed) and fetch a derivative
    Deliver(DeliverArgs),

    /// Decode an inbound request path and deliver it
    Get(GetArgs),

    /// Delete contextual derivatives of a style
    Flush(FlushArgs),

    /// List configured image styles
    Styles(StylesArgs),

    /// Manage contextual crops
    Crop(CropArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Source, style and crop of one derivative
#[derive(Parser, Debug)]
pub struct PathArgs {
    /// Source image URI (e.g. public://photos/dog.jpg)
    pub source: String,

    /// Image style id
    pub style: String,

    /// Crop id (omit for no crop)
    #[arg(long)]
    pub crop: Option<u64>,
}

/// Arguments for the decode command
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Request path, e.g. /sites/default/files/contextual/styles/...
    pub path: String,
}

/// Where to put delivered bytes
#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Write the derivative to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Grant access to non-public derivatives
    #[arg(long)]
    pub grant: bool,
}

/// Arguments for the deliver command
#[derive(Parser, Debug)]
pub struct DeliverArgs {
    /// Source image URI
    pub source: String,

    /// Image style id
    pub style: String,

    /// Usage context (e.g. node:article:5.field_image.0)
    #[arg(long, conflicts_with = "crop")]
    pub context: Option<String>,

    /// Crop id
    #[arg(long)]
    pub crop: Option<u64>,

    /// Access token (computed when omitted)
    #[arg(long)]
    pub token: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Request path with optional query (?itok=...)
    pub path: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the flush command
#[derive(Parser, Debug)]
pub struct FlushArgs {
    /// Image style id
    pub style: String,

    /// Only flush derivatives of this source image
    #[arg(long)]
    pub source: Option<String>,
}

/// Arguments for the styles command
#[derive(Parser, Debug)]
pub struct StylesArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the crop command
#[derive(Parser, Debug)]
pub struct CropArgs {
    #[command(subcommand)]
    pub action: CropAction,
}

/// Crop subcommands
#[derive(Subcommand, Debug)]
pub enum CropAction {
    /// Save a contextual crop and print the derivative URL
    Save {
        /// Source image URI
        source: String,

        /// Image style the URL is built for
        style: String,

        /// Usage context
        #[arg(long)]
        context: String,

        /// Plugin settings, e.g. "25,75" for a focal point
        #[arg(long)]
        settings: String,

        /// Crop plugin id
        #[arg(long, default_value = "focal_point")]
        plugin: String,
    },

    /// List crops, optionally under a base context
    List {
        /// Base context prefix (e.g. node:article:5.)
        #[arg(long)]
        context: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete derivatives of every crop under a base context
    Invalidate {
        /// Base context prefix
        context: String,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
