use clap::{Args, Parser, Subcommand, ValueEnum};
use pagesnap_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagesnap")]
#[command(
    version,
    about = "Page Snapshot - Capture markup, links, screenshots and network activity from web pages",
    long_about = "Page Snapshot (pagesnap)\n\nModes:\n- summarize: markup, links, full-page screenshot and every request/response made while loading.\n- markup: rendered HTML only.\n- screenshot: PNG of the viewport or the whole page.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) for engine, pool and timeout settings; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

/// Flags shared by every capture command.
#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    #[arg(long, help = "Page to capture (http, https, file or data URL)")]
    pub url: String,

    #[arg(long, help = "Viewport dimensions (WIDTHxHEIGHT); defaults to the config value")]
    pub viewport: Option<Viewport>,

    #[arg(
        long,
        value_name = "SECS",
        help = "Navigation timeout in seconds; defaults to the config value"
    )]
    pub nav_timeout: Option<u64>,

    #[arg(long, value_enum, default_value = "json", help = "Output format")]
    pub format: OutputFormat,

    #[arg(long, short, help = "Output file path (stdout if omitted)")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture markup, links, a full-page screenshot and network activity
    Summarize {
        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// Capture the rendered markup of a page
    Markup {
        #[command(flatten)]
        capture: CaptureArgs,
    },

    /// Capture a PNG screenshot of a page
    Screenshot {
        #[command(flatten)]
        capture: CaptureArgs,

        #[arg(long, help = "Capture the whole document instead of the viewport")]
        full_page: bool,

        #[arg(
            long,
            value_name = "PATH",
            help = "Also write the raw PNG to this file"
        )]
        save: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
