mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_markup, run_screenshot, run_summarize};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.verbose);
    run(args).await
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "pagesnap=debug,pagesnap_lib=debug,chromiumoxide=warn"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(args: cli::Cli) -> ExitCode {
    match args.command {
        Commands::Summarize { capture } => run_summarize(args.config, capture).await,
        Commands::Markup { capture } => run_markup(args.config, capture).await,
        Commands::Screenshot {
            capture,
            full_page,
            save,
        } => run_screenshot(args.config, capture, full_page, save).await,
    }
}
