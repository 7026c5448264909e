use std::path::PathBuf;
use std::process::ExitCode;

use pagesnap_lib::{SnapError, SnapOutput, SummaryOutput};

use crate::cli::CaptureArgs;
use crate::commands::Session;
use crate::formatting::{render_error, write_output};

/// Run the summarize command.
pub async fn run_summarize(config_path: Option<PathBuf>, args: CaptureArgs) -> ExitCode {
    let format = args.format;
    let output = args.output.clone();

    let session = match Session::start(config_path.as_deref(), &args) {
        Ok(session) => session,
        Err(err) => return render_error(err, format, output),
    };

    let result = session
        .summarizer
        .capture_summary(&args.url, &session.cancel)
        .await;
    session.finish().await;

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => return render_error(err, format, output),
    };

    let body = SnapOutput::Summary(SummaryOutput::from(summary));
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(SnapError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
