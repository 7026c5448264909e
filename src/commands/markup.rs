use std::path::PathBuf;
use std::process::ExitCode;

use pagesnap_lib::output::PAGESNAP_OUTPUT_VERSION;
use pagesnap_lib::{MarkupOutput, SnapError, SnapOutput};

use crate::cli::CaptureArgs;
use crate::commands::Session;
use crate::formatting::{render_error, write_output};

/// Run the markup command.
pub async fn run_markup(config_path: Option<PathBuf>, args: CaptureArgs) -> ExitCode {
    let format = args.format;
    let output = args.output.clone();

    let session = match Session::start(config_path.as_deref(), &args) {
        Ok(session) => session,
        Err(err) => return render_error(err, format, output),
    };

    let result = session.summarizer.get_markup(&args.url, &session.cancel).await;
    session.finish().await;

    let html = match result {
        Ok(html) => html,
        Err(err) => return render_error(err, format, output),
    };

    let body = SnapOutput::Markup(MarkupOutput {
        version: PAGESNAP_OUTPUT_VERSION.to_string(),
        url: args.url,
        html,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(SnapError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
