use std::path::PathBuf;
use std::process::ExitCode;

use pagesnap_lib::output::PAGESNAP_OUTPUT_VERSION;
use pagesnap_lib::{ImageData, ScreenshotOutput, SnapError, SnapOutput};
use tracing::info;

use crate::cli::CaptureArgs;
use crate::commands::Session;
use crate::formatting::{render_error, write_output};

/// Run the screenshot command.
pub async fn run_screenshot(
    config_path: Option<PathBuf>,
    args: CaptureArgs,
    full_page: bool,
    save: Option<PathBuf>,
) -> ExitCode {
    let format = args.format;
    let output = args.output.clone();

    let session = match Session::start(config_path.as_deref(), &args) {
        Ok(session) => session,
        Err(err) => return render_error(err, format, output),
    };

    let result = session
        .summarizer
        .get_screenshot(&args.url, full_page, &session.cancel)
        .await;
    session.finish().await;

    let png = match result {
        Ok(png) => png,
        Err(err) => return render_error(err, format, output),
    };

    if let Some(path) = save {
        if let Err(err) = tokio::fs::write(&path, &png).await {
            return render_error(SnapError::Io(err), format, output);
        }
        info!(path = %path.display(), bytes = png.len(), "Saved screenshot");
    }

    let body = SnapOutput::Screenshot(ScreenshotOutput {
        version: PAGESNAP_OUTPUT_VERSION.to_string(),
        url: args.url,
        full_page,
        image: ImageData::png(&png),
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(SnapError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
