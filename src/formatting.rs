use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pagesnap_lib::output::PAGESNAP_OUTPUT_VERSION;
use pagesnap_lib::{ErrorOutput, SnapError, SnapOutput};

use crate::cli::OutputFormat;

/// Links and requests listed in pretty output before eliding the rest.
const PRETTY_LIST_LIMIT: usize = 20;

/// Write output in the requested format.
pub fn write_output(
    body: &SnapOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: SnapError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let error_payload = err.to_payload();
    let payload = SnapOutput::Error(ErrorOutput {
        version: PAGESNAP_OUTPUT_VERSION.to_string(),
        message: Some(error_payload.message.clone()),
        error: error_payload,
    });

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    ExitCode::from(2)
}

/// Write JSON output to file or stdout.
fn write_json_output(body: &SnapOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty output to file or stdout.
fn write_pretty_output(body: &SnapOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn describe_image(image: &pagesnap_lib::ImageData) -> String {
    match (image.width, image.height) {
        (Some(w), Some(h)) => format!("{}x{} {}, {} bytes", w, h, image.format, image.bytes),
        _ => format!("{}, {} bytes", image.format, image.bytes),
    }
}

/// Format output for human consumption in a terminal.
pub fn format_pretty(body: &SnapOutput, colorize: bool) -> String {
    let mut buf = String::new();
    match body {
        SnapOutput::Summary(out) => {
            let header = color("[SUMMARY]", "32", colorize);
            writeln!(buf, "{} {}", header, out.url).ok();
            writeln!(buf, "Captured at: {}", out.timestamp.to_rfc3339()).ok();
            writeln!(buf, "Markup: {} bytes", out.html.len()).ok();
            writeln!(buf, "Screenshot: {}", describe_image(&out.screenshot)).ok();

            writeln!(buf, "Links ({}):", out.links.len()).ok();
            for link in out.links.iter().take(PRETTY_LIST_LIMIT) {
                if link.text.is_empty() {
                    writeln!(buf, "- {}", link.href).ok();
                } else {
                    writeln!(buf, "- {} ({})", link.href, link.text).ok();
                }
            }
            if out.links.len() > PRETTY_LIST_LIMIT {
                writeln!(buf, "  ... {} more", out.links.len() - PRETTY_LIST_LIMIT).ok();
            }

            writeln!(buf, "Network activity ({}):", out.network_activity.len()).ok();
            for activity in out.network_activity.iter().take(PRETTY_LIST_LIMIT) {
                let status = activity.response.status;
                let code = status_color_code(status);
                let content_type = activity.response.content_type().unwrap_or("-");
                writeln!(
                    buf,
                    "- {} {} {} [{}]",
                    color(&status.to_string(), code, colorize),
                    activity.request.method,
                    activity.request.url,
                    content_type
                )
                .ok();
            }
            if out.network_activity.len() > PRETTY_LIST_LIMIT {
                writeln!(
                    buf,
                    "  ... {} more",
                    out.network_activity.len() - PRETTY_LIST_LIMIT
                )
                .ok();
            }
        }
        SnapOutput::Markup(out) => {
            let header = color("[MARKUP]", "36", colorize);
            writeln!(buf, "{} {} ({} bytes)", header, out.url, out.html.len()).ok();
            writeln!(buf, "{}", out.html).ok();
        }
        SnapOutput::Screenshot(out) => {
            let header = color("[SCREENSHOT]", "34", colorize);
            let scope = if out.full_page { "full page" } else { "viewport" };
            writeln!(buf, "{} {} ({})", header, out.url, scope).ok();
            writeln!(buf, "Image: {}", describe_image(&out.image)).ok();
        }
        SnapOutput::Error(out) => {
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
        }
    }
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Map an HTTP status to an ANSI color code.
fn status_color_code(status: u16) -> &'static str {
    match status {
        200..=299 => "32", // green
        300..=399 => "33", // yellow
        _ => "31",         // red
    }
}
