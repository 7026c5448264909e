mod markup;
mod screenshot;
mod summarize;

pub use markup::run_markup;
pub use screenshot::run_screenshot;
pub use summarize::run_summarize;

use std::path::Path;

use pagesnap_lib::{Config, PageSummarizer, SnapError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CaptureArgs;
use crate::settings::{apply_overrides, load_config, log_effective_config};

/// Everything a capture command needs once flags and config are merged.
pub(crate) struct Session {
    pub summarizer: PageSummarizer,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn start(config_path: Option<&Path>, args: &CaptureArgs) -> Result<Self, SnapError> {
        let config = load_config(config_path)?;
        let config: Config = apply_overrides(config, args)?;
        log_effective_config(&config, config_path);

        let summarizer = PageSummarizer::from_config(&config)?;
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_interrupt.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_ok() {
                        info!("Interrupted; cancelling capture");
                        on_interrupt.cancel();
                    }
                }
            }
        });

        Ok(Self { summarizer, cancel })
    }

    /// Stops the interrupt watcher and tears down the engine.
    pub async fn finish(self) {
        self.cancel.cancel();
        if let Err(err) = self.summarizer.shutdown().await {
            warn!(error = %err, "Engine shutdown failed");
        }
    }
}
