//! Scoped ownership of an open page and the context it was opened in.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::browser::{ContextLease, PageSession};
use crate::{Result, SnapError};

/// Owns a page together with the lease of its context.
///
/// [`PageScope::close`] closes the page and then returns the context. If the
/// scope is dropped first (the capture future was abandoned) the same cleanup
/// is spawned onto the runtime. A page that fails to close, or does not close
/// within `close_timeout`, takes its context out of the pool with it.
pub(crate) struct PageScope {
    page: Option<Box<dyn PageSession>>,
    lease: Option<ContextLease>,
    close_timeout: Duration,
}

impl PageScope {
    pub fn new(page: Box<dyn PageSession>, lease: ContextLease, close_timeout: Duration) -> Self {
        Self {
            page: Some(page),
            lease: Some(lease),
            close_timeout,
        }
    }

    pub fn page(&mut self) -> Result<&mut dyn PageSession> {
        match self.page.as_deref_mut() {
            Some(page) => Ok(page),
            None => Err(SnapError::engine("page is already closed")),
        }
    }

    pub async fn close(mut self) {
        if let (Some(page), Some(lease)) = (self.page.take(), self.lease.take()) {
            close_and_return(page, lease, self.close_timeout).await;
        }
    }
}

impl Drop for PageScope {
    fn drop(&mut self) {
        let (Some(page), Some(lease)) = (self.page.take(), self.lease.take()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(context = %lease.id(), "Capture abandoned; closing its page in the background");
                runtime.spawn(close_and_return(page, lease, self.close_timeout));
            }
            Err(_) => {
                warn!(context = %lease.id(), "No runtime to close an abandoned page; dropping its context");
                lease.forget();
            }
        }
    }
}

async fn close_and_return(mut page: Box<dyn PageSession>, lease: ContextLease, limit: Duration) {
    match timeout(limit, page.close()).await {
        Ok(Ok(())) => lease.release(),
        Ok(Err(err)) => {
            warn!(context = %lease.id(), error = %err, "Failed to close page; dropping the context");
            lease.discard().await;
        }
        Err(_) => {
            warn!(context = %lease.id(), ?limit, "Page close timed out; dropping the context");
            lease.discard().await;
        }
    }
}
