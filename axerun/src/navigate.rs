use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{info, instrument};

use crate::error::RunError;
use crate::session::BrowserSession;

/// What the run learned about the page after loading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub title: String,
}

/// Loads `url` within `timeout` and reads the page title.
#[instrument(skip(session))]
pub async fn navigate(
    session: &dyn BrowserSession,
    url: &str,
    timeout: Duration,
) -> Result<Navigation, RunError> {
    info!("Navigating to {url}");

    match tokio::time::timeout(timeout, session.goto(url)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(RunError::Navigation(e.context(format!("failed to load {url}"))));
        }
        Err(_elapsed) => {
            return Err(RunError::Navigation(anyhow!(
                "timed out after {}s loading {url}",
                timeout.as_secs()
            )));
        }
    }

    let title = session
        .title()
        .await
        .context("failed to read page title")
        .map_err(RunError::Navigation)?;
    info!(%title, "Page loaded");

    Ok(Navigation { title })
}
