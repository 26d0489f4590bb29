use std::time::Duration;

use anyhow::anyhow;
use futures::future::abortable;
use tracing::{info, instrument};

use crate::config::GridConfig;
use crate::error::RunError;

/// One-shot reachability and credential check against the grid hub.
#[derive(Clone)]
pub struct GridProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl GridProber {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Issues a single authenticated GET against the hub status endpoint.
    ///
    /// Any transport failure or a status outside 2xx/3xx is a
    /// `RunError::Connectivity`. The in-flight request is aborted once the
    /// probe returns, whatever the outcome.
    #[instrument(skip_all, fields(status_url = %grid.status_url()))]
    pub async fn probe(&self, grid: &GridConfig) -> Result<(), RunError> {
        let url = grid.status_url();
        let (username, password) = grid.credentials();

        let request = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .timeout(self.timeout)
            .send();

        let (request, handle) = abortable(request);
        let result = request.await;
        handle.abort();

        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                info!("Grid connection: FAILED");
                return Err(RunError::Connectivity(
                    anyhow::Error::new(e).context(format!("status check to {url} failed")),
                ));
            }
            Err(_aborted) => {
                return Err(RunError::Connectivity(anyhow!(
                    "status check to {url} was cancelled"
                )));
            }
        };

        let status = response.status();
        let ok = status.is_success() || status.is_redirection();
        info!(%status, "Grid connection: {}", if ok { "SUCCESS" } else { "FAILED" });

        if !ok {
            return Err(RunError::Connectivity(anyhow!(
                "failed to connect to grid at {url} (HTTP {status}); check your credentials"
            )));
        }

        Ok(())
    }
}
