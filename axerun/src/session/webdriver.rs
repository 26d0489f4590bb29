use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thirtyfour::WebDriver;

use super::{BrowserSession, Protocol, ReleaseError};

/// A browser behind a WebDriver endpoint: a local driver binary or a remote
/// grid hub.
pub struct WebDriverSession {
    driver: Option<WebDriver>,
    session_id: String,
}

impl WebDriverSession {
    pub async fn connect(endpoint: &str, capabilities: Map<String, Value>) -> Result<Self> {
        let driver = WebDriver::new(endpoint, capabilities)
            .await
            .context("failed to start WebDriver session")?;
        let session_id = driver.session_id().to_string();
        Ok(Self {
            driver: Some(driver),
            session_id,
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver.as_ref().context("WebDriver session is closed")
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    fn protocol(&self) -> Protocol {
        Protocol::WebDriver
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.driver()?.goto(url).await?;
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.driver()?.title().await?)
    }

    async fn inject_script(&self, source: &str) -> Result<()> {
        self.driver()?
            .execute(source, Vec::<Value>::new())
            .await
            .context("failed to inject script")?;
        Ok(())
    }

    async fn execute_async(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let ret = self
            .driver()?
            .execute_async(script, args)
            .await
            .context("async script failed")?;
        Ok(ret.json().clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.driver()?
            .screenshot(path)
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn close(&mut self) -> Vec<ReleaseError> {
        let Some(driver) = self.driver.take() else {
            return Vec::new();
        };
        match driver.quit().await {
            Ok(()) => Vec::new(),
            Err(e) => vec![ReleaseError::new("session", e)],
        }
    }
}
