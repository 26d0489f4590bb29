use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, instrument};

use crate::config::AxeSourceLocation;

pub const DEFAULT_AXE_SOURCE_URL: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.10.2/axe.min.js";

const UNKNOWN_VERSION: &str = "unknown";

/// The axe-core script injected into the page, plus the version read from its
/// license banner (`/*! axe v4.10.2`).
#[derive(Debug, Clone)]
pub struct AxeSource {
    script: Arc<str>,
    version: String,
}

impl AxeSource {
    pub fn new(script: impl Into<String>) -> Self {
        let script: String = script.into();
        let version = banner_version(&script).unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        Self {
            script: Arc::from(script),
            version,
        }
    }

    #[instrument(skip(client))]
    pub async fn load(location: &AxeSourceLocation, client: &reqwest::Client) -> Result<Self> {
        let script = match location {
            AxeSourceLocation::Path(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read axe-core from {}", path.display()))?,
            AxeSourceLocation::Url(url) => {
                let response = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("failed to download axe-core from {url}"))?;
                let status = response.status();
                if !status.is_success() {
                    bail!("{url} returned HTTP {status}");
                }
                response
                    .text()
                    .await
                    .with_context(|| format!("failed to read body from {url}"))?
            }
        };

        if script.trim().is_empty() {
            bail!("axe-core source is empty");
        }

        let source = Self::new(script);
        debug!(version = %source.version, bytes = source.script.len(), "loaded axe-core");
        Ok(source)
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

fn banner_version(script: &str) -> Option<String> {
    let head: String = script.chars().take(512).collect();
    let start = head.find("axe v")? + "axe v".len();
    let version: String = head[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
        .collect();
    if version.is_empty() { None } else { Some(version) }
}
