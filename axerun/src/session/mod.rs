pub mod devtools;
pub mod webdriver;

use std::fmt;
use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, Transport};
use crate::error::RunError;

pub use devtools::DevToolsSession;
pub use webdriver::WebDriverSession;

pub const VIEWPORT_WIDTH: u32 = 2048;
pub const VIEWPORT_HEIGHT: u32 = 1536;

/// Wire protocol spoken to the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    DevTools,
    WebDriver,
}

impl Protocol {
    pub fn label(self) -> &'static str {
        match self {
            Self::DevTools => "devtools",
            Self::WebDriver => "webdriver",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Browser engine family a configured browser name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Chromium,
    Firefox,
    WebKit,
}

impl Engine {
    /// Case-insensitive lookup. Unknown names fall back to Chromium rather
    /// than failing the run.
    pub fn resolve(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" | "edge" | "microsoftedge" => Self::Chromium,
            "firefox" => Self::Firefox,
            "webkit" | "safari" => Self::WebKit,
            other => {
                debug!(browser = other, "unrecognized browser name, using chromium");
                Self::Chromium
            }
        }
    }

    /// `browserName` capability for a local WebDriver endpoint.
    pub fn webdriver_name(self) -> &'static str {
        match self {
            Self::Chromium => "chrome",
            Self::Firefox => "firefox",
            Self::WebKit => "safari",
        }
    }
}

/// A browser resource that could not be released during teardown.
#[derive(Debug)]
pub struct ReleaseError {
    pub resource: &'static str,
    pub error: anyhow::Error,
}

impl ReleaseError {
    pub fn new(resource: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self {
            resource,
            error: error.into(),
        }
    }
}

/// A live browser the run controls: one page, navigated once, audited once.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Identifier assigned by the automation engine, if it assigns one.
    fn session_id(&self) -> Option<String>;

    /// Loads `url` and waits for the page load and its network to settle.
    async fn goto(&self, url: &str) -> anyhow::Result<()>;

    async fn title(&self) -> anyhow::Result<String>;

    /// Runs a script in the page for its side effects.
    async fn inject_script(&self, source: &str) -> anyhow::Result<()>;

    /// Evaluates an expression, awaiting it if it is a promise.
    async fn evaluate(&self, expression: &str) -> anyhow::Result<Value> {
        let _ = expression;
        bail!("expression evaluation is not supported over {}", self.protocol())
    }

    /// Runs a WebDriver-style async script; the last argument is the
    /// completion callback.
    async fn execute_async(&self, script: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let _ = (script, args);
        bail!("async scripts are not supported over {}", self.protocol())
    }

    async fn screenshot(&self, path: &Path) -> anyhow::Result<()>;

    /// Releases page, context and browser in that order. Each release is
    /// attempted even if an earlier one failed.
    async fn close(&mut self) -> Vec<ReleaseError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn create(
        &self,
        config: &Config,
        engine_version: &str,
    ) -> Result<Box<dyn BrowserSession>, RunError>;
}

/// Opens real browser sessions: chromium over DevTools, everything else over
/// WebDriver, and grid sessions over WebDriver.
pub struct DriverSessionProvider;

#[async_trait]
impl SessionProvider for DriverSessionProvider {
    async fn create(
        &self,
        config: &Config,
        engine_version: &str,
    ) -> Result<Box<dyn BrowserSession>, RunError> {
        open_session(config, engine_version)
            .await
            .map_err(RunError::Session)
    }
}

async fn open_session(
    config: &Config,
    engine_version: &str,
) -> anyhow::Result<Box<dyn BrowserSession>> {
    let engine = Engine::resolve(&config.browser.name);

    match config.session.transport {
        Transport::Local if engine == Engine::Chromium => {
            info!(headless = config.session.headless, "Launching chromium");
            let session =
                DevToolsSession::launch(config.session.headless, config.system.debug).await?;
            Ok(Box::new(session))
        }
        Transport::Local => {
            info!(
                browser = engine.webdriver_name(),
                endpoint = %config.session.webdriver_url,
                "Connecting to local WebDriver"
            );
            let endpoint = endpoint_url(&config.session.webdriver_url)?;
            let capabilities = local_capabilities(engine, config.session.headless);
            let session = WebDriverSession::connect(endpoint.as_str(), capabilities).await?;
            Ok(Box::new(session))
        }
        Transport::Remote => {
            info!(endpoint = %config.grid.webdriver_url(), "Connecting to grid");
            let url = authenticated_url(config)?;
            let capabilities = remote_capabilities(config, engine_version);
            let session = WebDriverSession::connect(url.as_str(), capabilities).await?;
            Ok(Box::new(session))
        }
    }
}

/// Parses a WebDriver endpoint and gives its path a trailing slash, so that
/// command paths like `session` are joined below it instead of replacing the
/// last segment.
fn endpoint_url(raw: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(raw).with_context(|| format!("invalid WebDriver URL: {raw}"))?;
    let path = format!("{}/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

fn authenticated_url(config: &Config) -> anyhow::Result<Url> {
    let raw = config.grid.webdriver_url();
    let mut url = endpoint_url(&raw)?;
    let (username, password) = config.grid.credentials();
    url.set_username(username)
        .map_err(|_| anyhow::anyhow!("cannot embed credentials in {raw}"))?;
    url.set_password(Some(password))
        .map_err(|_| anyhow::anyhow!("cannot embed credentials in {raw}"))?;
    Ok(url)
}

pub fn local_capabilities(engine: Engine, headless: bool) -> Map<String, Value> {
    let mut caps = Map::new();
    caps.insert("browserName".into(), json!(engine.webdriver_name()));
    caps.insert("acceptInsecureCerts".into(), json!(true));

    let size = format!("--window-size={VIEWPORT_WIDTH},{VIEWPORT_HEIGHT}");
    match engine {
        Engine::Firefox => {
            let mut args = vec![
                format!("--width={VIEWPORT_WIDTH}"),
                format!("--height={VIEWPORT_HEIGHT}"),
            ];
            if headless {
                args.push("-headless".into());
            }
            caps.insert("moz:firefoxOptions".into(), json!({ "args": args }));
        }
        Engine::Chromium => {
            let mut args = vec![size];
            if headless {
                args.push("--headless=new".into());
            }
            caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
        }
        // safaridriver has no headless mode and no window arguments.
        Engine::WebKit => {}
    }
    caps
}

pub fn remote_capabilities(config: &Config, engine_version: &str) -> Map<String, Value> {
    let mut caps = Map::new();
    caps.insert("browserName".into(), json!(config.browser.name));
    caps.insert("browserVersion".into(), json!(config.browser.version));
    caps.insert("platformName".into(), json!(config.browser.platform));
    caps.insert("acceptInsecureCerts".into(), json!(true));
    caps.insert(
        "sauce:options".into(),
        json!({
            "region": config.grid.data_center,
            "name": config.test.name,
            "build": config.system.build_id,
            "custom-data": {
                "tool": "axe-core",
                "version": engine_version,
            },
            "public": "public",
            "recordScreenshots": true,
            "screenResolution": format!("{VIEWPORT_WIDTH}x{VIEWPORT_HEIGHT}"),
            "extendedDebugging": true,
            "capturePerformance": true,
        }),
    );
    caps
}
