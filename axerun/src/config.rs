use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::audit::source::DEFAULT_AXE_SOURCE_URL;
use crate::error::RunError;
use crate::hub::ParsedHubUrl;

pub const DEFAULT_RULE_TAGS: [&str; 2] = ["wcag2a", "wcag2aa"];
pub const DEFAULT_TEST_URL: &str = "https://webdriver.io/";
pub const DEFAULT_REGION: &str = "us-west-1";
pub const DEFAULT_DATA_CENTER: &str = "us-west";
pub const DEFAULT_BROWSER: &str = "chrome";
pub const DEFAULT_BROWSER_VERSION: &str = "latest";
pub const DEFAULT_PLATFORM: &str = "macOS 12";
pub const DEFAULT_OUTPUT_DIR: &str = ".tmp";
pub const DEFAULT_OUTPUT_FILENAME: &str = "axe-report.json";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw option values as they arrive from flags or the environment.
///
/// Every field is optional; `Config::resolve` supplies the defaults.
#[derive(Debug, Clone, Default)]
pub struct RawSettings {
    pub run_on_grid: Option<String>,
    pub username: Option<String>,
    pub access_key: Option<String>,
    pub region: Option<String>,
    pub data_center: Option<String>,
    pub hub_url: Option<String>,
    pub api_url: Option<String>,
    pub test_url: Option<String>,
    pub test_name: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
    pub platform_name: Option<String>,
    pub rule_tags: Option<String>,
    pub axe_source_path: Option<PathBuf>,
    pub axe_source_url: Option<String>,
    pub transport: Option<String>,
    pub webdriver_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output_filename: Option<String>,
    pub output_console: Option<String>,
    pub headless: Option<String>,
    pub log_level: Option<String>,
    pub debug: Option<String>,
    pub ci_platform: Option<String>,
    pub proxy: Option<String>,
    pub build_number: Option<String>,
}

/// A feature is on unless its value is literally `"false"`.
pub fn enabled_unless_false(raw: Option<&str>) -> bool {
    raw != Some("false")
}

/// Splits a comma-separated tag list, dropping blank entries.
pub fn parse_rule_tags(raw: Option<&str>) -> Vec<String> {
    let tags: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect();

    if tags.is_empty() {
        DEFAULT_RULE_TAGS.iter().map(|t| t.to_string()).collect()
    } else {
        tags
    }
}

/// How the browser session is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// A browser launched on this machine.
    Local,
    /// A WebDriver session on the grid.
    Remote,
}

impl FromStr for Transport {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(RunError::Configuration(format!(
                "unknown transport: {other} (valid: local, remote)"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GridConfig {
    pub enabled: bool,
    pub username: String,
    pub access_key: String,
    pub region: String,
    pub data_center: String,
    pub hub: Option<ParsedHubUrl>,
    pub api_url: Option<String>,
}

impl GridConfig {
    /// Hub credentials when a hub URL is configured, else the grid ones.
    pub fn credentials(&self) -> (&str, &str) {
        match &self.hub {
            Some(hub) => (&hub.username, &hub.password),
            None => (&self.username, &self.access_key),
        }
    }

    pub fn status_url(&self) -> String {
        match &self.hub {
            Some(hub) => hub.status_url(),
            None => format!("https://ondemand.{}.saucelabs.com/wd/hub/status", self.region),
        }
    }

    pub fn webdriver_url(&self) -> String {
        match &self.hub {
            Some(hub) => hub.webdriver_url(),
            None => format!("https://ondemand.{}.saucelabs.com:443/wd/hub", self.region),
        }
    }

    pub fn api_base(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://api.{}.saucelabs.com", self.region),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestConfig {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    pub name: String,
    pub version: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxeSourceLocation {
    Path(PathBuf),
    Url(String),
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub rule_tags: Vec<String>,
    pub source: AxeSourceLocation,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub filename: String,
    pub console_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub transport: Transport,
    pub headless: bool,
    pub webdriver_url: String,
    pub navigation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub log_level: LevelFilter,
    pub debug: bool,
    pub build_id: String,
}

impl SystemConfig {
    /// Resolves the logging and build settings on their own, so logging can
    /// be installed before the rest of the configuration is resolved.
    ///
    /// `DEBUG=true` forces debug logging whatever `LOG_LEVEL` says.
    pub fn from_settings(raw: &RawSettings) -> Self {
        let debug = raw.debug.as_deref() == Some("true");
        let log_level = if debug {
            LevelFilter::DEBUG
        } else {
            parse_log_level(raw.log_level.as_deref())
        };
        let build_id = raw
            .build_number
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| format!("build-{}", chrono::Utc::now().timestamp_millis()));

        Self {
            log_level,
            debug,
            build_id,
        }
    }
}

/// `silent` and `off` disable logging; anything unrecognised means `warn`.
pub fn parse_log_level(raw: Option<&str>) -> LevelFilter {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("silent" | "off") => LevelFilter::OFF,
        Some("error") => LevelFilter::ERROR,
        Some("info") => LevelFilter::INFO,
        Some("debug") => LevelFilter::DEBUG,
        Some("trace") => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Let the HTTP client pick up the system proxy settings.
    System,
    /// Never use a proxy.
    Disabled,
    Explicit(String),
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub proxy: ProxyPolicy,
    pub timeout: Duration,
}

/// Immutable configuration for a single run.
#[derive(Debug, Clone)]
pub struct Config {
    pub grid: GridConfig,
    pub test: TestConfig,
    pub browser: BrowserInfo,
    pub audit: AuditConfig,
    pub output: OutputConfig,
    pub session: SessionConfig,
    pub system: SystemConfig,
    pub network: NetworkConfig,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn resolve(raw: RawSettings) -> Result<Self, RunError> {
        let system = SystemConfig::from_settings(&raw);
        let enabled = enabled_unless_false(raw.run_on_grid.as_deref());
        let username = raw.username.unwrap_or_default();
        let access_key = raw.access_key.unwrap_or_default();

        let hub = raw.hub_url.as_deref().and_then(|url| {
            match ParsedHubUrl::parse(url, &username, &access_key) {
                Ok(hub) => Some(hub),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "ignoring invalid SAUCE_LABS_HUB");
                    None
                }
            }
        });

        let transport = match raw.transport.as_deref() {
            Some(t) => t.parse()?,
            None if enabled => Transport::Remote,
            None => Transport::Local,
        };

        let source = match (raw.axe_source_path, raw.axe_source_url) {
            (Some(path), _) => AxeSourceLocation::Path(path),
            (None, Some(url)) => AxeSourceLocation::Url(url),
            (None, None) => AxeSourceLocation::Url(DEFAULT_AXE_SOURCE_URL.to_string()),
        };

        let proxy = if raw
            .ci_platform
            .as_deref()
            .is_some_and(|p| p.contains("jenkins"))
        {
            ProxyPolicy::Disabled
        } else {
            match raw.proxy.filter(|p| !p.is_empty()) {
                Some(p) => ProxyPolicy::Explicit(p),
                None => ProxyPolicy::System,
            }
        };

        let now = chrono::Utc::now();

        Ok(Self {
            grid: GridConfig {
                enabled,
                username,
                access_key,
                region: or_default(raw.region, DEFAULT_REGION),
                data_center: or_default(raw.data_center, DEFAULT_DATA_CENTER),
                hub,
                api_url: raw.api_url,
            },
            test: TestConfig {
                url: or_default(raw.test_url, DEFAULT_TEST_URL),
                name: raw.test_name.unwrap_or_else(|| {
                    format!(
                        "Accessibility Test - {}",
                        now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
                    )
                }),
            },
            browser: BrowserInfo {
                name: or_default(raw.browser_name, DEFAULT_BROWSER),
                version: or_default(raw.browser_version, DEFAULT_BROWSER_VERSION),
                platform: or_default(raw.platform_name, DEFAULT_PLATFORM),
            },
            audit: AuditConfig {
                rule_tags: parse_rule_tags(raw.rule_tags.as_deref()),
                source,
            },
            output: OutputConfig {
                dir: raw
                    .output_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                filename: or_default(raw.output_filename, DEFAULT_OUTPUT_FILENAME),
                console_enabled: enabled_unless_false(raw.output_console.as_deref()),
            },
            session: SessionConfig {
                transport,
                headless: enabled_unless_false(raw.headless.as_deref()),
                webdriver_url: or_default(raw.webdriver_url, DEFAULT_WEBDRIVER_URL),
                navigation_timeout: NAVIGATION_TIMEOUT,
            },
            system,
            network: NetworkConfig {
                proxy,
                timeout: HTTP_TIMEOUT,
            },
        })
    }

    /// Grid runs need both credentials before anything touches the network.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.grid.enabled && (self.grid.username.is_empty() || self.grid.access_key.is_empty()) {
            return Err(RunError::Configuration(
                "SAUCE_USERNAME and SAUCE_ACCESS_KEY are required when running on the grid"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
