use anyhow::{bail, Context, Result};
use url::Url;

pub const STATUS_PATH: &str = "/wd/hub/status";

/// A grid hub URL broken into its parts. Credentials embedded in the URL win
/// over the configured ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHubUrl {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub username: String,
    pub password: String,
}

impl ParsedHubUrl {
    pub fn parse(raw: &str, fallback_username: &str, fallback_password: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("'{raw}' is not a valid URL"))?;

        let Some(host) = url.host_str() else {
            bail!("'{raw}' has no host");
        };

        let scheme = url.scheme().to_string();
        let port = url
            .port()
            .unwrap_or(if scheme == "http" { 80 } else { 443 });

        let username = match url.username() {
            "" => fallback_username.to_string(),
            user => decode(user),
        };
        let password = match url.password() {
            None | Some("") => fallback_password.to_string(),
            Some(password) => decode(password),
        };

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: url.path().to_string(),
            username,
            password,
        })
    }

    pub fn status_url(&self) -> String {
        format!("{}://{}:{}{STATUS_PATH}", self.scheme, self.host, self.port)
    }

    /// WebDriver endpoint without credentials.
    pub fn webdriver_url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// `Url` hands back userinfo percent-encoded.
fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
