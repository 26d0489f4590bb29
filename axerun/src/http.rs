use anyhow::{Context, Result};
use reqwest::{Client, Proxy};

use crate::config::{NetworkConfig, ProxyPolicy};

/// Builds the one HTTP client shared by the prober, the axe source loader
/// and the publisher. Proxy settings are decided here and nowhere else.
pub fn build_client(network: &NetworkConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(concat!("axerun/", env!("CARGO_PKG_VERSION")))
        .timeout(network.timeout);

    builder = match &network.proxy {
        ProxyPolicy::System => builder,
        ProxyPolicy::Disabled => builder.no_proxy(),
        ProxyPolicy::Explicit(url) => {
            let proxy = Proxy::all(url).with_context(|| format!("invalid proxy URL: {url}"))?;
            builder.proxy(proxy)
        }
    };

    builder.build().context("failed to build HTTP client")
}
