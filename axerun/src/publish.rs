use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::{Config, Transport};
use crate::report::Report;
use crate::session::Protocol;

pub const DASHBOARD_BASE: &str = "https://app.saucelabs.com/tests";

pub fn dashboard_url(id: &str) -> String {
    format!("{DASHBOARD_BASE}/{id}")
}

#[derive(Debug, Deserialize)]
struct CreatedJob {
    #[serde(alias = "ID")]
    id: String,
}

/// Records the run's outcome on the grid. Failures here are logged and never
/// change the run outcome.
#[derive(Clone)]
pub struct ResultPublisher {
    client: reqwest::Client,
}

impl ResultPublisher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Returns the grid job id the results are attached to, or `None` when the
    /// grid is disabled or publishing failed.
    #[instrument(skip_all, fields(transport = %config.session.transport))]
    pub async fn publish(
        &self,
        config: &Config,
        report: &Report,
        passed: bool,
        protocol: Protocol,
    ) -> Option<String> {
        if !config.grid.enabled {
            return None;
        }

        let result = match config.session.transport {
            Transport::Local => self.create_result_job(config, report, passed, protocol).await,
            Transport::Remote => self.update_job(config, report, passed, protocol).await,
        };

        match result {
            Ok(id) => {
                info!(job = %id, "Published results to Sauce Labs");
                Some(id)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to upload results to Sauce Labs");
                None
            }
        }
    }

    async fn create_result_job(
        &self,
        config: &Config,
        report: &Report,
        passed: bool,
        protocol: Protocol,
    ) -> Result<String> {
        let url = format!("{}/v1/testcomposer/reports", config.grid.api_base());
        let label = protocol.label();
        let body = json!({
            "name": config.test.name,
            "user": config.grid.username,
            "framework": format!("{label}-axe"),
            "passed": passed,
            "public": "public",
            "build": config.system.build_id,
            "tags": ["accessibility", "axe-core", label],
            "customData": {
                "axeVersion": report.axe_version,
                "violations": report.summary.violations,
                "passes": report.summary.passes,
                "url": config.test.url,
            },
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&config.grid.username, Some(&config.grid.access_key))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }

        let job: CreatedJob = response
            .json()
            .await
            .context("failed to parse result job response")?;
        Ok(job.id)
    }

    async fn update_job(
        &self,
        config: &Config,
        report: &Report,
        passed: bool,
        protocol: Protocol,
    ) -> Result<String> {
        let (username, password) = config.grid.credentials();
        let session_id = &report.session_id;
        let url = format!(
            "{}/rest/v1/{username}/jobs/{session_id}",
            config.grid.api_base()
        );
        let body = json!({
            "passed": passed,
            "build": config.system.build_id,
            "tags": ["accessibility", "axe-core", protocol.label()],
            "custom-data": {
                "axeVersion": report.axe_version,
                "violations": report.summary.violations,
                "passes": report.summary.passes,
                "url": config.test.url,
            },
        });

        let response = self
            .client
            .put(&url)
            .basic_auth(username, Some(password))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{url} returned HTTP {status}");
        }
        Ok(session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditResultSet;
    use crate::config::RawSettings;
    use crate::navigate::Navigation;
    use crate::test_support::axe_results;
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, transport: &str) -> Config {
        Config::resolve(RawSettings {
            username: Some("alice".into()),
            access_key: Some("secret".into()),
            api_url: Some(format!("{}/", server.uri())),
            transport: Some(transport.into()),
            test_url: Some("https://example.com/".into()),
            test_name: Some("homepage".into()),
            build_number: Some("42".into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn report(config: &Config, session_id: &str, violations: usize) -> Report {
        let results: AuditResultSet = serde_json::from_value(axe_results(violations)).unwrap();
        Report::build(
            config,
            session_id.into(),
            &Navigation {
                title: "Example Domain".into(),
            },
            results,
            "4.10.2",
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn disabled_grid_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config(&server, "local");
        config.grid.enabled = false;
        let report = report(&config, "devtools-1-x", 0);

        let publisher = ResultPublisher::new(reqwest::Client::new());
        assert_eq!(publisher.publish(&config, &report, true, Protocol::DevTools).await, None);
    }

    #[tokio::test]
    async fn local_run_creates_result_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/testcomposer/reports"))
            .and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
            .and(body_partial_json(json!({
                "name": "homepage",
                "user": "alice",
                "framework": "devtools-axe",
                "passed": false,
                "public": "public",
                "build": "42",
                "tags": ["accessibility", "axe-core", "devtools"],
                "customData": { "axeVersion": "4.10.2", "violations": 2, "passes": 1, "url": "https://example.com/" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ID": "job-123" })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server, "local");
        let report = report(&config, "devtools-1-x", 2);
        let publisher = ResultPublisher::new(reqwest::Client::new());

        let id = publisher.publish(&config, &report, false, Protocol::DevTools).await;
        assert_eq!(id.as_deref(), Some("job-123"));
        assert_eq!(dashboard_url("job-123"), "https://app.saucelabs.com/tests/job-123");
    }

    #[tokio::test]
    async fn remote_run_updates_existing_job() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/v1/alice/jobs/abc123"))
            .and(body_partial_json(json!({
                "passed": true,
                "build": "42",
                "tags": ["accessibility", "axe-core", "webdriver"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc123" })))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server, "remote");
        let report = report(&config, "abc123", 0);
        let publisher = ResultPublisher::new(reqwest::Client::new());

        let id = publisher.publish(&config, &report, true, Protocol::WebDriver).await;
        assert_eq!(id.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn server_error_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server, "local");
        let report = report(&config, "devtools-1-x", 0);
        let publisher = ResultPublisher::new(reqwest::Client::new());

        assert_eq!(publisher.publish(&config, &report, true, Protocol::DevTools).await, None);
    }

    #[tokio::test]
    async fn unexpected_response_body_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let config = config(&server, "local");
        let report = report(&config, "devtools-1-x", 0);
        let publisher = ResultPublisher::new(reqwest::Client::new());

        assert_eq!(publisher.publish(&config, &report, true, Protocol::DevTools).await, None);
    }
}
