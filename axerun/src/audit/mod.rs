pub mod results;
pub mod source;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::error::RunError;
use crate::session::{BrowserSession, Protocol};

pub use results::{AuditFinding, AuditResultSet, Impact, ResultCategory};
pub use source::AxeSource;

/// Runs the accessibility engine against the page a session currently shows.
#[async_trait]
pub trait AccessibilityAuditor: Send + Sync {
    async fn audit(
        &self,
        session: &dyn BrowserSession,
        rule_tags: &[String],
    ) -> Result<AuditResultSet, RunError>;

    fn name(&self) -> &'static str;
}

/// Picks the auditor matching the protocol a session speaks.
pub fn auditor_for(protocol: Protocol, source: AxeSource) -> Box<dyn AccessibilityAuditor> {
    match protocol {
        Protocol::DevTools => Box::new(NativeAuditor::new(source)),
        Protocol::WebDriver => Box::new(InjectedAuditor::new(source)),
    }
}

fn run_options(rule_tags: &[String]) -> Value {
    json!({
        "runOnly": {
            "type": "tag",
            "values": rule_tags,
        }
    })
}

fn parse_results(value: Value) -> anyhow::Result<AuditResultSet> {
    serde_json::from_value(value).context("axe-core returned malformed results")
}

/// Evaluates `axe.run` directly and awaits the returned promise.
pub struct NativeAuditor {
    source: AxeSource,
}

impl NativeAuditor {
    pub fn new(source: AxeSource) -> Self {
        Self { source }
    }

    async fn run(
        &self,
        session: &dyn BrowserSession,
        rule_tags: &[String],
    ) -> anyhow::Result<AuditResultSet> {
        session
            .inject_script(self.source.script())
            .await
            .context("failed to inject axe-core")?;

        let expression = format!("axe.run(document, {})", run_options(rule_tags));
        let value = session.evaluate(&expression).await?;
        parse_results(value)
    }
}

#[async_trait]
impl AccessibilityAuditor for NativeAuditor {
    #[instrument(skip_all, fields(auditor = self.name()))]
    async fn audit(
        &self,
        session: &dyn BrowserSession,
        rule_tags: &[String],
    ) -> Result<AuditResultSet, RunError> {
        info!("Running accessibility tests ({})", rule_tags.join(", "));
        self.run(session, rule_tags).await.map_err(RunError::Audit)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}

/// The script receives the run options and the WebDriver completion
/// callback, and always answers with `[error, results]`.
const GUARDED_RUN_SCRIPT: &str = r#"
const options = arguments[0];
const done = arguments[arguments.length - 1];
if (typeof window.axe === 'undefined' || typeof window.axe.run !== 'function') {
  return done(['axe-core is not available on this page', null]);
}
window.axe
  .run(document, options)
  .then((results) => done([null, results]))
  .catch((error) => done([String((error && error.message) || error), null]));
"#;

/// Injects axe-core and runs it through an async script guarded against the
/// engine being absent from the page.
pub struct InjectedAuditor {
    source: AxeSource,
}

impl InjectedAuditor {
    pub fn new(source: AxeSource) -> Self {
        Self { source }
    }

    async fn run(
        &self,
        session: &dyn BrowserSession,
        rule_tags: &[String],
    ) -> anyhow::Result<AuditResultSet> {
        session
            .inject_script(self.source.script())
            .await
            .context("failed to inject axe-core")?;

        let reply = session
            .execute_async(GUARDED_RUN_SCRIPT, vec![run_options(rule_tags)])
            .await?;
        debug!("axe-core run completed");

        let (error, results): (Option<String>, Option<Value>) =
            serde_json::from_value(reply).context("unexpected reply from audit script")?;
        if let Some(message) = error {
            return Err(anyhow!(message));
        }
        match results {
            Some(value) => parse_results(value),
            None => bail!("axe-core returned no results"),
        }
    }
}

#[async_trait]
impl AccessibilityAuditor for InjectedAuditor {
    #[instrument(skip_all, fields(auditor = self.name()))]
    async fn audit(
        &self,
        session: &dyn BrowserSession,
        rule_tags: &[String],
    ) -> Result<AuditResultSet, RunError> {
        info!("Running accessibility tests ({})", rule_tags.join(", "));
        self.run(session, rule_tags).await.map_err(RunError::Audit)
    }

    fn name(&self) -> &'static str {
        "injected"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{axe_results, FakeSession};

    fn tags() -> Vec<String> {
        vec!["wcag2a".into(), "wcag2aa".into()]
    }

    fn source() -> AxeSource {
        AxeSource::new("/*! axe v4.10.2 */ window.axe = {};")
    }

    #[tokio::test]
    async fn native_auditor_parses_engine_results() {
        let session = FakeSession::new(Protocol::DevTools, axe_results(2));
        let auditor = auditor_for(Protocol::DevTools, source());
        assert_eq!(auditor.name(), "native");

        let results = auditor.audit(&session, &tags()).await.unwrap();
        assert_eq!(results.violations.len(), 2);
        assert!(session.injected());

        let expression = session.last_expression().unwrap();
        assert!(expression.starts_with("axe.run(document, "));
        assert!(expression.contains(r#""values":["wcag2a","wcag2aa"]"#));
    }

    #[tokio::test]
    async fn injected_auditor_passes_rule_tags() {
        let session = FakeSession::new(Protocol::WebDriver, axe_results(1));
        let auditor = auditor_for(Protocol::WebDriver, source());
        assert_eq!(auditor.name(), "injected");

        let results = auditor.audit(&session, &tags()).await.unwrap();
        assert_eq!(results.violations.len(), 1);
        assert_eq!(results.engine_version(), Some("4.10.2"));

        let args = session.last_script_args().unwrap();
        assert_eq!(args[0]["runOnly"]["type"], "tag");
        assert_eq!(args[0]["runOnly"]["values"], json!(["wcag2a", "wcag2aa"]));
    }

    #[tokio::test]
    async fn missing_engine_is_an_audit_error() {
        let session = FakeSession::new(Protocol::WebDriver, axe_results(0)).without_axe();
        let err = InjectedAuditor::new(source())
            .audit(&session, &tags())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Audit(_)));
        assert!(
            err.to_string().contains("axe-core is not available on this page"),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn malformed_results_are_an_audit_error() {
        let session = FakeSession::new(Protocol::DevTools, json!({ "violations": "nope" }));
        let err = NativeAuditor::new(source())
            .audit(&session, &tags())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Audit(_)));
        assert!(err.to_string().contains("malformed"));
    }
}
