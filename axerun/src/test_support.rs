use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::audit::AuditFinding;
use crate::config::Config;
use crate::error::RunError;
use crate::session::{BrowserSession, Engine, Protocol, ReleaseError, SessionProvider};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Engine output with `violations` findings, one pass, one inapplicable rule.
/// The first two findings are serious, the rest moderate.
pub fn axe_results(violations: usize) -> Value {
    let violations: Vec<Value> = (0..violations)
        .map(|i| {
            if i == 0 {
                json!({
                    "id": "image-alt",
                    "impact": "serious",
                    "tags": ["wcag2a", "wcag111"],
                    "description": "Ensures <img> elements have alternate text",
                    "help": "Images must have alternate text",
                    "helpUrl": "https://dequeuniversity.com/rules/axe/4.10/image-alt",
                    "nodes": [{
                        "html": "<img src=\"logo.png\">",
                        "target": ["header", "img.logo"],
                        "failureSummary": "Fix any of the following"
                    }]
                })
            } else {
                json!({
                    "id": format!("rule-{i}"),
                    "impact": if i == 1 { "serious" } else { "moderate" },
                    "tags": ["wcag2aa"],
                    "description": format!("Rule {i} description"),
                    "help": format!("Rule {i} help"),
                    "helpUrl": format!("https://dequeuniversity.com/rules/axe/4.10/rule-{i}"),
                    "nodes": [{ "html": "<div></div>", "target": [format!("#el-{i}")] }]
                })
            }
        })
        .collect();

    json!({
        "testEngine": { "name": "axe-core", "version": "4.10.2" },
        "url": "https://example.com/",
        "violations": violations,
        "passes": [{
            "id": "document-title",
            "impact": null,
            "tags": ["wcag2a"],
            "description": "Ensures each HTML document contains a non-empty <title> element",
            "help": "Documents must have <title> element to aid in navigation",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.10/document-title",
            "nodes": []
        }],
        "incomplete": [],
        "inapplicable": [{
            "id": "video-caption",
            "tags": ["wcag2a"],
            "description": "Ensures <video> elements have captions",
            "help": "<video> elements must have captions",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.10/video-caption",
            "nodes": []
        }]
    })
}

pub fn finding_with_nodes(count: usize) -> AuditFinding {
    let nodes: Vec<Value> = (0..count)
        .map(|i| json!({ "target": [format!("#node-{i}")] }))
        .collect();
    serde_json::from_value(json!({
        "id": "color-contrast",
        "impact": "serious",
        "description": "Ensures the contrast between foreground and background colors meets WCAG 2 AA",
        "help": "Elements must meet minimum color contrast ratio thresholds",
        "helpUrl": "https://dequeuniversity.com/rules/axe/4.10/color-contrast",
        "nodes": nodes
    }))
    .unwrap()
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub injected: bool,
    pub visited: Option<String>,
    pub last_expression: Option<String>,
    pub last_script_args: Option<Vec<Value>>,
    pub screenshots: Vec<PathBuf>,
    pub closes: usize,
}

/// In-memory browser that answers audits with canned engine output.
pub struct FakeSession {
    protocol: Protocol,
    session_id: Option<String>,
    results: Value,
    axe_available: bool,
    fail_goto: bool,
    fail_screenshot: bool,
    fail_release: bool,
    goto_delay: Option<Duration>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    pub fn new(protocol: Protocol, results: Value) -> Self {
        Self {
            protocol,
            session_id: None,
            results,
            axe_available: true,
            fail_goto: false,
            fail_screenshot: false,
            fail_release: false,
            goto_delay: None,
            state: Arc::default(),
        }
    }

    pub fn with_session_id(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    pub fn without_axe(mut self) -> Self {
        self.axe_available = false;
        self
    }

    pub fn failing_goto(mut self) -> Self {
        self.fail_goto = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn with_goto_delay(mut self, delay: Duration) -> Self {
        self.goto_delay = Some(delay);
        self
    }

    pub fn state(&self) -> Arc<Mutex<FakeState>> {
        self.state.clone()
    }

    pub fn injected(&self) -> bool {
        self.state.lock().unwrap().injected
    }

    pub fn visited(&self) -> Option<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn last_expression(&self) -> Option<String> {
        self.state.lock().unwrap().last_expression.clone()
    }

    pub fn last_script_args(&self) -> Option<Vec<Value>> {
        self.state.lock().unwrap().last_script_args.clone()
    }

    fn engine_ready(&self) -> bool {
        self.axe_available && self.injected()
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    async fn goto(&self, url: &str) -> anyhow::Result<()> {
        if let Some(delay) = self.goto_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_goto {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        self.state.lock().unwrap().visited = Some(url.to_string());
        Ok(())
    }

    async fn title(&self) -> anyhow::Result<String> {
        Ok("Example Domain".to_string())
    }

    async fn inject_script(&self, _source: &str) -> anyhow::Result<()> {
        if self.axe_available {
            self.state.lock().unwrap().injected = true;
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> anyhow::Result<Value> {
        self.state.lock().unwrap().last_expression = Some(expression.to_string());
        if !self.engine_ready() {
            bail!("ReferenceError: axe is not defined");
        }
        Ok(self.results.clone())
    }

    async fn execute_async(&self, _script: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        self.state.lock().unwrap().last_script_args = Some(args);
        if !self.engine_ready() {
            return Ok(json!(["axe-core is not available on this page", null]));
        }
        Ok(json!([null, self.results]))
    }

    async fn screenshot(&self, path: &Path) -> anyhow::Result<()> {
        if self.fail_screenshot {
            bail!("page crashed");
        }
        std::fs::write(path, PNG_SIGNATURE)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Vec<ReleaseError> {
        self.state.lock().unwrap().closes += 1;
        if self.fail_release {
            vec![ReleaseError::new("page", anyhow!("target crashed"))]
        } else {
            Vec::new()
        }
    }
}

/// Hands out one prepared `FakeSession` and records what it was asked for.
pub struct FakeProvider {
    session: Mutex<Option<FakeSession>>,
    calls: Arc<AtomicUsize>,
    engines: Arc<Mutex<Vec<Engine>>>,
}

impl FakeProvider {
    pub fn new(session: FakeSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            calls: Arc::default(),
            engines: Arc::default(),
        }
    }

    pub fn empty() -> Self {
        Self {
            session: Mutex::new(None),
            calls: Arc::default(),
            engines: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn engines(&self) -> Arc<Mutex<Vec<Engine>>> {
        self.engines.clone()
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn create(
        &self,
        config: &Config,
        _engine_version: &str,
    ) -> Result<Box<dyn BrowserSession>, RunError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.engines
            .lock()
            .unwrap()
            .push(Engine::resolve(&config.browser.name));

        let session = self.session.lock().unwrap().take();
        match session {
            Some(session) => Ok(Box::new(session)),
            None => Err(RunError::Session(anyhow!("browser failed to start"))),
        }
    }
}
