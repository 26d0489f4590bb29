use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventLifecycleEvent, SetLifecycleEventsEnabledParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EvaluateParams, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{future, Stream, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserSession, Protocol, ReleaseError, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

/// A locally launched chromium driven over the DevTools protocol, with one
/// isolated browser context and one page.
pub struct DevToolsSession {
    browser: Option<Browser>,
    context: Option<BrowserContextId>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
}

impl DevToolsSession {
    /// Launches chromium with one page. With `forward_console` set, the
    /// page's console messages and uncaught exceptions are logged at debug.
    pub async fn launch(headless: bool, forward_console: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
            .viewport(Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                ..Default::default()
            })
            .arg("--ignore-certificate-errors");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(anyhow::Error::msg)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler error");
                }
            }
        });

        let mut session = Self {
            browser: Some(browser),
            context: None,
            page: None,
            handler: Some(handler),
            listeners: Vec::new(),
        };

        if let Err(e) = session.open_page(forward_console).await {
            for failure in session.close().await {
                warn!(resource = failure.resource, error = %failure.error, "release after failed launch");
            }
            return Err(e);
        }

        Ok(session)
    }

    async fn open_page(&mut self, forward_console: bool) -> Result<()> {
        let browser = self.browser.as_mut().context("browser is not running")?;

        let context = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;
        self.context = Some(context.clone());

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = Some(context);
        let page = browser
            .new_page(target)
            .await
            .context("failed to open page")?;
        page.execute(SetLifecycleEventsEnabledParams::new(true))
            .await
            .context("failed to enable lifecycle events")?;
        if forward_console {
            self.forward_console(&page).await?;
        }
        self.page = Some(page);
        Ok(())
    }

    async fn forward_console(&mut self, page: &Page) -> Result<()> {
        let mut messages = page.event_listener::<EventConsoleApiCalled>().await?;
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = messages.next().await {
                debug!(kind = ?event.r#type, "browser console: {}", render_console_args(&event.args));
            }
        }));

        let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                debug!("browser page error: {message}");
            }
        }));
        Ok(())
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("page is closed")
    }

    async fn eval(&self, expression: &str) -> Result<chromiumoxide::js::EvaluationResult> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(anyhow::Error::msg)?;
        self.page()?
            .evaluate_expression(params)
            .await
            .context("script evaluation failed")
    }
}

#[async_trait]
impl BrowserSession for DevToolsSession {
    fn protocol(&self) -> Protocol {
        Protocol::DevTools
    }

    fn session_id(&self) -> Option<String> {
        None
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page()?;
        let main_frame = page.mainframe().await?;
        let lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await?
            .filter(move |event| {
                future::ready(main_frame.as_ref().is_none_or(|f| *f == event.frame_id))
            })
            .map(|event| event.name.clone());

        page.goto(url).await?;
        wait_for_network_idle(lifecycle).await
    }

    async fn title(&self) -> Result<String> {
        Ok(self.page()?.get_title().await?.unwrap_or_default())
    }

    async fn inject_script(&self, source: &str) -> Result<()> {
        self.eval(source).await.map(|_| ())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self.eval(expression).await?;
        result
            .into_value::<Value>()
            .context("script returned no value")
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page()?
            .save_screenshot(params, path)
            .await
            .with_context(|| format!("failed to save screenshot to {}", path.display()))?;
        Ok(())
    }

    async fn close(&mut self) -> Vec<ReleaseError> {
        let mut failures = Vec::new();

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                failures.push(ReleaseError::new("page", e));
            }
        }

        if let Some(mut browser) = self.browser.take() {
            if let Some(context) = self.context.take() {
                if let Err(e) = browser.dispose_browser_context(context).await {
                    failures.push(ReleaseError::new("context", e));
                }
            }
            if let Err(e) = browser.close().await {
                failures.push(ReleaseError::new("browser", e));
            } else if let Err(e) = browser.wait().await {
                failures.push(ReleaseError::new("browser", e));
            }
        }

        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }

        failures
    }
}

/// Consumes main-frame lifecycle event names until the navigated document
/// reports `networkIdle`. Events before the document's `init` belong to the
/// previous document and are ignored.
async fn wait_for_network_idle(events: impl Stream<Item = String>) -> Result<()> {
    let mut events = std::pin::pin!(events);
    let mut started = false;
    while let Some(name) = events.next().await {
        match name.as_str() {
            "init" => started = true,
            "networkIdle" if started => {
                debug!("network settled");
                return Ok(());
            }
            _ => {}
        }
    }
    anyhow::bail!("page closed before the network settled")
}

fn render_console_args(args: &[RemoteObject]) -> String {
    args.iter()
        .map(|arg| match (&arg.value, &arg.description) {
            (Some(Value::String(text)), _) => text.clone(),
            (Some(value), _) => value.to_string(),
            (None, Some(description)) => description.clone(),
            (None, None) => format!("{:?}", arg.r#type).to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
