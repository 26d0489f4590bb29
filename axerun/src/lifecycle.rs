use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::audit::{auditor_for, AxeSource};
use crate::config::Config;
use crate::error::RunError;
use crate::navigate::navigate;
use crate::probe::GridProber;
use crate::publish::{dashboard_url, ResultPublisher};
use crate::report::{generate_session_id, Report};
use crate::session::{BrowserSession, DriverSessionProvider, SessionProvider};
use crate::sink::{persist_report, ConsoleReporter, SCREENSHOT_FILENAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Configuring,
    Probing,
    SessionStarting,
    Navigating,
    Auditing,
    Reporting,
    Publishing,
    TearingDown,
    Done,
}

/// Everything a completed run produced. A run that found violations still
/// completes; `passed` carries the verdict.
#[derive(Debug)]
pub struct RunOutcome {
    pub passed: bool,
    pub report: Report,
    pub report_path: PathBuf,
    pub screenshot_path: Option<PathBuf>,
    pub dashboard_url: Option<String>,
    pub phases: Vec<Phase>,
}

struct PhaseLog(Vec<Phase>);

impl PhaseLog {
    fn new() -> Self {
        Self(vec![Phase::Idle])
    }

    fn enter(&mut self, phase: Phase) {
        debug!(?phase, "entering phase");
        self.0.push(phase);
    }
}

struct Completed {
    report: Report,
    report_path: PathBuf,
    screenshot_path: Option<PathBuf>,
    dashboard_url: Option<String>,
}

pub struct Runner {
    config: Config,
    client: reqwest::Client,
    provider: Box<dyn SessionProvider>,
    prober: GridProber,
    publisher: ResultPublisher,
    axe_source: Option<AxeSource>,
    console: ConsoleReporter,
}

impl Runner {
    /// Drives one audit from configuration check to teardown.
    ///
    /// Once a session exists it is always closed before this returns, and a
    /// failure while releasing it never replaces the run's own result.
    #[instrument(skip_all, fields(url = %self.config.test.url))]
    pub async fn run(&self, out: &mut dyn Write) -> Result<RunOutcome, RunError> {
        let mut phases = PhaseLog::new();

        phases.enter(Phase::Configuring);
        self.console.write_banner(&self.config, out)?;
        self.config.validate()?;

        if self.config.grid.enabled {
            phases.enter(Phase::Probing);
            self.prober.probe(&self.config.grid).await?;
        }

        let source = match &self.axe_source {
            Some(source) => source.clone(),
            None => AxeSource::load(&self.config.audit.source, &self.client)
                .await
                .map_err(RunError::Audit)?,
        };

        phases.enter(Phase::SessionStarting);
        let started = Instant::now();
        info!(transport = %self.config.session.transport, "Connecting to browser");
        let mut session = self.provider.create(&self.config, source.version()).await?;

        let result = self
            .drive(session.as_ref(), source, started, &mut phases, out)
            .await;

        phases.enter(Phase::TearingDown);
        info!("Closing browser session");
        for failure in session.close().await {
            warn!(
                resource = failure.resource,
                error = %format!("{:#}", failure.error),
                "failed to release browser resource"
            );
        }
        phases.enter(Phase::Done);

        let completed = result?;
        Ok(RunOutcome {
            passed: completed.report.passed(),
            report: completed.report,
            report_path: completed.report_path,
            screenshot_path: completed.screenshot_path,
            dashboard_url: completed.dashboard_url,
            phases: phases.0,
        })
    }

    async fn drive(
        &self,
        session: &dyn BrowserSession,
        source: AxeSource,
        started: Instant,
        phases: &mut PhaseLog,
        out: &mut dyn Write,
    ) -> Result<Completed, RunError> {
        phases.enter(Phase::Navigating);
        let navigation = navigate(
            session,
            &self.config.test.url,
            self.config.session.navigation_timeout,
        )
        .await?;

        phases.enter(Phase::Auditing);
        let source_version = source.version().to_string();
        let auditor = auditor_for(session.protocol(), source);
        let results = auditor
            .audit(session, &self.config.audit.rule_tags)
            .await?;

        phases.enter(Phase::Reporting);
        let session_id = session
            .session_id()
            .unwrap_or_else(|| generate_session_id(session.protocol().label()));
        let report = Report::build(
            &self.config,
            session_id,
            &navigation,
            results,
            &source_version,
            started,
        );
        info!(duration = %report.test_duration, "Tests completed");

        self.console.write_summary(&report.summary, out)?;
        self.console.write_violations(&report.results.violations, out)?;

        let output = &self.config.output;
        let report_path = persist_report(&output.dir, &output.filename, &report)
            .await
            .map_err(RunError::Report)?;
        self.console.write_artifact("Report saved to", &report_path, out)?;

        let screenshot_path = if report.passed() {
            None
        } else {
            let path = output.dir.join(SCREENSHOT_FILENAME);
            session.screenshot(&path).await.map_err(RunError::Report)?;
            self.console.write_artifact("Screenshot saved to", &path, out)?;
            Some(path)
        };

        let mut dashboard = None;
        if self.config.grid.enabled {
            phases.enter(Phase::Publishing);
            let published = self
                .publisher
                .publish(&self.config, &report, report.passed(), session.protocol())
                .await;
            if let Some(id) = published {
                let url = dashboard_url(&id);
                self.console.write_dashboard(&url, out)?;
                dashboard = Some(url);
            }
        }

        self.console.write_verdict(&report, out)?;

        Ok(Completed {
            report,
            report_path,
            screenshot_path,
            dashboard_url: dashboard,
        })
    }
}

pub struct RunnerBuilder {
    config: Config,
    client: reqwest::Client,
    provider: Option<Box<dyn SessionProvider>>,
    axe_source: Option<AxeSource>,
}

impl RunnerBuilder {
    pub fn new(config: Config, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            provider: None,
            axe_source: None,
        }
    }

    pub fn session_provider(mut self, provider: impl SessionProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// Uses an already loaded engine instead of fetching the configured one.
    pub fn axe_source(mut self, source: AxeSource) -> Self {
        self.axe_source = Some(source);
        self
    }

    pub fn build(self) -> Runner {
        let timeout = self.config.network.timeout;
        let console = ConsoleReporter::new(self.config.output.console_enabled);
        Runner {
            prober: GridProber::new(self.client.clone(), timeout),
            publisher: ResultPublisher::new(self.client.clone()),
            provider: self
                .provider
                .unwrap_or_else(|| Box::new(DriverSessionProvider)),
            axe_source: self.axe_source,
            console,
            client: self.client,
            config: self.config,
        }
    }
}
