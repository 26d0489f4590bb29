use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::audit::AuditFinding;
use crate::config::Config;
use crate::report::{Report, Summary};

pub const SCREENSHOT_FILENAME: &str = "violations-screenshot.png";

/// Affected elements listed per violation before the remainder is counted.
pub const MAX_LISTED_NODES: usize = 3;

/// Human-readable run output. The summary and verdict are always written;
/// the violation listing only when console output is enabled.
pub struct ConsoleReporter {
    enabled: bool,
}

impl ConsoleReporter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn write_banner(&self, config: &Config, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "Accessibility test with axe-core")?;
        writeln!(writer, "Configuration:")?;
        writeln!(writer, "  - URL: {}", config.test.url)?;
        writeln!(
            writer,
            "  - Browser: {} {}",
            config.browser.name, config.browser.version
        )?;
        writeln!(writer, "  - Platform: {}", config.browser.platform)?;
        writeln!(
            writer,
            "  - Accessibility Rules: {}",
            config.audit.rule_tags.join(", ")
        )?;
        writeln!(
            writer,
            "  - Sauce Labs: {}",
            if config.grid.enabled { "ENABLED" } else { "DISABLED" }
        )?;
        if let Some(hub) = &config.grid.hub {
            writeln!(writer, "  - Custom Hub: {}:{}", hub.host, hub.port)?;
        }
        writeln!(writer)?;
        Ok(())
    }

    pub fn write_summary(&self, summary: &Summary, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "Accessibility Test Summary:")?;
        writeln!(writer, "  Violations: {}", summary.violations)?;
        writeln!(writer, "  Passes: {}", summary.passes)?;
        writeln!(writer, "  Incomplete: {}", summary.incomplete)?;
        writeln!(writer, "  Inapplicable: {}", summary.inapplicable)?;
        writeln!(writer)?;
        Ok(())
    }

    pub fn write_violations(
        &self,
        violations: &[AuditFinding],
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if !self.enabled || violations.is_empty() {
            return Ok(());
        }

        writeln!(writer, "Accessibility Violations Found:")?;
        writeln!(writer)?;
        for (index, violation) in violations.iter().enumerate() {
            let impact = violation
                .impact
                .map(|i| i.to_string().to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string());

            writeln!(writer, "{}. {}", index + 1, violation.description)?;
            writeln!(writer, "   Impact: {impact}")?;
            writeln!(writer, "   Help: {}", violation.help)?;
            writeln!(writer, "   More info: {}", violation.help_url)?;
            writeln!(writer, "   Affected elements: {}", violation.nodes.len())?;
            for node in violation.nodes.iter().take(MAX_LISTED_NODES) {
                writeln!(writer, "     - {}", node.selector_path())?;
            }
            if violation.nodes.len() > MAX_LISTED_NODES {
                writeln!(
                    writer,
                    "     ... and {} more",
                    violation.nodes.len() - MAX_LISTED_NODES
                )?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn write_artifact(
        &self,
        label: &str,
        path: &Path,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        writeln!(writer, "{label}: {}", path.display())
    }

    pub fn write_dashboard(&self, url: &str, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "Sauce Labs Session: {url}")
    }

    pub fn write_verdict(&self, report: &Report, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer)?;
        if report.passed() {
            writeln!(writer, "All accessibility tests passed!")
        } else {
            writeln!(
                writer,
                "Found {} accessibility violation(s)",
                report.summary.violations
            )
        }
    }
}

pub fn render_report(report: &Report) -> Result<String> {
    let mut json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    json.push('\n');
    Ok(json)
}

/// Writes the report to `<dir>/<filename>`, creating `dir` and replacing any
/// previous report.
pub async fn persist_report(dir: &Path, filename: &str, report: &Report) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let path = dir.join(filename);
    let json = render_report(report)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
