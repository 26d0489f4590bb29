use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditResultSet, ResultCategory};
use crate::config::{BrowserInfo, Config};
use crate::navigate::Navigation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub violations: usize,
    pub passes: usize,
    pub incomplete: usize,
    pub inapplicable: usize,
}

impl Summary {
    pub fn from_results(results: &AuditResultSet) -> Self {
        Self {
            violations: results.category(ResultCategory::Violations).len(),
            passes: results.category(ResultCategory::Passes).len(),
            incomplete: results.category(ResultCategory::Incomplete).len(),
            inapplicable: results.category(ResultCategory::Inapplicable).len(),
        }
    }
}

/// The persisted artifact of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub url: String,
    pub page_title: String,
    pub timestamp: String,
    pub test_duration: String,
    pub session_id: String,
    pub browser_info: BrowserInfo,
    pub axe_version: String,
    pub summary: Summary,
    pub results: AuditResultSet,
}

impl Report {
    /// `axeVersion` comes from the engine's own descriptor when it reports
    /// one, otherwise from the loaded source banner.
    pub fn build(
        config: &Config,
        session_id: String,
        navigation: &Navigation,
        results: AuditResultSet,
        source_version: &str,
        started: Instant,
    ) -> Self {
        Self::assemble(
            config,
            session_id,
            navigation,
            results,
            source_version,
            started.elapsed(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    fn assemble(
        config: &Config,
        session_id: String,
        navigation: &Navigation,
        results: AuditResultSet,
        source_version: &str,
        elapsed: Duration,
        timestamp: String,
    ) -> Self {
        let axe_version = results
            .engine_version()
            .unwrap_or(source_version)
            .to_string();

        Self {
            url: config.test.url.clone(),
            page_title: navigation.title.clone(),
            timestamp,
            test_duration: format_duration(elapsed),
            session_id,
            browser_info: config.browser.clone(),
            axe_version,
            summary: Summary::from_results(&results),
            results,
        }
    }

    pub fn passed(&self) -> bool {
        self.summary.violations == 0
    }
}

pub fn format_duration(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `<prefix>-<epoch ms>-<9 base36 chars>`, for engines that do not assign
/// their own session id.
pub fn generate_session_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}
