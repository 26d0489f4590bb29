use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCategory {
    Violations,
    Passes,
    Incomplete,
    Inapplicable,
}

impl ResultCategory {
    pub const ALL: [ResultCategory; 4] = [
        Self::Violations,
        Self::Passes,
        Self::Incomplete,
        Self::Inapplicable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Violations => "violations",
            Self::Passes => "passes",
            Self::Incomplete => "incomplete",
            Self::Inapplicable => "inapplicable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Serious => "serious",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One entry of a node's `target`. Elements inside shadow roots or frames are
/// addressed by a nested selector list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSegment {
    Selector(String),
    Nested(Vec<String>),
}

impl fmt::Display for TargetSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(s) => f.write_str(s),
            Self::Nested(parts) => f.write_str(&parts.join(" >>> ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(default)]
    pub target: Vec<TargetSegment>,
    /// html, failureSummary, any/all/none checks: kept as the engine sent them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeResult {
    pub fn selector_path(&self) -> String {
        self.target
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinding {
    pub id: String,
    #[serde(default)]
    pub impact: Option<Impact>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: String,
    pub help: String,
    pub help_url: String,
    #[serde(default)]
    pub nodes: Vec<NodeResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEngine {
    pub name: String,
    pub version: String,
}

/// The engine's result object. Fields this crate does not interpret (url,
/// timestamp, toolOptions, testRunner, testEnvironment) pass through `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResultSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_engine: Option<TestEngine>,
    #[serde(default)]
    pub violations: Vec<AuditFinding>,
    #[serde(default)]
    pub passes: Vec<AuditFinding>,
    #[serde(default)]
    pub incomplete: Vec<AuditFinding>,
    #[serde(default)]
    pub inapplicable: Vec<AuditFinding>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditResultSet {
    pub fn category(&self, category: ResultCategory) -> &[AuditFinding] {
        match category {
            ResultCategory::Violations => &self.violations,
            ResultCategory::Passes => &self.passes,
            ResultCategory::Incomplete => &self.incomplete,
            ResultCategory::Inapplicable => &self.inapplicable,
        }
    }

    pub fn engine_version(&self) -> Option<&str> {
        self.test_engine.as_ref().map(|e| e.version.as_str())
    }
}
