//! Core domain types for trak
//!
//! These types are persisted as JSON (camelCase) in the per-project `.trak/`
//! directory and are the shapes the dashboard and org endpoint consume.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One tracked span of developer activity in a working directory |
//! | **ChangeEntry** | Per-file aggregate of observed filesystem events within a session |
//! | **FileChange** | A single normalized event emitted by the watcher |
//! | **AnalysisResult** | Quality score, issues and narrative produced when a session stops |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Changed-file contents keyed by relative path, in sorted order.
pub type FileContents = BTreeMap<String, String>;

// ============================================
// Changes
// ============================================

/// Kind of filesystem change observed for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single normalized watcher event, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Path relative to the watched root, `/`-separated
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

impl FileChange {
    pub fn new(change_type: ChangeType, path: impl Into<String>) -> Self {
        Self {
            change_type,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-file aggregate within a session, keyed by `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    pub path: String,
    /// Latest observed type wins
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Time of the most recent event for this path
    pub timestamp: DateTime<Utc>,
    /// Number of events observed for this path (never reset)
    pub change_count: u32,
}

/// Tally of change entries by their latest type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

// ============================================
// Session
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The unit of tracked work.
///
/// `end_time` is set if and only if `status` is [`SessionStatus::Stopped`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Time-derived identifier (epoch milliseconds)
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Absolute path the session is scoped to
    pub working_directory: PathBuf,
    pub status: SessionStatus,
    /// Ordered by first sighting, unique by path
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
    /// Pid of the detached watcher process, if one was spawned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
}

impl Session {
    /// Create a fresh active session
    pub fn new(
        id: impl Into<String>,
        working_directory: PathBuf,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time: None,
            working_directory,
            status: SessionStatus::Active,
            changes: Vec::new(),
            daemon_process_id: None,
            summary: None,
            analysis: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Elapsed time from start to end, or to now while active
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.start_time)
    }

    pub fn change_counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for change in &self.changes {
            match change.change_type {
                ChangeType::Added => counts.added += 1,
                ChangeType::Modified => counts.modified += 1,
                ChangeType::Deleted => counts.deleted += 1,
            }
        }
        counts
    }

    /// Entries sorted by most recent activity first
    pub fn recent_changes(&self, limit: usize) -> Vec<&ChangeEntry> {
        let mut recent: Vec<&ChangeEntry> = self.changes.iter().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        recent
    }
}

// ============================================
// Issues
// ============================================

/// Category of a detected quality issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    Complexity,
    Duplication,
    ErrorHandling,
    Security,
    Performance,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Complexity => "complexity",
            IssueType::Duplication => "duplication",
            IssueType::ErrorHandling => "error-handling",
            IssueType::Security => "security",
            IssueType::Performance => "performance",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One quality finding. Immutable once part of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedIssue {
    pub id: String,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub file_path: String,
    /// 1-indexed
    pub line_number: u32,
    pub description: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_example: Option<CodeExample>,
}

/// Optional before/after snippet attached to an AI-reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeExample {
    pub before: String,
    pub after: String,
}

/// Issue tallies by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCount {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl IssueCount {
    /// Count severities over a list of issues
    pub fn tally(issues: &[DetectedIssue]) -> Self {
        let mut count = IssueCount::default();
        for issue in issues {
            match issue.severity {
                Severity::High => count.high += 1,
                Severity::Medium => count.medium += 1,
                Severity::Low => count.low += 1,
            }
        }
        count
    }

    pub fn total(&self) -> u32 {
        self.high + self.medium + self.low
    }
}

// ============================================
// Analysis
// ============================================

/// Which path produced an [`AnalysisResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Structured review from the LLM backend
    Ai,
    /// No backend configured; offline pattern scan
    Heuristic,
    /// Backend configured but the call or its response failed
    Fallback,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Ai => "ai",
            AnalysisSource::Heuristic => "heuristic",
            AnalysisSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    /// Always in [0, 100]
    pub quality_score: u8,
    /// Branching-construct proxy, not true cyclomatic complexity
    #[serde(default)]
    pub complexity: u32,
    #[serde(default)]
    pub duplication: u32,
    /// Tallies over the returned (possibly truncated) `issues`
    pub issue_count: IssueCount,
}

/// Outcome of ending a session. Computed once and archived with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub issues: Vec<DetectedIssue>,
    /// Issues found before truncation to the cap
    #[serde(default)]
    pub total_issues: usize,
    pub metrics: AnalysisMetrics,
    pub summary: String,
    /// Wall-clock milliseconds spent producing the result
    #[serde(rename = "analysisTime")]
    pub analysis_time_ms: u64,
    pub source: AnalysisSource,
}

impl AnalysisResult {
    /// True when the result did not come from the LLM review
    pub fn is_degraded(&self) -> bool {
        self.source != AnalysisSource::Ai
    }
}
