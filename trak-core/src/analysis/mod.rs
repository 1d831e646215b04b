//! Session quality analysis.
//!
//! [`QualityAnalyzer::analyze`] always produces an [`AnalysisResult`]:
//!
//! - no LLM client: heuristic scan ([`AnalysisSource::Heuristic`])
//! - LLM review parsed cleanly: [`AnalysisSource::Ai`]
//! - LLM call or parse failed: zero-issue result ([`AnalysisSource::Fallback`])
//!
//! Issue counts and the quality score are always recomputed locally from
//! the returned issue list; anything the model claims about them is ignored.

pub mod heuristic;
pub mod scoring;

use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, LlmClient};
use crate::types::{
    AnalysisMetrics, AnalysisResult, AnalysisSource, CodeExample, DetectedIssue, FileContents,
    IssueCount, IssueType, Session, Severity,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

/// Upper bound on issues in any [`AnalysisResult`]
pub const MAX_ISSUES: usize = 25;

const MAX_PROMPT_FILES: usize = 5;
const MAX_FILE_CHARS: usize = 2000;

const SYSTEM_PROMPT: &str = r#"You are a senior software engineer reviewing the changes from one development session. Report only genuine issues that affect maintainability, security or performance in a production codebase. Ignore style preferences.

Issue categories:
1. complexity: deep nesting, long functions, tangled conditionals
2. duplication: repeated blocks or copy-paste patterns that should be abstracted
3. error-handling: missing handling, unhandled promises, silent failures
4. security: injection risks, hardcoded secrets, unsafe data handling
5. performance: inefficient algorithms, leaks, blocking work, wasted computation

Severity:
- high: security vulnerabilities, major performance problems, likely failures
- medium: maintainability problems, error-handling gaps, moderate performance cost
- low: minor optimizations and readability improvements

Every description must be at least 3 complete sentences: what the problem is, why it is risky, and what it could lead to.

Return JSON only, with exactly this structure:
{
  "issues": [
    {
      "id": "unique-id",
      "type": "complexity|duplication|error-handling|security|performance",
      "severity": "high|medium|low",
      "filePath": "src/path/to/file.ts",
      "lineNumber": 42,
      "description": "Three or more sentences.",
      "suggestion": "A specific, actionable fix."
    }
  ],
  "metrics": { "complexity": 12, "duplication": 5 },
  "summary": "Short overall assessment."
}"#;

/// Produces the [`AnalysisResult`] attached to a stopped session.
pub struct QualityAnalyzer {
    client: Option<Arc<dyn LlmClient>>,
}

impl QualityAnalyzer {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self { client }
    }

    pub fn has_backend(&self) -> bool {
        self.client.is_some()
    }

    /// Analyze the changed-file contents of `session`. Never fails.
    pub fn analyze(&self, session: &Session, files: &FileContents) -> AnalysisResult {
        let started = Instant::now();

        let Some(client) = &self.client else {
            return heuristic_result(files, started);
        };

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(session, files),
            max_tokens: 2000,
            temperature: 0.3,
            json_output: true,
        };

        let review = match client.complete(&request) {
            Ok(raw) => parse_review(&raw),
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "LLM review failed, using fallback analysis"
                );
                return fallback_result(started);
            }
        };

        match review {
            Ok(review) => {
                tracing::info!(
                    session_id = %session.id,
                    model = client.model(),
                    issues = review.issues.len(),
                    "LLM review parsed"
                );
                review.into_result(started)
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Unusable LLM review, using fallback analysis"
                );
                fallback_result(started)
            }
        }
    }
}

fn heuristic_result(files: &FileContents, started: Instant) -> AnalysisResult {
    let report = heuristic::scan(files);
    let count = IssueCount::tally(&report.issues);

    let summary = if report.total_issues == 0 {
        format!("Heuristic scan of {} files found no issues.", files.len())
    } else {
        format!(
            "Heuristic scan of {} files found {} issue(s): {} high, {} medium, {} low.",
            files.len(),
            report.total_issues,
            count.high,
            count.medium,
            count.low
        )
    };

    finish(
        report.issues,
        report.total_issues,
        report.complexity,
        0,
        summary,
        AnalysisSource::Heuristic,
        started,
    )
}

fn fallback_result(started: Instant) -> AnalysisResult {
    finish(
        Vec::new(),
        0,
        0,
        0,
        "Analysis unavailable: the AI review failed or returned an unusable response.".to_string(),
        AnalysisSource::Fallback,
        started,
    )
}

fn finish(
    mut issues: Vec<DetectedIssue>,
    total_issues: usize,
    complexity: u32,
    duplication: u32,
    summary: String,
    source: AnalysisSource,
    started: Instant,
) -> AnalysisResult {
    issues.truncate(MAX_ISSUES);
    let issue_count = IssueCount::tally(&issues);
    let quality_score = scoring::quality_score(&issue_count, complexity, duplication);

    AnalysisResult {
        issues,
        total_issues,
        metrics: AnalysisMetrics {
            quality_score,
            complexity,
            duplication,
            issue_count,
        },
        summary,
        analysis_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        source,
    }
}

// ============================================
// Prompt
// ============================================

fn build_prompt(session: &Session, files: &FileContents) -> String {
    let languages = detect_languages(files);
    let excerpts = files
        .iter()
        .take(MAX_PROMPT_FILES)
        .map(|(path, content)| {
            let excerpt: String = content.chars().take(MAX_FILE_CHARS).collect();
            format!("### {path}\n```\n{excerpt}\n```")
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Review the following changes from a development session.\n\n\
         Languages: {}\n\
         Session duration: {} minutes\n\
         Files changed: {}\n\n\
         Code to review:\n{}\n\n\
         Focus on real defects: security, error handling, performance, complexity and duplication. \
         Respond with the required JSON only.",
        if languages.is_empty() {
            "unknown".to_string()
        } else {
            languages.join(", ")
        },
        session.duration().num_minutes().max(0),
        session.changes.len(),
        excerpts
    )
}

fn detect_languages(files: &FileContents) -> Vec<String> {
    let languages: BTreeSet<String> = files
        .keys()
        .filter_map(|path| path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
        .map(|ext| match ext.as_str() {
            "ts" | "tsx" => "typescript".to_string(),
            "js" | "jsx" => "javascript".to_string(),
            "py" => "python".to_string(),
            "go" => "go".to_string(),
            "rs" => "rust".to_string(),
            "md" => "markdown".to_string(),
            _ => ext,
        })
        .collect();
    languages.into_iter().collect()
}

// ============================================
// Response parsing
// ============================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReview {
    issues: Vec<RawIssue>,
    #[serde(default)]
    metrics: Option<RawMetrics>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    issue_type: IssueType,
    severity: Severity,
    file_path: String,
    line_number: u32,
    description: String,
    suggestion: String,
    #[serde(default)]
    code_example: Option<CodeExample>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetrics {
    #[serde(default)]
    complexity: Option<f64>,
    #[serde(default)]
    duplication: Option<f64>,
}

/// A model review that passed validation.
#[derive(Debug)]
struct Review {
    issues: Vec<DetectedIssue>,
    complexity: u32,
    duplication: u32,
    summary: String,
}

impl Review {
    fn into_result(self, started: Instant) -> AnalysisResult {
        let total = self.issues.len();
        finish(
            self.issues,
            total,
            self.complexity,
            self.duplication,
            self.summary,
            AnalysisSource::Ai,
            started,
        )
    }
}

fn parse_review(raw: &str) -> Result<Review> {
    let json = extract_json_object(raw)?;
    let parsed: RawReview = serde_json::from_str(json)
        .map_err(|e| Error::Parse(format!("review does not match schema: {e}")))?;

    let mut issues = Vec::with_capacity(parsed.issues.len());
    for raw_issue in parsed.issues {
        if raw_issue.line_number == 0 {
            return Err(Error::Parse(format!(
                "issue in {} has lineNumber 0",
                raw_issue.file_path
            )));
        }
        issues.push(DetectedIssue {
            id: raw_issue
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            issue_type: raw_issue.issue_type,
            severity: raw_issue.severity,
            file_path: raw_issue.file_path,
            line_number: raw_issue.line_number,
            description: raw_issue.description,
            suggestion: raw_issue.suggestion,
            code_example: raw_issue.code_example,
        });
    }

    let metrics = parsed.metrics.unwrap_or_default();
    Ok(Review {
        issues,
        complexity: non_negative(metrics.complexity),
        duplication: non_negative(metrics.duplication),
        summary: parsed
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Code analysis completed.".to_string()),
    })
}

fn non_negative(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.floor().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

/// Slice from the first `{` to the last `}`, which also strips markdown fences.
fn extract_json_object(raw: &str) -> Result<&str> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Parse("review did not contain a JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Parse("review did not contain a JSON object".to_string()))?;
    if end <= start {
        return Err(Error::Parse("review JSON bounds are invalid".to_string()));
    }
    Ok(&raw[start..=end])
}
