//! Human-readable session narrative.

use crate::format::format_duration;
use crate::llm::{CompletionRequest, LlmClient};
use crate::types::{AnalysisResult, FileContents, Session};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_SAMPLE_FILES: usize = 3;
const MAX_SAMPLE_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You summarize coding sessions for the developer who did the work. \
Focus on what was built, fixed or improved. Be specific and brief. \
Answer with 2 to 4 markdown bullet points and nothing else.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Ai,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub text: String,
    pub source: SummarySource,
}

pub struct SummaryGenerator {
    client: Option<Arc<dyn LlmClient>>,
}

impl SummaryGenerator {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self { client }
    }

    /// Narrative for `session`. Falls back to a count-based sentence on any failure.
    pub fn generate(
        &self,
        session: &Session,
        files: &FileContents,
        analysis: &AnalysisResult,
    ) -> SessionSummary {
        let Some(client) = &self.client else {
            return fallback(session, analysis);
        };

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_prompt(session, files),
            max_tokens: 500,
            temperature: 0.7,
            json_output: false,
        };

        match client.complete(&request) {
            Ok(text) if !text.trim().is_empty() => SessionSummary {
                text: format!("{}\n{}", text.trim_end(), quality_line(analysis)),
                source: SummarySource::Ai,
            },
            Ok(_) => {
                tracing::warn!(session_id = %session.id, "Empty summary from LLM, using fallback");
                fallback(session, analysis)
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Summary generation failed, using fallback"
                );
                fallback(session, analysis)
            }
        }
    }
}

/// `Quality: 82/100 | Issues: 1 high, 0 medium, 0 low`
pub fn quality_line(analysis: &AnalysisResult) -> String {
    let count = &analysis.metrics.issue_count;
    format!(
        "Quality: {}/100 | Issues: {} high, {} medium, {} low",
        analysis.metrics.quality_score, count.high, count.medium, count.low
    )
}

/// Deterministic summary built only from change and issue counts.
pub fn fallback(session: &Session, analysis: &AnalysisResult) -> SessionSummary {
    let counts = session.change_counts();
    let mut text = format!(
        "Worked on {} files: {} added, {} modified, {} deleted.",
        session.changes.len(),
        counts.added,
        counts.modified,
        counts.deleted
    );
    let flagged = analysis.total_issues.max(analysis.issues.len());
    if flagged > 0 {
        text.push_str(&format!(" Analysis flagged {flagged} issue(s)."));
    }
    SessionSummary {
        text,
        source: SummarySource::Fallback,
    }
}

fn build_prompt(session: &Session, files: &FileContents) -> String {
    let changes = session
        .changes
        .iter()
        .map(|c| format!("- {} ({}, {} changes)", c.path, c.change_type, c.change_count))
        .collect::<Vec<_>>()
        .join("\n");

    let samples = files
        .iter()
        .take(MAX_SAMPLE_FILES)
        .map(|(path, content)| {
            let excerpt: String = content.chars().take(MAX_SAMPLE_CHARS).collect();
            format!("### {path}\n```\n{excerpt}\n```")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Summarize this coding session.\n\n\
         Duration: {}\n\
         Working directory: {}\n\n\
         File changes:\n{}\n\n\
         Sample file contents (first {} files):\n{}\n",
        format_duration(session.duration()),
        session.working_directory.display(),
        if changes.is_empty() { "(none)".to_string() } else { changes },
        MAX_SAMPLE_FILES,
        samples
    )
}
