//! Best-effort delivery of finished sessions to an organization endpoint.
//!
//! Reports are POSTed to `{endpoint}/api/sessions` with a bearer token.
//! Delivery is retried with exponential backoff and never returns an error:
//! a report that cannot be delivered is logged and reported as
//! `delivered: false`, and the local stop flow carries on.

pub mod git;

use crate::analysis::MAX_ISSUES;
use crate::config::OrgConfig;
use crate::error::{Error, Result};
use crate::format::format_duration;
use crate::types::{ChangeType, DetectedIssue, Session};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use std::time::Duration;

/// Payload accepted by `POST /api/sessions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub developer_id: String,
    pub developer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration: String,
    pub files: usize,
    pub summary: String,
    pub quality_score: u8,
    /// Issues before truncation
    pub issues: usize,
    pub changes: Vec<ReportedChange>,
    /// At most [`MAX_ISSUES`]
    pub issue_details: Vec<DetectedIssue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedChange {
    pub path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub change_count: u32,
}

/// What happened to one [`OrgReporter::send_with_outcome`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    pub delivered: bool,
    pub attempts: u32,
}

/// HTTP client for the organization sessions endpoint.
pub struct OrgReporter {
    config: OrgConfig,
    http_client: reqwest::Client,
    url: String,
}

impl OrgReporter {
    /// Build a reporter, or `Ok(None)` when org reporting is not enabled.
    pub fn new(config: &OrgConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        config.validate()?;
        if !config.is_ready() {
            return Ok(None);
        }

        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::Config("org.endpoint is required".to_string()))?
            .trim_end_matches('/');
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("org.token is required".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Config(format!("invalid org.token: {e}")))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("trak/", env!("CARGO_PKG_VERSION"))),
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Some(Self {
            url: format!("{endpoint}/api/sessions"),
            config: config.clone(),
            http_client,
        }))
    }

    /// Assemble the payload for a stopped session.
    pub fn build_report(&self, session: &Session) -> SessionReport {
        let repo = git::detect_github_repo(&session.working_directory).map(|r| r.full_name());
        let branch = git::detect_branch(&session.working_directory);

        let (quality_score, issues, issue_details) = match &session.analysis {
            Some(analysis) => (
                analysis.metrics.quality_score,
                analysis.total_issues.max(analysis.issues.len()),
                analysis.issues.iter().take(MAX_ISSUES).cloned().collect(),
            ),
            None => (0, 0, Vec::new()),
        };

        SessionReport {
            developer_id: self.config.developer_id.clone().unwrap_or_default(),
            developer_name: self
                .config
                .developer_name
                .clone()
                .or_else(|| self.config.developer_id.clone())
                .unwrap_or_default(),
            repo,
            branch,
            session_id: session.id.clone(),
            timestamp: session.end_time.unwrap_or_else(Utc::now),
            duration: format_duration(session.duration()),
            files: session.changes.len(),
            summary: session
                .summary
                .clone()
                .unwrap_or_else(|| "No summary available".to_string()),
            quality_score,
            issues,
            changes: session
                .changes
                .iter()
                .map(|c| ReportedChange {
                    path: c.path.clone(),
                    change_type: c.change_type,
                    change_count: c.change_count,
                })
                .collect(),
            issue_details,
        }
    }

    /// POST `report` once, mapping non-2xx responses to [`Error::Backend`].
    async fn post(&self, report: &SessionReport) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(report)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Backend(format!("API error ({status}): {body}")))
        }
    }

    /// Deliver `report`. Returns `false` once every attempt has failed.
    pub async fn send(&self, report: &SessionReport) -> bool {
        self.send_with_outcome(report).await.delivered
    }

    /// Deliver `report`, retrying every failure with doubling backoff.
    pub async fn send_with_outcome(&self, report: &SessionReport) -> ReportOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.initial_backoff_ms);

        for attempt in 1..=max_attempts {
            match self.post(report).await {
                Ok(()) => {
                    tracing::info!(
                        session_id = %report.session_id,
                        attempt,
                        "Session report delivered"
                    );
                    return ReportOutcome {
                        delivered: true,
                        attempts: attempt,
                    };
                }
                Err(e) if attempt == max_attempts => {
                    tracing::warn!(
                        session_id = %report.session_id,
                        attempts = attempt,
                        error = %e,
                        "Failed to send session report"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "Retrying session report (attempt {}/{}) after {:?}: {}",
                        attempt + 1,
                        max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        ReportOutcome {
            delivered: false,
            attempts: max_attempts,
        }
    }

    /// [`send`](Self::send) on a private current-thread runtime.
    pub fn send_blocking(&self, report: &SessionReport) -> bool {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.send(report)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build runtime for session report");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AnalysisMetrics, AnalysisResult, AnalysisSource, ChangeEntry, IssueCount, IssueType,
        SessionStatus, Severity,
    };
    use std::path::PathBuf;

    fn org_config() -> OrgConfig {
        OrgConfig {
            enabled: true,
            endpoint: Some("http://127.0.0.1:9/".to_string()),
            token: Some("tok".to_string()),
            developer_id: Some("dev@example.com".to_string()),
            developer_name: None,
            ..OrgConfig::default()
        }
    }

    fn stopped_session(issue_total: usize) -> Session {
        let start = Utc::now() - chrono::Duration::minutes(65);
        let mut session = Session::new("77", PathBuf::from("/nonexistent/trak"), start);
        session.status = SessionStatus::Stopped;
        session.end_time = Some(Utc::now());
        session.changes.push(ChangeEntry {
            path: "a.ts".to_string(),
            change_type: ChangeType::Modified,
            timestamp: Utc::now(),
            change_count: 4,
        });
        let issues: Vec<DetectedIssue> = (0..issue_total.min(MAX_ISSUES))
            .map(|i| DetectedIssue {
                id: format!("i{i}"),
                issue_type: IssueType::Security,
                severity: Severity::High,
                file_path: "a.ts".to_string(),
                line_number: 1,
                description: "d".to_string(),
                suggestion: "s".to_string(),
                code_example: None,
            })
            .collect();
        session.analysis = Some(AnalysisResult {
            metrics: AnalysisMetrics {
                quality_score: 0,
                complexity: 0,
                duplication: 0,
                issue_count: IssueCount::tally(&issues),
            },
            issues,
            total_issues: issue_total,
            summary: "s".to_string(),
            analysis_time_ms: 1,
            source: AnalysisSource::Heuristic,
        });
        session
    }

    #[test]
    fn disabled_config_builds_no_reporter() {
        assert!(OrgReporter::new(&OrgConfig::default()).unwrap().is_none());
    }

    #[test]
    fn incomplete_enabled_config_is_error() {
        let config = OrgConfig {
            token: None,
            ..org_config()
        };
        assert!(matches!(OrgReporter::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn report_carries_counts_and_truncated_issues() {
        let reporter = OrgReporter::new(&org_config()).unwrap().unwrap();
        assert_eq!(reporter.url, "http://127.0.0.1:9/api/sessions");

        let report = reporter.build_report(&stopped_session(40));
        assert_eq!(report.session_id, "77");
        assert_eq!(report.developer_name, "dev@example.com");
        assert_eq!(report.duration, "1h 5m");
        assert_eq!(report.files, 1);
        assert_eq!(report.issues, 40);
        assert_eq!(report.issue_details.len(), MAX_ISSUES);
        assert_eq!(report.summary, "No summary available");
        assert_eq!(report.repo, None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["developerId"], "dev@example.com");
        assert_eq!(json["qualityScore"], 0);
        assert_eq!(json["changes"][0]["type"], "modified");
        assert_eq!(json["changes"][0]["changeCount"], 4);
        assert!(json.get("repo").is_none());
    }
}
