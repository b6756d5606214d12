//! Product job handlers.
//!
//! Scraping and report rendering live behind third-party APIs. These
//! handlers validate the request, stamp the result, and hand back the
//! shape callers poll for.

use chrono::{DateTime, Utc};
use pulse_jobs::{JobContext, JobError, JobPayload, JobQueue, JobResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Social platforms a profile can be refreshed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
    YouTube,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Instagram => write!(f, "instagram"),
            Platform::TikTok => write!(f, "tiktok"),
            Platform::YouTube => write!(f, "youtube"),
        }
    }
}

/// Re-fetch a social account's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshProfile {
    pub platform: Platform,
    pub handle: String,
}

/// Result of a profile refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub platform: Platform,
    pub handle: String,
    pub refreshed_at: DateTime<Utc>,
}

impl JobPayload for RefreshProfile {
    const JOB_TYPE: &'static str = "refresh_profile";
    type Output = ProfileSnapshot;
}

/// Report file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

impl ReportFormat {
    fn extension(self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

/// Export a user's analytics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub user_id: String,
    #[serde(default)]
    pub format: ReportFormat,
}

/// Location of an exported report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedReport {
    pub file_name: String,
}

impl JobPayload for ExportReport {
    const JOB_TYPE: &'static str = "export_report";
    type Output = ExportedReport;
}

/// Register every handler in this module.
pub fn register_all(queue: &JobQueue) {
    queue.register(refresh_profile);
    queue.register(export_report);
}

pub async fn refresh_profile(job: RefreshProfile, ctx: JobContext) -> JobResult<ProfileSnapshot> {
    let handle = job.handle.trim().trim_start_matches('@');
    if handle.is_empty() {
        return Err(JobError::unrecoverable("profile handle must not be empty"));
    }

    debug!(
        platform = %job.platform,
        handle,
        attempt = ctx.attempt,
        "Refreshing profile"
    );

    let snapshot = ProfileSnapshot {
        platform: job.platform,
        handle: handle.to_lowercase(),
        refreshed_at: Utc::now(),
    };
    metrics::counter!("pulse_profiles_refreshed_total", "platform" => job.platform.to_string())
        .increment(1);

    Ok(snapshot)
}

pub async fn export_report(job: ExportReport, _ctx: JobContext) -> JobResult<ExportedReport> {
    if job.user_id.trim().is_empty() {
        return Err(JobError::unrecoverable("user_id must not be empty"));
    }

    let file_name = format!(
        "report-{}-{}.{}",
        job.user_id,
        Utc::now().format("%Y%m%d%H%M%S"),
        job.format.extension()
    );
    info!(user_id = %job.user_id, file_name = %file_name, "Report exported");

    Ok(ExportedReport { file_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_jobs::{EnqueueOptions, JobId, JobStatus, JobsConfig, Priority};

    fn ctx(job_type: &str) -> JobContext {
        JobContext {
            job_id: JobId::new(),
            job_type: job_type.to_string(),
            attempt: 1,
            max_attempts: 3,
            priority: Priority::Normal,
        }
    }

    #[tokio::test]
    async fn test_refresh_profile_normalises_handle() {
        let job = RefreshProfile {
            platform: Platform::Instagram,
            handle: " @NatGeo ".to_string(),
        };

        let snapshot = refresh_profile(job, ctx("refresh_profile")).await.unwrap();
        assert_eq!(snapshot.handle, "natgeo");
        assert_eq!(snapshot.platform, Platform::Instagram);
    }

    #[tokio::test]
    async fn test_refresh_profile_rejects_empty_handle() {
        let job = RefreshProfile {
            platform: Platform::TikTok,
            handle: "@".to_string(),
        };

        let err = refresh_profile(job, ctx("refresh_profile")).await.unwrap_err();
        assert!(matches!(err, JobError::Unrecoverable(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_export_report_file_name() {
        let job = ExportReport {
            user_id: "u-42".to_string(),
            format: ReportFormat::Json,
        };

        let report = export_report(job, ctx("export_report")).await.unwrap();
        assert!(report.file_name.starts_with("report-u-42-"));
        assert!(report.file_name.ends_with(".json"));
    }

    #[test]
    fn test_payload_wire_format() {
        let payload: ExportReport = serde_json::from_str(r#"{"user_id": "u-1"}"#).unwrap();
        assert_eq!(payload.format, ReportFormat::Csv);

        let payload: RefreshProfile =
            serde_json::from_str(r#"{"platform": "youtube", "handle": "mkbhd"}"#).unwrap();
        assert_eq!(payload.platform, Platform::YouTube);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_run_through_queue() {
        let queue = JobQueue::new(JobsConfig::default()).unwrap();
        register_all(&queue);

        let refresh = queue.enqueue(
            &RefreshProfile {
                platform: Platform::YouTube,
                handle: "mkbhd".to_string(),
            },
            EnqueueOptions::new().priority(Priority::High),
        );
        let bad = queue.enqueue(
            &RefreshProfile {
                platform: Platform::YouTube,
                handle: String::new(),
            },
            EnqueueOptions::new(),
        );

        let record = queue.wait(&refresh).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        let snapshot: ProfileSnapshot = record.output().unwrap().unwrap();
        assert_eq!(snapshot.handle, "mkbhd");

        let record = queue.wait(&bad).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.error.as_deref(), Some("profile handle must not be empty"));
    }
}
