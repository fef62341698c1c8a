use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scraper placeholder for a posting without an outbound link.
const URL_NOT_FOUND: &str = "Not found";

/// Application lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Discovered,
    Tailored,
    Applying,
    Applied,
    Failed,
    Skipped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Discovered,
        JobStatus::Tailored,
        JobStatus::Applying,
        JobStatus::Applied,
        JobStatus::Failed,
        JobStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Discovered => "discovered",
            JobStatus::Tailored => "tailored",
            JobStatus::Applying => "applying",
            JobStatus::Applied => "applied",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// The transition table. Status only moves forward, except for the
    /// explicit retry paths out of `Failed`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Discovered, Tailored)
                | (Tailored, Applying)
                | (Applying, Applied)
                | (Applying, Failed)
                | (Failed, Applying)
                | (Failed, Discovered)
                | (Failed, Skipped)
        )
    }

    /// Statuses from which `apply` may start an attempt.
    pub fn accepts_apply(self) -> bool {
        matches!(self, JobStatus::Tailored | JobStatus::Failed)
    }

    /// Statuses in which a job must reference a rendered artifact.
    pub fn holds_artifact(self) -> bool {
        matches!(
            self,
            JobStatus::Tailored | JobStatus::Applying | JobStatus::Applied | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// A job posting and its application state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub platform: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub external_url: String,
    pub description: String,
    pub status: JobStatus,
    /// Path of the current rendered artifact. Owned by the artifact linker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An unvalidated posting as produced by a job source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawJob {
    pub platform: String,
    pub title: String,
    pub company: String,
    pub location: String,
    /// The employer's own application link.
    pub external_url: Option<String>,
    /// The job board's listing page, used when there is no external link.
    pub listing_url: Option<String>,
    pub description: String,
}

impl RawJob {
    /// Checks the record can be ingested and returns its normalized URL.
    pub fn validate(&self) -> Result<String, String> {
        if self.platform.trim().is_empty() {
            return Err("missing source platform".to_string());
        }
        resolve_url(self).ok_or_else(|| {
            format!(
                "no resolvable external URL for '{}' at '{}'",
                self.title.trim(),
                self.company.trim()
            )
        })
    }
}

/// Picks the first usable URL of a raw record, normalized.
pub fn resolve_url(raw: &RawJob) -> Option<String> {
    [raw.external_url.as_deref(), raw.listing_url.as_deref()]
        .into_iter()
        .flatten()
        .find_map(normalize_url)
}

/// Normalizes an absolute http(s) URL: trims it, lower-cases scheme and
/// host and drops trailing slashes. Returns `None` for anything else.
pub(crate) fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(URL_NOT_FOUND) {
        return None;
    }

    let (scheme, rest) = trimmed.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let host = authority.rsplit('@').next().unwrap_or(authority);
    if host.is_empty() || host.starts_with(':') || host.chars().any(char::is_whitespace) {
        return None;
    }

    let normalized = format!("{}://{}{}", scheme, authority.to_ascii_lowercase(), tail);
    Some(normalized.trim_end_matches('/').to_string())
}

/// Stable job identifier: a UUID v5 over the platform and normalized URL,
/// so re-scraping the same posting yields the same id.
pub fn derive_job_id(platform: &str, normalized_url: &str) -> String {
    let key = format!("{}|{}", platform.trim().to_lowercase(), normalized_url);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}
