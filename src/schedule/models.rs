use crate::error::{Result, UploaderError};
use crate::shorts::Privacy;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Completed,
    /// Upload attempted and given up on.
    Failed,
    /// The entry itself cannot be processed (e.g. unknown account).
    Error,
    Cancelled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledUpload {
    pub id: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_schedule_time")]
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub status: UploadStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "error_message")]
    pub last_error: Option<String>,
    #[serde(default, alias = "failure_time", deserialize_with = "deserialize_optional_time")]
    pub error_time: Option<DateTime<Utc>>,

    // Flags written by older desktop builds; folded into `status` on load
    #[serde(default, skip_serializing)]
    uploaded: bool,
    #[serde(default, skip_serializing)]
    cancelled: bool,
}

impl ScheduledUpload {
    pub fn new(file_path: impl Into<PathBuf>, account_id: Option<String>, scheduled_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.into(),
            account_id,
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            scheduled_time,
            privacy: Privacy::default(),
            category_id: None,
            status: UploadStatus::Pending,
            attempts: 0,
            video_id: None,
            uploaded_at: None,
            last_error: None,
            error_time: None,
            uploaded: false,
            cancelled: false,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == UploadStatus::Pending && self.scheduled_time <= now
    }

    pub fn display_title(&self) -> String {
        if self.title.trim().is_empty() {
            self.file_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        } else {
            self.title.clone()
        }
    }

    pub(crate) fn normalize_legacy_flags(&mut self) {
        if self.status == UploadStatus::Pending {
            if self.uploaded {
                self.status = UploadStatus::Completed;
            } else if self.cancelled {
                self.status = UploadStatus::Cancelled;
            }
        }
        self.uploaded = false;
        self.cancelled = false;
    }
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]` (also with a space) taken as local time.
pub fn parse_schedule_time(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Ok(time.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| UploaderError::Schedule(format!("'{}' does not exist in the local time zone", input)));
        }
    }

    Err(UploaderError::Schedule(format!(
        "Invalid time '{}'. Use e.g. 2026-05-01T18:30 or 2026-05-01T18:30:00+02:00",
        input
    )))
}

fn deserialize_schedule_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_schedule_time(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_time<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_schedule_time(&s).map_err(serde::de::Error::custom))
        .transpose()
}
