use super::models::{ScheduledUpload, UploadStatus};
use crate::error::{Result, UploaderError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    scheduled_uploads: Vec<ScheduledUpload>,
}

/// The JSON list of scheduled uploads. Mutations are in memory until `save`.
#[derive(Debug)]
pub struct ScheduleStore {
    path: PathBuf,
    entries: Vec<ScheduledUpload>,
}

impl ScheduleStore {
    /// Create an empty schedule file if none exists.
    pub fn ensure(path: &Path) -> Result<()> {
        if !path.exists() {
            write_atomic(path, &serde_json::to_vec_pretty(&ScheduleFile::default())?)?;
            tracing::info!("Created schedule file {}", path.display());
        }
        Ok(())
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let raw = std::fs::read_to_string(&path)?;
        let mut entries = if raw.trim().is_empty() {
            Vec::new()
        } else {
            let file: ScheduleFile = serde_json::from_str(&raw).map_err(|e| {
                UploaderError::Schedule(format!("Invalid schedule file {}: {}", path.display(), e))
            })?;
            file.scheduled_uploads
        };
        for entry in &mut entries {
            entry.normalize_legacy_flags();
        }

        Ok(Self { path, entries })
    }

    /// Write to a sibling temp file and rename over the original.
    pub fn save(&self) -> Result<()> {
        let file = ScheduleFile {
            scheduled_uploads: self.entries.clone(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[ScheduledUpload] {
        &self.entries
    }

    pub fn add(&mut self, entry: ScheduledUpload) -> &ScheduledUpload {
        tracing::info!(
            "Scheduled {} for {}",
            entry.file_path.display(),
            entry.scheduled_time.to_rfc3339()
        );
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Exact id, or a unique prefix of at least four characters.
    pub fn find(&self, id: &str) -> Result<&ScheduledUpload> {
        let index = self.index_of(id)?;
        Ok(&self.entries[index])
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        if let Some(index) = self.entries.iter().position(|e| e.id == id) {
            return Ok(index);
        }
        if id.len() >= 4 {
            let matches: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.id.starts_with(id))
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [index] => return Ok(*index),
                [] => {}
                _ => {
                    return Err(UploaderError::Schedule(format!(
                        "Id prefix '{}' matches {} entries",
                        id,
                        matches.len()
                    )))
                }
            }
        }
        Err(UploaderError::NotFound(format!("Scheduled upload '{}'", id)))
    }

    /// Mark as cancelled; the entry stays in the file.
    pub fn cancel(&mut self, id: &str) -> Result<&ScheduledUpload> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        if entry.status == UploadStatus::Completed {
            return Err(UploaderError::Schedule(format!(
                "Scheduled upload {} was already uploaded",
                entry.id
            )));
        }
        entry.status = UploadStatus::Cancelled;
        tracing::info!("Cancelled scheduled upload {}", entry.id);
        Ok(&self.entries[index])
    }

    /// Put a failed, errored or cancelled entry back in the queue.
    pub fn retry(&mut self, id: &str, at: Option<DateTime<Utc>>) -> Result<&ScheduledUpload> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        if entry.status == UploadStatus::Completed {
            return Err(UploaderError::Schedule(format!(
                "Scheduled upload {} was already uploaded",
                entry.id
            )));
        }
        entry.status = UploadStatus::Pending;
        entry.attempts = 0;
        entry.last_error = None;
        entry.error_time = None;
        if let Some(at) = at {
            entry.scheduled_time = at;
        }
        Ok(&self.entries[index])
    }

    pub fn remove(&mut self, id: &str) -> Result<ScheduledUpload> {
        let index = self.index_of(id)?;
        let removed = self.entries.remove(index);
        tracing::info!("Removed scheduled upload {}", removed.id);
        Ok(removed)
    }

    /// Pending entries whose time has come, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledUpload> {
        let mut due: Vec<ScheduledUpload> = self.entries.iter().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by_key(|e| e.scheduled_time);
        due
    }

    /// Replace the entry with the same id. Returns false if it is gone.
    pub fn update(&mut self, entry: ScheduledUpload) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }

    /// Copy the outcome of an upload attempt onto the stored entry with the
    /// same id. Title, time and tags keep whatever is stored. Entries that
    /// left Pending meanwhile (cancelled, edited into another state) are not
    /// touched, unless the upload completed. Returns false when nothing was
    /// written.
    pub fn record_attempt(&mut self, result: &ScheduledUpload) -> bool {
        let Some(stored) = self.entries.iter_mut().find(|e| e.id == result.id) else {
            return false;
        };
        if stored.status != UploadStatus::Pending && result.status != UploadStatus::Completed {
            return false;
        }
        stored.status = result.status;
        stored.attempts = result.attempts;
        stored.last_error = result.last_error.clone();
        stored.error_time = result.error_time;
        stored.video_id = result.video_id.clone();
        stored.uploaded_at = result.uploaded_at;
        true
    }

    pub fn completed(&self) -> Vec<ScheduledUpload> {
        self.entries
            .iter()
            .filter(|e| e.status == UploadStatus::Completed)
            .cloned()
            .collect()
    }

    pub fn remove_ids(&mut self, ids: &[String]) {
        self.entries.retain(|e| !ids.contains(&e.id));
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    uploads: Vec<Value>,
}

/// Append-only record of completed uploads.
pub struct UploadHistory {
    path: PathBuf,
}

impl UploadHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<HistoryFile> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| UploaderError::Schedule(format!("Invalid history file {}: {}", self.path.display(), e)))
    }

    pub fn append(&self, completed: &[ScheduledUpload]) -> Result<()> {
        if completed.is_empty() {
            return Ok(());
        }
        let mut history = self.read()?;
        for entry in completed {
            history.uploads.push(serde_json::to_value(entry)?);
        }
        write_atomic(&self.path, &serde_json::to_vec_pretty(&history)?)?;
        tracing::info!("Saved {} uploads to history", completed.len());
        Ok(())
    }

    /// Entries this build can read; foreign records are skipped.
    pub fn entries(&self) -> Result<Vec<ScheduledUpload>> {
        Ok(self
            .read()?
            .uploads
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect())
    }
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "schedule".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(minutes_from_now: i64) -> ScheduledUpload {
        ScheduledUpload::new(
            "/videos/a.mp4",
            Some("acc".to_string()),
            Utc::now() + Duration::minutes(minutes_from_now),
        )
    }

    #[test]
    fn test_missing_file_is_empty_and_ensure_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_uploads.json");

        assert!(ScheduleStore::load(&path).unwrap().list().is_empty());
        ScheduleStore::ensure(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"scheduled_uploads": []}));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_uploads.json");
        let mut store = ScheduleStore::load(&path).unwrap();
        let id = store.add(entry(10)).id.clone();
        store.save().unwrap();

        let reloaded = ScheduleStore::load(&path).unwrap();
        assert_eq!(reloaded.list().len(), 1);
        assert_eq!(reloaded.find(&id).unwrap().status, UploadStatus::Pending);
        assert!(!dir.path().join(".scheduled_uploads.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_uploads.json");
        std::fs::write(&path, "{oops").unwrap();
        assert!(matches!(ScheduleStore::load(&path), Err(UploaderError::Schedule(_))));
    }

    #[test]
    fn test_due_orders_by_time_and_skips_non_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let late = store.add(entry(-1)).id.clone();
        let early = store.add(entry(-30)).id.clone();
        let cancelled = store.add(entry(-10)).id.clone();
        store.add(entry(30));
        store.cancel(&cancelled).unwrap();

        let due: Vec<String> = store.due(Utc::now()).into_iter().map(|e| e.id).collect();
        assert_eq!(due, vec![early, late]);
    }

    #[test]
    fn test_cancel_rules_and_prefix_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let id = store.add(entry(5)).id.clone();

        assert_eq!(store.find(&id[..8]).unwrap().id, id);
        assert!(matches!(store.find("abc"), Err(UploaderError::NotFound(_))));

        let mut done = store.find(&id).unwrap().clone();
        done.status = UploadStatus::Completed;
        store.update(done);
        assert!(store.cancel(&id).is_err());

        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_retry_resets_failed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let mut failed = entry(-5);
        failed.status = UploadStatus::Failed;
        failed.attempts = 3;
        failed.last_error = Some("quota".to_string());
        let id = store.add(failed).id.clone();

        let retried = store.retry(&id, None).unwrap();
        assert_eq!(retried.status, UploadStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(retried.last_error.is_none());
    }

    #[test]
    fn test_record_attempt_keeps_user_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let id = store.add(entry(-5)).id.clone();

        let mut result = store.find(&id).unwrap().clone();
        result.title = "stale".to_string();
        result.attempts = 1;
        result.last_error = Some("503".to_string());

        let mut edited = store.find(&id).unwrap().clone();
        edited.title = "Edited".to_string();
        store.update(edited);

        assert!(store.record_attempt(&result));
        let stored = store.find(&id).unwrap();
        assert_eq!(stored.title, "Edited");
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.last_error.as_deref(), Some("503"));

        store.cancel(&id).unwrap();
        result.attempts = 2;
        assert!(!store.record_attempt(&result));
        assert_eq!(store.find(&id).unwrap().status, UploadStatus::Cancelled);

        result.status = UploadStatus::Completed;
        assert!(store.record_attempt(&result));
        assert_eq!(store.completed().len(), 1);

        result.id = "missing".to_string();
        assert!(!store.record_attempt(&result));
    }

    #[test]
    fn test_history_appends() {
        let dir = tempfile::tempdir().unwrap();
        let history = UploadHistory::new(dir.path().join("upload_history.json"));
        let mut done = entry(-1);
        done.status = UploadStatus::Completed;
        done.video_id = Some("abc".to_string());

        history.append(&[done.clone()]).unwrap();
        history.append(&[done]).unwrap();
        history.append(&[]).unwrap();

        let entries = history.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].video_id.as_deref(), Some("abc"));
    }
}
