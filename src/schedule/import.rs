use super::models::ScheduledUpload;
use super::store::ScheduleStore;
use crate::error::{Result, UploaderError};
use crate::metadata::{fallback_title, MetadataGenerator};
use crate::shorts::Privacy;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};

/// Settings for scheduling every video in a folder.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub account_id: Option<String>,
    pub interval_hours: f64,
    /// Defaults to five minutes from now.
    pub start: Option<DateTime<Utc>>,
    pub privacy: Privacy,
    pub extensions: Vec<String>,
    pub style_prompt: Option<String>,
}

/// Video files directly inside `folder` whose extension is in `extensions`
/// (any case), sorted by file name.
pub fn list_videos(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(UploaderError::NotFound(format!("Folder {}", folder.display())));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .map(|ext| wanted.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false);
        if matches {
            videos.push(path);
        }
    }

    videos.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    Ok(videos)
}

/// `count` times starting at `start`, `interval_hours` apart.
fn slot_times(start: DateTime<Utc>, interval_hours: f64, count: usize) -> Result<Vec<DateTime<Utc>>> {
    let out_of_range =
        || UploaderError::Schedule(format!("Interval of {} hours is out of range", interval_hours));

    let seconds = (interval_hours * 3600.0).round();
    if seconds >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    let step = Duration::try_seconds(seconds as i64).ok_or_else(out_of_range)?;

    (0..count)
        .map(|i| {
            i32::try_from(i)
                .ok()
                .and_then(|i| step.checked_mul(i))
                .and_then(|offset| start.checked_add_signed(offset))
                .ok_or_else(out_of_range)
        })
        .collect()
}

/// Schedule every video in `folder`, one every `interval_hours`, with
/// generated metadata. Entries are added to `store` but not saved.
pub async fn import_folder(
    store: &mut ScheduleStore,
    folder: &Path,
    options: &ImportOptions,
    generator: &MetadataGenerator,
) -> Result<Vec<ScheduledUpload>> {
    if !(options.interval_hours > 0.0 && options.interval_hours.is_finite()) {
        return Err(UploaderError::Schedule("Interval must be a positive number of hours".to_string()));
    }

    let videos = list_videos(folder, &options.extensions)?;
    if videos.is_empty() {
        tracing::warn!("No video files found in {}", folder.display());
        return Ok(Vec::new());
    }

    let start = options.start.unwrap_or_else(|| Utc::now() + Duration::minutes(5));
    let times = slot_times(start, options.interval_hours, videos.len())?;
    let style = options.style_prompt.as_deref();

    let mut scheduled = Vec::with_capacity(videos.len());
    for (path, time) in videos.into_iter().zip(times) {
        let mut entry = ScheduledUpload::new(&path, options.account_id.clone(), time);
        entry.privacy = options.privacy;

        match generator.generate(&path, style).await {
            Ok(metadata) => {
                entry.title = metadata.title;
                entry.description = metadata.description;
                entry.tags = metadata.hashtags;
            }
            Err(e) => {
                tracing::error!("Metadata generation failed for {}: {}", path.display(), e);
                entry.title = fallback_title(&path);
            }
        }

        scheduled.push(store.add(entry).clone());
    }

    tracing::info!("Scheduled {} videos from {}", scheduled.len(), folder.display());
    Ok(scheduled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    fn extensions() -> Vec<String> {
        [".mp4", ".mov", ".avi", ".mkv", ".webm"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_list_videos_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.MOV");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "c.webm");
        std::fs::create_dir(dir.path().join("sub.mp4")).unwrap();

        let names: Vec<String> = list_videos(dir.path(), &extensions())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MOV", "c.webm"]);
    }

    #[tokio::test]
    async fn test_import_folder_spaces_entries() {
        let dir = tempfile::tempdir().unwrap();
        let videos = dir.path().join("videos");
        std::fs::create_dir(&videos).unwrap();
        touch(&videos, "02_second.mp4");
        touch(&videos, "01_first.mp4");

        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let start = Utc::now() + Duration::hours(1);
        let options = ImportOptions {
            account_id: Some("acc".to_string()),
            interval_hours: 1.5,
            start: Some(start),
            privacy: Privacy::Public,
            extensions: extensions(),
            style_prompt: None,
        };
        let generator = MetadataGenerator::new(None, 100, 0).without_probe();

        let scheduled = import_folder(&mut store, &videos, &options, &generator).await.unwrap();

        assert_eq!(scheduled.len(), 2);
        assert_eq!(scheduled[0].title, "01_first");
        assert_eq!(scheduled[0].scheduled_time, start);
        assert_eq!(scheduled[1].scheduled_time, start + Duration::minutes(90));
        assert_eq!(scheduled[1].privacy, Privacy::Public);
        assert_eq!(scheduled[1].description, "Video featuring second.");
        assert_eq!(store.list().len(), 2);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_interval_and_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let generator = MetadataGenerator::new(None, 100, 0).without_probe();
        let mut options = ImportOptions {
            account_id: None,
            interval_hours: 0.0,
            start: None,
            privacy: Privacy::Unlisted,
            extensions: extensions(),
            style_prompt: None,
        };

        assert!(import_folder(&mut store, dir.path(), &options, &generator).await.is_err());

        options.interval_hours = 24.0;
        let missing = import_folder(&mut store, &dir.path().join("nope"), &options, &generator).await;
        assert!(matches!(missing, Err(UploaderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_import_rejects_infinite_and_huge_intervals() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "b.mp4");
        let mut store = ScheduleStore::load(dir.path().join("s.json")).unwrap();
        let generator = MetadataGenerator::new(None, 100, 0).without_probe();

        for hours in [f64::INFINITY, f64::NAN, 1e300, 1e12] {
            let options = ImportOptions {
                account_id: None,
                interval_hours: hours,
                start: None,
                privacy: Privacy::Unlisted,
                extensions: extensions(),
                style_prompt: None,
            };
            let result = import_folder(&mut store, dir.path(), &options, &generator).await;
            assert!(matches!(result, Err(UploaderError::Schedule(_))), "interval {}", hours);
        }
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_slot_times_spacing() {
        let start = Utc::now();
        let times = slot_times(start, 0.25, 3).unwrap();
        assert_eq!(times, vec![start, start + Duration::minutes(15), start + Duration::minutes(30)]);
        assert!(slot_times(start, 1e12, 1).is_ok());
        assert!(slot_times(start, 1e12, 2).is_err());
    }
}
