// Polling pass over the schedule and the daemon loop around it

use super::models::{ScheduledUpload, UploadStatus};
use super::store::{ScheduleStore, UploadHistory};
use crate::accounts::AccountStore;
use crate::config::{AppPaths, Settings};
use crate::error::Result;
use crate::uploader::{UploadRequest, Uploader, YouTubePublisher};
use crate::youtube_client::YouTubeClient;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub due: usize,
    pub completed: usize,
    pub retrying: usize,
    pub failed: usize,
}

pub struct ScheduleRunner {
    schedule_path: PathBuf,
    history: UploadHistory,
    uploader: Uploader,
    max_attempts: u32,
    category_id: String,
    notify_subscribers: bool,
    made_for_kids: bool,
    style_prompt: Option<String>,
    default_account: Option<String>,
    accounts_file: Option<PathBuf>,
}

impl ScheduleRunner {
    pub fn new(paths: &AppPaths, uploader: Uploader, settings: &Settings, default_account: Option<String>) -> Self {
        Self {
            schedule_path: paths.schedule_file(),
            history: UploadHistory::new(paths.history_file()),
            uploader,
            max_attempts: settings.max_upload_attempts.max(1),
            category_id: settings.category_id.clone(),
            notify_subscribers: settings.notify_subscribers,
            made_for_kids: settings.made_for_kids,
            style_prompt: Some(settings.style_prompt.clone()).filter(|s| !s.trim().is_empty()),
            default_account,
            accounts_file: None,
        }
    }

    /// Runner that uploads to YouTube with the accounts in the config directory.
    pub fn from_settings(paths: &AppPaths, settings: &Settings) -> Self {
        let publisher = YouTubePublisher::new(YouTubeClient::new(), paths.token_store(settings));
        let uploader = Uploader::from_settings(Arc::new(publisher), settings);
        Self::new(paths, uploader, settings, None).with_accounts_file(paths.accounts_file())
    }

    /// Check entry accounts against this file, re-read on every pass. Its
    /// current account is used for entries that name none.
    pub fn with_accounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.accounts_file = Some(path.into());
        self
    }

    fn load_accounts(&self) -> Result<Option<AccountStore>> {
        self.accounts_file.as_ref().map(AccountStore::load).transpose()
    }

    /// One pass: upload everything due at `now`, then persist the results.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        self.run_pass(now, None).await
    }

    async fn run_pass(&self, now: DateTime<Utc>, shutdown: Option<&watch::Receiver<bool>>) -> Result<PassSummary> {
        tracing::info!("Checking for scheduled uploads...");
        let store = ScheduleStore::load(&self.schedule_path)?;
        let due = store.due(now);
        let unrecorded = store.completed().len();
        drop(store);

        let mut summary = PassSummary {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() && unrecorded == 0 {
            tracing::info!("No uploads due");
            return Ok(summary);
        }

        let accounts = self.load_accounts()?;
        let total = due.len();
        let mut results = Vec::with_capacity(total);

        for (index, mut entry) in due.into_iter().enumerate() {
            if shutdown.map_or(false, |s| *s.borrow()) {
                tracing::info!("Shutdown requested, leaving {} uploads for the next run", total - index);
                break;
            }
            tracing::info!("Processing scheduled upload: {}", entry.display_title());
            self.process_entry(&mut entry, accounts.as_ref()).await;

            match entry.status {
                UploadStatus::Completed => summary.completed += 1,
                UploadStatus::Pending => summary.retrying += 1,
                _ => summary.failed += 1,
            }
            results.push(entry);
        }

        // Re-read so entries added, edited or cancelled during the uploads survive
        let mut store = ScheduleStore::load(&self.schedule_path)?;
        let mut finished = Vec::new();
        for entry in results {
            if store.record_attempt(&entry) {
                continue;
            }
            if entry.status == UploadStatus::Completed {
                tracing::warn!("Uploaded entry {} was removed from the schedule meanwhile", entry.id);
                finished.push(entry);
            } else {
                tracing::warn!("Scheduled entry {} changed while it was being processed, keeping the stored version", entry.id);
            }
        }
        finished.extend(store.completed());

        match self.history.append(&finished) {
            Ok(()) => {
                let ids: Vec<String> = finished.iter().map(|e| e.id.clone()).collect();
                store.remove_ids(&ids);
            }
            Err(e) => {
                tracing::error!("Error saving upload history, keeping completed uploads in the schedule: {}", e);
            }
        }
        store.save()?;

        tracing::info!(
            "Processed {} uploads: {} completed, {} will retry, {} failed",
            summary.due,
            summary.completed,
            summary.retrying,
            summary.failed
        );
        Ok(summary)
    }

    async fn process_entry(&self, entry: &mut ScheduledUpload, accounts: Option<&AccountStore>) {
        let now = Utc::now();

        let requested = entry
            .account_id
            .clone()
            .or_else(|| self.default_account.clone())
            .or_else(|| accounts.and_then(|a| a.current()).map(|a| a.id.clone()));
        let Some(requested) = requested else {
            record_error(entry, UploadStatus::Error, "No account set for this upload and no current account", now);
            return;
        };
        let account_id = match accounts.map(|a| a.resolve(&requested)) {
            None => requested,
            Some(Ok(account)) => account.id.clone(),
            Some(Err(_)) => {
                let message = format!("Unknown account {}", requested);
                record_error(entry, UploadStatus::Error, &message, now);
                return;
            }
        };

        if !entry.file_path.is_file() {
            entry.attempts += 1;
            let message = format!("Video file not found: {}", entry.file_path.display());
            record_error(entry, UploadStatus::Failed, &message, now);
            return;
        }

        let request = UploadRequest {
            account_id,
            video_path: entry.file_path.clone(),
            title: Some(entry.title.clone()).filter(|t| !t.trim().is_empty()),
            description: Some(entry.description.clone()).filter(|d| !d.trim().is_empty()),
            tags: Some(entry.tags.clone()),
            privacy: entry.privacy,
            category_id: entry.category_id.clone().unwrap_or_else(|| self.category_id.clone()),
            notify_subscribers: self.notify_subscribers,
            made_for_kids: self.made_for_kids,
            style_prompt: self.style_prompt.clone(),
        };

        entry.attempts += 1;
        match self.uploader.upload(&request).await {
            Ok(outcome) => {
                tracing::info!("Successfully uploaded: {} ({})", entry.display_title(), outcome.url);
                entry.status = UploadStatus::Completed;
                entry.video_id = Some(outcome.video_id);
                entry.uploaded_at = Some(Utc::now());
                entry.last_error = None;
                entry.error_time = None;
            }
            Err(e) => {
                let status = if entry.attempts >= self.max_attempts {
                    UploadStatus::Failed
                } else {
                    UploadStatus::Pending
                };
                tracing::error!(
                    "Failed to upload {} (attempt {}/{}): {}",
                    entry.display_title(),
                    entry.attempts,
                    self.max_attempts,
                    e
                );
                record_error(entry, status, &e.to_string(), Utc::now());
            }
        }
    }

    /// Run passes every `interval` until `shutdown` turns true. The flag is
    /// also checked between uploads, so a pass in progress stops after the
    /// current video. A failing pass is logged and the loop carries on.
    pub async fn run_service(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        ScheduleStore::ensure(&self.schedule_path)?;

        tracing::info!(
            "Scheduler started, checking {} every {}s",
            self.schedule_path.display(),
            interval.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_pass(Utc::now(), Some(&shutdown)).await {
                tracing::error!("Scheduled upload pass failed: {}", e);
            }
            if *shutdown.borrow() {
                break;
            }

            tracing::debug!("Sleeping for {} seconds", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Shutdown channel closed");
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopping");
        Ok(())
    }
}

fn record_error(entry: &mut ScheduledUpload, status: UploadStatus, message: &str, at: DateTime<Utc>) {
    if status != UploadStatus::Pending {
        tracing::error!("Giving up on {}: {}", entry.display_title(), message);
    }
    entry.status = status;
    entry.last_error = Some(message.to_string());
    entry.error_time = Some(at);
}

/// Install the Ctrl-C and SIGTERM handlers right away. The returned flag
/// turns true once either arrives.
pub fn install_shutdown_handler() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = terminate.recv() => tracing::info!("Received SIGTERM"),
                _ = interrupt.recv() => tracing::info!("Received Ctrl-C"),
            }
            tracing::info!("Finishing the current upload before stopping");
            let _ = tx.send(true);
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, finishing the current upload before stopping");
                let _ = tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                // keep the sender alive so the flag stays readable
                std::future::pending::<()>().await;
                drop(tx);
            }
        }
    });

    Ok(rx)
}
