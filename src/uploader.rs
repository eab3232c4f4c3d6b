// Upload pipeline: metadata, Shorts formatting, publish, optional cleanup

use crate::auth::{AuthManager, TokenStore};
use crate::config::Settings;
use crate::error::{Result, UploaderError};
use crate::metadata::MetadataGenerator;
use crate::shorts::{format_description, optimize_title, sanitize_tags, shorts_url, Privacy};
use crate::youtube_client::{VideoDetails, YouTubeClient};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub account_id: String,
    pub video_path: PathBuf,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub privacy: Privacy,
    pub category_id: String,
    pub notify_subscribers: bool,
    pub made_for_kids: bool,
    pub style_prompt: Option<String>,
}

impl UploadRequest {
    /// A request with every optional field empty and defaults taken from settings.
    pub fn from_settings(account_id: &str, video_path: impl Into<PathBuf>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            account_id: account_id.to_string(),
            video_path: video_path.into(),
            title: None,
            description: None,
            tags: None,
            privacy: settings.privacy_status.parse()?,
            category_id: settings.category_id.clone(),
            notify_subscribers: settings.notify_subscribers,
            made_for_kids: settings.made_for_kids,
            style_prompt: Some(settings.style_prompt.clone()).filter(|s| !s.trim().is_empty()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadOutcome {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub deleted_local_file: bool,
}

/// Where finished videos go. Implemented by YouTube; tests substitute fakes.
#[async_trait]
pub trait VideoPublisher: Send + Sync {
    /// Returns the platform's video id.
    async fn publish(&self, account_id: &str, video_path: &Path, details: &VideoDetails) -> Result<String>;
}

pub struct YouTubePublisher {
    client: YouTubeClient,
    tokens: TokenStore,
}

impl YouTubePublisher {
    pub fn new(client: YouTubeClient, tokens: TokenStore) -> Self {
        Self { client, tokens }
    }
}

#[async_trait]
impl VideoPublisher for YouTubePublisher {
    async fn publish(&self, account_id: &str, video_path: &Path, details: &VideoDetails) -> Result<String> {
        let auth = AuthManager::new(self.client.clone(), self.tokens.clone(), account_id);
        let access_token = auth.access_token().await?;

        // Log every 10% step once
        let last_logged = AtomicU8::new(0);
        let progress = |percent: u8| {
            let step = percent / 10 * 10;
            if step > last_logged.load(Ordering::Relaxed) {
                last_logged.store(step, Ordering::Relaxed);
                tracing::info!("Upload progress: {}%", step);
            }
        };

        let video = self
            .client
            .upload_video(&access_token, video_path, details, Some(&progress))
            .await?;
        Ok(video.id)
    }
}

pub struct Uploader {
    publisher: Arc<dyn VideoPublisher>,
    generator: MetadataGenerator,
    max_title_length: usize,
    delete_after_upload: bool,
}

impl Uploader {
    pub fn new(
        publisher: Arc<dyn VideoPublisher>,
        generator: MetadataGenerator,
        max_title_length: usize,
        delete_after_upload: bool,
    ) -> Self {
        Self {
            publisher,
            generator,
            max_title_length,
            delete_after_upload,
        }
    }

    pub fn from_settings(publisher: Arc<dyn VideoPublisher>, settings: &Settings) -> Self {
        Self::new(
            publisher,
            MetadataGenerator::from_settings(settings),
            settings.max_title_length,
            settings.delete_after_upload,
        )
    }

    /// Upload a video as a Short, generating whatever metadata is missing.
    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadOutcome> {
        let path = &request.video_path;
        if !path.is_file() {
            return Err(UploaderError::NotFound(format!("Video file {}", path.display())));
        }

        tracing::info!("📤 Uploading {} for account {}", path.display(), request.account_id);

        let has_text = |field: &Option<String>| field.as_deref().map_or(false, |s| !s.trim().is_empty());
        let needs_generation =
            !has_text(&request.title) || !has_text(&request.description) || request.tags.is_none();

        let generated = if needs_generation {
            Some(self.generator.generate(path, request.style_prompt.as_deref()).await?)
        } else {
            None
        };

        let raw_title = match (&request.title, &generated) {
            (Some(title), _) if !title.trim().is_empty() => title.clone(),
            (_, Some(generated)) => generated.title.clone(),
            _ => crate::metadata::fallback_title(path),
        };
        let raw_description = match (&request.description, &generated) {
            (Some(description), _) if !description.trim().is_empty() => description.clone(),
            (_, Some(generated)) => generated.description.clone(),
            _ => String::new(),
        };
        let raw_tags = match (&request.tags, &generated) {
            (Some(tags), _) => tags.clone(),
            (None, Some(generated)) => generated.hashtags.clone(),
            (None, None) => Vec::new(),
        };

        let tags = sanitize_tags(&raw_tags);
        let details = VideoDetails {
            title: optimize_title(&raw_title, self.max_title_length),
            description: format_description(&raw_description, &tags),
            tags,
            category_id: request.category_id.clone(),
            privacy: request.privacy,
            made_for_kids: request.made_for_kids,
            notify_subscribers: request.notify_subscribers,
        };

        tracing::debug!("Title: {}", details.title);
        tracing::debug!("Description: {}", details.description);

        let video_id = self.publisher.publish(&request.account_id, path, &details).await?;
        let url = shorts_url(&video_id);
        tracing::info!("✅ Uploaded {} as {}", path.display(), url);

        let deleted_local_file = self.delete_after_upload && remove_local_file(path);

        Ok(UploadOutcome {
            video_id,
            url,
            title: details.title,
            description: details.description,
            tags: details.tags,
            deleted_local_file,
        })
    }
}

// Deletion failure doesn't undo a successful upload
fn remove_local_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Deleted local file {}", path.display());
            true
        }
        Err(e) => {
            tracing::warn!("Uploaded, but could not delete {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every publish call; optionally fails.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub calls: Mutex<Vec<(String, PathBuf, VideoDetails)>>,
        pub failures: Mutex<Vec<UploaderError>>,
    }

    impl RecordingPublisher {
        pub fn failing_with(errors: Vec<UploaderError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(errors),
            }
        }
    }

    #[async_trait]
    impl VideoPublisher for RecordingPublisher {
        async fn publish(&self, account_id: &str, video_path: &Path, details: &VideoDetails) -> Result<String> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((account_id.to_string(), video_path.to_path_buf(), details.clone()));
                calls.len()
            };
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
            Ok(format!("vid{}", n))
        }
    }
}
