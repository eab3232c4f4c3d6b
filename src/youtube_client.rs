// YouTube Data API v3 client for Shorts uploads and channel management
// Docs: https://developers.google.com/youtube/v3

use crate::error::{Result, UploaderError};
use crate::shorts::Privacy;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const YOUTUBE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

/// Resumable uploads are sent in 5 MiB chunks (must be a multiple of 256 KiB).
pub const UPLOAD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

#[derive(Debug, Clone)]
pub struct YouTubeClient {
    client: Client,
    api_base: String,
    upload_base: String,
    revoke_uri: String,
    max_retries: u32,
    initial_retry_interval: Duration,
}

// ============================================================================
// Channel Structures
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct YouTubeChannel {
    pub id: String,
    pub title: String,
    pub description: String,
    pub custom_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub subscriber_count: Option<i64>,
    pub video_count: Option<i64>,
    pub uploads_playlist_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    snippet: ChannelSnippet,
    statistics: Option<ChannelStatistics>,
    #[serde(rename = "contentDetails")]
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "customUrl")]
    custom_url: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<ThumbnailInfo>,
    medium: Option<ThumbnailInfo>,
    high: Option<ThumbnailInfo>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailInfo {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChannelStatistics {
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
    #[serde(rename = "videoCount")]
    video_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

// ============================================================================
// Video Upload Structures
// ============================================================================

/// Everything YouTube needs to know about a video besides its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDetails {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy: Privacy,
    pub made_for_kids: bool,
    pub notify_subscribers: bool,
}

impl VideoDetails {
    fn resource(&self) -> Value {
        json!({
            "snippet": {
                "title": self.title,
                "description": self.description,
                "tags": self.tags,
                "categoryId": self.category_id,
            },
            "status": {
                "privacyStatus": self.privacy.as_str(),
                "selfDeclaredMadeForKids": self.made_for_kids,
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadedVideo {
    pub id: String,
    pub snippet: Option<UploadedSnippet>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadedSnippet {
    pub title: String,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
}

/// Outcome of sending one chunk (or asking where the session stands).
#[derive(Debug)]
enum ChunkProgress {
    Incomplete { next_offset: u64 },
    Complete(UploadedVideo),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStatusInfo {
    pub video_id: String,
    pub upload_status: String,
    pub privacy_status: String,
    pub processing_status: String,
    pub failure_reason: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Fields left as `None` keep their current value on YouTube.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category_id: Option<String>,
    pub privacy: Option<Privacy>,
}

impl VideoUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.category_id.is_none()
            && self.privacy.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentUpload {
    pub video_id: String,
    pub title: String,
    pub published_at: Option<String>,
}

// ============================================================================
// OAuth Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

// ============================================================================
// YouTube Client Implementation
// ============================================================================

impl Default for YouTubeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: YOUTUBE_API_BASE.to_string(),
            upload_base: YOUTUBE_UPLOAD_BASE.to_string(),
            revoke_uri: GOOGLE_REVOKE_URI.to_string(),
            max_retries: 10,
            initial_retry_interval: Duration::from_secs(2),
        }
    }

    /// Point the client at different endpoints (used against mock servers).
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str, revoke_uri: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self.revoke_uri = revoke_uri.to_string();
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, initial_interval: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_retry_interval = initial_interval;
        self
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_retry_interval,
            max_interval: Duration::from_secs(64),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Get the authenticated user's channel
    pub async fn get_channel_info(&self, access_token: &str) -> Result<YouTubeChannel> {
        let response = self
            .client
            .get(format!("{}/channels", self.api_base))
            .query(&[("part", "snippet,statistics,contentDetails"), ("mine", "true")])
            .bearer_auth(access_token)
            .send()
            .await?;

        let channel_response: ChannelListResponse = ensure_success(response).await?.json().await?;

        let item = channel_response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| UploaderError::NotFound("YouTube channel for this account".to_string()))?;

        let thumbnail_url = item
            .snippet
            .thumbnails
            .and_then(|t| t.high.or(t.medium).or(t.default))
            .map(|t| t.url);

        let subscriber_count = item
            .statistics
            .as_ref()
            .and_then(|s| s.subscriber_count.as_ref())
            .and_then(|c| c.parse().ok());

        let video_count = item
            .statistics
            .as_ref()
            .and_then(|s| s.video_count.as_ref())
            .and_then(|c| c.parse().ok());

        let uploads_playlist_id = item
            .content_details
            .and_then(|d| d.related_playlists)
            .and_then(|p| p.uploads);

        tracing::info!("Retrieved channel info for {}", item.snippet.title);

        Ok(YouTubeChannel {
            id: item.id,
            title: item.snippet.title,
            description: item.snippet.description,
            custom_url: item.snippet.custom_url,
            thumbnail_url,
            subscriber_count,
            video_count,
            uploads_playlist_id,
        })
    }

    /// Upload a video with the resumable protocol.
    ///
    /// Server errors and dropped connections are retried with exponential
    /// backoff; after each failure the session is queried so the upload
    /// resumes from the last byte YouTube acknowledged. Client errors abort.
    pub async fn upload_video(
        &self,
        access_token: &str,
        video_path: &Path,
        details: &VideoDetails,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<UploadedVideo> {
        let total = tokio::fs::metadata(video_path).await?.len();
        if total == 0 {
            return Err(UploaderError::Config(format!(
                "Video file is empty: {}",
                video_path.display()
            )));
        }

        tracing::info!(
            "Preparing to upload {} ({:.2} MB)",
            video_path.display(),
            total as f64 / (1024.0 * 1024.0)
        );

        let session_url = self
            .with_retries("initiate upload", || {
                self.initiate_resumable_upload(access_token, details, total)
            })
            .await?;

        let mut file = tokio::fs::File::open(video_path).await?;
        let mut offset = 0u64;
        let mut backoff = self.backoff_policy();
        let mut retries = 0u32;

        loop {
            let result = match self.read_chunk(&mut file, offset, total).await {
                Ok(chunk) => self.upload_chunk(&session_url, chunk, offset, total).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(ChunkProgress::Complete(video)) => {
                    if let Some(progress) = on_progress {
                        progress(100);
                    }
                    tracing::info!("✅ Video uploaded to YouTube: {} (ID: {})", details.title, video.id);
                    return Ok(video);
                }
                Ok(ChunkProgress::Incomplete { next_offset }) => {
                    offset = next_offset;
                    backoff.reset();
                    if let Some(progress) = on_progress {
                        progress(((offset * 100) / total).min(99) as u8);
                    }
                    tracing::debug!("Upload progress: {}/{} bytes", offset, total);
                }
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.initial_retry_interval);
                    tracing::warn!(
                        "Retry {}/{} after upload error: {} (waiting {:?})",
                        retries,
                        self.max_retries,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;

                    match self.query_upload_offset(&session_url, total).await {
                        Ok(ChunkProgress::Complete(video)) => return Ok(video),
                        Ok(ChunkProgress::Incomplete { next_offset }) => offset = next_offset,
                        Err(status_err) => {
                            tracing::warn!("Could not query upload session, resending chunk: {}", status_err);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("YouTube upload failed after {} retries: {}", retries, e);
                    return Err(e);
                }
            }
        }
    }

    /// Start a resumable upload session; returns the session URL.
    async fn initiate_resumable_upload(
        &self,
        access_token: &str,
        details: &VideoDetails,
        file_size: u64,
    ) -> Result<String> {
        let notify = details.notify_subscribers.to_string();
        let response = self
            .client
            .post(format!("{}/videos", self.upload_base))
            .query(&[
                ("uploadType", "resumable"),
                ("part", "snippet,status"),
                ("notifySubscribers", notify.as_str()),
            ])
            .bearer_auth(access_token)
            .header("X-Upload-Content-Length", file_size.to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&details.resource())
            .send()
            .await?;

        let response = ensure_success(response).await?;

        let session_url = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| UploaderError::api(response.status().as_u16(), "No upload session URL in response"))?
            .to_string();

        tracing::debug!("Resumable upload session initiated");
        Ok(session_url)
    }

    async fn read_chunk(&self, file: &mut tokio::fs::File, offset: u64, total: u64) -> Result<Vec<u8>> {
        let len = UPLOAD_CHUNK_SIZE.min(total.saturating_sub(offset));
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut chunk = Vec::with_capacity(len as usize);
        (&mut *file).take(len).read_to_end(&mut chunk).await?;
        Ok(chunk)
    }

    async fn upload_chunk(
        &self,
        session_url: &str,
        chunk: Vec<u8>,
        offset: u64,
        total: u64,
    ) -> Result<ChunkProgress> {
        let range = content_range(offset, chunk.len(), total)?;
        let response = self
            .client
            .put(session_url)
            .header("Content-Length", chunk.len().to_string())
            .header("Content-Range", range)
            .body(chunk)
            .send()
            .await?;

        chunk_progress(response).await
    }

    /// Ask the session how many bytes it has persisted.
    async fn query_upload_offset(&self, session_url: &str, total: u64) -> Result<ChunkProgress> {
        let response = self
            .client
            .put(session_url)
            .header("Content-Length", "0")
            .header("Content-Range", format!("bytes */{}", total))
            .send()
            .await?;

        chunk_progress(response).await
    }

    /// Upload status, privacy and processing state of a video
    pub async fn get_upload_status(&self, access_token: &str, video_id: &str) -> Result<VideoStatusInfo> {
        let video = self.fetch_video(access_token, video_id, "status,processingDetails").await?;

        let status = &video["status"];
        let text = |v: &Value| v.as_str().unwrap_or("").to_string();
        let info = VideoStatusInfo {
            video_id: video_id.to_string(),
            upload_status: text(&status["uploadStatus"]),
            privacy_status: text(&status["privacyStatus"]),
            processing_status: text(&video["processingDetails"]["processingStatus"]),
            failure_reason: status["failureReason"].as_str().map(String::from),
            rejection_reason: status["rejectionReason"].as_str().map(String::from),
        };

        tracing::info!("Retrieved status for video {}: {}", video_id, info.upload_status);
        Ok(info)
    }

    /// Update video metadata; fields not provided keep their current value.
    ///
    /// Required scope: https://www.googleapis.com/auth/youtube
    pub async fn update_video_metadata(
        &self,
        access_token: &str,
        video_id: &str,
        update: &VideoUpdate,
    ) -> Result<()> {
        let video = self.fetch_video(access_token, video_id, "snippet,status").await?;

        let mut snippet = video["snippet"].clone();
        let mut status = video["status"].clone();

        if let Some(title) = &update.title {
            snippet["title"] = json!(title);
        }
        if let Some(description) = &update.description {
            snippet["description"] = json!(description);
        }
        if let Some(tags) = &update.tags {
            snippet["tags"] = json!(tags);
        }
        if let Some(category) = &update.category_id {
            snippet["categoryId"] = json!(category);
        }
        if let Some(privacy) = update.privacy {
            status["privacyStatus"] = json!(privacy.as_str());
        }

        // Read-only snippet fields are rejected by videos.update
        if let Some(fields) = snippet.as_object_mut() {
            fields.retain(|key, _| {
                matches!(key.as_str(), "title" | "description" | "tags" | "categoryId" | "defaultLanguage")
            });
        }

        let body = json!({
            "id": video_id,
            "snippet": snippet,
            "status": status,
        });

        tracing::info!("📝 Updating YouTube video metadata: {}", video_id);

        let response = self
            .client
            .put(format!("{}/videos", self.api_base))
            .query(&[("part", "snippet,status")])
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await?;
        tracing::info!("✅ Video metadata updated: {}", video_id);
        Ok(())
    }

    /// Most recent uploads on the authenticated channel
    pub async fn list_recent_uploads(&self, access_token: &str, max_results: u32) -> Result<Vec<RecentUpload>> {
        let channel = self.get_channel_info(access_token).await?;
        let playlist_id = channel
            .uploads_playlist_id
            .ok_or_else(|| UploaderError::NotFound("Uploads playlist".to_string()))?;

        let max = max_results.clamp(1, 50).to_string();
        let response = self
            .client
            .get(format!("{}/playlistItems", self.api_base))
            .query(&[
                ("part", "snippet"),
                ("playlistId", playlist_id.as_str()),
                ("maxResults", max.as_str()),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;

        let body: Value = ensure_success(response).await?.json().await?;
        let uploads = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let snippet = &item["snippet"];
                        Some(RecentUpload {
                            video_id: snippet["resourceId"]["videoId"].as_str()?.to_string(),
                            title: snippet["title"].as_str().unwrap_or("").to_string(),
                            published_at: snippet["publishedAt"].as_str().map(String::from),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(uploads)
    }

    async fn fetch_video(&self, access_token: &str, video_id: &str, part: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/videos", self.api_base))
            .query(&[("part", part), ("id", video_id)])
            .bearer_auth(access_token)
            .send()
            .await?;

        let mut body: Value = ensure_success(response).await?.json().await?;
        match body["items"].as_array_mut().and_then(|items| items.drain(..).next()) {
            Some(video) => Ok(video),
            None => {
                tracing::warn!("No video found with ID: {}", video_id);
                Err(UploaderError::NotFound(format!("Video {}", video_id)))
            }
        }
    }

    // ========================================================================
    // OAuth Methods
    // ========================================================================

    /// Exchange authorization code for access token
    pub async fn exchange_code_for_token(
        &self,
        token_uri: &str,
        code: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<GoogleTokenResponse> {
        let params = json!({
            "code": code,
            "client_id": client_id,
            "client_secret": client_secret,
            "redirect_uri": redirect_uri,
            "code_verifier": code_verifier,
            "grant_type": "authorization_code"
        });

        let response = self.client.post(token_uri).json(&params).send().await?;
        let response = ensure_token_success(response).await?;
        Ok(response.json().await?)
    }

    /// Refresh an expired access token using refresh token
    pub async fn refresh_access_token(
        &self,
        token_uri: &str,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenRefreshResponse> {
        let params = json!({
            "client_id": client_id,
            "client_secret": client_secret,
            "refresh_token": refresh_token,
            "grant_type": "refresh_token"
        });

        let response = self.client.post(token_uri).json(&params).send().await?;
        let response = ensure_token_success(response).await?;
        Ok(response.json().await?)
    }

    /// Revoke a token so the grant disappears from the user's Google account
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.revoke_uri)
            .query(&[("token", token)])
            .header("Content-Length", "0")
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff_policy();
        let mut retries = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    retries += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.initial_retry_interval);
                    tracing::warn!("Retry {}/{} for {}: {}", retries, self.max_retries, what, e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build the Google consent-screen URL for the installed-app flow
pub fn build_oauth_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
    code_challenge: &str,
) -> String {
    let scope_string = scopes.join(" ");

    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&state={}&code_challenge={}&code_challenge_method=S256&prompt=consent",
        auth_uri,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scope_string),
        urlencoding::encode(state),
        urlencoding::encode(code_challenge)
    )
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!("YouTube API error ({}): {}", status, body);
    Err(UploaderError::api(status.as_u16(), body))
}

// A rejected grant means the stored token is dead; that is an auth problem, not an API hiccup
async fn ensure_token_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        if body.contains("invalid_grant") {
            return Err(UploaderError::Auth(
                "Token has been expired or revoked. Run `shorts-uploader auth login` again".to_string(),
            ));
        }
        return Err(UploaderError::Auth(format!("Token request rejected: {}", body)));
    }
    Err(UploaderError::api(status.as_u16(), body))
}

async fn chunk_progress(response: Response) -> Result<ChunkProgress> {
    let status = response.status();

    // 308 Resume Incomplete = more bytes expected; no Range header means nothing was stored
    if status.as_u16() == 308 {
        let next_offset = response
            .headers()
            .get("Range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range_end)
            .map(|last| last + 1)
            .unwrap_or(0);
        return Ok(ChunkProgress::Incomplete { next_offset });
    }

    if status.is_success() {
        let video: UploadedVideo = response.json().await?;
        return Ok(ChunkProgress::Complete(video));
    }

    let body = response.text().await.unwrap_or_default();
    Err(UploaderError::api(status.as_u16(), body))
}

/// `Content-Range` for `len` bytes at `offset`. An empty chunk means the
/// file got shorter after the session was opened.
fn content_range(offset: u64, len: usize, total: u64) -> Result<String> {
    if len == 0 {
        return Err(UploaderError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("Video file ended at byte {} of {}, was it changed during the upload?", offset, total),
        )));
    }
    Ok(format!("bytes {}-{}/{}", offset, offset + len as u64 - 1, total))
}

/// `bytes=0-524287` -> 524287
fn parse_range_end(range: &str) -> Option<u64> {
    range.trim().strip_prefix("bytes=")?.split('-').nth(1)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn details() -> VideoDetails {
        VideoDetails {
            title: "Cat does a backflip #Shorts".to_string(),
            description: "Unbelievable.".to_string(),
            tags: vec!["cat".to_string()],
            category_id: "22".to_string(),
            privacy: Privacy::Unlisted,
            made_for_kids: false,
            notify_subscribers: false,
        }
    }

    fn client_for(server: &MockServer) -> YouTubeClient {
        YouTubeClient::new()
            .with_base_urls(
                &format!("{}/youtube/v3", server.uri()),
                &format!("{}/upload/youtube/v3", server.uri()),
                &format!("{}/revoke", server.uri()),
            )
            .with_retry_policy(3, Duration::from_millis(1))
    }

    fn video_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/upload/youtube/v3/videos"))
            .and(query_param("uploadType", "resumable"))
            .and(query_param("notifySubscribers", "false"))
            .and(header("X-Upload-Content-Length", "11"))
            .and(body_partial_json(json!({
                "snippet": {"title": "Cat does a backflip #Shorts", "categoryId": "22"},
                "status": {"privacyStatus": "unlisted", "selfDeclaredMadeForKids": false}
            })))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Location", format!("{}/session/1", server.uri()).as_str()),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_content_range_rejects_empty_chunk() {
        assert_eq!(content_range(0, 10, 25).unwrap(), "bytes 0-9/25");
        assert_eq!(content_range(20, 5, 25).unwrap(), "bytes 20-24/25");
        assert!(matches!(content_range(0, 0, 25), Err(UploaderError::Io(_))));
        assert!(matches!(content_range(10, 0, 25), Err(UploaderError::Io(_))));
    }

    #[test]
    fn test_parse_range_end() {
        assert_eq!(parse_range_end("bytes=0-524287"), Some(524287));
        assert_eq!(parse_range_end("garbage"), None);
    }

    #[test]
    fn test_build_oauth_url_encodes_parameters() {
        let url = build_oauth_url(
            GOOGLE_AUTH_URI,
            "client id",
            "http://127.0.0.1:8080/",
            &["https://www.googleapis.com/auth/youtube.upload"],
            "state123",
            "challenge",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?client_id=client%20id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8080%2F"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=state123"));
    }

    #[tokio::test]
    async fn test_upload_video_single_chunk() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 0-10/11"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "abc123",
                "snippet": {"title": "Cat does a backflip #Shorts", "publishedAt": "2026-01-01T00:00:00Z"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = video_file(b"hello world");
        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |p: u8| seen.lock().unwrap().push(p);

        let video = client_for(&server)
            .upload_video("token", file.path(), &details(), Some(&progress))
            .await
            .unwrap();

        assert_eq!(video.id, "abc123");
        assert_eq!(seen.lock().unwrap().last(), Some(&100));
    }

    #[tokio::test]
    async fn test_upload_video_resumes_after_server_error() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 0-10/11"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes */11"))
            .respond_with(ResponseTemplate::new(308))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .and(header("Content-Range", "bytes 0-10/11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "retry-ok"})))
            .mount(&server)
            .await;

        let file = video_file(b"hello world");
        let video = client_for(&server)
            .upload_video("token", file.path(), &details(), None)
            .await
            .unwrap();

        assert_eq!(video.id, "retry-ok");
    }

    #[tokio::test]
    async fn test_upload_video_client_error_is_not_retried() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("PUT"))
            .and(path("/session/1"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let file = video_file(b"hello world");
        let err = client_for(&server)
            .upload_video("token", file.path(), &details(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, UploaderError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_get_upload_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .and(query_param("id", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "abc123",
                    "status": {"uploadStatus": "processed", "privacyStatus": "public"},
                    "processingDetails": {"processingStatus": "succeeded"}
                }]
            })))
            .mount(&server)
            .await;

        let status = client_for(&server).get_upload_status("token", "abc123").await.unwrap();
        assert_eq!(status.upload_status, "processed");
        assert_eq!(status.privacy_status, "public");
        assert_eq!(status.processing_status, "succeeded");
    }

    #[tokio::test]
    async fn test_get_upload_status_unknown_video() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).get_upload_status("token", "missing").await.unwrap_err();
        assert!(matches!(err, UploaderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_video_metadata_merges_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "abc123",
                    "snippet": {
                        "title": "Old title",
                        "description": "Old description",
                        "categoryId": "22",
                        "channelId": "UC123",
                        "publishedAt": "2026-01-01T00:00:00Z"
                    },
                    "status": {"privacyStatus": "private"}
                }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/youtube/v3/videos"))
            .and(body_partial_json(json!({
                "id": "abc123",
                "snippet": {"title": "New title", "description": "Old description", "categoryId": "22"},
                "status": {"privacyStatus": "public"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        let update = VideoUpdate {
            title: Some("New title".to_string()),
            privacy: Some(Privacy::Public),
            ..Default::default()
        };
        client_for(&server)
            .update_video_metadata("token", "abc123", &update)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_channel_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/youtube/v3/channels"))
            .and(header("Authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "UC123",
                    "snippet": {"title": "Cat Channel", "description": "cats"},
                    "statistics": {"subscriberCount": "42", "videoCount": "7"},
                    "contentDetails": {"relatedPlaylists": {"uploads": "UU123"}}
                }]
            })))
            .mount(&server)
            .await;

        let channel = client_for(&server).get_channel_info("token").await.unwrap();
        assert_eq!(channel.title, "Cat Channel");
        assert_eq!(channel.subscriber_count, Some(42));
        assert_eq!(channel.uploads_playlist_id.as_deref(), Some("UU123"));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .refresh_access_token(&format!("{}/token", server.uri()), "refresh", "id", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, UploaderError::Auth(_)));
    }
}
