//! TikTok publishing over the Content Posting API, with chunked,
//! resumable video upload.

use serde_json::json;
use tracing::{debug, info};

use crate::config::TiktokConfig;
use crate::error::PlatformError;
use crate::platforms::media;
use crate::types::{Credential, PostRecord, PostType, TokenGrant};

/// Smallest chunk the upload endpoint accepts, except for a sole final chunk.
pub const MIN_CHUNK_BYTES: u64 = 5 * 1024 * 1024;
/// Largest chunk the upload endpoint accepts.
pub const MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;
/// Upper bound on chunk count per upload session.
pub const MAX_CHUNKS: u64 = 1000;

/// Per-chunk PUT timeout. Chunks are up to 64 MiB, so this is generous
/// on purpose.
const CHUNK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(480);

/// How a video file is split for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

impl ChunkPlan {
    /// Decide the chunking for a file of `total_size` bytes.
    ///
    /// Files up to one max chunk upload whole; larger files are cut into
    /// max-size chunks, with a shorter final chunk. Files needing more
    /// than [`MAX_CHUNKS`] chunks are refused before any upload starts.
    pub fn for_size(total_size: u64) -> Result<Self, PlatformError> {
        if total_size == 0 {
            return Err(PlatformError::Media("Video file is empty".to_string()));
        }
        if total_size <= MAX_CHUNK_BYTES {
            return Ok(Self {
                total_size,
                chunk_size: total_size,
                total_chunks: 1,
            });
        }

        let total_chunks = total_size.div_ceil(MAX_CHUNK_BYTES);
        if total_chunks > MAX_CHUNKS {
            return Err(PlatformError::Media(format!(
                "Video too large: needs {} chunks, limit is {}",
                total_chunks, MAX_CHUNKS
            )));
        }

        Ok(Self {
            total_size,
            chunk_size: MAX_CHUNK_BYTES,
            total_chunks,
        })
    }

    /// Byte range `[start, end]` (inclusive) of chunk `index`.
    pub fn range(&self, index: u64) -> (u64, u64) {
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size) - 1;
        (start, end)
    }
}

#[derive(Debug, Clone)]
pub struct TikTokPublisher {
    http: reqwest::Client,
    config: TiktokConfig,
}

impl TikTokPublisher {
    pub fn new(http: reqwest::Client, config: TiktokConfig) -> Self {
        Self { http, config }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        let url = format!("{}oauth/token/", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_key", self.config.client_key.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Authentication(format!(
                "Token refresh failed: HTTP {}: {}",
                status, body
            )));
        }

        Ok(response.json::<TokenGrant>().await?)
    }

    pub async fn publish(
        &self,
        credential: &Credential,
        mut record: PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> PostRecord {
        let result = match record.post_type {
            PostType::Video => {
                self.publish_video(credential, &mut record, content, media_url)
                    .await
            }
            other => Err(PlatformError::Validation(format!(
                "Post type '{}' is not supported on TikTok",
                other
            ))),
        };

        match result {
            Ok(()) => info!(post_id = %record.post_id, "Published to TikTok"),
            Err(e) => {
                record.mark_error(e.to_string());
            }
        }
        record
    }

    async fn publish_video(
        &self,
        credential: &Credential,
        record: &mut PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> Result<(), PlatformError> {
        if !credential.is_authenticated {
            return Err(PlatformError::Authentication(
                "User not authenticated or TikTok profile not found".to_string(),
            ));
        }
        let access_token = credential.access_token.as_deref().ok_or_else(|| {
            PlatformError::Authentication("Access token not found".to_string())
        })?;
        let media_url = media_url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            PlatformError::Validation("Content and URL cannot be empty.".to_string())
        })?;

        // Stage the video; the temp file is removed when this function
        // returns, on every path.
        let video = media::download(&self.http, media_url, "mp4")
            .await
            .map_err(|_| {
                PlatformError::Media("Failed to download video from URL".to_string())
            })?;

        let total_size = std::fs::metadata(video.path())
            .map_err(|e| PlatformError::Media(format!("Failed to stat staged video: {}", e)))?
            .len();
        let plan = ChunkPlan::for_size(total_size)?;

        let creator = self.fetch_creator_info(access_token).await?;
        let upload_url = self
            .init_upload(access_token, content, &creator, &plan)
            .await?;

        record.mark_processed();

        upload_video_chunks(&self.http, &upload_url, video.path(), &plan).await?;
        record.mark_posted();
        Ok(())
    }

    async fn fetch_creator_info(
        &self,
        access_token: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let url = format!("{}post/publish/creator_info/query/", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&json!({}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Posting(
                "Failed to fetch creator info".to_string(),
            ));
        }

        let payload: serde_json::Value = response.json().await?;
        match payload.get("data") {
            Some(data) if data.is_object() => Ok(data.clone()),
            _ => Err(PlatformError::Posting("Creator data not found".to_string())),
        }
    }

    /// Declare the upload session and return the upload URL.
    async fn init_upload(
        &self,
        access_token: &str,
        content: &str,
        creator: &serde_json::Value,
        plan: &ChunkPlan,
    ) -> Result<String, PlatformError> {
        let title = if content.trim().is_empty() {
            "#fypost"
        } else {
            content
        };

        let url = format!("{}post/publish/video/init/", self.config.api_url);
        let body = json!({
            "post_info": {
                "title": title,
                "privacy_level": "SELF_ONLY",
                "disable_comment": creator["comment_disabled"].as_bool().unwrap_or(false),
                "disable_duet": creator["duet_disabled"].as_bool().unwrap_or(false),
                "disable_stitch": creator["stitch_disabled"].as_bool().unwrap_or(true),
            },
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": plan.total_size,
                "chunk_size": plan.chunk_size,
                "total_chunk_count": plan.total_chunks,
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Posting(
                "Failed to initiate video upload".to_string(),
            ));
        }

        let payload: serde_json::Value = response.json().await?;
        payload["data"]["upload_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Posting("Failed to get video upload URL".to_string())
            })
    }
}

/// PUT the staged video to `upload_url` chunk by chunk, with a
/// `Content-Range` header per chunk.
///
/// Public so the chunk loop can be exercised against a plan built by
/// hand, without a multi-gigabyte fixture.
pub async fn upload_video_chunks(
    http: &reqwest::Client,
    upload_url: &str,
    path: &std::path::Path,
    plan: &ChunkPlan,
) -> Result<(), PlatformError> {
    use std::io::{Read, Seek, SeekFrom};

    let mut file = std::fs::File::open(path)
        .map_err(|e| PlatformError::Media(format!("Failed to open staged video: {}", e)))?;

    for index in 0..plan.total_chunks {
        let (start, end) = plan.range(index);
        let len = (end - start + 1) as usize;

        let mut chunk = vec![0u8; len];
        file.seek(SeekFrom::Start(start))
            .and_then(|_| file.read_exact(&mut chunk))
            .map_err(|e| PlatformError::Media(format!("Failed to read video chunk: {}", e)))?;

        debug!(chunk = index + 1, total = plan.total_chunks, start, end, "Uploading video chunk");
        let response = http
            .put(upload_url)
            .header(
                "Content-Range",
                format!("bytes {}-{}/{}", start, end, plan.total_size),
            )
            .header("Content-Type", "video/mp4")
            .timeout(CHUNK_TIMEOUT)
            .body(chunk)
            .send()
            .await?;

        // The endpoint answers 206 for intermediate chunks and 201 for
        // the final one
        let status = response.status();
        if !status.is_success() && status.as_u16() != 206 {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Media(format!(
                "Failed to post video chunk {}/{}, posting response: {}",
                index + 1,
                plan.total_chunks,
                body
            )));
        }
    }

    Ok(())
}
