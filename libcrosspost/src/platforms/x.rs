//! X (Twitter) publishing: v2 tweets plus the v1.1 chunked media
//! upload protocol, signed with OAuth 1.0a.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::XConfig;
use crate::error::PlatformError;
use crate::platforms::media::{self, media_extension};
use crate::platforms::oauth1::OAuth1;
use crate::types::{Credential, PostRecord, PostType};

/// Video bytes sent per APPEND call.
const APPEND_CHUNK_BYTES: usize = 4 * 1024 * 1024;
/// Attempts per APPEND chunk before aborting the upload.
const APPEND_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct XPublisher {
    http: reqwest::Client,
    config: XConfig,
}

impl XPublisher {
    pub fn new(http: reqwest::Client, config: XConfig) -> Self {
        Self { http, config }
    }

    pub async fn publish(
        &self,
        credential: &Credential,
        mut record: PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> PostRecord {
        let result = match record.post_type {
            PostType::Text => self.publish_text(credential, &mut record, content).await,
            PostType::Image | PostType::Video => {
                self.publish_with_media(credential, &mut record, content, media_url)
                    .await
            }
            other => Err(PlatformError::Validation(format!(
                "Post type '{}' is not supported on X",
                other
            ))),
        };

        match result {
            Ok(()) => info!(post_id = %record.post_id, "Published to X"),
            Err(e) => {
                record.mark_error(e.to_string());
            }
        }
        record
    }

    async fn publish_text(
        &self,
        credential: &Credential,
        record: &mut PostRecord,
        content: &str,
    ) -> Result<(), PlatformError> {
        let signer = self.signer(credential)?;
        if content.trim().is_empty() {
            return Err(PlatformError::Validation("Content cannot be empty.".to_string()));
        }

        record.mark_processed();
        self.create_tweet(&signer, content, None).await?;
        record.mark_posted();
        Ok(())
    }

    async fn publish_with_media(
        &self,
        credential: &Credential,
        record: &mut PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> Result<(), PlatformError> {
        let signer = self.signer(credential)?;
        let media_url = match media_url.filter(|u| !u.trim().is_empty()) {
            Some(url) if !content.trim().is_empty() => url,
            _ => {
                return Err(PlatformError::Validation(
                    "Content and URL cannot be empty.".to_string(),
                ))
            }
        };

        // Media must be fully uploaded before the record may advance
        let media_id = self.upload_media(&signer, media_url).await?;

        record.mark_processed();
        self.create_tweet(&signer, content, Some(&media_id)).await?;
        record.mark_posted();
        Ok(())
    }

    fn signer(&self, credential: &Credential) -> Result<OAuth1, PlatformError> {
        match (
            credential.is_authenticated,
            credential.access_token.as_deref(),
            credential.access_token_secret.as_deref(),
        ) {
            (true, Some(token), Some(secret)) => Ok(OAuth1::new(
                self.config.consumer_key.clone(),
                self.config.consumer_secret.clone(),
                token,
                secret,
            )),
            _ => Err(PlatformError::Authentication(
                "X account is not authenticated or missing access tokens.".to_string(),
            )),
        }
    }

    async fn create_tweet(
        &self,
        signer: &OAuth1,
        content: &str,
        media_id: Option<&str>,
    ) -> Result<(), PlatformError> {
        let url = format!("{}2/tweets", self.config.api_url);
        let body = match media_id {
            Some(id) => json!({ "text": content, "media": { "media_ids": [id] } }),
            None => json!({ "text": content }),
        };

        // JSON bodies contribute no parameters to the OAuth signature
        let auth = signer.authorization_header("POST", &url, &[]);
        let response = self
            .http
            .post(&url)
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 200 || status == 201 {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PlatformError::Posting(format!(
            "Failed to post content. Response: {}",
            body
        )))
    }

    /// Upload the media behind `url` and return its media id.
    ///
    /// Videos go through the chunked INIT/APPEND/FINALIZE protocol,
    /// images through a single multipart POST.
    pub async fn upload_media(
        &self,
        signer: &OAuth1,
        url: &str,
    ) -> Result<String, PlatformError> {
        let extension = media_extension(url);
        let staged = media::download(&self.http, url, extension).await?;

        let media_id = if extension == "mp4" {
            self.upload_video(signer, staged.path()).await
        } else {
            self.upload_image(signer, staged.path()).await
        };

        media_id.map_err(|e| {
            warn!(url, error = %e, "Media upload failed");
            PlatformError::Media("Failed to upload media. No Media Id Returned".to_string())
        })
    }

    async fn upload_image(
        &self,
        signer: &OAuth1,
        path: &std::path::Path,
    ) -> Result<String, PlatformError> {
        let url = format!("{}1.1/media/upload.json", self.config.upload_url);
        let bytes = std::fs::read(path)
            .map_err(|e| PlatformError::Media(format!("Failed to read staged image: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("media_category", "tweet_image")
            .part(
                "media",
                reqwest::multipart::Part::bytes(bytes).file_name("tweet_image"),
            );

        // Multipart bodies contribute no parameters to the signature
        let auth = signer.authorization_header("POST", &url, &[]);
        let response = self
            .http
            .post(&url)
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Media(format!(
                "Image upload rejected: {}",
                body
            )));
        }

        let payload: serde_json::Value = response.json().await?;
        extract_media_id(&payload)
            .ok_or_else(|| PlatformError::Media("Upload response had no media id".to_string()))
    }

    async fn upload_video(
        &self,
        signer: &OAuth1,
        path: &std::path::Path,
    ) -> Result<String, PlatformError> {
        let url = format!("{}1.1/media/upload.json", self.config.upload_url);
        let total_bytes = std::fs::metadata(path)
            .map_err(|e| PlatformError::Media(format!("Failed to stat staged video: {}", e)))?
            .len()
            .to_string();

        // INIT
        let init_params = [
            ("command", "INIT"),
            ("total_bytes", total_bytes.as_str()),
            ("media_type", "video/mp4"),
            ("media_category", "tweet_video"),
        ];
        let auth = signer.authorization_header("POST", &url, &init_params);
        let response = self
            .http
            .post(&url)
            .header("Authorization", auth)
            .form(&init_params)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 201 && status != 202 {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Media(format!(
                "INIT rejected: HTTP {}: {}",
                status, body
            )));
        }
        let payload: serde_json::Value = response.json().await?;
        let media_id = extract_media_id(&payload)
            .ok_or_else(|| PlatformError::Media("INIT response had no media id".to_string()))?;

        // APPEND, one multipart call per chunk
        self.append_video_file(signer, &url, &media_id, path, APPEND_CHUNK_BYTES)
            .await?;

        // FINALIZE
        let finalize_params = [("command", "FINALIZE"), ("media_id", media_id.as_str())];
        let auth = signer.authorization_header("POST", &url, &finalize_params);
        let response = self
            .http
            .post(&url)
            .header("Authorization", auth)
            .form(&finalize_params)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Media(format!(
                "FINALIZE rejected: HTTP {}: {}",
                status, body
            )));
        }
        let payload: serde_json::Value = response.json().await?;

        self.await_processing(signer, &url, &media_id, &payload)
            .await?;
        Ok(media_id)
    }

    /// APPEND the staged video in `chunk_bytes` slices, reading each
    /// slice from disk as it is sent.
    ///
    /// Public so the chunk loop can be exercised with a small slice
    /// size, without a multi-megabyte fixture.
    pub async fn append_video_file(
        &self,
        signer: &OAuth1,
        url: &str,
        media_id: &str,
        path: &std::path::Path,
        chunk_bytes: usize,
    ) -> Result<(), PlatformError> {
        use std::io::Read;

        let total = std::fs::metadata(path)
            .map_err(|e| PlatformError::Media(format!("Failed to stat staged video: {}", e)))?
            .len();
        let mut file = std::fs::File::open(path)
            .map_err(|e| PlatformError::Media(format!("Failed to open staged video: {}", e)))?;

        let mut remaining = total;
        let mut segment_index = 0usize;
        while remaining > 0 {
            let len = remaining.min(chunk_bytes as u64) as usize;
            let mut chunk = vec![0u8; len];
            file.read_exact(&mut chunk)
                .map_err(|e| PlatformError::Media(format!("Failed to read video chunk: {}", e)))?;

            self.append_chunk(signer, url, media_id, segment_index, &chunk)
                .await?;
            remaining -= len as u64;
            segment_index += 1;
        }
        Ok(())
    }

    async fn append_chunk(
        &self,
        signer: &OAuth1,
        url: &str,
        media_id: &str,
        segment_index: usize,
        chunk: &[u8],
    ) -> Result<(), PlatformError> {
        let mut last_error = String::new();

        for attempt in 0..APPEND_MAX_ATTEMPTS {
            let form = reqwest::multipart::Form::new()
                .text("command", "APPEND")
                .text("media_id", media_id.to_string())
                .text("segment_index", segment_index.to_string())
                .part(
                    "media",
                    reqwest::multipart::Part::bytes(chunk.to_vec()).file_name("chunk"),
                );

            let auth = signer.authorization_header("POST", url, &[]);
            let outcome = self
                .http
                .post(url)
                .header("Authorization", auth)
                .multipart(form)
                .send()
                .await;

            match outcome {
                Ok(response) if response.status().is_success() => {
                    debug!(segment_index, "APPEND chunk accepted");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    last_error = format!("HTTP {}: {}", status, body);
                }
                Err(e) => last_error = e.to_string(),
            }

            warn!(segment_index, attempt, error = %last_error, "APPEND chunk failed");
            if attempt + 1 < APPEND_MAX_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_secs(1 << attempt)).await;
            }
        }

        Err(PlatformError::Media(format!(
            "APPEND failed for segment {} after {} attempts: {}",
            segment_index, APPEND_MAX_ATTEMPTS, last_error
        )))
    }

    /// Poll the STATUS endpoint until async video processing finishes.
    async fn await_processing(
        &self,
        signer: &OAuth1,
        url: &str,
        media_id: &str,
        finalize_payload: &serde_json::Value,
    ) -> Result<(), PlatformError> {
        let mut info = finalize_payload.get("processing_info").cloned();

        while let Some(processing) = info {
            let state = processing["state"].as_str().unwrap_or("unknown");
            match state {
                "succeeded" => return Ok(()),
                "failed" => {
                    let detail = processing["error"]["message"].as_str().unwrap_or("unknown");
                    return Err(PlatformError::Media(format!(
                        "Video processing failed: {}",
                        detail
                    )));
                }
                _ => {}
            }

            let wait = processing["check_after_secs"].as_u64().unwrap_or(1);
            debug!(media_id, state, wait, "Video still processing");
            tokio::time::sleep(std::time::Duration::from_secs(wait)).await;

            let status_params = [("command", "STATUS"), ("media_id", media_id)];
            let auth = signer.authorization_header("GET", url, &status_params);
            let response = self
                .http
                .get(url)
                .header("Authorization", auth)
                .query(&status_params)
                .send()
                .await?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PlatformError::Media(format!(
                    "STATUS poll failed: {}",
                    body
                )));
            }
            let payload: serde_json::Value = response.json().await?;
            info = payload.get("processing_info").cloned();
        }

        // No processing_info at all means the media is ready
        Ok(())
    }
}

fn extract_media_id(payload: &serde_json::Value) -> Option<String> {
    payload["media_id_string"]
        .as_str()
        .map(str::to_string)
        .or_else(|| payload["media_id"].as_u64().map(|id| id.to_string()))
}
