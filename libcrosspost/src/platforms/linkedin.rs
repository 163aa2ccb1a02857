//! LinkedIn publishing over the ugcPosts and assets APIs.

use serde_json::json;
use tracing::{debug, info};

use crate::config::LinkedinConfig;
use crate::error::PlatformError;
use crate::platforms::media;
use crate::types::{Credential, PostRecord, PostType, TokenGrant};

#[derive(Debug, Clone)]
pub struct LinkedinPublisher {
    http: reqwest::Client,
    config: LinkedinConfig,
}

fn auth_precondition_error() -> PlatformError {
    PlatformError::Authentication(
        "User not authenticated or LinkedIn profile not found".to_string(),
    )
}

/// Token and profile id are required for every LinkedIn call; either
/// missing gets the same precondition reason.
fn require_identity(credential: &Credential) -> Result<(&str, &str), PlatformError> {
    match (
        credential.access_token.as_deref(),
        credential.profile_id.as_deref(),
    ) {
        (Some(token), Some(profile)) => Ok((token, profile)),
        _ => Err(auth_precondition_error()),
    }
}

fn person_urn(profile_id: &str) -> String {
    if profile_id.starts_with("urn:") {
        profile_id.to_string()
    } else {
        format!("urn:li:person:{}", profile_id)
    }
}

impl LinkedinPublisher {
    pub fn new(http: reqwest::Client, config: LinkedinConfig) -> Self {
        Self { http, config }
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant, PlatformError> {
        let url = format!("{}oauth/v2/accessToken", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
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

    /// Publish one record, consuming and returning it with its final
    /// status and, on failure, the error reason.
    pub async fn publish(
        &self,
        credential: &Credential,
        mut record: PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> PostRecord {
        let result = match record.post_type {
            PostType::Text => self.publish_text(credential, &mut record, content).await,
            PostType::Image => {
                self.publish_image(credential, &mut record, content, media_url)
                    .await
            }
            other => Err(PlatformError::Validation(format!(
                "Post type '{}' is not supported on LinkedIn",
                other
            ))),
        };

        match result {
            Ok(()) => info!(post_id = %record.post_id, "Published to LinkedIn"),
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
        let (access_token, profile_id) = require_identity(credential)?;
        if content.is_empty() {
            return Err(auth_precondition_error());
        }

        record.mark_processed();

        let body = json!({
            "author": person_urn(profile_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": content },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        self.create_ugc_post(access_token, body, true).await?;
        record.mark_posted();
        Ok(())
    }

    async fn publish_image(
        &self,
        credential: &Credential,
        record: &mut PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> Result<(), PlatformError> {
        let (access_token, profile_id) = require_identity(credential)?;
        if !credential.is_authenticated {
            return Err(auth_precondition_error());
        }
        let media_url = media_url
            .filter(|u| !u.is_empty())
            .ok_or_else(auth_precondition_error)?;

        // Stage the image locally; the temp file is cleaned up when this
        // function returns, success or not.
        let image = media::download(&self.http, media_url, "jpg").await?;

        let (upload_url, asset) = self.register_upload(access_token, profile_id).await?;
        self.upload_image_bytes(access_token, &upload_url, image.path())
            .await?;

        record.mark_processed();

        let body = json!({
            "author": person_urn(profile_id),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": content },
                    "shareMediaCategory": "IMAGE",
                    "media": [{
                        "status": "READY",
                        "media": asset
                    }]
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        self.create_ugc_post(access_token, body, false).await?;
        record.mark_posted();
        Ok(())
    }

    /// Register an image upload and return `(upload_url, asset_urn)`.
    async fn register_upload(
        &self,
        access_token: &str,
        profile_id: &str,
    ) -> Result<(String, String), PlatformError> {
        let url = format!("{}v2/assets?action=registerUpload", self.config.api_url);
        let body = json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-image"],
                "owner": person_urn(profile_id),
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Media("Failed to register upload".to_string()));
        }

        let payload: serde_json::Value = response.json().await?;
        let upload_url = payload["value"]["uploadMechanism"]
            ["com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest"]["uploadUrl"]
            .as_str();
        let asset = payload["value"]["asset"].as_str();

        match (upload_url, asset) {
            (Some(u), Some(a)) => Ok((u.to_string(), a.to_string())),
            _ => Err(PlatformError::Media(
                "Invalid upload URL or asset".to_string(),
            )),
        }
    }

    async fn upload_image_bytes(
        &self,
        access_token: &str,
        upload_url: &str,
        path: &std::path::Path,
    ) -> Result<(), PlatformError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PlatformError::Media(format!("Failed to read staged image: {}", e)))?;

        debug!(upload_url, size = bytes.len(), "Uploading image bytes");
        let response = self
            .http
            .put(upload_url)
            .bearer_auth(access_token)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Media("Failed to upload image".to_string()));
        }
        Ok(())
    }

    /// POST a ugcPosts body. Text posts surface the response body as the
    /// failure reason; image posts use a fixed message since the body was
    /// already consumed for diagnostics upstream.
    async fn create_ugc_post(
        &self,
        access_token: &str,
        body: serde_json::Value,
        body_as_reason: bool,
    ) -> Result<(), PlatformError> {
        let url = format!("{}v2/ugcPosts", self.config.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 200 || status.as_u16() == 201 {
            return Ok(());
        }

        if body_as_reason {
            let text = response.text().await.unwrap_or_default();
            Err(PlatformError::Posting(text))
        } else {
            Err(PlatformError::Posting(
                "Failed to create LinkedIn post".to_string(),
            ))
        }
    }
}
