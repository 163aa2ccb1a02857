mod support;

use libcrosspost::config::LinkedinConfig;
use libcrosspost::platforms::LinkedinPublisher;
use libcrosspost::types::{Credential, Platform, PostRecord, PostStatus, PostType};
use serde_json::json;
use support::{CannedResponse, MockServer};

fn config(url: &str) -> LinkedinConfig {
    LinkedinConfig {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        base_url: url.to_string(),
        api_url: url.to_string(),
        refresh_lead_hours: 24,
    }
}

fn credential(profile_id: Option<&str>) -> Credential {
    Credential {
        id: None,
        user: "alice".to_string(),
        platform: Platform::Linkedin,
        access_token: Some("token".to_string()),
        access_token_secret: None,
        refresh_token: Some("rt".to_string()),
        token_expires_on: Some(chrono::Utc::now() + chrono::Duration::days(30)),
        refresh_token_expires_in_days: 300.0,
        is_authenticated: true,
        requires_auth: false,
        profile_id: profile_id.map(str::to_string),
    }
}

fn started_record(post_type: PostType) -> PostRecord {
    let mut record = PostRecord::new(
        "alice".to_string(),
        "p-1".to_string(),
        post_type,
        Platform::Linkedin,
    );
    record.start();
    record
}

#[tokio::test]
async fn text_post_success() {
    let server = MockServer::start(vec![CannedResponse::new(201, "{}")]).await;
    let publisher = LinkedinPublisher::new(reqwest::Client::new(), config(&server.url()));

    let record = publisher
        .publish(
            &credential(Some("abc")),
            started_record(PostType::Text),
            "hello world",
            None,
        )
        .await;

    assert_eq!(record.status, PostStatus::Posted);
    assert!(record.is_posted);
    assert!(record.error_reason.is_none());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/v2/ugcPosts");
    assert_eq!(
        requests[0].header("X-Restli-Protocol-Version"),
        Some("2.0.0")
    );
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["author"], "urn:li:person:abc");
    assert_eq!(
        body["specificContent"]["com.linkedin.ugc.ShareContent"]["shareCommentary"]["text"],
        "hello world"
    );
}

#[tokio::test]
async fn missing_profile_is_an_auth_error_with_no_requests() {
    let server = MockServer::start(vec![]).await;
    let publisher = LinkedinPublisher::new(reqwest::Client::new(), config(&server.url()));

    let record = publisher
        .publish(&credential(None), started_record(PostType::Text), "hi", None)
        .await;

    assert_eq!(record.status, PostStatus::Error);
    assert!(!record.is_posted);
    assert!(record
        .error_reason
        .as_deref()
        .unwrap()
        .contains("User not authenticated or LinkedIn profile not found"));
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn text_rejection_body_becomes_error_reason() {
    let server = MockServer::start(vec![CannedResponse::new(500, "boom")]).await;
    let publisher = LinkedinPublisher::new(reqwest::Client::new(), config(&server.url()));

    let record = publisher
        .publish(
            &credential(Some("abc")),
            started_record(PostType::Text),
            "hi",
            None,
        )
        .await;

    assert_eq!(record.status, PostStatus::Error);
    assert!(record.error_reason.as_deref().unwrap().contains("boom"));
}

#[tokio::test]
async fn image_post_walks_the_upload_protocol() {
    // Responses in protocol order: image download, registerUpload,
    // byte PUT, ugcPosts
    let server = MockServer::start(vec![CannedResponse::new(200, "fake image bytes")]).await;
    let upload_url = format!("{}media-upload", server.url());
    server.enqueue(CannedResponse::new(
        200,
        json!({
            "value": {
                "uploadMechanism": {
                    "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest": {
                        "uploadUrl": upload_url
                    }
                },
                "asset": "urn:li:digitalmediaAsset:xyz"
            }
        })
        .to_string(),
    ));
    server.enqueue(CannedResponse::new(201, ""));
    server.enqueue(CannedResponse::new(201, "{}"));

    let publisher = LinkedinPublisher::new(reqwest::Client::new(), config(&server.url()));
    let media_url = format!("{}photo.jpg", server.url());

    let record = publisher
        .publish(
            &credential(Some("abc")),
            started_record(PostType::Image),
            "caption",
            Some(&media_url),
        )
        .await;

    assert_eq!(record.status, PostStatus::Posted, "{:?}", record.error_reason);

    let requests = server.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/photo.jpg");
    assert_eq!(requests[1].path, "/v2/assets?action=registerUpload");
    assert_eq!(requests[2].method, "PUT");
    assert_eq!(requests[2].path, "/media-upload");
    assert_eq!(requests[2].body, b"fake image bytes");
    assert_eq!(requests[3].path, "/v2/ugcPosts");

    let body: serde_json::Value = serde_json::from_slice(&requests[3].body).unwrap();
    let share = &body["specificContent"]["com.linkedin.ugc.ShareContent"];
    assert_eq!(share["shareMediaCategory"], "IMAGE");
    assert_eq!(share["media"][0]["media"], "urn:li:digitalmediaAsset:xyz");
}
