//! Platform publishers.
//!
//! Each platform adapter owns its wire protocol; the closed
//! [`PlatformPublisher`] enum is the single dispatch point, so the set
//! of supported platforms is a compile-time fact.

pub mod linkedin;
pub mod media;
pub mod oauth1;
pub mod tiktok;
pub mod x;

pub use linkedin::LinkedinPublisher;
pub use tiktok::TikTokPublisher;
pub use x::XPublisher;

use crate::types::{Credential, PostRecord};

#[derive(Debug, Clone)]
pub enum PlatformPublisher {
    Linkedin(LinkedinPublisher),
    X(XPublisher),
    Tiktok(TikTokPublisher),
}

impl PlatformPublisher {
    /// Run one publish unit to completion and return the record with its
    /// final status. Never panics and never returns an error: failures
    /// land in the record's `error_reason`.
    pub async fn publish(
        &self,
        credential: &Credential,
        record: PostRecord,
        content: &str,
        media_url: Option<&str>,
    ) -> PostRecord {
        match self {
            PlatformPublisher::Linkedin(p) => {
                p.publish(credential, record, content, media_url).await
            }
            PlatformPublisher::X(p) => p.publish(credential, record, content, media_url).await,
            PlatformPublisher::Tiktok(p) => p.publish(credential, record, content, media_url).await,
        }
    }
}
