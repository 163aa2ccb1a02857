//! Crosspost - scheduled multi-platform social publishing
//!
//! This library provides the core pipeline for publishing scheduled
//! content to LinkedIn, X, and TikTok: schedule intake from per-user
//! CSV files, platform publish adapters with chunked media upload, and
//! an OAuth token refresher.

pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod logging;
pub mod platforms;
pub mod refresh;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::{AccountSummary, Database, UploadFile, UserStats};
pub use error::{CrosspostError, PlatformError, Result};
pub use intake::PostingWindow;
pub use platforms::PlatformPublisher;
pub use refresh::TokenRefresher;
pub use scheduler::PublishScheduler;
pub use types::{Credential, Platform, PostRecord, PostStatus, PostType, TokenGrant};
