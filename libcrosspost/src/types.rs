//! Core types for Crosspost

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Remaining refresh-token lifetime below which a credential is
/// considered to need re-authorization, in days.
pub const REFRESH_TOKEN_MIN_DAYS: f64 = 3.0;

/// The platforms Crosspost can publish to.
///
/// A closed set: the scheduler dispatches on this enum rather than on
/// trait objects, so adding a platform is a compile-time change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    X,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Linkedin, Platform::X, Platform::Tiktok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::X => "x",
            Platform::Tiktok => "tiktok",
        }
    }

    /// Whether this platform accepts the given content type.
    ///
    /// LinkedIn has no video publishing here; TikTok is video only.
    /// `article` is parsed but not published anywhere yet.
    pub fn supports(&self, kind: PostType) -> bool {
        match self {
            Platform::Linkedin => matches!(kind, PostType::Text | PostType::Image),
            Platform::X => matches!(kind, PostType::Text | PostType::Image | PostType::Video),
            Platform::Tiktok => matches!(kind, PostType::Video),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linkedin" => Ok(Platform::Linkedin),
            "x" | "twitter" => Ok(Platform::X),
            "tiktok" => Ok(Platform::Tiktok),
            _ => Err(format!("Unknown platform: '{}'", s)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Image,
    Video,
    Article,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Image => "image",
            PostType::Video => "video",
            PostType::Article => "article",
        }
    }

    /// Whether publishing this type requires a media URL in the row.
    pub fn requires_url(&self) -> bool {
        matches!(self, PostType::Image | PostType::Video)
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(PostType::Text),
            "image" => Ok(PostType::Image),
            "video" => Ok(PostType::Video),
            "article" => Ok(PostType::Article),
            _ => Err(format!("Unknown post type: '{}'", s)),
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a post record.
///
/// `Pending → Started → Processed → Posted`, with `Error` reachable
/// from `Started` or `Processed`. `Posted` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Started,
    Processed,
    Posted,
    Error,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Started => "started",
            PostStatus::Processed => "processed",
            PostStatus::Posted => "posted",
            PostStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Error)
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition(&self, to: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, to),
            (Pending, Started)
                | (Started, Processed)
                | (Started, Error)
                | (Processed, Posted)
                | (Processed, Error)
        )
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PostStatus::Pending),
            "started" => Ok(PostStatus::Started),
            "processed" => Ok(PostStatus::Processed),
            "posted" => Ok(PostStatus::Posted),
            "error" => Ok(PostStatus::Error),
            _ => Err(format!("Unknown post status: '{}'", s)),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracked delivery state of one scheduled piece of content on one
/// platform.
///
/// A value object: publishers mutate their own copy and the scheduler's
/// spawned task persists it through an explicit repository call, so no
/// two units ever share a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    /// Database row ID (None until inserted)
    pub id: Option<i64>,
    pub user: String,
    /// External post identifier from the source schedule
    pub post_id: String,
    pub post_type: PostType,
    pub status: PostStatus,
    pub is_posted: bool,
    /// Present only after a failure
    pub error_reason: Option<String>,
    pub platform: Platform,
    pub created_at: i64,
}

impl PostRecord {
    pub fn new(user: String, post_id: String, post_type: PostType, platform: Platform) -> Self {
        Self {
            id: None,
            user,
            post_id,
            post_type,
            status: PostStatus::Pending,
            is_posted: false,
            error_reason: None,
            platform,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Apply a status transition, refusing illegal ones.
    ///
    /// Returns `true` if the record changed. Terminal records are never
    /// mutated.
    pub fn transition(&mut self, to: PostStatus) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }
        self.status = to;
        true
    }

    pub fn start(&mut self) -> bool {
        self.transition(PostStatus::Started)
    }

    pub fn mark_processed(&mut self) -> bool {
        self.transition(PostStatus::Processed)
    }

    pub fn mark_posted(&mut self) -> bool {
        if self.transition(PostStatus::Posted) {
            self.is_posted = true;
            true
        } else {
            false
        }
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) -> bool {
        if self.transition(PostStatus::Error) {
            self.error_reason = Some(reason.into());
            true
        } else {
            false
        }
    }
}

/// Stored OAuth token set and auth-state flags for one user on one
/// platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Option<i64>,
    pub user: String,
    pub platform: Platform,
    pub access_token: Option<String>,
    /// OAuth 1.0a token secret (X only)
    pub access_token_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_on: Option<DateTime<Utc>>,
    /// Remaining refresh-token lifetime, in days
    pub refresh_token_expires_in_days: f64,
    pub is_authenticated: bool,
    pub requires_auth: bool,
    /// Platform-specific profile identifier (e.g. LinkedIn URN)
    pub profile_id: Option<String>,
}

impl Credential {
    /// Apply a token grant from the platform's token endpoint and
    /// recompute the auth-state invariant.
    ///
    /// `is_authenticated` holds iff the access token is unexpired and
    /// the refresh token has more than three days of life left;
    /// `requires_auth` is the complement on the refresh-token side.
    pub fn apply_token_grant(&mut self, grant: &TokenGrant, now: DateTime<Utc>) {
        let expires_on = now + Duration::seconds(grant.expires_in);
        let refresh_days = grant.refresh_token_expires_in as f64 / 86_400.0;

        self.access_token = Some(grant.access_token.clone());
        self.token_expires_on = Some(expires_on);
        self.refresh_token = grant.refresh_token.clone();
        self.refresh_token_expires_in_days = refresh_days;
        self.is_authenticated = expires_on >= now && refresh_days > REFRESH_TOKEN_MIN_DAYS;
        self.requires_auth = refresh_days <= REFRESH_TOKEN_MIN_DAYS;
    }

    /// Whether the access token expires within the given lead window.
    ///
    /// A credential with no recorded expiry is treated as due so the
    /// refresher gets a chance to repair it.
    pub fn refresh_due(&self, now: DateTime<Utc>, lead: Duration) -> bool {
        match self.token_expires_on {
            Some(expires_on) => expires_on <= now + lead,
            None => true,
        }
    }
}

/// Response shape of the platforms' token endpoints, for both the
/// authorization-code and refresh-token grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Access-token lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,
    pub refresh_token: Option<String>,
    /// Refresh-token lifetime in seconds. TikTok spells this
    /// `refresh_expires_in`.
    #[serde(default, alias = "refresh_expires_in")]
    pub refresh_token_expires_in: i64,
}

/// One row of a per-user upload schedule, as found in the CSV.
///
/// Everything is optional at parse time; intake decides what is
/// acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub date_time: Option<String>,
}

/// A validated schedule row, ready for dispatch.
#[derive(Debug, Clone)]
pub struct IntakeItem {
    pub post_id: String,
    pub content: String,
    pub post_type: PostType,
    pub media_url: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

/// Generate a synthetic post id for rows that arrive without one.
pub fn synthetic_post_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PostRecord {
        PostRecord::new(
            "alice".to_string(),
            "p-1".to_string(),
            PostType::Text,
            Platform::Linkedin,
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut r = record();
        assert_eq!(r.status, PostStatus::Pending);
        assert!(r.start());
        assert!(r.mark_processed());
        assert!(r.mark_posted());
        assert_eq!(r.status, PostStatus::Posted);
        assert!(r.is_posted);
    }

    #[test]
    fn test_error_reachable_from_started_and_processed() {
        let mut r = record();
        r.start();
        assert!(r.mark_error("boom"));
        assert_eq!(r.status, PostStatus::Error);
        assert_eq!(r.error_reason.as_deref(), Some("boom"));

        let mut r = record();
        r.start();
        r.mark_processed();
        assert!(r.mark_error("later boom"));
        assert_eq!(r.status, PostStatus::Error);
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let mut r = record();
        r.start();
        r.mark_processed();
        r.mark_posted();
        assert!(!r.mark_error("too late"));
        assert_eq!(r.status, PostStatus::Posted);
        assert!(r.error_reason.is_none());

        let mut r = record();
        r.start();
        r.mark_error("first");
        assert!(!r.mark_posted());
        assert!(!r.mark_error("second"));
        assert_eq!(r.error_reason.as_deref(), Some("first"));
    }

    #[test]
    fn test_no_skipping_states() {
        let mut r = record();
        // Pending cannot jump straight to Processed or Posted
        assert!(!r.mark_processed());
        assert!(!r.mark_posted());
        assert_eq!(r.status, PostStatus::Pending);
    }

    #[test]
    fn test_platform_content_support() {
        assert!(Platform::Linkedin.supports(PostType::Text));
        assert!(Platform::Linkedin.supports(PostType::Image));
        assert!(!Platform::Linkedin.supports(PostType::Video));

        assert!(Platform::Tiktok.supports(PostType::Video));
        assert!(!Platform::Tiktok.supports(PostType::Text));
        assert!(!Platform::Tiktok.supports(PostType::Image));

        assert!(Platform::X.supports(PostType::Video));
        assert!(!Platform::X.supports(PostType::Article));
    }

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert_eq!("twitter".parse::<Platform>().unwrap(), Platform::X);
        assert!("myspace".parse::<Platform>().is_err());
    }

    fn grant(expires_in: i64, refresh_days: i64) -> TokenGrant {
        TokenGrant {
            access_token: "at".to_string(),
            expires_in,
            refresh_token: Some("rt".to_string()),
            refresh_token_expires_in: refresh_days * 86_400,
        }
    }

    fn credential() -> Credential {
        Credential {
            id: None,
            user: "alice".to_string(),
            platform: Platform::Linkedin,
            access_token: None,
            access_token_secret: None,
            refresh_token: None,
            token_expires_on: None,
            refresh_token_expires_in_days: 0.0,
            is_authenticated: false,
            requires_auth: true,
            profile_id: None,
        }
    }

    #[test]
    fn test_apply_grant_authenticates() {
        let mut cred = credential();
        let now = Utc::now();
        cred.apply_token_grant(&grant(3600, 365), now);

        assert!(cred.is_authenticated);
        assert!(!cred.requires_auth);
        assert_eq!(cred.access_token.as_deref(), Some("at"));
        assert!(cred.token_expires_on.unwrap() > now);
        assert!((cred.refresh_token_expires_in_days - 365.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_grant_refresh_token_boundary() {
        let now = Utc::now();

        // Exactly 3 days left: requires re-auth, not authenticated
        let mut cred = credential();
        cred.apply_token_grant(&grant(3600, 3), now);
        assert!(!cred.is_authenticated);
        assert!(cred.requires_auth);

        // 4 days left: fine
        let mut cred = credential();
        cred.apply_token_grant(&grant(3600, 4), now);
        assert!(cred.is_authenticated);
        assert!(!cred.requires_auth);
    }

    #[test]
    fn test_refresh_due() {
        let now = Utc::now();
        let lead = Duration::hours(24);

        let mut cred = credential();
        cred.token_expires_on = Some(now + Duration::hours(6));
        assert!(cred.refresh_due(now, lead));

        cred.token_expires_on = Some(now + Duration::hours(48));
        assert!(!cred.refresh_due(now, lead));

        cred.token_expires_on = None;
        assert!(cred.refresh_due(now, lead));
    }

    #[test]
    fn test_token_grant_tiktok_field_alias() {
        let json = r#"{
            "access_token": "at",
            "expires_in": 86400,
            "refresh_token": "rt",
            "refresh_expires_in": 31536000
        }"#;
        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.refresh_token_expires_in, 31_536_000);
    }

    #[test]
    fn test_synthetic_post_id_is_unique_uuid() {
        let a = synthetic_post_id();
        let b = synthetic_post_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
