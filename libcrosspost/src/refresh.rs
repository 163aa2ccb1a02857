//! OAuth token refresher.
//!
//! Walks the authenticated credentials per platform ahead of each
//! scheduler tick and renews any access token that expires within the
//! platform's configured lead window. Per-user failures are logged and
//! never block other users or the tick itself.

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::platforms::{LinkedinPublisher, TikTokPublisher};
use crate::types::{Credential, Platform, TokenGrant};

pub struct TokenRefresher {
    db: Database,
    linkedin: Option<LinkedinPublisher>,
    tiktok: Option<TikTokPublisher>,
    linkedin_lead: Duration,
    tiktok_lead: Duration,
}

impl TokenRefresher {
    pub fn new(db: Database, http: reqwest::Client, config: &Config) -> Self {
        Self {
            db,
            linkedin: config
                .linkedin
                .clone()
                .map(|c| LinkedinPublisher::new(http.clone(), c)),
            tiktok: config
                .tiktok
                .clone()
                .map(|c| TikTokPublisher::new(http.clone(), c)),
            linkedin_lead: Duration::hours(
                config.linkedin.as_ref().map(|c| c.refresh_lead_hours).unwrap_or(24),
            ),
            tiktok_lead: Duration::hours(
                config.tiktok.as_ref().map(|c| c.refresh_lead_hours).unwrap_or(6),
            ),
        }
    }

    /// Refresh every due credential on every refreshable platform.
    ///
    /// X is skipped: its OAuth 1.0a tokens do not expire.
    pub async fn run_once(&self) -> Result<()> {
        if self.linkedin.is_some() {
            self.refresh_platform(Platform::Linkedin).await?;
        }
        if self.tiktok.is_some() {
            self.refresh_platform(Platform::Tiktok).await?;
        }
        Ok(())
    }

    /// Refresh the due credentials of one platform. Only enumeration
    /// failures propagate; individual token exchanges fail soft.
    pub async fn refresh_platform(&self, platform: Platform) -> Result<()> {
        let lead = match platform {
            Platform::Linkedin => self.linkedin_lead,
            Platform::Tiktok => self.tiktok_lead,
            Platform::X => return Ok(()),
        };

        let now = Utc::now();
        for credential in self.db.list_authenticated(platform).await? {
            if !credential.refresh_due(now, lead) {
                debug!(user = %credential.user, %platform, "Token still fresh, skipping");
                continue;
            }

            match self.refresh_one(platform, &credential).await {
                Ok(()) => info!(user = %credential.user, %platform, "Refreshed access token"),
                Err(e) => {
                    warn!(user = %credential.user, %platform, error = %e, "Token refresh failed")
                }
            }
        }

        Ok(())
    }

    async fn refresh_one(&self, platform: Platform, credential: &Credential) -> Result<()> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::Authentication("Credential has no refresh token".to_string())
        })?;

        let grant = self.exchange(platform, refresh_token).await?;

        let mut updated = credential.clone();
        updated.apply_token_grant(&grant, Utc::now());
        self.db.save_credential(&updated).await?;
        Ok(())
    }

    async fn exchange(
        &self,
        platform: Platform,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, PlatformError> {
        match platform {
            Platform::Linkedin => match &self.linkedin {
                Some(publisher) => publisher.refresh_grant(refresh_token).await,
                None => Err(PlatformError::Authentication(
                    "LinkedIn is not configured".to_string(),
                )),
            },
            Platform::Tiktok => match &self.tiktok {
                Some(publisher) => publisher.refresh_grant(refresh_token).await,
                None => Err(PlatformError::Authentication(
                    "TikTok is not configured".to_string(),
                )),
            },
            Platform::X => Err(PlatformError::Authentication(
                "X tokens are not refreshable".to_string(),
            )),
        }
    }
}
