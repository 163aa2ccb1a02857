//! Database operations for Crosspost

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{DbError, Result};
use crate::types::{Credential, Platform, PostRecord, PostStatus, PostType};

/// A registered schedule file for one user on one platform
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub user: String,
    pub platform: Platform,
    pub file_path: String,
}

/// Aggregate posting counts for one user
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserStats {
    pub user: String,
    pub total: i64,
    pub posted: i64,
    pub errored: i64,
    pub pending: i64,
}

/// Per-platform account state for one user
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSummary {
    pub platform: Platform,
    pub profile_id: Option<String>,
    pub access_token: Option<String>,
    pub is_authenticated: bool,
    pub requires_auth: bool,
    pub token_expires_on: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Insert or update a credential, keyed on (user, platform)
    pub async fn save_credential(&self, cred: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                user, platform, access_token, access_token_secret, refresh_token,
                token_expires_on, refresh_token_expires_in_days,
                is_authenticated, requires_auth, profile_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user, platform) DO UPDATE SET
                access_token = excluded.access_token,
                access_token_secret = excluded.access_token_secret,
                refresh_token = excluded.refresh_token,
                token_expires_on = excluded.token_expires_on,
                refresh_token_expires_in_days = excluded.refresh_token_expires_in_days,
                is_authenticated = excluded.is_authenticated,
                requires_auth = excluded.requires_auth,
                profile_id = excluded.profile_id
            "#,
        )
        .bind(&cred.user)
        .bind(cred.platform.as_str())
        .bind(&cred.access_token)
        .bind(&cred.access_token_secret)
        .bind(&cred.refresh_token)
        .bind(cred.token_expires_on.map(|t| t.timestamp()))
        .bind(cred.refresh_token_expires_in_days)
        .bind(cred.is_authenticated as i64)
        .bind(cred.requires_auth as i64)
        .bind(&cred.profile_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a user's credential for a platform, but only if it is
    /// currently marked authenticated
    pub async fn get_active_credential(
        &self,
        user: &str,
        platform: Platform,
    ) -> Result<Option<Credential>> {
        let row = sqlx::query(
            r#"
            SELECT id, user, platform, access_token, access_token_secret, refresh_token,
                   token_expires_on, refresh_token_expires_in_days,
                   is_authenticated, requires_auth, profile_id
            FROM credentials
            WHERE user = ? AND platform = ? AND is_authenticated = 1
            "#,
        )
        .bind(user)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_credential).transpose()
    }

    /// All authenticated credentials for one platform
    pub async fn list_authenticated(&self, platform: Platform) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, platform, access_token, access_token_secret, refresh_token,
                   token_expires_on, refresh_token_expires_in_days,
                   is_authenticated, requires_auth, profile_id
            FROM credentials
            WHERE platform = ? AND is_authenticated = 1
            ORDER BY user
            "#,
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_credential).collect()
    }

    /// All credentials for one user, any state
    pub async fn account_summaries(&self, user: &str) -> Result<Vec<AccountSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, profile_id, access_token,
                   is_authenticated, requires_auth, token_expires_on
            FROM credentials
            WHERE user = ?
            ORDER BY platform
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter()
            .map(|r| {
                let platform = parse_platform(r.get::<String, _>("platform").as_str())?;
                Ok(AccountSummary {
                    platform,
                    profile_id: r.get("profile_id"),
                    access_token: r.get("access_token"),
                    is_authenticated: r.get::<i64, _>("is_authenticated") != 0,
                    requires_auth: r.get::<i64, _>("requires_auth") != 0,
                    token_expires_on: r
                        .get::<Option<i64>, _>("token_expires_on")
                        .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                })
            })
            .collect()
    }

    /// Register (or repoint) a user's schedule file for a platform
    pub async fn set_upload_file(
        &self,
        user: &str,
        platform: Platform,
        file_path: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_files (user, platform, file_path)
            VALUES (?, ?, ?)
            ON CONFLICT(user, platform) DO UPDATE SET file_path = excluded.file_path
            "#,
        )
        .bind(user)
        .bind(platform.as_str())
        .bind(file_path)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// All registered schedule files, across users and platforms
    pub async fn list_upload_files(&self) -> Result<Vec<UploadFile>> {
        let rows = sqlx::query(
            r#"
            SELECT user, platform, file_path
            FROM upload_files
            ORDER BY user, platform
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter()
            .map(|r| {
                Ok(UploadFile {
                    user: r.get("user"),
                    platform: parse_platform(r.get::<String, _>("platform").as_str())?,
                    file_path: r.get("file_path"),
                })
            })
            .collect()
    }

    /// Insert a new post record and return its row id
    pub async fn insert_post_record(&self, record: &PostRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO posted_content (
                user, post_id, post_type, status, is_posted, error_reason, platform, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.user)
        .bind(&record.post_id)
        .bind(record.post_type.as_str())
        .bind(record.status.as_str())
        .bind(record.is_posted as i64)
        .bind(&record.error_reason)
        .bind(record.platform.as_str())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Persist the final state of a post record
    pub async fn update_post_record(&self, record: &PostRecord) -> Result<()> {
        let id = record.id.ok_or_else(|| {
            crate::error::CrosspostError::InvalidInput(
                "Cannot update a post record that was never inserted".to_string(),
            )
        })?;

        sqlx::query(
            r#"
            UPDATE posted_content
            SET status = ?, is_posted = ?, error_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.is_posted as i64)
        .bind(&record.error_reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Fetch one post record by row id
    pub async fn get_post_record(&self, id: i64) -> Result<Option<PostRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user, post_id, post_type, status, is_posted, error_reason,
                   platform, created_at
            FROM posted_content
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_post_record).transpose()
    }

    /// Whether a schedule row was already dispatched to a platform.
    ///
    /// Only terminal and in-flight records count; this is what keeps the
    /// scheduler from double-posting a row on overlapping ticks.
    pub async fn post_already_dispatched(&self, post_id: &str, platform: Platform) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM posted_content
            WHERE post_id = ? AND platform = ?
            "#,
        )
        .bind(post_id)
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.get::<i64, _>("n") > 0)
    }

    /// All post records for one user, newest first
    pub async fn list_post_records(&self, user: &str) -> Result<Vec<PostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, post_id, post_type, status, is_posted, error_reason,
                   platform, created_at
            FROM posted_content
            WHERE user = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_post_record).collect()
    }

    /// Aggregate posting counts for one user
    pub async fn user_stats(&self, user: &str) -> Result<UserStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'posted' THEN 1 ELSE 0 END), 0) AS posted,
                COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) AS errored,
                COALESCE(SUM(CASE WHEN status NOT IN ('posted', 'error') THEN 1 ELSE 0 END), 0) AS pending
            FROM posted_content
            WHERE user = ?
            "#,
        )
        .bind(user)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(UserStats {
            user: user.to_string(),
            total: row.get("total"),
            posted: row.get("posted"),
            errored: row.get("errored"),
            pending: row.get("pending"),
        })
    }
}

fn parse_platform(s: &str) -> Result<Platform> {
    Platform::from_str(s).map_err(crate::error::CrosspostError::InvalidInput)
}

fn row_to_credential(r: sqlx::sqlite::SqliteRow) -> Result<Credential> {
    Ok(Credential {
        id: Some(r.get("id")),
        user: r.get("user"),
        platform: parse_platform(r.get::<String, _>("platform").as_str())?,
        access_token: r.get("access_token"),
        access_token_secret: r.get("access_token_secret"),
        refresh_token: r.get("refresh_token"),
        token_expires_on: r
            .get::<Option<i64>, _>("token_expires_on")
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        refresh_token_expires_in_days: r.get("refresh_token_expires_in_days"),
        is_authenticated: r.get::<i64, _>("is_authenticated") != 0,
        requires_auth: r.get::<i64, _>("requires_auth") != 0,
        profile_id: r.get("profile_id"),
    })
}

fn row_to_post_record(r: sqlx::sqlite::SqliteRow) -> Result<PostRecord> {
    let post_type = PostType::from_str(r.get::<String, _>("post_type").as_str())
        .map_err(crate::error::CrosspostError::InvalidInput)?;
    let status = PostStatus::from_str(r.get::<String, _>("status").as_str())
        .map_err(crate::error::CrosspostError::InvalidInput)?;

    Ok(PostRecord {
        id: Some(r.get("id")),
        user: r.get("user"),
        post_id: r.get("post_id"),
        post_type,
        status,
        is_posted: r.get::<i64, _>("is_posted") != 0,
        error_reason: r.get("error_reason"),
        platform: parse_platform(r.get::<String, _>("platform").as_str())?,
        created_at: r.get("created_at"),
    })
}
