//! Publish scheduler.
//!
//! On each tick, reads every registered schedule file, selects the rows
//! due in the upcoming posting window, records them, and hands each one
//! to its platform publisher as a fire-and-forget task. A semaphore
//! bounds how many publish units run at once; a slow video upload never
//! delays the next tick.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{Config, SchedulerConfig};
use crate::db::Database;
use crate::error::Result;
use crate::intake::{select_due_rows, PostingWindow};
use crate::platforms::{LinkedinPublisher, PlatformPublisher, TikTokPublisher, XPublisher};
use crate::types::{Platform, PostRecord};

pub struct PublishScheduler {
    db: Database,
    config: SchedulerConfig,
    publishers: HashMap<Platform, Arc<PlatformPublisher>>,
    limiter: Arc<Semaphore>,
}

impl PublishScheduler {
    pub fn new(db: Database, http: reqwest::Client, config: &Config) -> Self {
        let mut publishers = HashMap::new();
        if let Some(c) = config.linkedin.clone() {
            publishers.insert(
                Platform::Linkedin,
                Arc::new(PlatformPublisher::Linkedin(LinkedinPublisher::new(
                    http.clone(),
                    c,
                ))),
            );
        }
        if let Some(c) = config.x.clone() {
            publishers.insert(
                Platform::X,
                Arc::new(PlatformPublisher::X(XPublisher::new(http.clone(), c))),
            );
        }
        if let Some(c) = config.tiktok.clone() {
            publishers.insert(
                Platform::Tiktok,
                Arc::new(PlatformPublisher::Tiktok(TikTokPublisher::new(
                    http.clone(),
                    c,
                ))),
            );
        }

        Self {
            db,
            config: config.scheduler.clone(),
            publishers,
            limiter: Arc::new(Semaphore::new(config.scheduler.max_concurrent_publishes)),
        }
    }

    /// Run one scheduling tick: select and dispatch everything due in
    /// the window `[now + offset, now + offset + length)`.
    ///
    /// Returns the number of publish units dispatched. The units
    /// themselves keep running after this returns.
    pub async fn run_once(&self) -> Result<usize> {
        let window = PostingWindow::ahead_of(
            chrono::Utc::now(),
            self.config.window_offset_hours,
            self.config.window_length_hours,
        );
        debug!(start = %window.start, end = %window.end, "Scheduler tick");

        let mut dispatched = 0;

        for file in self.db.list_upload_files().await? {
            let publisher = match self.publishers.get(&file.platform) {
                Some(p) => Arc::clone(p),
                None => {
                    debug!(platform = %file.platform, "Platform not configured, skipping file");
                    continue;
                }
            };

            let credential = match self
                .db
                .get_active_credential(&file.user, file.platform)
                .await
            {
                Ok(Some(c)) => c,
                Ok(None) => {
                    warn!(user = %file.user, platform = %file.platform,
                        "No authenticated credential, skipping schedule file");
                    continue;
                }
                Err(e) => {
                    warn!(user = %file.user, platform = %file.platform, error = %e,
                        "Failed to load credential, skipping schedule file");
                    continue;
                }
            };

            let items = match select_due_rows(Path::new(&file.file_path), file.platform, &window) {
                Ok(items) => items,
                Err(e) => {
                    warn!(user = %file.user, file = %file.file_path, error = %e,
                        "Failed to read schedule file");
                    continue;
                }
            };

            for item in items {
                match self
                    .db
                    .post_already_dispatched(&item.post_id, file.platform)
                    .await
                {
                    Ok(true) => {
                        debug!(post_id = %item.post_id, "Already dispatched, skipping");
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(post_id = %item.post_id, error = %e,
                            "Failed to check dispatch history, skipping row");
                        continue;
                    }
                }

                let mut record = PostRecord::new(
                    file.user.clone(),
                    item.post_id.clone(),
                    item.post_type,
                    file.platform,
                );
                record.start();
                let id = match self.db.insert_post_record(&record).await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(user = %file.user, post_id = %item.post_id, error = %e,
                            "Failed to record post, skipping row");
                        continue;
                    }
                };
                record.id = Some(id);

                info!(user = %file.user, platform = %file.platform, post_id = %item.post_id,
                    scheduled_at = %item.scheduled_at, "Dispatching publish unit");

                let db = self.db.clone();
                let limiter = Arc::clone(&self.limiter);
                let publisher = Arc::clone(&publisher);
                let credential = credential.clone();
                tokio::spawn(async move {
                    // A closed semaphore only happens at shutdown
                    let _permit = match limiter.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };

                    let finished = publisher
                        .publish(
                            &credential,
                            record,
                            &item.content,
                            item.media_url.as_deref(),
                        )
                        .await;

                    if let Err(e) = db.update_post_record(&finished).await {
                        warn!(post_id = %finished.post_id, error = %e,
                            "Failed to persist publish outcome");
                    }
                });

                dispatched += 1;
            }
        }

        Ok(dispatched)
    }
}
