//! One upload run: log in, pick unposted images, then caption, publish and
//! record each of them in turn.

use crate::caption::{Captioner, generate_caption, preview};
use crate::error::{Error, Result};
use crate::posted::PostedSetStore;
use crate::publish::Publisher;
use crate::selector::{ImageCandidate, list_candidates, select};
use rand::Rng;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub image_dir: PathBuf,
    pub batch_size: usize,
    /// Pause between successful posts, in seconds.
    pub delay_secs: RangeInclusive<f64>,
}

/// What happened to one selected image.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Published {
        id: String,
        url: String,
        /// False when publishing worked but the record file could not be
        /// written; the image may be posted again on a later run.
        recorded: bool,
    },
    Skipped {
        id: String,
        reason: String,
    },
}

impl ItemOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, ItemOutcome::Published { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionReport {
    NothingToDo,
    Completed { outcomes: Vec<ItemOutcome> },
}

pub struct UploadSession<C, P, R> {
    captioner: C,
    publisher: P,
    store: PostedSetStore,
    settings: SessionSettings,
    rng: R,
}

impl<C: Captioner, P: Publisher, R: Rng> UploadSession<C, P, R> {
    pub fn new(
        captioner: C,
        publisher: P,
        store: PostedSetStore,
        settings: SessionSettings,
        rng: R,
    ) -> Self {
        Self {
            captioner,
            publisher,
            store,
            settings,
            rng,
        }
    }

    /// Runs the session to completion. Only a failed login or an unreadable
    /// image directory end it early with an error.
    pub async fn run(&mut self) -> Result<SessionReport> {
        let account = self
            .publisher
            .login()
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        tracing::info!("Logged in as @{} (id {})", account.username, account.id);

        let mut posted = self.store.load();
        let candidates = list_candidates(&self.settings.image_dir)?;
        let batch = select(&candidates, &posted, self.settings.batch_size, &mut self.rng);
        if batch.is_empty() {
            tracing::info!("No images available for upload");
            return Ok(SessionReport::NothingToDo);
        }
        tracing::info!(
            "Selected for upload: {:?}",
            batch.iter().map(ImageCandidate::id).collect::<Vec<_>>()
        );

        let mut outcomes = Vec::with_capacity(batch.len());
        for (i, image) in batch.iter().enumerate() {
            let outcome = self.process(image).await;
            if let ItemOutcome::Published { id, .. } = &outcome {
                posted.insert(id.clone());
            }

            let pause = outcome.is_published() && i + 1 < batch.len();
            outcomes.push(outcome);
            if pause {
                self.pause().await;
            }
        }

        let published = outcomes.iter().filter(|o| o.is_published()).count();
        tracing::info!(
            "Upload session completed: {published} of {} images published, {} recorded in total",
            outcomes.len(),
            posted.len()
        );
        Ok(SessionReport::Completed { outcomes })
    }

    async fn process(&self, image: &ImageCandidate) -> ItemOutcome {
        let id = image.id().to_string();
        tracing::info!("Generating caption for {id}");
        let caption =
            generate_caption(&self.captioner, image.path(), self.publisher.caption_limit()).await;

        tracing::info!("Uploading {id} with caption: {}", preview(&caption, 100));
        match self.publisher.publish(image.path(), &caption).await {
            Ok(published) => {
                tracing::info!(
                    "Successfully uploaded {id} as post {}: {}",
                    published.post_id,
                    published.url
                );
                let recorded = match self.store.append(&id) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("{e}");
                        false
                    }
                };
                ItemOutcome::Published {
                    id,
                    url: published.url,
                    recorded,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to upload {id}: {e}");
                ItemOutcome::Skipped {
                    id,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn pause(&mut self) {
        let (min, max) = (*self.settings.delay_secs.start(), *self.settings.delay_secs.end());
        let secs = if max > min {
            self.rng.gen_range(min..=max)
        } else {
            min
        };
        tracing::info!("Waiting {secs:.1}s before the next upload");
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}
