use crate::caption::CaptionLimit;
use crate::error::PublishError;
use std::path::Path;

/// The account a publisher is logged in as.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
}

/// A successfully published image.
#[derive(Debug, Clone)]
pub struct Published {
    pub post_id: String,
    pub url: String,
}

/// Somewhere images can be posted with a caption.
pub trait Publisher {
    /// Checks credentials. Must succeed before any call to [`Publisher::publish`].
    async fn login(&mut self) -> Result<Account, PublishError>;

    async fn publish(&self, image: &Path, caption: &str) -> Result<Published, PublishError>;

    /// Longest caption the platform accepts.
    fn caption_limit(&self) -> CaptionLimit;
}
