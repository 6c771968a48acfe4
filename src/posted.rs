use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_RECORD_FILE: &str = "uploaded_images.txt";

/// Identifiers of images that have already been posted.
pub type PostedSet = HashSet<String>;

/// Append-only record of posted images, one identifier per line.
#[derive(Debug, Clone)]
pub struct PostedSetStore {
    path: PathBuf,
}

impl PostedSetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the posted set. A missing or unreadable file counts as
    /// "nothing posted yet" and never fails the caller.
    pub fn load(&self) -> PostedSet {
        if !self.path.exists() {
            tracing::info!(
                "No record file at {}, starting with an empty posted set",
                self.path.display()
            );
            return PostedSet::new();
        }

        match self.read() {
            Ok(posted) => {
                tracing::info!("Loaded {} previously posted images", posted.len());
                posted
            }
            Err(e) => {
                tracing::warn!("{e}; treating as no prior posts");
                PostedSet::new()
            }
        }
    }

    fn read(&self) -> Result<PostedSet> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| Error::RecordRead {
            path: self.path.clone(),
            source,
        })?;

        Ok(content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Appends one identifier, creating the file if needed.
    pub fn append(&self, id: &str) -> Result<()> {
        if id.contains('\n') || id.contains('\r') {
            return Err(self.write_error(id, "identifier contains a line break".into()));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(id, e.to_string()))?;
        writeln!(file, "{id}").map_err(|e| self.write_error(id, e.to_string()))?;

        tracing::debug!("Recorded posted image: {id}");
        Ok(())
    }

    fn write_error(&self, id: &str, reason: String) -> Error {
        Error::RecordWrite {
            path: self.path.clone(),
            id: id.to_string(),
            reason,
        }
    }
}
