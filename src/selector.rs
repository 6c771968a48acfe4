use crate::error::{Error, Result};
use crate::posted::PostedSet;
use rand::Rng;
use std::path::{Component, Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// An image file eligible for posting. Its identifier is the path string
/// stored in the record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    id: String,
}

impl ImageCandidate {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.id)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

/// Prefix for record identifiers: `dir` without `.` components, so `.`
/// yields bare file names and `./pics/` yields `pics/<name>`.
fn id_prefix(dir: &Path) -> PathBuf {
    dir.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Lists image files directly inside `dir`, in filesystem order.
pub fn list_candidates(dir: &Path) -> Result<Vec<ImageCandidate>> {
    let list_err = |source| Error::ListImages {
        dir: dir.to_path_buf(),
        source,
    };

    let prefix = id_prefix(dir);
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(list_err)? {
        let entry = entry.map_err(list_err)?;
        if !entry.path().is_file() {
            continue;
        }
        let path: PathBuf = prefix.join(entry.file_name());
        if !has_image_extension(&path) {
            continue;
        }

        match path.to_str() {
            Some(id) if !id.contains(['\n', '\r']) => candidates.push(ImageCandidate {
                id: id.to_string(),
            }),
            _ => tracing::warn!(
                "Skipping {}: name cannot be stored in the record file",
                path.display()
            ),
        }
    }
    Ok(candidates)
}

/// Draws up to `count` unposted candidates uniformly at random, without
/// replacement.
pub fn select<R: Rng + ?Sized>(
    candidates: &[ImageCandidate],
    posted: &PostedSet,
    count: usize,
    rng: &mut R,
) -> Vec<ImageCandidate> {
    let available: Vec<&ImageCandidate> = candidates
        .iter()
        .filter(|c| !posted.contains(c.id()))
        .collect();

    tracing::info!(
        "Found {} total images, {} available",
        candidates.len(),
        available.len()
    );

    let amount = count.min(available.len());
    if amount == 0 {
        return Vec::new();
    }

    rand::seq::index::sample(rng, available.len(), amount)
        .into_iter()
        .map(|i| available[i].clone())
        .collect()
}
