//! On-disk layout for one request.
//!
//! ```text
//! <raw_root>/<engine>/<token>.<ext>
//! <preprocessed_root>/<engine>/<token>_page_<n>.png
//! <output_root>/<engine>/<token>.md
//! ```
//!
//! Building a layout is pure; [`StorageLayout::ensure_dirs`] is the only
//! part that touches the filesystem.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::storage::naming::FileIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub raw_path: PathBuf,
    pub preprocessed_dir: PathBuf,
    pub output_path: PathBuf,
    token: String,
}

impl StorageLayout {
    /// `engine` must be a registry key, never raw client input.
    pub fn build(identity: &FileIdentity, engine: &str, storage: &StorageConfig) -> Self {
        let raw_dir = Path::new(&storage.raw_path).join(engine);
        let preprocessed_dir = Path::new(&storage.preprocessed_path).join(engine);
        let output_dir = Path::new(&storage.output_path).join(engine);

        Self {
            raw_path: raw_dir.join(identity.storage_name()),
            preprocessed_dir,
            output_path: output_dir.join(format!("{}.md", identity.token)),
            token: identity.token.clone(),
        }
    }

    pub fn page_path(&self, page: usize) -> PathBuf {
        self.preprocessed_dir
            .join(format!("{}_page_{page}.png", self.token))
    }

    fn dirs(&self) -> [&Path; 3] {
        [
            self.raw_path.parent().unwrap_or(Path::new(".")),
            self.preprocessed_dir.as_path(),
            self.output_path.parent().unwrap_or(Path::new(".")),
        ]
    }

    /// Create the three engine directories, owner-only on Unix.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        for dir in self.dirs() {
            create_private_dir(dir).await?;
        }
        Ok(())
    }
}

pub async fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await
}
