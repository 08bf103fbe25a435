//! Server-side file naming.
//!
//! Stored files are named by a random token, never by anything the client
//! sent. The sanitized client name survives only as display metadata.

use uuid::Uuid;

use crate::upload::validator::{extension_of, sanitize_filename};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// 32 lowercase hex chars.
    pub token: String,
    /// Lowercase, may be empty.
    pub extension: String,
    pub display_name: String,
}

impl FileIdentity {
    pub fn generate(original: &str) -> Self {
        let display_name = sanitize_filename(original);
        Self {
            token: Uuid::new_v4().simple().to_string(),
            extension: extension_of(&display_name),
            display_name,
        }
    }

    /// `<token>.<ext>`, or just the token when there is no extension.
    pub fn storage_name(&self) -> String {
        if self.extension.is_empty() {
            self.token.clone()
        } else {
            format!("{}.{}", self.token, self.extension)
        }
    }

    /// Display name with its last extension replaced by `.md`.
    pub fn download_name(&self) -> String {
        let stem = match self.display_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.display_name.as_str(),
        };
        format!("{stem}.md")
    }
}
