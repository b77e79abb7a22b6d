//! File-level metadata exposed through `$file.*`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed metadata the storage collaborator knows about a note file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub path: String,
    pub folder: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub size: u64,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub backlinks: Vec<String>,
}

impl FileMetadata {
    /// Derive name/folder fields from a vault-relative path.
    pub fn for_path(path: &str) -> Self {
        let (folder, file) = match path.rsplit_once('/') {
            Some((folder, file)) => (folder.to_string(), file),
            None => (String::new(), path),
        };
        let name = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
        Self {
            name: name.to_string(),
            path: path.to_string(),
            folder,
            ..Default::default()
        }
    }
}
