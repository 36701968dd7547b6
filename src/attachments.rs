//! Media attachment catalogue
//!
//! Lists the attachments an operator may swap in during approval, and picks
//! a default attachment for a freshly generated draft.

use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::models::{Attachment, AttachmentKind};

/// Source of available media attachments
#[async_trait]
pub trait AttachmentSource: Send + Sync {
    /// Every attachment currently available, in a stable order
    async fn list(&self) -> std::io::Result<Vec<Attachment>>;

    /// Default attachment for a topic
    ///
    /// Picks deterministically from [`list`](Self::list) so the same topic
    /// gets the same media; `None` when the catalogue is empty or unreadable.
    async fn select_for(&self, topic: &str) -> Option<Attachment> {
        let mut available = match self.list().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list attachments");
                return None;
            }
        };
        if available.is_empty() {
            return None;
        }

        let mut hasher = DefaultHasher::new();
        topic.hash(&mut hasher);
        let index = (hasher.finish() % available.len() as u64) as usize;
        Some(available.swap_remove(index))
    }
}

/// Attachments stored as files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryAttachments {
    dir: PathBuf,
}

impl DirectoryAttachments {
    /// Catalogue over `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being listed
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl AttachmentSource for DirectoryAttachments {
    async fn list(&self) -> std::io::Result<Vec<Attachment>> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut attachments = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(kind) = AttachmentKind::from_path(&path) else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            attachments.push(Attachment::new(
                name,
                path.to_string_lossy().into_owned(),
                kind,
            ));
        }

        attachments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[tokio::test]
    async fn test_lists_media_files_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.png");
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "notes.txt");
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let source = DirectoryAttachments::new(dir.path());
        let list = source.list().await.unwrap();

        let names: Vec<_> = list.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.png"]);
        assert_eq!(list[0].kind, AttachmentKind::Video);
        assert_eq!(list[1].kind, AttachmentKind::Image);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let source = DirectoryAttachments::new(dir.path().join("nope"));
        assert!(source.list().await.unwrap().is_empty());
        assert!(source.select_for("topic").await.is_none());
    }

    #[tokio::test]
    async fn test_select_is_stable_per_topic() {
        let dir = TempDir::new().unwrap();
        for name in ["1.png", "2.png", "3.png"] {
            touch(dir.path(), name);
        }
        let source = DirectoryAttachments::new(dir.path());

        let first = source.select_for("rust").await.unwrap();
        let again = source.select_for("rust").await.unwrap();
        assert_eq!(first, again);
    }
}
