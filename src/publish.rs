use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// A fragment ready for the publishing sink.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub slug: String,
    pub title: String,
    pub tags: Vec<String>,
    pub draft: bool,
    pub html: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, post: &Post) -> Result<()>;
}

/// Writes each post to `{dir}/{slug}.json` for a downstream uploader.
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryPublisher { dir: dir.into() }
    }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(&self, post: &Post) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(format!("{}.json", post.slug));
        let json = serde_json::to_string_pretty(post)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Published {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_post_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path().join("posts"));
        let post = Post {
            slug: "101".into(),
            title: "Cutie Pizza 30cm".into(),
            tags: vec!["seo".into()],
            draft: true,
            html: "<p>x</p>".into(),
        };
        publisher.publish(&post).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("posts/101.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["title"], "Cutie Pizza 30cm");
        assert_eq!(value["draft"], true);
        assert_eq!(value["html"], "<p>x</p>");
        assert_eq!(value["tags"][0], "seo");
    }
}
