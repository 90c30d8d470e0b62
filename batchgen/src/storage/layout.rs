//! Input and output path conventions.

use std::path::{Path, PathBuf};

use crate::pipeline::GenerationMode;

/// Image extensions tried when resolving frames and ingredients.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Where batches are read from and artifacts are written to.
///
/// - source text: `<input_root>/<batch>.txt`
/// - auxiliary images: `<input_root>/<batch>/`
/// - artifacts: `<output_root>/<batch>/<seq>.<ext>`
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    input_root: PathBuf,
    output_root: PathBuf,
    extension: &'static str,
}

impl ArtifactLayout {
    pub fn new(
        input_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        mode: GenerationMode,
    ) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            extension: mode.artifact_extension(),
        }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.output_root.join(batch_id)
    }

    pub fn artifact_path(&self, batch_id: &str, sequence_number: u32) -> PathBuf {
        self.batch_dir(batch_id)
            .join(format!("{}.{}", sequence_number, self.extension))
    }

    pub fn source_file(&self, batch_id: &str) -> PathBuf {
        self.input_root.join(format!("{}.txt", batch_id))
    }

    pub fn asset_dir(&self, batch_id: &str) -> PathBuf {
        self.input_root.join(batch_id)
    }

    /// Create the output directory of a batch.
    pub async fn ensure_batch_dir(&self, batch_id: &str) -> std::io::Result<PathBuf> {
        let dir = self.batch_dir(batch_id);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = ArtifactLayout::new("prompts", "videos", GenerationMode::TextToVideo);
        assert_eq!(
            layout.artifact_path("story", 4),
            PathBuf::from("videos/story/4.mp4")
        );
        assert_eq!(layout.source_file("story"), PathBuf::from("prompts/story.txt"));
        assert_eq!(layout.asset_dir("story"), PathBuf::from("prompts/story"));
    }

    #[test]
    fn test_image_mode_extension() {
        let layout = ArtifactLayout::new("prompts", "images", GenerationMode::TextToImage);
        assert_eq!(
            layout.artifact_path("cats", 1),
            PathBuf::from("images/cats/1.png")
        );
    }

    #[tokio::test]
    async fn test_ensure_batch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path(), dir.path().join("out"), GenerationMode::TextToVideo);
        let created = layout.ensure_batch_dir("story").await.unwrap();
        assert!(created.is_dir());
    }
}
