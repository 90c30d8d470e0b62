//! Filesystem preconditions evaluated by the queue on dequeue.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::layout::{ArtifactLayout, IMAGE_EXTENSIONS};
use crate::Result;
use crate::pipeline::{GenerationMode, JobDescriptor, Preconditions, Readiness, SkipReason};

/// Skips finished jobs and resolves auxiliary images on disk.
pub struct FsPreconditions {
    layout: ArtifactLayout,
    overwrite_existing: bool,
}

impl FsPreconditions {
    pub fn new(layout: ArtifactLayout, overwrite_existing: bool) -> Self {
        Self {
            layout,
            overwrite_existing,
        }
    }

    /// `<asset_dir>/<seq>.<ext>` for the first image extension present.
    fn find_indexed_image(&self, job: &JobDescriptor) -> Result<Option<PathBuf>> {
        let base = self.layout.asset_dir(&job.batch_id);
        for ext in IMAGE_EXTENSIONS {
            let candidate = base.join(format!("{}.{}", job.sequence_number, ext));
            if candidate.try_exists()? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Resolve a named image, trying the known extensions when `name` has none.
    fn find_named_image(&self, batch_id: &str, name: &str) -> Result<Option<PathBuf>> {
        let base = self.layout.asset_dir(batch_id);
        let direct = base.join(name);
        if direct.try_exists()? {
            return Ok(Some(direct));
        }

        if Path::new(name).extension().is_none() {
            for ext in IMAGE_EXTENSIONS {
                let candidate = base.join(format!("{}.{}", name, ext));
                if candidate.try_exists()? {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }
}

impl Preconditions for FsPreconditions {
    fn check(&self, job: &JobDescriptor) -> Result<Readiness> {
        if !self.overwrite_existing {
            let artifact = self
                .layout
                .artifact_path(&job.batch_id, job.sequence_number);
            if artifact.try_exists()? {
                return Ok(Readiness::Skip(SkipReason::ArtifactExists(artifact)));
            }
        }

        match job.payload.effective_mode {
            GenerationMode::FramesToVideo => match self.find_indexed_image(job)? {
                Some(frame) => Ok(Readiness::Ready {
                    resolved_assets: vec![frame],
                    effective_mode: GenerationMode::FramesToVideo,
                }),
                None => Ok(Readiness::Skip(SkipReason::MissingAsset(format!(
                    "{}.{{{}}}",
                    job.sequence_number,
                    IMAGE_EXTENSIONS.join(",")
                )))),
            },
            GenerationMode::IngredientsToVideo => {
                if job.payload.asset_names.is_empty() {
                    debug!(job = %job.key(), "No images listed; falling back to text to video");
                    return Ok(Readiness::Ready {
                        resolved_assets: Vec::new(),
                        effective_mode: GenerationMode::TextToVideo,
                    });
                }

                let mut resolved = Vec::with_capacity(job.payload.asset_names.len());
                for name in &job.payload.asset_names {
                    match self.find_named_image(&job.batch_id, name)? {
                        Some(path) => resolved.push(path),
                        None => return Ok(Readiness::Skip(SkipReason::MissingAsset(name.clone()))),
                    }
                }
                Ok(Readiness::Ready {
                    resolved_assets: resolved,
                    effective_mode: GenerationMode::IngredientsToVideo,
                })
            }
            mode @ (GenerationMode::TextToVideo | GenerationMode::TextToImage) => {
                Ok(Readiness::Ready {
                    resolved_assets: Vec::new(),
                    effective_mode: mode,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        layout: ArtifactLayout,
    }

    fn fixture(mode: GenerationMode) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(dir.path().join("prompts"), dir.path().join("out"), mode);
        fs::create_dir_all(layout.asset_dir("story")).unwrap();
        fs::create_dir_all(layout.batch_dir("story")).unwrap();
        Fixture { _dir: dir, layout }
    }

    #[test]
    fn test_existing_artifact_skipped_without_overwrite() {
        let fx = fixture(GenerationMode::TextToVideo);
        fs::write(fx.layout.artifact_path("story", 1), b"done").unwrap();
        let job = JobDescriptor::new("story", 1, "p", GenerationMode::TextToVideo);

        let keep = FsPreconditions::new(fx.layout.clone(), false);
        assert!(matches!(
            keep.check(&job).unwrap(),
            Readiness::Skip(SkipReason::ArtifactExists(_))
        ));

        let overwrite = FsPreconditions::new(fx.layout.clone(), true);
        assert!(matches!(overwrite.check(&job).unwrap(), Readiness::Ready { .. }));
    }

    #[test]
    fn test_frames_resolve_indexed_image() {
        let fx = fixture(GenerationMode::FramesToVideo);
        let frame = fx.layout.asset_dir("story").join("2.jpeg");
        fs::write(&frame, b"img").unwrap();
        let pre = FsPreconditions::new(fx.layout.clone(), true);

        let ready = pre
            .check(&JobDescriptor::new("story", 2, "p", GenerationMode::FramesToVideo))
            .unwrap();
        assert_eq!(
            ready,
            Readiness::Ready {
                resolved_assets: vec![frame],
                effective_mode: GenerationMode::FramesToVideo,
            }
        );

        let missing = pre
            .check(&JobDescriptor::new("story", 3, "p", GenerationMode::FramesToVideo))
            .unwrap();
        assert!(matches!(missing, Readiness::Skip(SkipReason::MissingAsset(_))));
    }

    #[test]
    fn test_ingredients_resolution_and_fallback() {
        let fx = fixture(GenerationMode::IngredientsToVideo);
        fs::write(fx.layout.asset_dir("story").join("hero.png"), b"img").unwrap();
        fs::write(fx.layout.asset_dir("story").join("castle.webp"), b"img").unwrap();
        let pre = FsPreconditions::new(fx.layout.clone(), true);

        let job = JobDescriptor::new("story", 1, "p", GenerationMode::IngredientsToVideo)
            .with_asset_names(vec!["hero.png".into(), "castle".into()]);
        match pre.check(&job).unwrap() {
            Readiness::Ready {
                resolved_assets,
                effective_mode,
            } => {
                assert_eq!(resolved_assets.len(), 2);
                assert!(resolved_assets[1].ends_with("castle.webp"));
                assert_eq!(effective_mode, GenerationMode::IngredientsToVideo);
            }
            other => panic!("unexpected {:?}", other),
        }

        let missing = JobDescriptor::new("story", 2, "p", GenerationMode::IngredientsToVideo)
            .with_asset_names(vec!["dragon".into()]);
        assert_eq!(
            pre.check(&missing).unwrap(),
            Readiness::Skip(SkipReason::MissingAsset("dragon".into()))
        );

        let bare = JobDescriptor::new("story", 3, "p", GenerationMode::IngredientsToVideo);
        assert_eq!(
            pre.check(&bare).unwrap(),
            Readiness::Ready {
                resolved_assets: Vec::new(),
                effective_mode: GenerationMode::TextToVideo,
            }
        );
    }
}
