//! Batch loading from a prompts directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::prompts::{extract_asset_directive, parse_prompts};
use crate::Result;
use crate::pipeline::{GenerationMode, JobDescriptor};

/// Jobs loaded from every batch file, plus per-batch job counts.
#[derive(Debug, Default)]
pub struct LoadedBatches {
    pub jobs: Vec<JobDescriptor>,
    /// Batch id to job count, including empty batches.
    pub totals: BTreeMap<String, u32>,
}

impl LoadedBatches {
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn batch_count(&self) -> usize {
        self.totals.len()
    }
}

/// Whether `path` names a batch file (`*.txt`, not a fail or success log).
fn is_batch_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".txt") && !name.contains("fail") && !name.contains("success")
}

async fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_batch_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Turn one batch file's text into jobs.
pub fn jobs_from_text(batch_id: &str, content: &str, mode: GenerationMode) -> Vec<JobDescriptor> {
    parse_prompts(content)
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let sequence_number = index as u32 + 1;
            if mode == GenerationMode::IngredientsToVideo {
                let directive = extract_asset_directive(&text);
                if !directive.asset_names.is_empty() {
                    debug!(
                        batch_id = %batch_id,
                        sequence_number,
                        assets = ?directive.asset_names,
                        "Parsed asset directive"
                    );
                    return JobDescriptor::new(batch_id, sequence_number, directive.text, mode)
                        .with_asset_names(directive.asset_names);
                }
            }
            JobDescriptor::new(batch_id, sequence_number, text, mode)
        })
        .collect()
}

/// Load every batch file in `dir`, in file name order.
///
/// A missing directory is created and yields no batches.
pub async fn load_batches(dir: &Path, mode: GenerationMode) -> Result<LoadedBatches> {
    if !tokio::fs::try_exists(dir).await? {
        warn!(dir = %dir.display(), "Prompts directory missing; creating it");
        tokio::fs::create_dir_all(dir).await?;
        return Ok(LoadedBatches::default());
    }

    let mut loaded = LoadedBatches::default();
    for path in list_batch_files(dir).await? {
        let Some(batch_id) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "Skipping batch file with non UTF-8 name");
            continue;
        };
        let content = tokio::fs::read_to_string(&path).await?;
        let jobs = jobs_from_text(batch_id, &content, mode);

        info!(batch_id = %batch_id, prompts = jobs.len(), "Loaded batch");
        loaded.totals.insert(batch_id.to_string(), jobs.len() as u32);
        loaded.jobs.extend(jobs);
    }

    info!(
        batches = loaded.batch_count(),
        jobs = loaded.job_count(),
        "Finished loading prompts"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loads_sorted_batches() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b_story.txt"), "1. one\n2. two\n").await.unwrap();
        tokio::fs::write(dir.path().join("a_story.txt"), "single prompt").await.unwrap();
        tokio::fs::write(dir.path().join("prompts_fail.txt"), "1. ignored").await.unwrap();
        tokio::fs::write(dir.path().join("notes.md"), "1. ignored").await.unwrap();

        let loaded = load_batches(dir.path(), GenerationMode::TextToVideo).await.unwrap();

        assert_eq!(loaded.batch_count(), 2);
        assert_eq!(loaded.job_count(), 3);
        assert_eq!(loaded.jobs[0].batch_id, "a_story");
        assert_eq!(loaded.jobs[1].batch_id, "b_story");
        assert_eq!(loaded.jobs[2].sequence_number, 2);
        assert_eq!(loaded.totals["b_story"], 2);
    }

    #[tokio::test]
    async fn test_missing_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts");
        let loaded = load_batches(&prompts, GenerationMode::TextToVideo).await.unwrap();
        assert_eq!(loaded.job_count(), 0);
        assert!(prompts.is_dir());
    }

    #[test]
    fn test_asset_directive_only_in_ingredients_mode() {
        let text = "1. A duel\nimages: a.png b.png\n2. A feast\n";
        // Numbered lists join lines, so use block format for the directive.
        let blocks = "A duel\nimages: a.png b.png\n\nA feast";

        let plain = jobs_from_text("s", blocks, GenerationMode::TextToVideo);
        assert!(plain[0].payload.asset_names.is_empty());

        let ingredients = jobs_from_text("s", blocks, GenerationMode::IngredientsToVideo);
        assert_eq!(ingredients[0].payload.asset_names, vec!["a.png", "b.png"]);
        assert_eq!(ingredients[0].payload.prompt, "A duel");
        assert!(ingredients[1].payload.asset_names.is_empty());

        assert_eq!(jobs_from_text("s", text, GenerationMode::TextToVideo).len(), 2);
    }
}
