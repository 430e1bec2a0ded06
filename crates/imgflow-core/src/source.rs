//! Local file source: finds images on disk and turns them into input records.

use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::InputConfig;
use crate::record::InputRecord;

/// Discovers image files and loads them as [`InputRecord`]s.
pub struct FileSource {
    config: InputConfig,
}

/// A discovered image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Record id, sequential in discovery order
    pub id: u32,
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Name of the parent directory, used as the label
    pub label: String,
}

impl FileSource {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    /// Discover supported files at `path`, shuffling with the thread RNG.
    pub fn discover(&self, path: &Path) -> Vec<SourceFile> {
        self.discover_with_rng(path, &mut rand::thread_rng())
    }

    /// Discover supported files at `path`.
    ///
    /// Files are sorted by path, reduced to partition `part_id` of
    /// `part_num` (round-robin), optionally shuffled, then numbered.
    pub fn discover_with_rng<R: Rng + ?Sized>(&self, path: &Path, rng: &mut R) -> Vec<SourceFile> {
        let max_size = self.config.max_file_size_mb * 1024 * 1024;
        let mut found: Vec<(PathBuf, u64)> = Vec::new();

        if path.is_file() {
            if self.is_supported(path) {
                if let Ok(meta) = std::fs::metadata(path) {
                    found.push((path.to_path_buf(), meta.len()));
                }
            }
        } else {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file() && self.is_supported(entry_path) {
                    if let Ok(meta) = entry.metadata() {
                        found.push((entry_path.to_path_buf(), meta.len()));
                    }
                }
            }
        }

        found.retain(|(path, size)| {
            if *size > max_size {
                tracing::warn!(
                    "Skipping {:?}: {} bytes exceeds {} MB limit",
                    path,
                    size,
                    self.config.max_file_size_mb
                );
                false
            } else {
                true
            }
        });

        // Sort by path for deterministic partitioning
        found.sort_by(|a, b| a.0.cmp(&b.0));
        let total = found.len();
        let mut found = partition(found, self.config.part_id, self.config.part_num);
        if self.config.shuffle {
            found.shuffle(rng);
        }
        tracing::debug!(
            "Discovered {} files under {:?}, {} in partition {}/{}",
            total,
            path,
            found.len(),
            self.config.part_id,
            self.config.part_num
        );

        found
            .into_iter()
            .enumerate()
            .map(|(id, (path, size))| SourceFile {
                id: id as u32,
                label: label_for(&path),
                path,
                size,
            })
            .collect()
    }

    /// Check if a file has a supported extension.
    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext_lower = ext.to_lowercase();
                self.config
                    .extensions
                    .iter()
                    .any(|e| e.to_lowercase() == ext_lower)
            })
            .unwrap_or(false)
    }

    /// Read a discovered file into a record.
    pub fn load(file: &SourceFile) -> std::io::Result<InputRecord> {
        let data = std::fs::read(&file.path)?;
        Ok(InputRecord::new(file.id, data, file.label.as_bytes()))
    }

    /// Get total size of all discovered files.
    pub fn total_size(files: &[SourceFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

/// Keep every `part_num`-th item starting at `part_id`.
pub fn partition<T>(items: Vec<T>, part_id: usize, part_num: usize) -> Vec<T> {
    if part_num <= 1 {
        return items;
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % part_num == part_id)
        .map(|(_, item)| item)
        .collect()
}

fn label_for(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
