//! Candidate test file enumeration.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use super::error::AdapterError;

/// Lists files under `root` matching any of `patterns`, never descending
/// into a directory named in `excluded_dirs`. Sorted for stable tree order.
pub fn collect_test_files(
    root: &Path,
    patterns: &[String],
    excluded_dirs: &[String],
) -> Result<Vec<PathBuf>, AdapterError> {
    let mut overrides = OverrideBuilder::new(root);
    for pattern in patterns {
        overrides.add(pattern)?;
    }
    let overrides = overrides.build()?;

    let excluded: Vec<String> = excluded_dirs.to_vec();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .overrides(overrides)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !excluded.iter().any(|d| d.as_str() == name)
        })
        .build();

    let mut files: Vec<PathBuf> = walker
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    Ok(files)
}
