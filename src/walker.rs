use std::path::{Path, PathBuf};

use crate::{error::Result, extract::ExtractorRegistry};

/// Expand a list of files and directories into the documents to ingest.
///
/// Files are taken as given, whatever their extension, so an unsupported
/// file shows up as a failed document rather than vanishing. Directories
/// are walked recursively for supported documents. Duplicates are dropped
/// and the first occurrence wins.
pub fn collect_documents(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            documents.extend(discover_files(input)?);
        } else {
            documents.push(input.clone());
        }
    }

    let mut seen = std::collections::HashSet::new();
    documents.retain(|path| seen.insert(path.clone()));
    Ok(documents)
}

/// Recursively walk a directory and discover supported documents.
///
/// Skips hidden files/directories (names starting with `.`) and returns
/// absolute paths sorted so ingestion order is stable across runs.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(current: &Path, results: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();

        // Skip hidden files and directories.
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        let path = entry.path();

        if file_type.is_dir() {
            walk_dir(&path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue; // broken symlink
            };
            // Directory links are not followed, so cycles are impossible.
            if resolved.is_file() && ExtractorRegistry::supports(&path) {
                results.push(path);
            }
        } else if file_type.is_file() && ExtractorRegistry::supports(&path) {
            results.push(path);
        }
    }

    Ok(())
}
