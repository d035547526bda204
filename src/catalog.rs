use crate::error::FatalError;
use crate::types::{SOURCE_EXT, TestCase};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const GOOD_DIR: &str = "good";
const BAD_DIR: &str = "bad";
const EXTENSIONS_DIR: &str = "extensions";

/// Source files directly inside `dir`, in lexical order, without their extension.
fn list_sources(dir: &Path) -> Result<Vec<PathBuf>, FatalError> {
    if !dir.is_dir() {
        return Err(FatalError::MissingCorpus(dir.to_path_buf()));
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            FatalError::io(format!("listing {}", dir.display()), e.into())
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().is_some_and(|ext| ext == SOURCE_EXT) {
            out.push(path.with_extension(""));
        }
    }
    Ok(out)
}

fn push_dir(cases: &mut Vec<TestCase>, dir: &Path, expected_good: bool) -> Result<(), FatalError> {
    for base in list_sources(dir)? {
        cases.push(TestCase::new(base.to_string_lossy(), expected_good));
    }
    Ok(())
}

/// Names of the extension test directories under `root`, sorted.
pub fn available_extensions(root: &Path) -> Result<Vec<String>, FatalError> {
    let dir = root.join(EXTENSIONS_DIR);
    if !dir.is_dir() {
        return Err(FatalError::MissingCorpus(dir));
    }
    let mut names = Vec::new();
    for entry in WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            FatalError::io(format!("listing {}", dir.display()), e.into())
        })?;
        if entry.file_type().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Checks the requested extensions against the corpus, returning them without duplicates.
pub fn validate_extensions(root: &Path, requested: &[String]) -> Result<Vec<String>, FatalError> {
    let wanted: IndexSet<&String> = requested.iter().collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let available = available_extensions(root)?;
    wanted
        .into_iter()
        .map(|ext| {
            if available.contains(ext) {
                Ok(ext.clone())
            } else {
                Err(FatalError::UnknownExtension(ext.clone()))
            }
        })
        .collect()
}

/// Discovers every test case of the corpus rooted at `root`.
///
/// The order is good, bad, then per extension its directory followed by its `bad`
/// subdirectory when present. Files inside a directory are sorted by name, so two
/// runs over the same corpus see the same sequence.
pub fn discover(root: &Path, extensions: &[String]) -> Result<Vec<TestCase>, FatalError> {
    let extensions = validate_extensions(root, extensions)?;
    let mut cases = Vec::new();
    push_dir(&mut cases, &root.join(GOOD_DIR), true)?;
    push_dir(&mut cases, &root.join(BAD_DIR), false)?;
    for ext in &extensions {
        let dir = root.join(EXTENSIONS_DIR).join(ext);
        push_dir(&mut cases, &dir, true)?;
        let bad = dir.join(BAD_DIR);
        if bad.is_dir() {
            push_dir(&mut cases, &bad, false)?;
        }
    }
    Ok(cases)
}
