//! Source enumeration and build units
//!
//! Enumerating translation units is an injected capability so the
//! orchestrator never couples to a concrete filesystem; the default
//! implementation walks the workspace with `walkdir`.

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::resolve::ResolvedTarget;
use crate::{Error, Result};

/// One source file scheduled for compilation within a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUnit {
    /// Owning target name
    pub target: String,
    /// Workspace-relative source path
    pub source: Utf8PathBuf,
    /// Workspace-relative object file path
    pub object: Utf8PathBuf,
}

/// Capability for listing source files under a directory
pub trait SourceEnumerator: Send + Sync {
    /// Return all files under `dir` with the given extension, ordered
    fn enumerate(&self, dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>>;
}

/// Filesystem-backed enumerator
pub struct FsEnumerator {
    root: Utf8PathBuf,
}

impl FsEnumerator {
    /// Create an enumerator rooted at the workspace directory
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceEnumerator for FsEnumerator {
    fn enumerate(&self, dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>> {
        let abs_dir = self.root.join(dir);
        if !abs_dir.exists() {
            return Err(Error::manifest(
                format!("source_dir does not exist: {}", dir),
                "Check the source_dirs entries in the manifest",
            ));
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(&abs_dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                Error::manifest(
                    format!("Failed to read directory entry under {}: {}", dir, e),
                    "Check directory permissions",
                )
            })?;

            if !entry.path().is_file() {
                continue;
            }
            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                Error::manifest(
                    format!("Path is not valid UTF-8: {:?}", entry.path()),
                    "Ensure all source paths are valid UTF-8",
                )
            })?;

            if path.extension() == Some(extension) {
                // Report paths relative to the workspace root
                let relative = path.strip_prefix(&self.root).unwrap_or(path);
                sources.push(relative.to_path_buf());
            }
        }

        sources.sort();
        Ok(sources)
    }
}

/// Enumerate the build units of a target, main entry point first
///
/// Units are recreated on every resolution pass; only the incremental
/// cache persists across runs.
pub fn enumerate_units(
    target: &ResolvedTarget,
    source_extension: &str,
    build_dir: &Utf8Path,
    enumerator: &dyn SourceEnumerator,
) -> Result<Vec<BuildUnit>> {
    let mut sources: Vec<Utf8PathBuf> = Vec::new();

    if let Some(main) = &target.main {
        sources.push(Utf8PathBuf::from(format!("{}.{}", main, source_extension)));
    }

    for dir in &target.source_dirs {
        for source in enumerator.enumerate(Utf8Path::new(dir), source_extension)? {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
    }

    Ok(sources
        .into_iter()
        .map(|source| {
            let object = build_dir
                .join("obj")
                .join(&target.name)
                .join(source.with_extension("o"));
            BuildUnit {
                target: target.name.clone(),
                source,
                object,
            }
        })
        .collect())
}

/// Enumerate the header files under a target's source directories
///
/// Headers are not compiled; their content feeds the unit fingerprint so
/// a header edit invalidates the whole target.
pub fn enumerate_headers(
    target: &ResolvedTarget,
    header_extension: &str,
    enumerator: &dyn SourceEnumerator,
) -> Result<Vec<Utf8PathBuf>> {
    let mut headers: Vec<Utf8PathBuf> = Vec::new();
    for dir in &target.source_dirs {
        for header in enumerator.enumerate(Utf8Path::new(dir), header_extension)? {
            if !headers.contains(&header) {
                headers.push(header);
            }
        }
    }
    Ok(headers)
}
