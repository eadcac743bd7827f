//! Incremental build cache using Blake3 hashes
//!
//! Persists a content signature and flag fingerprint per source file and
//! a link fingerprint per artifact. Entries are written back as units
//! succeed; failed units never refresh their entry, so they retry on the
//! next run.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

use crate::resolve::ResolvedTarget;
use crate::{Error, Result};

/// Cached record of one successfully compiled translation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Blake3 hash of the source file content
    pub content_hash: String,
    /// Fingerprint of the compiler invocation that produced the object
    pub flag_fingerprint: String,
    /// Time of the last successful compile
    pub timestamp: DateTime<Utc>,
}

/// Cached record of one successfully linked artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Fingerprint of the link inputs (objects, libraries, options)
    pub link_fingerprint: String,
    /// Time of the last successful link
    pub timestamp: DateTime<Utc>,
}

/// On-disk cache state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheState {
    #[serde(default)]
    pub units: HashMap<String, UnitEntry>,
    #[serde(default)]
    pub artifacts: HashMap<String, ArtifactEntry>,
}

/// Manages the incremental cache for one workspace
#[derive(Debug)]
pub struct CacheManager {
    cache_file: Utf8PathBuf,
    state: CacheState,
}

impl CacheManager {
    /// Load the cache from the state directory (missing file is an empty cache)
    pub fn load(state_dir: &Utf8Path) -> Result<Self> {
        let cache_file = state_dir.join("cache.json");
        let state = if cache_file.exists() {
            let content = std::fs::read_to_string(&cache_file)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::cache(
                    format!("Failed to parse {}: {}", cache_file, e),
                    "The cache file may be corrupted. Try deleting it.",
                )
            })?
        } else {
            CacheState::default()
        };

        Ok(Self { cache_file, state })
    }

    /// Immutable snapshot of the current state, for staleness analysis
    pub fn snapshot(&self) -> CacheState {
        self.state.clone()
    }

    /// Look up a unit entry by source path
    pub fn unit(&self, source: &Utf8Path) -> Option<&UnitEntry> {
        self.state.units.get(source.as_str())
    }

    /// Look up an artifact entry by artifact path
    pub fn artifact(&self, path: &Utf8Path) -> Option<&ArtifactEntry> {
        self.state.artifacts.get(path.as_str())
    }

    /// Record a successful compile and flush the cache file
    pub fn record_unit(
        &mut self,
        source: &Utf8Path,
        content_hash: String,
        flag_fingerprint: String,
    ) -> Result<()> {
        self.state.units.insert(
            source.as_str().to_string(),
            UnitEntry {
                content_hash,
                flag_fingerprint,
                timestamp: Utc::now(),
            },
        );
        self.flush()
    }

    /// Record a successful link and flush the cache file
    pub fn record_artifact(&mut self, path: &Utf8Path, link_fingerprint: String) -> Result<()> {
        self.state.artifacts.insert(
            path.as_str().to_string(),
            ArtifactEntry {
                link_fingerprint,
                timestamp: Utc::now(),
            },
        );
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.state).map_err(|e| {
            Error::cache(
                format!("Failed to serialize cache: {}", e),
                "This is likely a bug in ccbuild",
            )
        })?;
        std::fs::write(&self.cache_file, content)?;
        Ok(())
    }
}

/// Blake3 hash of a file's content
pub fn content_signature(path: &Utf8Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut file = std::fs::File::open(path)?;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint of everything that affects every compile of a target
///
/// Field groups are order-normalized (sorted) before hashing so that
/// reordering equivalent flags does not force a rebuild, while any
/// addition, removal, or change invalidates every unit of the target.
pub fn flag_fingerprint(target: &ResolvedTarget, source_extension: &str) -> String {
    let mut hasher = blake3::Hasher::new();

    for group in [
        &target.defines,
        &target.include_dirs,
        &target.compiler_options,
        &target.pkg_config,
    ] {
        let mut normalized = group.clone();
        normalized.sort();
        for entry in &normalized {
            hasher.update(entry.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x1f");
    }

    hasher.update(if target.debug { b"debug" } else { b"release" });
    hasher.update(source_extension.as_bytes());

    hasher.finalize().to_hex().to_string()
}

/// Fingerprint stored per unit entry: compile flags plus visible headers
///
/// Header changes cannot be attributed to individual units without
/// include scanning, so the header signature folds into the flag
/// fingerprint and invalidates the whole target.
pub fn unit_fingerprint(
    root: &Utf8Path,
    target: &ResolvedTarget,
    source_extension: &str,
    headers: &[Utf8PathBuf],
) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(flag_fingerprint(target, source_extension).as_bytes());
    for header in headers {
        hasher.update(header.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(content_signature(&root.join(header))?.as_bytes());
        hasher.update(b"\0");
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Fingerprint of everything that affects a target's link step
pub fn link_fingerprint(target: &ResolvedTarget, objects: &[Utf8PathBuf]) -> String {
    let mut hasher = blake3::Hasher::new();

    for object in objects {
        hasher.update(object.as_str().as_bytes());
        hasher.update(b"\0");
    }
    // Link inputs are order-significant; hash them as declared
    for group in [
        &target.library_dirs,
        &target.libraries,
        &target.internal_static_library_paths,
        &target.linker_options,
    ] {
        for entry in group.iter() {
            hasher.update(entry.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\x1f");
    }

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TargetKind;
    use std::fs;
    use tempfile::TempDir;

    fn target(compiler_options: &[&str], defines: &[&str]) -> ResolvedTarget {
        ResolvedTarget {
            name: "t".to_string(),
            kind: TargetKind::StaticLibrary,
            main: None,
            debug: false,
            defines: defines.iter().map(|s| s.to_string()).collect(),
            source_dirs: Vec::new(),
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
            libraries: Vec::new(),
            internal_static_library_paths: Vec::new(),
            library_import_paths: Vec::new(),
            pkg_config: Vec::new(),
            compiler_options: compiler_options.iter().map(|s| s.to_string()).collect(),
            linker_options: Vec::new(),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let state_dir = Utf8Path::from_path(temp.path()).unwrap();

        let mut manager = CacheManager::load(state_dir).unwrap();
        manager
            .record_unit(Utf8Path::new("src/a.cc"), "hash".into(), "flags".into())
            .unwrap();
        manager
            .record_artifact(Utf8Path::new("lib/liba.a"), "link".into())
            .unwrap();

        let reloaded = CacheManager::load(state_dir).unwrap();
        assert_eq!(reloaded.unit(Utf8Path::new("src/a.cc")).unwrap().content_hash, "hash");
        assert_eq!(
            reloaded
                .artifact(Utf8Path::new("lib/liba.a"))
                .unwrap()
                .link_fingerprint,
            "link"
        );
    }

    #[test]
    fn test_content_signature_tracks_changes() {
        let temp = TempDir::new().unwrap();
        let file = Utf8PathBuf::try_from(temp.path().join("a.cc")).unwrap();

        fs::write(&file, "int x;").unwrap();
        let first = content_signature(&file).unwrap();
        let again = content_signature(&file).unwrap();
        assert_eq!(first, again);

        fs::write(&file, "int y;").unwrap();
        let changed = content_signature(&file).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn test_flag_fingerprint_order_normalized() {
        let a = flag_fingerprint(&target(&["Wall", "O2"], &["A"]), "cc");
        let b = flag_fingerprint(&target(&["O2", "Wall"], &["A"]), "cc");
        assert_eq!(a, b);
    }

    #[test]
    fn test_flag_fingerprint_changes_with_any_flag() {
        let base = flag_fingerprint(&target(&["O2"], &["A"]), "cc");
        assert_ne!(base, flag_fingerprint(&target(&["O2", "g"], &["A"]), "cc"));
        assert_ne!(base, flag_fingerprint(&target(&["O2"], &["A", "B"]), "cc"));
        assert_ne!(base, flag_fingerprint(&target(&["O2"], &["A"]), "cpp"));

        let mut debug_target = target(&["O2"], &["A"]);
        debug_target.debug = true;
        assert_ne!(base, flag_fingerprint(&debug_target, "cc"));
    }

    #[test]
    fn test_unit_fingerprint_tracks_header_content() {
        let temp = TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        fs::write(root.join("core.h"), "struct A;").unwrap();

        let t = target(&["O2"], &[]);
        let headers = vec![Utf8PathBuf::from("core.h")];
        let before = unit_fingerprint(root, &t, "cc", &headers).unwrap();

        fs::write(root.join("core.h"), "struct A; struct B;").unwrap();
        let after = unit_fingerprint(root, &t, "cc", &headers).unwrap();

        assert_ne!(before, after);
        assert_ne!(before, unit_fingerprint(root, &t, "cc", &[]).unwrap());
    }

    #[test]
    fn test_link_fingerprint_is_order_significant() {
        let t = target(&[], &[]);
        let a = link_fingerprint(&t, &["a.o".into(), "b.o".into()]);
        let b = link_fingerprint(&t, &["b.o".into(), "a.o".into()]);
        assert_ne!(a, b);
    }
}
