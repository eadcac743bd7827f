//! Staleness analysis
//!
//! Decides, per target, which translation units must be recompiled and
//! whether the artifact must be relinked. Flag and header changes are
//! not attributable to individual sources, so a changed unit fingerprint
//! invalidates every unit of the target. Dependency staleness propagates
//! forward: a rebuilt dependency forces a relink of every dependent.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;

use crate::cache::{self, CacheState};
use crate::resolve::ResolvedTarget;
use crate::source::BuildUnit;
use crate::Result;

/// Outcome of analyzing one target
#[derive(Debug)]
pub struct StalenessReport {
    /// Units that must be recompiled, in enumeration order
    pub stale_units: Vec<BuildUnit>,
    /// Whether the artifact must be (re)linked
    pub needs_relink: bool,
    /// The target's current flag + header fingerprint
    pub flag_fingerprint: String,
    /// Current content hash per source path, for cache recording
    pub content_hashes: HashMap<Utf8PathBuf, String>,
    /// The target's current link fingerprint
    pub link_fingerprint: String,
}

/// Analyze a target whose dependencies have all reached a terminal state
///
/// `deps_rebuilt` must be true when any dependency was rebuilt or
/// relinked earlier in this run.
#[allow(clippy::too_many_arguments)]
pub fn analyze(
    root: &Utf8Path,
    target: &ResolvedTarget,
    units: &[BuildUnit],
    headers: &[Utf8PathBuf],
    source_extension: &str,
    cache: &CacheState,
    deps_rebuilt: bool,
    force: bool,
) -> Result<StalenessReport> {
    let flag_fingerprint = cache::unit_fingerprint(root, target, source_extension, headers)?;

    let mut stale_units = Vec::new();
    let mut content_hashes = HashMap::new();

    for unit in units {
        let content_hash = cache::content_signature(&root.join(&unit.source))?;
        let stale = force
            || !root.join(&unit.object).exists()
            || match cache.units.get(unit.source.as_str()) {
                None => true,
                Some(entry) => {
                    entry.content_hash != content_hash
                        || entry.flag_fingerprint != flag_fingerprint
                }
            };

        if stale {
            stale_units.push(unit.clone());
        }
        content_hashes.insert(unit.source.clone(), content_hash);
    }

    let objects: Vec<Utf8PathBuf> = units.iter().map(|u| u.object.clone()).collect();
    let link_fingerprint = cache::link_fingerprint(target, &objects);
    let artifact = target.artifact_path();

    let needs_relink = force
        || !stale_units.is_empty()
        || deps_rebuilt
        || !root.join(&artifact).exists()
        || match cache.artifacts.get(artifact.as_str()) {
            None => true,
            Some(entry) => entry.link_fingerprint != link_fingerprint,
        };

    Ok(StalenessReport {
        stale_units,
        needs_relink,
        flag_fingerprint,
        content_hashes,
        link_fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, CacheState};
    use crate::manifest::TargetKind;
    use std::fs;
    use tempfile::TempDir;

    fn lib_target(compiler_options: &[&str]) -> ResolvedTarget {
        ResolvedTarget {
            name: "core".to_string(),
            kind: TargetKind::StaticLibrary,
            main: None,
            debug: false,
            defines: Vec::new(),
            source_dirs: vec!["src/core".to_string()],
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

    fn unit(source: &str) -> BuildUnit {
        BuildUnit {
            target: "core".to_string(),
            source: Utf8PathBuf::from(source),
            object: Utf8PathBuf::from(format!("build/obj/core/{}", source)).with_extension("o"),
        }
    }

    /// Workspace where both sources, their objects, and the archive exist
    fn built_workspace() -> (TempDir, Vec<BuildUnit>) {
        let temp = TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();

        let units = vec![unit("src/core/a.cc"), unit("src/core/b.cc")];
        for u in &units {
            fs::create_dir_all(root.join(&u.source).parent().unwrap()).unwrap();
            fs::write(root.join(&u.source), format!("// {}", u.source)).unwrap();
            fs::create_dir_all(root.join(&u.object).parent().unwrap()).unwrap();
            fs::write(root.join(&u.object), "obj").unwrap();
        }
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/libcore.a"), "archive").unwrap();

        (temp, units)
    }

    /// Cache state that matches the workspace exactly
    fn warm_cache(root: &Utf8Path, target: &ResolvedTarget, units: &[BuildUnit]) -> CacheState {
        let mut manager = CacheManager::load(&root.join(".ccbuild")).unwrap();
        let fingerprint = cache::unit_fingerprint(root, target, "cc", &[]).unwrap();
        for u in units {
            let hash = cache::content_signature(&root.join(&u.source)).unwrap();
            manager
                .record_unit(&u.source, hash, fingerprint.clone())
                .unwrap();
        }
        let objects: Vec<Utf8PathBuf> = units.iter().map(|u| u.object.clone()).collect();
        manager
            .record_artifact(&target.artifact_path(), cache::link_fingerprint(target, &objects))
            .unwrap();
        manager.snapshot()
    }

    #[test]
    fn test_cold_cache_everything_stale() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);

        let report =
            analyze(root, &target, &units, &[], "cc", &CacheState::default(), false, false).unwrap();

        assert_eq!(report.stale_units.len(), 2);
        assert!(report.needs_relink);
    }

    #[test]
    fn test_warm_cache_nothing_stale() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        let report = analyze(root, &target, &units, &[], "cc", &state, false, false).unwrap();

        assert!(report.stale_units.is_empty());
        assert!(!report.needs_relink);
    }

    #[test]
    fn test_touched_source_is_stale_and_forces_relink() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        fs::write(root.join(&units[0].source), "// changed").unwrap();

        let report = analyze(root, &target, &units, &[], "cc", &state, false, false).unwrap();
        assert_eq!(report.stale_units.len(), 1);
        assert_eq!(report.stale_units[0].source, units[0].source);
        assert!(report.needs_relink);
    }

    #[test]
    fn test_flag_change_invalidates_every_unit() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        let changed = lib_target(&["O2", "Wall"]);
        let report = analyze(root, &changed, &units, &[], "cc", &state, false, false).unwrap();

        assert_eq!(report.stale_units.len(), units.len());
        assert!(report.needs_relink);
    }

    #[test]
    fn test_header_change_invalidates_every_unit() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);

        fs::write(root.join("src/core/core.h"), "struct A;").unwrap();
        let headers = vec![Utf8PathBuf::from("src/core/core.h")];

        // Warm the cache with the header-aware fingerprint
        let mut manager = CacheManager::load(&root.join(".ccbuild")).unwrap();
        let fingerprint = cache::unit_fingerprint(root, &target, "cc", &headers).unwrap();
        for u in &units {
            let hash = cache::content_signature(&root.join(&u.source)).unwrap();
            manager.record_unit(&u.source, hash, fingerprint.clone()).unwrap();
        }
        let objects: Vec<Utf8PathBuf> = units.iter().map(|u| u.object.clone()).collect();
        manager
            .record_artifact(&target.artifact_path(), cache::link_fingerprint(&target, &objects))
            .unwrap();
        let state = manager.snapshot();

        let clean = analyze(root, &target, &units, &headers, "cc", &state, false, false).unwrap();
        assert!(clean.stale_units.is_empty());

        fs::write(root.join("src/core/core.h"), "struct A; struct B;").unwrap();
        let report = analyze(root, &target, &units, &headers, "cc", &state, false, false).unwrap();
        assert_eq!(report.stale_units.len(), units.len());
        assert!(report.needs_relink);
    }

    #[test]
    fn test_dependency_rebuild_forces_relink_only() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        let report = analyze(root, &target, &units, &[], "cc", &state, true, false).unwrap();
        assert!(report.stale_units.is_empty());
        assert!(report.needs_relink);
    }

    #[test]
    fn test_force_rebuilds_everything() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        let report = analyze(root, &target, &units, &[], "cc", &state, false, true).unwrap();
        assert_eq!(report.stale_units.len(), units.len());
        assert!(report.needs_relink);
    }

    #[test]
    fn test_missing_artifact_forces_relink() {
        let (temp, units) = built_workspace();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        let target = lib_target(&["O2"]);
        let state = warm_cache(root, &target, &units);

        fs::remove_file(root.join("lib/libcore.a")).unwrap();

        let report = analyze(root, &target, &units, &[], "cc", &state, false, false).unwrap();
        assert!(report.stale_units.is_empty());
        assert!(report.needs_relink);
    }
}
