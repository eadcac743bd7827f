//! Partial resolution
//!
//! Merges a target's optional partial reference with its own fields into
//! one fully-populated, immutable [`ResolvedTarget`]. The merge is pure:
//! scalars are target-overrides-partial, sequences are partial-first
//! append (order and repetition are significant for linker ordering).

use camino::Utf8PathBuf;

use crate::manifest::{Manifest, Partial, Target, TargetKind};
use crate::{Error, Result};

/// Fully merged configuration for one target
///
/// Produced once per resolution pass and never mutated; a manifest change
/// yields a fresh value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub name: String,
    pub kind: TargetKind,
    /// Entry-point stem for applications (extension comes from the manifest)
    pub main: Option<String>,
    pub debug: bool,
    pub defines: Vec<String>,
    pub source_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub library_dirs: Vec<String>,
    pub libraries: Vec<String>,
    pub internal_static_library_paths: Vec<String>,
    pub library_import_paths: Vec<String>,
    pub pkg_config: Vec<String>,
    pub compiler_options: Vec<String>,
    pub linker_options: Vec<String>,
}

impl ResolvedTarget {
    /// Workspace-relative path of the artifact this target produces
    ///
    /// Fixed convention: applications land in `bin/<name>`, static
    /// libraries in `lib/lib<name>.a`. Dependency edges are inferred by
    /// matching these paths against other targets' declared inputs.
    pub fn artifact_path(&self) -> Utf8PathBuf {
        match self.kind {
            TargetKind::Application => Utf8PathBuf::from(format!("bin/{}", self.name)),
            TargetKind::StaticLibrary => Utf8PathBuf::from(format!("lib/lib{}.a", self.name)),
        }
    }
}

/// Resolve every target declared in the manifest, in declaration order
pub fn resolve_targets(manifest: &Manifest) -> Result<Vec<ResolvedTarget>> {
    manifest
        .targets
        .iter()
        .map(|(name, target)| resolve_target(name, target, manifest))
        .collect()
}

/// Resolve a single target against the manifest's partials
pub fn resolve_target(name: &str, target: &Target, manifest: &Manifest) -> Result<ResolvedTarget> {
    static EMPTY: Partial = Partial {
        kind: None,
        main: None,
        debug: None,
        defines: Vec::new(),
        source_dirs: Vec::new(),
        include_dirs: Vec::new(),
        library_dirs: Vec::new(),
        libraries: Vec::new(),
        internal_static_library_paths: Vec::new(),
        library_import_paths: Vec::new(),
        pkg_config: Vec::new(),
        compiler_options: Vec::new(),
        linker_options: Vec::new(),
    };

    let partial = match &target.partial {
        Some(partial_name) => manifest
            .partial(partial_name)
            .ok_or_else(|| Error::unknown_partial(name, partial_name))?,
        None => &EMPTY,
    };

    let kind = target
        .kind
        .or(partial.kind)
        .ok_or_else(|| Error::missing_field(name, "type"))?;

    let main = target.main.clone().or_else(|| partial.main.clone());
    match kind {
        TargetKind::Application if main.is_none() => {
            return Err(Error::missing_field(name, "main"));
        }
        TargetKind::StaticLibrary if main.is_some() => {
            return Err(Error::manifest(
                format!("static_library target '{}' must not declare 'main'", name),
                "Only application targets have an entry point",
            ));
        }
        _ => {}
    }

    Ok(ResolvedTarget {
        name: name.to_string(),
        kind,
        main,
        debug: target.debug.or(partial.debug).unwrap_or(false),
        defines: append(&partial.defines, &target.defines),
        source_dirs: append(&partial.source_dirs, &target.source_dirs),
        include_dirs: append(&partial.include_dirs, &target.include_dirs),
        library_dirs: append(&partial.library_dirs, &target.library_dirs),
        libraries: append(&partial.libraries, &target.libraries),
        internal_static_library_paths: append(
            &partial.internal_static_library_paths,
            &target.internal_static_library_paths,
        ),
        library_import_paths: append(&partial.library_import_paths, &target.library_import_paths),
        pkg_config: append(&partial.pkg_config, &target.pkg_config),
        compiler_options: append(&partial.compiler_options, &target.compiler_options),
        linker_options: append(&partial.linker_options, &target.linker_options),
    })
}

/// Partial entries first, target entries appended; duplicates kept
fn append(partial: &[String], target: &[String]) -> Vec<String> {
    let mut merged = Vec::with_capacity(partial.len() + target.len());
    merged.extend_from_slice(partial);
    merged.extend_from_slice(target);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn manifest(json: &str) -> Manifest {
        Manifest::from_str(json).unwrap()
    }

    #[test]
    fn test_sequence_fields_append_partial_first() {
        let m = manifest(
            r#"{
                "partials": {
                    "p": { "type": "application", "compiler_options": ["O2"], "defines": ["A"] }
                },
                "targets": {
                    "t": { "partial": "p", "main": "src/main",
                           "compiler_options": ["g"], "defines": ["A", "B"] }
                }
            }"#,
        );

        let resolved = resolve_targets(&m).unwrap();
        assert_eq!(resolved[0].compiler_options, vec!["O2", "g"]);
        // Duplicates are preserved, not deduplicated
        assert_eq!(resolved[0].defines, vec!["A", "A", "B"]);
    }

    #[test]
    fn test_scalar_fields_target_overrides_partial() {
        let m = manifest(
            r#"{
                "partials": {
                    "p": { "type": "static_library", "debug": true }
                },
                "targets": {
                    "t": { "partial": "p", "type": "application", "main": "src/main",
                           "debug": false }
                }
            }"#,
        );

        let resolved = resolve_targets(&m).unwrap();
        assert_eq!(resolved[0].kind, TargetKind::Application);
        assert!(!resolved[0].debug);
    }

    #[test]
    fn test_scalar_inherited_when_target_omits() {
        let m = manifest(
            r#"{
                "partials": {
                    "p": { "type": "application", "main": "src/main", "debug": true }
                },
                "targets": { "t": { "partial": "p" } }
            }"#,
        );

        let resolved = resolve_targets(&m).unwrap();
        assert_eq!(resolved[0].main.as_deref(), Some("src/main"));
        assert!(resolved[0].debug);
    }

    #[test]
    fn test_unknown_partial() {
        let m = manifest(r#"{ "targets": { "t": { "partial": "nope" } } }"#);

        let err = resolve_targets(&m).unwrap_err();
        assert!(matches!(err, Error::UnknownPartial { ref target, ref partial }
            if target == "t" && partial == "nope"));
    }

    #[test]
    fn test_missing_type_is_required() {
        let m = manifest(r#"{ "targets": { "t": {} } }"#);

        let err = resolve_targets(&m).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref field, .. } if field == "type"));
    }

    #[test]
    fn test_application_requires_main() {
        let m = manifest(r#"{ "targets": { "t": { "type": "application" } } }"#);

        let err = resolve_targets(&m).unwrap_err();
        assert!(matches!(err, Error::MissingRequiredField { ref field, .. } if field == "main"));
    }

    #[test]
    fn test_static_library_rejects_main() {
        let m = manifest(
            r#"{ "targets": { "t": { "type": "static_library", "main": "src/main" } } }"#,
        );

        assert!(resolve_targets(&m).is_err());
    }

    #[test]
    fn test_no_partial_uses_defaults() {
        let m = manifest(r#"{ "targets": { "core": { "type": "static_library",
            "source_dirs": ["src/core"] } } }"#);

        let resolved = resolve_targets(&m).unwrap();
        assert!(!resolved[0].debug);
        assert!(resolved[0].defines.is_empty());
        assert_eq!(resolved[0].source_dirs, vec!["src/core"]);
    }

    #[test]
    fn test_artifact_path_convention() {
        let m = manifest(
            r#"{
                "targets": {
                    "core": { "type": "static_library" },
                    "game": { "type": "application", "main": "src/main" }
                }
            }"#,
        );

        let resolved = resolve_targets(&m).unwrap();
        assert_eq!(resolved[0].artifact_path(), "lib/libcore.a");
        assert_eq!(resolved[1].artifact_path(), "bin/game");
    }
}
