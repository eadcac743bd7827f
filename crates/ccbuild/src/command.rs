//! Command synthesis
//!
//! Pure mapping from a resolved target and a build unit (or link step) to
//! the exact external-process invocation. The same inputs always produce
//! the same argument list; nothing here touches the filesystem or spawns
//! processes.
//!
//! Manifest option entries are written without their leading dash
//! (`"std=c++14"`, `"Wl,-rpath,..."`); the dash is added here.

use camino::{Utf8Path, Utf8PathBuf};

use crate::manifest::TargetKind;
use crate::resolve::ResolvedTarget;
use crate::source::BuildUnit;

/// One external process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory (the workspace root)
    pub cwd: Utf8PathBuf,
}

impl std::fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}

/// External programs used to produce artifacts
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub compiler: String,
    pub archiver: String,
    pub pkg_config: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            compiler: "c++".to_string(),
            archiver: "ar".to_string(),
            pkg_config: "pkg-config".to_string(),
        }
    }
}

/// Compile one translation unit to one object file
pub fn compile_command(
    toolchain: &Toolchain,
    target: &ResolvedTarget,
    unit: &BuildUnit,
    pkg_cflags: &[String],
    cwd: &Utf8Path,
) -> ProcessInvocation {
    let mut args = vec!["-c".to_string()];

    for option in &target.compiler_options {
        args.push(format!("-{}", option));
    }
    if target.debug {
        args.push("-g".to_string());
    }
    for define in &target.defines {
        args.push(format!("-D{}", define));
    }
    for dir in &target.include_dirs {
        args.push(format!("-I{}", dir));
    }
    args.extend(pkg_cflags.iter().cloned());

    args.push("-o".to_string());
    args.push(unit.object.to_string());
    args.push(unit.source.to_string());

    ProcessInvocation {
        program: toolchain.compiler.clone(),
        args,
        cwd: cwd.to_path_buf(),
    }
}

/// Link a set of objects (and libraries) into the target's artifact
///
/// Applications link their objects plus internal archives in declared
/// order; static libraries only archive their own objects (composition
/// happens at the consuming application).
pub fn link_command(
    toolchain: &Toolchain,
    target: &ResolvedTarget,
    objects: &[Utf8PathBuf],
    pkg_libs: &[String],
    cwd: &Utf8Path,
) -> ProcessInvocation {
    let artifact = target.artifact_path();

    match target.kind {
        TargetKind::StaticLibrary => {
            let mut args = vec!["rcs".to_string(), artifact.to_string()];
            args.extend(objects.iter().map(|o| o.to_string()));

            ProcessInvocation {
                program: toolchain.archiver.clone(),
                args,
                cwd: cwd.to_path_buf(),
            }
        }
        TargetKind::Application => {
            let mut args = vec!["-o".to_string(), artifact.to_string()];
            args.extend(objects.iter().map(|o| o.to_string()));

            for dir in &target.library_dirs {
                args.push(format!("-L{}", dir));
            }
            for archive in &target.internal_static_library_paths {
                args.push(archive.clone());
            }
            for library in &target.libraries {
                // Archive files are passed literally, names via -l
                if library.ends_with(".a") {
                    args.push(library.clone());
                } else {
                    args.push(format!("-l{}", library));
                }
            }
            args.extend(pkg_libs.iter().cloned());
            for option in &target.linker_options {
                args.push(format!("-{}", option));
            }

            ProcessInvocation {
                program: toolchain.compiler.clone(),
                args,
                cwd: cwd.to_path_buf(),
            }
        }
    }
}

/// Query pkg-config metadata for one package
pub fn pkg_config_command(
    toolchain: &Toolchain,
    package: &str,
    libs: bool,
    cwd: &Utf8Path,
) -> ProcessInvocation {
    ProcessInvocation {
        program: toolchain.pkg_config.clone(),
        args: vec![
            if libs { "--libs" } else { "--cflags" }.to_string(),
            package.to_string(),
        ],
        cwd: cwd.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_target() -> ResolvedTarget {
        ResolvedTarget {
            name: "game".to_string(),
            kind: TargetKind::Application,
            main: Some("src/main".to_string()),
            debug: true,
            defines: vec!["NDEBUG".to_string()],
            source_dirs: vec!["src/game".to_string()],
            include_dirs: vec!["src".to_string()],
            library_dirs: vec!["vendor/lib".to_string()],
            libraries: vec!["libyaml.a".to_string(), "m".to_string()],
            internal_static_library_paths: vec!["lib/libcore.a".to_string()],
            library_import_paths: Vec::new(),
            pkg_config: Vec::new(),
            compiler_options: vec!["std=c++14".to_string(), "Wall".to_string()],
            linker_options: vec!["Wl,-rpath,'$ORIGIN/lib'".to_string()],
        }
    }

    #[test]
    fn test_compile_command_argument_order() {
        let unit = BuildUnit {
            target: "game".to_string(),
            source: "src/game/world.cc".into(),
            object: "build/obj/game/src/game/world.o".into(),
        };

        let inv = compile_command(
            &Toolchain::default(),
            &app_target(),
            &unit,
            &[],
            Utf8Path::new("/ws"),
        );

        assert_eq!(inv.program, "c++");
        assert_eq!(
            inv.args,
            vec![
                "-c",
                "-std=c++14",
                "-Wall",
                "-g",
                "-DNDEBUG",
                "-Isrc",
                "-o",
                "build/obj/game/src/game/world.o",
                "src/game/world.cc",
            ]
        );
        assert_eq!(inv.cwd, "/ws");
    }

    #[test]
    fn test_link_command_for_application() {
        let objects: Vec<Utf8PathBuf> =
            vec!["build/obj/game/src/main.o".into(), "build/obj/game/src/game/world.o".into()];

        let inv = link_command(
            &Toolchain::default(),
            &app_target(),
            &objects,
            &[],
            Utf8Path::new("/ws"),
        );

        assert_eq!(inv.program, "c++");
        assert_eq!(
            inv.args,
            vec![
                "-o",
                "bin/game",
                "build/obj/game/src/main.o",
                "build/obj/game/src/game/world.o",
                "-Lvendor/lib",
                "lib/libcore.a",
                "libyaml.a",
                "-lm",
                "-Wl,-rpath,'$ORIGIN/lib'",
            ]
        );
    }

    #[test]
    fn test_link_command_for_static_library_ignores_other_archives() {
        let mut target = app_target();
        target.name = "core".to_string();
        target.kind = TargetKind::StaticLibrary;
        target.main = None;

        let objects: Vec<Utf8PathBuf> = vec!["build/obj/core/src/core/a.o".into()];
        let inv = link_command(
            &Toolchain::default(),
            &target,
            &objects,
            &[],
            Utf8Path::new("/ws"),
        );

        assert_eq!(inv.program, "ar");
        assert_eq!(inv.args, vec!["rcs", "lib/libcore.a", "build/obj/core/src/core/a.o"]);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let unit = BuildUnit {
            target: "game".to_string(),
            source: "src/main.cc".into(),
            object: "build/obj/game/src/main.o".into(),
        };

        let first = compile_command(
            &Toolchain::default(),
            &app_target(),
            &unit,
            &["-I/usr/include/foo".to_string()],
            Utf8Path::new("/ws"),
        );
        let second = compile_command(
            &Toolchain::default(),
            &app_target(),
            &unit,
            &["-I/usr/include/foo".to_string()],
            Utf8Path::new("/ws"),
        );

        assert_eq!(first, second);
    }
}
