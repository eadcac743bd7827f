//! Manifest parsing and representation
//!
//! This module handles parsing of ccbuild manifests (JSON) and provides
//! the Partial/Target structures consumed by the resolver. Declaration
//! order of partials and targets is preserved, since it determines the
//! tie-break order of the build schedule.

use camino::Utf8Path;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::{Error, Result};

/// Kind of artifact a target produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Executable with a `main` entry point
    Application,
    /// Archive aggregating the target's own sources
    StaticLibrary,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Application => write!(f, "application"),
            TargetKind::StaticLibrary => write!(f, "static_library"),
        }
    }
}

/// Reusable configuration fragment; never built directly
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Partial {
    #[serde(rename = "type")]
    pub kind: Option<TargetKind>,
    pub main: Option<String>,
    pub debug: Option<bool>,
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

/// A buildable unit declared in the manifest
///
/// Carries the same field set as [`Partial`] plus an optional `partial`
/// reference naming the fragment to layer underneath.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Target {
    pub partial: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TargetKind>,
    pub main: Option<String>,
    pub debug: Option<bool>,
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

/// Parsed build manifest
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Extension of translation units (without the dot)
    pub source_extension: String,

    /// Extension of header files (without the dot)
    pub header_extension: String,

    /// Named partials, in declaration order
    #[serde(deserialize_with = "ordered_map")]
    pub partials: Vec<(String, Partial)>,

    /// Named targets, in declaration order
    #[serde(deserialize_with = "ordered_map")]
    pub targets: Vec<(String, Target)>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            source_extension: "cc".to_string(),
            header_extension: "h".to_string(),
            partials: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Manifest {
    /// Parse a manifest from a JSON file
    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from JSON content
    pub fn from_str(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Look up a partial by name
    pub fn partial(&self, name: &str) -> Option<&Partial> {
        self.partials
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    fn validate(&self) -> Result<()> {
        if self.source_extension.is_empty() {
            return Err(Error::manifest(
                "source_extension must not be empty",
                "Use e.g. \"cc\" or \"cpp\"",
            ));
        }
        Ok(())
    }
}

/// Deserialize a JSON object into a vector of (name, value) pairs,
/// preserving the document's declaration order.
///
/// Duplicate names are rejected; they would make lookups ambiguous.
fn ordered_map<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct OrderedMapVisitor<T>(std::marker::PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<T> {
        type Value = Vec<(String, T)>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a map of names to definitions")
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut access: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut entries: Vec<(String, T)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, value)) = access.next_entry::<String, T>()? {
                if entries.iter().any(|(n, _)| *n == name) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate name: {}",
                        name
                    )));
                }
                entries.push((name, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedMapVisitor(std::marker::PhantomData))
}
