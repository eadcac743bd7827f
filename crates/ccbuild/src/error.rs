//! Error types for ccbuild

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for ccbuild operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ccbuild
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Manifest error
    #[error("Manifest error: {message}")]
    #[diagnostic(help("{help}"))]
    Manifest { message: String, help: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(help("{help}"))]
    Config { message: String, help: String },

    /// A required field is missing after partial resolution
    #[error("Target '{target}' is missing required field '{field}'")]
    #[diagnostic(help("Set the field on the target or on the partial it references"))]
    MissingRequiredField { target: String, field: String },

    /// A target references a partial that does not exist
    #[error("Target '{target}' references unknown partial '{partial}'")]
    #[diagnostic(help("Declare the partial under 'partials' in the manifest"))]
    UnknownPartial { target: String, partial: String },

    /// A build request names a target that does not exist
    #[error("Unknown target: '{name}'")]
    #[diagnostic(help("Check the target names declared in the manifest"))]
    UnknownTargetReference { name: String },

    /// Cyclic dependency between targets
    #[error("Cyclic dependency between targets: {targets:?}")]
    #[diagnostic(help(
        "Check the internal_static_library_paths entries of the targets in the cycle"
    ))]
    CyclicDependency {
        /// Targets involved in the cycle, in edge order
        targets: Vec<String>,
    },

    /// A translation unit failed to compile
    #[error("Compilation failed for {source_file} (target '{target}')")]
    CompileFailure {
        target: String,
        source_file: String,
        diagnostics: String,
    },

    /// Linking an artifact failed
    #[error("Link failed for target '{target}'")]
    LinkFailure { target: String, diagnostics: String },

    /// The external compiler/linker could not be started
    #[error("Toolchain unavailable: could not start '{program}': {message}")]
    #[diagnostic(help("Check that the configured compiler/archiver is installed and on PATH"))]
    ToolchainUnavailable { program: String, message: String },

    /// Cache error
    #[error("Cache error: {message}")]
    #[diagnostic(help("{help}"))]
    Cache { message: String, help: String },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    #[diagnostic(help("This is likely a bug in ccbuild"))]
    Internal { message: String },
}

impl Error {
    /// Create a manifest error
    pub fn manifest(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a missing-required-field error
    pub fn missing_field(target: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            target: target.into(),
            field: field.into(),
        }
    }

    /// Create an unknown-partial error
    pub fn unknown_partial(target: impl Into<String>, partial: impl Into<String>) -> Self {
        Self::UnknownPartial {
            target: target.into(),
            partial: partial.into(),
        }
    }

    /// Create a cyclic-dependency error
    pub fn cyclic_dependency(targets: Vec<String>) -> Self {
        Self::CyclicDependency { targets }
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
