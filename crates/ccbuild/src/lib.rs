//! ccbuild - manifest-driven incremental build orchestrator for C/C++
//!
//! A workspace is described by a JSON manifest of partials (reusable
//! configuration fragments) and targets (applications and static
//! libraries). ccbuild resolves targets against their partials, infers
//! the dependency graph from artifact paths, decides per translation
//! unit what is stale, and builds targets in dependency order with
//! bounded parallelism.
//!
//! Main modules:
//! - [`manifest`]: JSON manifest parsing (declaration order preserved)
//! - [`resolve`]: partial/target merge into resolved targets
//! - [`graph`]: dependency graph inference and deterministic ordering
//! - [`source`]: translation unit enumeration
//! - [`cache`]: content hashes and flag fingerprints
//! - [`staleness`]: per-target rebuild/relink analysis
//! - [`command`]: pure compile/link command synthesis
//! - [`build`]: parallel orchestration
//! - [`config`]: workspace configuration files

pub mod build;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod resolve;
pub mod source;
pub mod staleness;

pub use error::{Error, Result};
