//! Build orchestration

mod builder;
mod parallel;
mod progress;
mod runner;

pub use builder::{BuildArgs, BuildResult, Builder};
pub use parallel::{ParallelExecutor, TargetOutcome, TargetReport};
pub use progress::BuildProgress;
pub use runner::{CommandRunner, ProcessOutput, ProcessRunner};
