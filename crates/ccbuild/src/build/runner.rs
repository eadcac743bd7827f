//! External process execution
//!
//! The orchestrator talks to the compiler/linker through the
//! [`ProcessRunner`] trait so tests can substitute a fake toolchain. The
//! real runner captures combined diagnostics and polls the child so an
//! abort can terminate in-flight processes.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::command::ProcessInvocation;
use crate::{Error, Result};

/// Result of one external process run
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Whether the process exited with status zero
    pub success: bool,
    /// Captured stderr followed by stdout, unmodified
    pub diagnostics: String,
}

/// Capability for running compiler/linker processes
pub trait ProcessRunner: Send + Sync {
    /// Run the invocation to completion and capture its diagnostics
    fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput>;
}

/// Runner backed by real child processes
pub struct CommandRunner {
    abort: Arc<AtomicBool>,
}

impl CommandRunner {
    /// Create a runner; setting `abort` kills in-flight children
    pub fn new(abort: Arc<AtomicBool>) -> Self {
        Self { abort }
    }
}

impl ProcessRunner for CommandRunner {
    fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutput> {
        tracing::debug!(command = %invocation, "Running");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ToolchainUnavailable {
                program: invocation.program.clone(),
                message: e.to_string(),
            })?;

        // Drain pipes on separate threads so a chatty child never blocks
        let stdout = child.stdout.take().expect("stdout is piped");
        let stderr = child.stderr.take().expect("stderr is piped");
        let stdout_handle = std::thread::spawn(move || read_to_string_lossy(stdout));
        let stderr_handle = std::thread::spawn(move || read_to_string_lossy(stderr));

        let status = loop {
            if self.abort.load(Ordering::Relaxed) {
                let _ = child.kill();
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        };

        let stdout_text = stdout_handle.join().unwrap_or_default();
        let stderr_text = stderr_handle.join().unwrap_or_default();

        let mut diagnostics = stderr_text;
        if !stdout_text.is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&stdout_text);
        }

        for line in diagnostics.lines() {
            tracing::debug!(target: "build_output", "{}", line);
        }

        Ok(ProcessOutput {
            success: status.success(),
            diagnostics,
        })
    }
}

fn read_to_string_lossy(mut reader: impl Read) -> String {
    let mut bytes = Vec::new();
    let _ = reader.read_to_end(&mut bytes);
    String::from_utf8_lossy(&bytes).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn invocation(program: &str, args: &[&str]) -> ProcessInvocation {
        ProcessInvocation {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: Utf8PathBuf::from("."),
        }
    }

    #[test]
    fn test_missing_program_is_toolchain_unavailable() {
        let runner = CommandRunner::new(Arc::new(AtomicBool::new(false)));
        let err = runner
            .run(&invocation("ccbuild-no-such-compiler", &[]))
            .unwrap_err();

        assert!(matches!(err, Error::ToolchainUnavailable { ref program, .. }
            if program == "ccbuild-no-such-compiler"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_diagnostics_and_exit_status() {
        let runner = CommandRunner::new(Arc::new(AtomicBool::new(false)));

        let ok = runner.run(&invocation("sh", &["-c", "echo hello"])).unwrap();
        assert!(ok.success);
        assert_eq!(ok.diagnostics, "hello");

        let failed = runner
            .run(&invocation("sh", &["-c", "echo broken >&2; exit 1"]))
            .unwrap();
        assert!(!failed.success);
        assert!(failed.diagnostics.contains("broken"));
    }
}
