//! Seam for the external tools that produce splat PLYs (data processing,
//! training). The converter never depends on it.

use std::process::Command;

use crate::error::SplatError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait CommandRunner {
    /// Runs `program` with `args` to completion and captures its output.
    fn submit(&self, program: &str, args: &[String]) -> Result<CommandOutput, SplatError>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommandRunner;

impl CommandRunner for LocalCommandRunner {
    fn submit(&self, program: &str, args: &[String]) -> Result<CommandOutput, SplatError> {
        tracing::info!("Executing command: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| SplatError::Command {
                program: program.to_string(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.success() {
            tracing::warn!(
                status = ?result.status,
                "Command '{}' failed: {}",
                program,
                result.stderr.trim_end()
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program() {
        let err = LocalCommandRunner
            .submit("definitely-not-a-real-program-4242", &[])
            .unwrap_err();
        assert!(matches!(err, SplatError::Command { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_status() {
        let runner = LocalCommandRunner;
        let out = runner
            .submit("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .unwrap();
        assert_eq!(out.status, Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");

        let out = runner.submit("true", &[]).unwrap();
        assert!(out.success());
    }
}
