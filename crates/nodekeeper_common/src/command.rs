//! External command execution
//!
//! Everything that shells out (systemctl, journalctl, client binaries,
//! apt-cache, operator hooks) goes through [`CommandRunner`] so it can be
//! replaced in tests.

use crate::error::{KeeperError, KeeperResult};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout on success, a `Command` error otherwise
    pub fn into_stdout(self, command: &str) -> KeeperResult<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            let reason = match self.status {
                Some(code) => format!("exit code {}: {}", code, self.stderr.trim()),
                None => format!("terminated by signal: {}", self.stderr.trim()),
            };
            Err(KeeperError::command(command, reason))
        }
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[&str]) -> KeeperResult<CommandOutput>;

    /// Run an argv vector (`argv[0]` is the program)
    fn run_argv(&self, argv: &[String]) -> KeeperResult<CommandOutput> {
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| KeeperError::command("<empty>", "empty command"))?;
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        self.run(program, &args)
    }
}

/// Runs commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> KeeperResult<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| KeeperError::command(program, e.to_string()))?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Render a command for log lines
pub fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_stdout() {
        assert_eq!(CommandOutput::ok("hi").into_stdout("echo").unwrap(), "hi");
        let err = CommandOutput::failed(4, "Unit x.service not found.")
            .into_stdout("systemctl")
            .unwrap_err();
        assert!(err.to_string().contains("exit code 4"));
    }

    #[test]
    fn test_run_argv_empty() {
        assert!(SystemRunner.run_argv(&[]).is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe("systemctl", &["restart", "geth.service"]), "systemctl restart geth.service");
    }
}
