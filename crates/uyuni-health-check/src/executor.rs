//! Command execution on the local host or over ssh.

use crate::types::{CommandResult, DeploymentTarget};
use async_trait::async_trait;
use common::{Error, Result};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code of a shell when the command does not exist
const EXIT_COMMAND_NOT_FOUND: i32 = 127;
/// Exit code of podman when it cannot run the container engine
const EXIT_RUNTIME_ERROR: i32 = 125;
/// Exit code of ssh on connection or authentication errors
const EXIT_SSH_ERROR: i32 = 255;

/// Runs commands on a deployment target
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its output.
    ///
    /// A non-zero exit is returned as a result; only a missing tool or a
    /// failure of the execution machinery itself is an error.
    async fn run(&self, target: &DeploymentTarget, argv: &[String]) -> Result<CommandResult>;

    /// Run a command, handing every output line to `on_line` as it arrives.
    async fn run_streaming(
        &self,
        target: &DeploymentTarget,
        argv: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<CommandResult>;
}

/// Runs commands as child processes, wrapping them in ssh for remote targets
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    ssh_program: String,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full command line for the target.
    ///
    /// Remote commands assume passwordless ssh on the default port; use the
    /// ssh agent and config to adjust.
    pub fn command_line(&self, target: &DeploymentTarget, argv: &[String], quiet: bool) -> Vec<String> {
        match target {
            DeploymentTarget::Local => argv.to_vec(),
            DeploymentTarget::Remote(host) => {
                let mut line = vec![self.ssh_program.clone()];
                if quiet {
                    line.push("-q".to_string());
                }
                line.push(host.clone());
                line.extend(argv.iter().cloned());
                line
            }
        }
    }

    fn command(&self, target: &DeploymentTarget, argv: &[String], quiet: bool) -> Result<Command> {
        let line = self.command_line(target, argv, quiet);
        let (program, args) = line
            .split_first()
            .ok_or_else(|| Error::config("empty command line"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }

    /// Map a spawn error, telling a missing program apart from other failures
    fn spawn_error(&self, target: &DeploymentTarget, argv: &[String], err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            let program = match target {
                DeploymentTarget::Local => argv.first().map(String::as_str).unwrap_or_default(),
                DeploymentTarget::Remote(_) => self.ssh_program.as_str(),
            };
            warn!(program, "Program not found");
            Error::missing_tool(program)
        } else {
            Error::Io(err)
        }
    }
}

/// Classify a finished command by its exit code
fn classify(target: &DeploymentTarget, argv: &[String], result: CommandResult) -> Result<CommandResult> {
    let program = argv.first().map(String::as_str).unwrap_or_default();
    match (result.exit_code, target) {
        (EXIT_COMMAND_NOT_FOUND, DeploymentTarget::Local) => Err(Error::missing_tool(program)),
        (EXIT_COMMAND_NOT_FOUND, DeploymentTarget::Remote(host)) => {
            Err(Error::missing_tool_on(program, host))
        }
        (EXIT_RUNTIME_ERROR, _) => Err(Error::command_failed(
            argv.join(" "),
            Some(EXIT_RUNTIME_ERROR),
            format!(
                "container runtime error, possibly insufficient privileges: {}",
                result.stderr.trim()
            ),
        )),
        (EXIT_SSH_ERROR, DeploymentTarget::Remote(host)) => Err(Error::command_failed(
            argv.join(" "),
            Some(EXIT_SSH_ERROR),
            format!("remote shell to {} failed: {}", host, result.stderr.trim()),
        )),
        _ => Ok(result),
    }
}

/// One output line without its terminator; invalid UTF-8 is replaced
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, target: &DeploymentTarget, argv: &[String]) -> Result<CommandResult> {
        debug!(target = %target, command = %argv.join(" "), "Running command");
        let start = Instant::now();

        let output = self
            .command(target, argv, true)?
            .output()
            .await
            .map_err(|e| self.spawn_error(target, argv, e))?;

        let result = CommandResult {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            target = %target,
            exit_code = result.exit_code,
            duration_ms = start.elapsed().as_millis(),
            "Command finished"
        );
        classify(target, argv, result)
    }

    async fn run_streaming(
        &self,
        target: &DeploymentTarget,
        argv: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<CommandResult> {
        debug!(target = %target, command = %argv.join(" "), "Running streaming command");

        let mut child = self
            .command(target, argv, false)?
            .spawn()
            .map_err(|e| self.spawn_error(target, argv, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(io::Error::other("child stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Io(io::Error::other("child stderr not captured")))?;
        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);

        // Partial reads stay in the buffers when the other branch wins
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let mut captured_out = String::new();
        let mut captured_err = String::new();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                biased;
                read = stdout.read_until(b'\n', &mut out_buf), if !out_done => {
                    if read? == 0 {
                        out_done = true;
                    } else {
                        let line = decode_line(&out_buf);
                        out_buf.clear();
                        on_line(&line);
                        captured_out.push_str(&line);
                        captured_out.push('\n');
                    }
                }
                read = stderr.read_until(b'\n', &mut err_buf), if !err_done => {
                    if read? == 0 {
                        err_done = true;
                    } else {
                        let line = decode_line(&err_buf);
                        err_buf.clear();
                        on_line(&line);
                        captured_err.push_str(&line);
                        captured_err.push('\n');
                    }
                }
            }
        }

        let status = child.wait().await?;
        let result = CommandResult {
            exit_code: exit_code(status),
            stdout: captured_out,
            stderr: captured_err,
        };
        debug!(target = %target, exit_code = result.exit_code, "Streaming command finished");
        classify(target, argv, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_local_command_line_is_unchanged() {
        let runner = ProcessRunner::new();
        let line = runner.command_line(&DeploymentTarget::Local, &argv(&["id", "-g", "salt"]), true);
        assert_eq!(line, argv(&["id", "-g", "salt"]));
    }

    #[test]
    fn test_remote_command_line_wraps_in_ssh() {
        let runner = ProcessRunner::new();
        let target = DeploymentTarget::Remote("uyuni.lab".into());

        let quiet = runner.command_line(&target, &argv(&["podman", "ps"]), true);
        assert_eq!(quiet, argv(&["ssh", "-q", "uyuni.lab", "podman", "ps"]));

        let verbose = runner.command_line(&target, &argv(&["podman", "ps"]), false);
        assert_eq!(verbose, argv(&["ssh", "uyuni.lab", "podman", "ps"]));
    }

    #[test]
    fn test_classify_exit_codes() {
        let local = DeploymentTarget::Local;
        let remote = DeploymentTarget::Remote("uyuni.lab".into());
        let cmd = argv(&["podman", "ps"]);
        let result = |code| CommandResult {
            exit_code: code,
            stdout: String::new(),
            stderr: "oops".into(),
        };

        let err = classify(&local, &cmd, result(127)).unwrap_err();
        assert_eq!(err.to_string(), "podman is required");

        let err = classify(&remote, &cmd, result(127)).unwrap_err();
        assert_eq!(err.to_string(), "podman is required on uyuni.lab");

        let err = classify(&local, &cmd, result(125)).unwrap_err();
        assert!(err.to_string().contains("insufficient privileges"));

        let err = classify(&remote, &cmd, result(255)).unwrap_err();
        assert!(err.to_string().contains("remote shell to uyuni.lab failed"));

        // 255 is an ordinary exit code for a local command
        assert_eq!(classify(&local, &cmd, result(255)).unwrap().exit_code, 255);
        assert_eq!(classify(&local, &cmd, result(1)).unwrap().exit_code, 1);
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"STEP 1/3\n"), "STEP 1/3");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"caf\xe9\n"), "caf\u{fffd}");
    }

    #[tokio::test]
    async fn test_empty_argv_is_rejected() {
        let runner = ProcessRunner::new();
        let err = runner.run(&DeploymentTarget::Local, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
