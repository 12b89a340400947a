//! Scripted command runner shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use common::{Error, Result};
use std::sync::Mutex;
use uyuni_health_check::{CommandResult, CommandRunner, DeploymentTarget};

/// What a scripted command answers
#[derive(Debug, Clone)]
pub enum Reply {
    /// The command ran; lines are streamed before the result is returned
    Exit {
        result: CommandResult,
        lines: Vec<String>,
    },
    /// The program is not installed
    MissingTool,
}

/// Successful command printing `stdout`
pub fn ok(stdout: &str) -> Reply {
    Reply::Exit {
        result: CommandResult {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        },
        lines: Vec::new(),
    }
}

/// Failed command printing `stderr`
pub fn fail(exit_code: i32, stderr: &str) -> Reply {
    Reply::Exit {
        result: CommandResult {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        },
        lines: Vec::new(),
    }
}

/// Successful streaming command emitting `lines`
pub fn streamed(lines: &[&str]) -> Reply {
    Reply::Exit {
        result: CommandResult::default(),
        lines: lines.iter().map(|l| l.to_string()).collect(),
    }
}

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: DeploymentTarget,
    pub command: String,
    pub streaming: bool,
}

/// Answers commands by their longest matching prefix.
///
/// Commands without a rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `reply`
    pub fn on(mut self, prefix: &str, reply: Reply) -> Self {
        self.rules.push((prefix.to_string(), reply));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded command lines, in order
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.command).collect()
    }

    /// Number of recorded commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn reply(&self, target: &DeploymentTarget, argv: &[String], streaming: bool) -> Reply {
        let command = argv.join(" ");
        self.calls.lock().unwrap().push(Call {
            target: target.clone(),
            command: command.clone(),
            streaming,
        });

        self.rules
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| ok(""))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, target: &DeploymentTarget, argv: &[String]) -> Result<CommandResult> {
        match self.reply(target, argv, false) {
            Reply::Exit { result, .. } => Ok(result),
            Reply::MissingTool => Err(Error::missing_tool(&argv[0])),
        }
    }

    async fn run_streaming(
        &self,
        target: &DeploymentTarget,
        argv: &[String],
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> Result<CommandResult> {
        match self.reply(target, argv, true) {
            Reply::Exit { result, lines } => {
                for line in &lines {
                    on_line(line);
                }
                Ok(result)
            }
            Reply::MissingTool => Err(Error::missing_tool(&argv[0])),
        }
    }
}
