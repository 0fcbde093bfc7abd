//! Subprocess plumbing shared by every tool wrapper.

use crate::error::ToolError;
use std::process::Command;
use std::time::{Duration, Instant};

/// Captured output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run a command to completion, capturing stdout and stderr.
///
/// A non-zero exit status becomes `ToolError::Invocation` carrying the
/// captured diagnostics.
pub fn run_checked(cmd: &mut Command) -> Result<CommandOutput, ToolError> {
    let rendered = render(cmd);
    tracing::debug!(command = %rendered, "invoking external tool");

    let begin = Instant::now();
    let output = cmd.output().map_err(|err| ToolError::Invocation {
        command: rendered.clone(),
        detail: err.to_string(),
    })?;
    let elapsed = begin.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(ToolError::Invocation {
            command: rendered,
            detail: if stderr.is_empty() { stdout } else { stderr },
        });
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        elapsed,
    })
}

/// Render a command for logs and error messages.
pub fn render(cmd: &Command) -> String {
    let mut rendered = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Lex a printed shell command into argv.
///
/// Handles space separation, single and double quotes, and backslash
/// escapes inside quotes. The input is assumed to be a valid command, the
/// way `make --just-print` emits recipes.
pub fn lex_command(line: &str) -> Option<Command> {
    let mut args: Vec<String> = Vec::new();
    let mut chars = line.chars().peekable();
    let mut current = String::new();
    let mut in_token = false;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            if in_token {
                args.push(std::mem::take(&mut current));
                in_token = false;
            }
        } else if c == '"' || c == '\'' {
            in_token = true;
            while let Some(&inner) = chars.peek() {
                if inner == c {
                    chars.next();
                    break;
                }
                if inner == '\\' {
                    chars.next();
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                    continue;
                }
                current.push(inner);
                chars.next();
            }
        } else {
            in_token = true;
            current.push(c);
        }
    }
    if in_token {
        args.push(current);
    }

    let mut parts = args.into_iter();
    let program = parts.next()?;
    let mut cmd = Command::new(program);
    cmd.args(parts);
    Some(cmd)
}
