//! External tool execution
//!
//! Children are spawned with `kill_on_drop`, so dropping the returned
//! future (job cancellation) terminates the tool.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::types::CapabilityError;

/// Longest stderr excerpt carried in an error message
const STDERR_TAIL_CHARS: usize = 2000;

/// Run to completion and return stdout
pub async fn run_tool(tool: &str, mut command: Command) -> Result<String, CapabilityError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = command.output().await.map_err(|e| spawn_error(tool, e))?;

    if !output.status.success() {
        return Err(CapabilityError::ToolFailed {
            tool: tool.to_string(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), output.status.code()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run to completion, handing each stdout line to `on_line` as it arrives
pub async fn run_tool_streaming<F>(
    tool: &str,
    mut command: Command,
    mut on_line: F,
) -> Result<(), CapabilityError>
where
    F: FnMut(&str),
{
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| spawn_error(tool, e))?;

    let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(CapabilityError::Spawn {
            tool: tool.to_string(),
            message: "output pipes unavailable".to_string(),
        });
    };

    // Drain both pipes together so a chatty stderr cannot block the child
    let read_stdout = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            on_line(&line);
        }
        Ok::<_, std::io::Error>(())
    };
    let read_stderr = async {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    };
    let (stdout_result, stderr_text) = tokio::join!(read_stdout, read_stderr);
    stdout_result?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(CapabilityError::ToolFailed {
            tool: tool.to_string(),
            stderr: tail(&stderr_text, status.code()),
        });
    }

    Ok(())
}

fn spawn_error(tool: &str, err: std::io::Error) -> CapabilityError {
    CapabilityError::Spawn {
        tool: tool.to_string(),
        message: err.to_string(),
    }
}

fn tail(stderr: &str, code: Option<i32>) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return match code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
    }

    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_end_of_long_output() {
        let long = format!("{}END", "x".repeat(5000));
        let excerpt = tail(&long, Some(1));
        assert_eq!(excerpt.chars().count(), STDERR_TAIL_CHARS);
        assert!(excerpt.ends_with("END"));
    }

    #[test]
    fn test_tail_reports_exit_code_when_silent() {
        assert_eq!(tail("  \n", Some(2)), "exited with status 2");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = run_tool("missing", Command::new("definitely-not-a-real-tool-4821")).await;
        assert!(matches!(result, Err(CapabilityError::Spawn { .. })));
    }
}
