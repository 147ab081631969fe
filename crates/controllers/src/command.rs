//! Running external programs.

use tokio::process::Command;
use tracing::debug;

use nodestate_core::{Error, Result};

/// Execute a program and return its stdout.
///
/// # Errors
///
/// [`Error::CommandFailed`] when the program cannot be spawned or exits
/// non-zero; the reason carries its stderr.
pub async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let rendered = std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ");
    debug!(command = %rendered, "Running command");

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::command_failed(&rendered, e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::command_failed(rendered, stderr.trim()))
    }
}
