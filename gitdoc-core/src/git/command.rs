//! Running the `git` executable
//!
//! Mutating operations go through the real `git` binary so hooks,
//! credential helpers and user configuration behave exactly as on the
//! command line.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::{Error, Result};

/// Run `git <args>` in `root` with extra environment, returning stdout
pub(crate) async fn run_git<I, S>(root: &Path, args: I, envs: &[(&str, String)]) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let command_line = args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");

    tracing::debug!(command = %command_line, root = %root.display(), "Running git");

    let mut cmd = Command::new("git");
    cmd.args(&args)
        .current_dir(root)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::Other("git executable not found. Is git installed?".to_string())
        } else {
            Error::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        return Err(Error::GitCommand {
            command: command_line,
            // git reports some failures ("nothing to commit") on stdout
            stderr: if stderr.is_empty() { stdout } else { stderr },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether a failed push was refused because the remote diverged
pub(crate) fn is_push_rejection(stderr: &str) -> bool {
    ["[rejected]", "non-fast-forward", "fetch first", "stale info"]
        .iter()
        .any(|needle| stderr.contains(needle))
}
