// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::{OsStr, OsString};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SysError};

pub fn render(command: &OsStr, args: &[OsString]) -> String {
    let mut rendered = command.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Run a tool to completion and return its standard output; a non-zero exit
/// status is an error
pub async fn run(command: impl AsRef<OsStr>, args: &[OsString]) -> Result<String> {
    let command = command.as_ref();
    let rendered = render(command, args);
    debug!("running {rendered}");

    let output = Command::new(command)
        .args(args)
        .output()
        .await
        .map_err(|error| SysError::CommandFailed {
            command: rendered.clone(),
            stderr: error.to_string(),
        })?;

    if !output.status.success() {
        warn!("{rendered} exited with {}", output.status);
        return Err(SysError::CommandFailed {
            command: rendered,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !stdout.trim().is_empty() {
        debug!("{}", stdout.trim_end());
    }
    Ok(stdout)
}

/// Collect string-like arguments into owned argument vectors
pub fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    items.into_iter().map(|item| item.as_ref().to_os_string()).collect()
}
