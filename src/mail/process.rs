use std::io::ErrorKind;
use std::process::Command;

use log::debug;

use crate::error::{Result, ScrapeError};

/// Run `program args... script` and return its trimmed stdout. A non-zero
/// exit is turned into an error by `classify`, which sees the host's stderr.
pub fn run_script(
    program: &str,
    args: &[&str],
    script: &str,
    classify: impl FnOnce(&str) -> ScrapeError,
) -> Result<String> {
    debug!("running {program} ({} byte script)", script.len());
    let output = Command::new(program)
        .args(args)
        .arg(script)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ScrapeError::Driver(format!("{program} not found; is this the right platform?"))
            }
            ErrorKind::PermissionDenied => ScrapeError::AutomationDenied(e.to_string()),
            _ => ScrapeError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("{program} exited with {}: {stderr}", output.status);
        return Err(classify(&stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
