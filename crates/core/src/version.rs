//! Minimum Tuist CLI version gate

use crate::command::ToolCommand;
use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Minimum Tuist CLI version this integration talks to.
pub const MINIMUM_REQUIRED: &str = "4.31.0";

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse a dot-separated version into numeric components.
///
/// Returns `None` when any component is not a non-negative integer.
#[must_use]
pub fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare `current` against `minimum` component-wise.
///
/// Missing trailing components count as `0`, so `4.31` satisfies `4.31.0`.
/// Unparseable versions never satisfy the gate.
#[must_use]
pub fn is_version_sufficient(current: &str, minimum: &str) -> bool {
    let (Some(current), Some(minimum)) = (parse_version(current), parse_version(minimum)) else {
        return false;
    };

    for i in 0..current.len().max(minimum.len()) {
        let have = current.get(i).copied().unwrap_or(0);
        let need = minimum.get(i).copied().unwrap_or(0);
        if have != need {
            return have > need;
        }
    }
    true
}

/// Ask the tool for its version (`<cmd> version`, first line of output).
///
/// # Errors
///
/// Propagates spawn, timeout and non-zero exit failures from the tool.
pub fn tool_version(command: &ToolCommand) -> Result<String> {
    let output = command.run(&["version"], None, VERSION_TIMEOUT)?;
    let version = output.lines().next().unwrap_or_default().trim().to_string();
    if version.is_empty() {
        return Err(Error::serialization("`tuist version` printed nothing"));
    }
    Ok(version)
}

/// Fail when the installed tool is older than [`MINIMUM_REQUIRED`].
///
/// A version that cannot be determined is not fatal: this happens inside
/// projects whose dependencies have not been installed yet. A missing
/// executable is reported to the caller.
///
/// # Errors
///
/// Returns [`Error::UnsupportedVersion`] for a too-old tool and
/// [`Error::ToolNotFound`] when the executable does not exist.
pub fn validate_tool_version(command: &ToolCommand) -> Result<()> {
    let version = match tool_version(command) {
        Ok(version) => version,
        Err(err @ Error::ToolNotFound { .. }) => return Err(err),
        Err(err) => {
            warn!(error = %err, "Tuist: Could not determine Tuist version. Proceeding without version validation.");
            return Ok(());
        }
    };

    if !is_version_sufficient(&version, MINIMUM_REQUIRED) {
        return Err(Error::UnsupportedVersion {
            version,
            minimum: MINIMUM_REQUIRED.to_string(),
        });
    }

    debug!(%version, "Tuist version satisfies minimum");
    Ok(())
}
