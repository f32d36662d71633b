// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::cmd::Tool;

/// Error types for external tool and disk operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("failed to launch {tool} ({command}): {source}")]
    ToolLaunch {
        tool: Tool,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with {status} ({command}): {stderr}")]
    ToolFailed {
        tool: Tool,
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from {tool}: {output:?}")]
    UnexpectedOutput { tool: Tool, output: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SysError {
    /// The external tool this error is attributed to, if any
    pub fn tool(&self) -> Option<Tool> {
        match self {
            SysError::ToolLaunch { tool, .. }
            | SysError::ToolFailed { tool, .. }
            | SysError::UnexpectedOutput { tool, .. } => Some(*tool),
            SysError::Io(_) => None,
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;

#[cfg(test)]
mod tests {
    use super::SysError;
    use crate::cmd::Tool;

    #[test]
    fn failures_are_attributed_to_their_tool() {
        let error = SysError::ToolFailed {
            tool: Tool::BcdEditor,
            command: "bcdedit.exe /store Y:\\EFI\\Microsoft\\Boot\\BCD /set x".to_string(),
            status: "exit code: 1".to_string(),
            stderr: "The parameter is incorrect.".to_string(),
        };
        assert_eq!(error.tool(), Some(Tool::BcdEditor));
        assert_eq!(
            error.to_string(),
            "boot-configuration editor failed with exit code: 1 \
             (bcdedit.exe /store Y:\\EFI\\Microsoft\\Boot\\BCD /set x): The parameter is incorrect."
        );

        let io = SysError::from(std::io::Error::other("disk full"));
        assert_eq!(io.tool(), None);
    }
}
