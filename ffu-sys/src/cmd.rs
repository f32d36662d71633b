// SPDX-License-Identifier: GPL-3.0-only

//! External process execution
//!
//! Every tool call is a structured argument list; nothing is ever passed
//! through a shell. `render` produces the display form used in logs and
//! error messages.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, SysError};

/// The external programs the pipeline drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Applies a Windows image onto a volume (wimlib-imagex)
    ImageApply,
    /// Injects a driver pack into an offline image
    DriverUpdater,
    /// Converts a virtual disk into an FFU (Img2Ffu)
    FfuPackager,
    /// Boot configuration data editor (bcdedit)
    BcdEditor,
    /// Copies boot files onto the system partition (bcdboot)
    BootFiles,
    /// Disk management host (PowerShell)
    Shell,
    Defrag,
    Compact,
}

impl Tool {
    pub fn label(self) -> &'static str {
        match self {
            Tool::ImageApply => "image-apply tool",
            Tool::DriverUpdater => "driver updater",
            Tool::FfuPackager => "FFU packager",
            Tool::BcdEditor => "boot-configuration editor",
            Tool::BootFiles => "boot file installer",
            Tool::Shell => "disk management shell",
            Tool::Defrag => "slab optimizer",
            Tool::Compact => "compression tool",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single external program call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(tool: Tool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Display form of the full command line
    pub fn render(&self) -> String {
        render(&self.program.display().to_string(), &self.args)
    }
}

/// Captured output of a successful call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

pub fn render(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        let args: Vec<Cow<'_, str>> = args.iter().map(|arg| quote_for_display(arg)).collect();
        format!("{} {}", command, args.join(" "))
    }
}

fn quote_for_display(arg: &str) -> Cow<'_, str> {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ';' | '&' | '"'));
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", arg.replace('"', "\\\"")))
    } else {
        Cow::Borrowed(arg)
    }
}

/// Split a raw argument fragment into tokens
///
/// Tokens are separated by whitespace; a double-quoted run groups into one
/// token and the quotes themselves are dropped.
pub fn split_raw_arguments(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in raw.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Run a tool to completion, blocking until it exits
pub fn run(invocation: &ToolInvocation) -> Result<ToolOutput> {
    let rendered = invocation.render();
    debug!(tool = %invocation.tool, command = %rendered, "running external tool");

    let output = duct::cmd(invocation.program.as_path(), invocation.args.iter())
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|source| SysError::ToolLaunch {
            tool: invocation.tool,
            command: rendered.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        warn!(tool = %invocation.tool, status = %output.status, "external tool failed: {}", stderr.trim());
        return Err(SysError::ToolFailed {
            tool: invocation.tool,
            command: rendered,
            status: output.status.to_string(),
            // Some tools only report on stdout.
            stderr: if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            },
        });
    }

    Ok(ToolOutput { stdout, stderr })
}
