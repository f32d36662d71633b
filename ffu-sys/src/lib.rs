// SPDX-License-Identifier: GPL-3.0-only

//! Low-level operations for the imaging pipeline
//!
//! This crate wraps every external program the pipeline depends on:
//! - Process execution with captured output (`cmd`)
//! - Argument contracts of the imaging tools (`tools`)
//! - The disk operations seam consumed by the pipeline (`ops`)
//! - The Windows implementation of that seam (`windows`)
//! - Tool discovery before a run starts (`preflight`)
//!
//! Disk operations require an elevated Windows host with the Hyper-V
//! PowerShell module available.

pub mod cmd;
pub mod error;
pub mod ops;
pub mod preflight;
pub mod tools;
pub mod windows;

pub use cmd::{Tool, ToolInvocation, ToolOutput};
pub use error::{Result, SysError};
pub use ops::VolumeOps;
pub use preflight::verify_all_components_are_present;
pub use windows::WindowsVolumeOps;
