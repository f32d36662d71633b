// SPDX-License-Identifier: GPL-3.0-only

//! Canonical data models for the FirmwareGen imaging pipeline
//!
//! - `DeviceProfile` → the target device's imaging parameters, read from XML
//! - `GenerateOptions` → the per-run inputs supplied by the caller
//! - `PipelineConfig` → tool names, mount letters and staging locations
//! - `DiskId` / `DriveLetter` → handles returned by disk operations

pub mod config;
pub mod error;
pub mod options;
pub mod profile;
pub mod volume;

pub use config::{PipelineConfig, SupplementalPolicy, ToolNames};
pub use error::{ConfigError, ProfileError, VolumeIdError};
pub use options::GenerateOptions;
pub use profile::DeviceProfile;
pub use volume::{DiskId, DriveLetter};
