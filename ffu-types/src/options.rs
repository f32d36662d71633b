// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

/// Per-run inputs of the imaging pipeline
///
/// The media, driver pack and output locations are kept as plain strings:
/// they are spliced into external tool arguments exactly as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Path to the device profile XML document
    pub device_profile: PathBuf,
    /// Windows installation media root, or a `.wim`/`.esd`/`.swm` file
    pub windows_dvd: String,
    /// Image index inside the installation media
    pub windows_index: u32,
    /// Driver pack root; the profile's definition path is appended to it
    pub driver_pack: String,
    /// Directory receiving the FFU
    pub output: String,
    /// Windows version tag passed to the packaging tool
    pub windows_ver: String,
}
