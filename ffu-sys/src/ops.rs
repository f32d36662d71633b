// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use ffu_types::{DeviceProfile, DiskId, DriveLetter};

use crate::cmd::{ToolInvocation, ToolOutput};
use crate::error::Result;

/// Disk and volume operations the imaging pipeline is built on
///
/// Every method blocks until the underlying tool exits. Implementations
/// attribute failures to the tool that produced them.
pub trait VolumeOps {
    /// Create a blank, partitioned and detached staging disk
    fn blank_vhd(&self, profile: &DeviceProfile) -> Result<PathBuf>;

    fn mount_virtual_disk(&self, vhd: &Path, read_only: bool) -> Result<DiskId>;

    /// Drive letter of the OS volume on an attached disk
    fn volume_letter(&self, disk: DiskId) -> Result<DriveLetter>;

    fn apply_windows_image(
        &self,
        tool: &Path,
        windows_dvd: &str,
        index: u32,
        target: DriveLetter,
    ) -> Result<()>;

    fn optimize_slabs(&self, volume: DriveLetter) -> Result<()>;

    fn apply_compact_flags(&self, volume: DriveLetter) -> Result<()>;

    fn mount_system_partition(&self, disk: DiskId, mount: DriveLetter) -> Result<()>;

    fn configure_boot_manager(&self, volume: DriveLetter, system: DriveLetter) -> Result<()>;

    fn unmount_system_partition(&self, disk: DiskId, mount: DriveLetter) -> Result<()>;

    fn dismount_virtual_disk(&self, vhd: &Path) -> Result<()>;

    /// Run an arbitrary tool; a non-zero exit is an error
    fn run_program(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}
