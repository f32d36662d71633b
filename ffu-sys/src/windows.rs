// SPDX-License-Identifier: GPL-3.0-only

//! Windows implementation of the disk operations
//!
//! Virtual disk and partition management goes through the Storage and
//! Hyper-V PowerShell modules; image servicing goes through the stock
//! command-line tools.

use std::path::{Path, PathBuf};

use ffu_types::{DeviceProfile, DiskId, DriveLetter, PipelineConfig};
use tracing::{debug, info, warn};

use crate::cmd::{self, Tool, ToolInvocation, ToolOutput};
use crate::error::{Result, SysError};
use crate::ops::VolumeOps;
use crate::tools;

/// GPT type of the EFI system partition
pub const ESP_GPT_TYPE: &str = "{c12a7328-f81f-11d2-ba4b-00a0c93ec93b}";
/// GPT type of the Microsoft reserved partition
pub const MSR_GPT_TYPE: &str = "{e3c9e316-0b5c-4db8-817d-f92df00215ae}";
/// GPT type of a basic data partition
pub const BASIC_DATA_GPT_TYPE: &str = "{ebd0a0a2-b9e5-4433-87c0-68b6b72699c7}";

const ESP_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const MSR_SIZE_BYTES: u64 = 16 * 1024 * 1024;

/// Quote a value as a PowerShell single-quoted string literal
pub fn ps_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn script(lines: &[String]) -> String {
    let mut body = vec!["$ErrorActionPreference = 'Stop'".to_string()];
    body.extend_from_slice(lines);
    body.join("; ")
}

pub(crate) fn blank_vhd_script(vhd: &Path, profile: &DeviceProfile) -> String {
    let path = ps_literal(&vhd.display().to_string());
    let sector = profile.disk_sector_size;
    let build = [
        format!(
            "$disk = Mount-VHD -Path {path} -Passthru | Initialize-Disk -PartitionStyle GPT -Passthru"
        ),
        format!(
            "$esp = New-Partition -DiskNumber $disk.Number -Size {ESP_SIZE_BYTES} -GptType '{ESP_GPT_TYPE}'"
        ),
        "Format-Volume -Partition $esp -FileSystem FAT32 -NewFileSystemLabel 'System' -Confirm:$false | Out-Null".to_string(),
        format!(
            "New-Partition -DiskNumber $disk.Number -Size {MSR_SIZE_BYTES} -GptType '{MSR_GPT_TYPE}' | Out-Null"
        ),
        format!(
            "$os = New-Partition -DiskNumber $disk.Number -UseMaximumSize -GptType '{BASIC_DATA_GPT_TYPE}'"
        ),
        "Format-Volume -Partition $os -FileSystem NTFS -NewFileSystemLabel 'Windows' -Confirm:$false | Out-Null".to_string(),
    ];

    // The disk is detached even when partitioning or formatting throws.
    script(&[
        format!(
            "New-VHD -Path {path} -SizeBytes {} -Dynamic -LogicalSectorSizeBytes {sector} -PhysicalSectorSizeBytes {sector} | Out-Null",
            profile.disk_total_size
        ),
        format!(
            "try {{ {} }} finally {{ Dismount-VHD -Path {path} -ErrorAction SilentlyContinue }}",
            build.join("; ")
        ),
    ])
}

pub(crate) fn mount_script(vhd: &Path, read_only: bool) -> String {
    let read_only = if read_only { " -ReadOnly" } else { "" };
    script(&[format!(
        "(Mount-VHD -Path {}{read_only} -Passthru | Get-Disk).Number",
        ps_literal(&vhd.display().to_string())
    )])
}

pub(crate) fn volume_letter_script(disk: DiskId) -> String {
    script(&[
        format!(
            "$p = Get-Partition -DiskNumber {disk} | Where-Object {{ $_.Type -eq 'Basic' }} | Select-Object -First 1"
        ),
        format!(
            "if ([int]$p.DriveLetter -eq 0) {{ $p | Add-PartitionAccessPath -AssignDriveLetter; $p = Get-Partition -DiskNumber {disk} -PartitionNumber $p.PartitionNumber }}"
        ),
        "$p.DriveLetter".to_string(),
    ])
}

pub(crate) fn access_path_script(verb: &str, disk: DiskId, mount: DriveLetter) -> String {
    script(&[format!(
        "Get-Partition -DiskNumber {disk} | Where-Object {{ $_.GptType -eq '{ESP_GPT_TYPE}' }} | {verb}-PartitionAccessPath -AccessPath {}",
        ps_literal(&mount.root())
    )])
}

pub(crate) fn dismount_script(vhd: &Path) -> String {
    script(&[format!(
        "Dismount-VHD -Path {}",
        ps_literal(&vhd.display().to_string())
    )])
}

/// Remove a staging disk that was never fully built
fn discard_staging_file(vhd: &Path) {
    if !vhd.exists() {
        return;
    }
    match std::fs::remove_file(vhd) {
        Ok(()) => info!("Removed incomplete staging disk {:?}", vhd),
        Err(e) => warn!("Failed to remove incomplete staging disk {:?}: {}", vhd, e),
    }
}

/// Disk operations backed by PowerShell and the Windows servicing tools
#[derive(Debug, Clone)]
pub struct WindowsVolumeOps {
    config: PipelineConfig,
}

impl WindowsVolumeOps {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn shell(&self, script: String) -> ToolInvocation {
        ToolInvocation::new(Tool::Shell, self.config.tool_path(&self.config.tools.shell)).args([
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-ExecutionPolicy".to_string(),
            "Bypass".to_string(),
            "-Command".to_string(),
            script,
        ])
    }

    fn run_shell(&self, script: String) -> Result<String> {
        let output = cmd::run(&self.shell(script))?;
        Ok(output.stdout.trim().to_string())
    }
}

impl VolumeOps for WindowsVolumeOps {
    fn blank_vhd(&self, profile: &DeviceProfile) -> Result<PathBuf> {
        let dir = self.config.staging_dir();
        std::fs::create_dir_all(&dir)?;
        let vhd = dir.join(format!("firmwaregen-{}.vhdx", uuid::Uuid::new_v4()));

        info!(
            "Creating staging disk {:?} ({} bytes, {} byte sectors)",
            vhd, profile.disk_total_size, profile.disk_sector_size
        );
        if let Err(e) = self.run_shell(blank_vhd_script(&vhd, profile)) {
            discard_staging_file(&vhd);
            return Err(e);
        }
        Ok(vhd)
    }

    fn mount_virtual_disk(&self, vhd: &Path, read_only: bool) -> Result<DiskId> {
        let stdout = self.run_shell(mount_script(vhd, read_only))?;
        let disk: DiskId = stdout.parse().map_err(|_| SysError::UnexpectedOutput {
            tool: Tool::Shell,
            output: stdout.clone(),
        })?;
        debug!("Mounted {:?} as disk {}", vhd, disk);
        Ok(disk)
    }

    fn volume_letter(&self, disk: DiskId) -> Result<DriveLetter> {
        let stdout = self.run_shell(volume_letter_script(disk))?;
        stdout.parse().map_err(|_| SysError::UnexpectedOutput {
            tool: Tool::Shell,
            output: stdout.clone(),
        })
    }

    fn apply_windows_image(
        &self,
        tool: &Path,
        windows_dvd: &str,
        index: u32,
        target: DriveLetter,
    ) -> Result<()> {
        cmd::run(&tools::image_apply(tool, windows_dvd, index, target)).map(drop)
    }

    fn optimize_slabs(&self, volume: DriveLetter) -> Result<()> {
        cmd::run(&tools::slab_optimization(&self.config, volume)).map(drop)
    }

    fn apply_compact_flags(&self, volume: DriveLetter) -> Result<()> {
        cmd::run(&tools::compact_flags(&self.config, volume)).map(drop)
    }

    fn mount_system_partition(&self, disk: DiskId, mount: DriveLetter) -> Result<()> {
        self.run_shell(access_path_script("Add", disk, mount)).map(drop)
    }

    fn configure_boot_manager(&self, volume: DriveLetter, system: DriveLetter) -> Result<()> {
        cmd::run(&tools::boot_files(&self.config, volume, system))?;
        for command in &self.config.boot_manager_commands {
            cmd::run(&tools::bcd_edit(&self.config, system, command))?;
        }
        Ok(())
    }

    fn unmount_system_partition(&self, disk: DiskId, mount: DriveLetter) -> Result<()> {
        self.run_shell(access_path_script("Remove", disk, mount)).map(drop)
    }

    fn dismount_virtual_disk(&self, vhd: &Path) -> Result<()> {
        self.run_shell(dismount_script(vhd)).map(drop)
    }

    fn run_program(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        cmd::run(invocation)
    }
}
