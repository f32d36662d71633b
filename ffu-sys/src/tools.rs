// SPDX-License-Identifier: GPL-3.0-only

//! Argument contracts of the imaging tools
//!
//! The token sequences built here are what the external programs expect;
//! flag names, order and separators must not change.

use std::path::Path;

use ffu_types::{DeviceProfile, DriveLetter, PipelineConfig};

use crate::cmd::{Tool, ToolInvocation, split_raw_arguments};

/// Location of the BCD store on a mounted system partition
pub fn bcd_store_path(system_partition: DriveLetter) -> String {
    system_partition.join("EFI\\Microsoft\\Boot\\BCD")
}

/// `<outputDir>\<ffuFileName>`, without doubling a trailing separator
pub fn ffu_output_path(output_dir: &str, ffu_file_name: &str) -> String {
    format!("{}\\{}", output_dir.trim_end_matches('\\'), ffu_file_name)
}

/// Install image inside the Windows media
///
/// A path naming an image file is used as is; anything else is treated as
/// the media root.
pub fn install_image_source(windows_dvd: &str) -> String {
    let lower = windows_dvd.to_ascii_lowercase();
    if [".wim", ".esd", ".swm"].iter().any(|ext| lower.ends_with(ext)) {
        windows_dvd.to_string()
    } else {
        format!("{}\\sources\\install.wim", windows_dvd.trim_end_matches('\\'))
    }
}

pub fn image_apply(
    program: &Path,
    windows_dvd: &str,
    index: u32,
    target: DriveLetter,
) -> ToolInvocation {
    ToolInvocation::new(Tool::ImageApply, program).args([
        "apply".to_string(),
        install_image_source(windows_dvd),
        index.to_string(),
        target.root(),
    ])
}

/// `-d <driverPack><definitionPath> -r <driverPack> -p <volume>`
pub fn driver_updater(
    config: &PipelineConfig,
    driver_pack: &str,
    driver_definition_path: &str,
    volume: DriveLetter,
) -> ToolInvocation {
    ToolInvocation::new(
        Tool::DriverUpdater,
        config.tool_path(&config.tools.driver_updater),
    )
    .args([
        "-d".to_string(),
        format!("{driver_pack}{driver_definition_path}"),
        "-r".to_string(),
        driver_pack.to_string(),
        "-p".to_string(),
        volume.to_string(),
    ])
}

/// `-i <disk> -f <output> -c <sector*4> -s <sector> -p <ids> -o <ver> -b <block>`
pub fn ffu_packager(
    config: &PipelineConfig,
    disk: &Path,
    output_dir: &str,
    profile: &DeviceProfile,
    windows_ver: &str,
) -> ToolInvocation {
    ToolInvocation::new(
        Tool::FfuPackager,
        config.tool_path(&config.tools.ffu_packager),
    )
    .args([
        "-i".to_string(),
        disk.display().to_string(),
        "-f".to_string(),
        ffu_output_path(output_dir, &profile.ffu_file_name),
        "-c".to_string(),
        profile.cluster_size().to_string(),
        "-s".to_string(),
        profile.disk_sector_size.to_string(),
        "-p".to_string(),
        profile.joined_platform_ids(),
        "-o".to_string(),
        windows_ver.to_string(),
        "-b".to_string(),
        config.payload_block_size.to_string(),
    ])
}

/// `/store <sys>\EFI\Microsoft\Boot\BCD <command tokens...>`
pub fn bcd_edit(
    config: &PipelineConfig,
    system_partition: DriveLetter,
    raw_command: &str,
) -> ToolInvocation {
    ToolInvocation::new(Tool::BcdEditor, config.tool_path(&config.tools.bcd_editor))
        .arg("/store")
        .arg(bcd_store_path(system_partition))
        .args(split_raw_arguments(raw_command))
}

pub fn boot_files(
    config: &PipelineConfig,
    volume: DriveLetter,
    system_partition: DriveLetter,
) -> ToolInvocation {
    ToolInvocation::new(Tool::BootFiles, config.tool_path(&config.tools.boot_files)).args([
        volume.join("Windows"),
        "/s".to_string(),
        system_partition.to_string(),
        "/f".to_string(),
        "UEFI".to_string(),
    ])
}

/// Slab consolidation plus retrim of the staged volume
pub fn slab_optimization(config: &PipelineConfig, volume: DriveLetter) -> ToolInvocation {
    ToolInvocation::new(Tool::Defrag, config.tool_path(&config.tools.defrag)).args([
        volume.to_string(),
        "/K".to_string(),
        "/L".to_string(),
        "/U".to_string(),
    ])
}

pub fn compact_flags(config: &PipelineConfig, volume: DriveLetter) -> ToolInvocation {
    ToolInvocation::new(Tool::Compact, config.tool_path(&config.tools.compact)).args([
        "/C".to_string(),
        "/I".to_string(),
        "/A".to_string(),
        "/EXE:LZX".to_string(),
        format!("/S:{}", volume.root()),
    ])
}
