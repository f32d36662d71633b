// SPDX-License-Identifier: GPL-3.0-only

//! Scoped mounts
//!
//! Both mounts the pipeline takes are guards: `release`/`dismount` give the
//! caller the unmount result, and dropping an unreleased guard still attempts
//! the unmount so an error path never leaks a mount point.

use std::path::{Path, PathBuf};

use ffu_sys::VolumeOps;
use ffu_types::{DiskId, DriveLetter};
use tracing::{debug, warn};

use crate::error::{BuildError, Stage};

/// The staging disk attached to the host
pub struct VolumeMount<'a, O: VolumeOps + ?Sized> {
    ops: &'a O,
    vhd: PathBuf,
    disk: DiskId,
    held: bool,
}

impl<'a, O: VolumeOps + ?Sized> VolumeMount<'a, O> {
    pub fn mount(ops: &'a O, vhd: &Path) -> Result<Self, BuildError> {
        let disk = ops
            .mount_virtual_disk(vhd, false)
            .map_err(BuildError::mount(Stage::MountDisk))?;
        debug!("Staging disk {:?} attached as disk {}", vhd, disk);

        Ok(Self {
            ops,
            vhd: vhd.to_path_buf(),
            disk,
            held: true,
        })
    }

    pub fn disk(&self) -> DiskId {
        self.disk
    }

    pub fn dismount(mut self) -> Result<(), BuildError> {
        self.held = false;
        self.ops
            .dismount_virtual_disk(&self.vhd)
            .map_err(BuildError::unmount(Stage::DismountDisk))
    }
}

impl<O: VolumeOps + ?Sized> Drop for VolumeMount<'_, O> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Err(e) = self.ops.dismount_virtual_disk(&self.vhd) {
            warn!("Failed to dismount staging disk {:?}: {}", self.vhd, e);
        }
    }
}

/// The disk's EFI system partition mounted on a drive letter
pub struct SystemPartitionMount<'a, O: VolumeOps + ?Sized> {
    ops: &'a O,
    disk: DiskId,
    letter: DriveLetter,
    stage: Stage,
    held: bool,
}

impl<'a, O: VolumeOps + ?Sized> SystemPartitionMount<'a, O> {
    pub fn mount(
        ops: &'a O,
        disk: DiskId,
        letter: DriveLetter,
        stage: Stage,
    ) -> Result<Self, BuildError> {
        ops.mount_system_partition(disk, letter)
            .map_err(BuildError::mount(stage))?;
        debug!("System partition of disk {} mounted at {}", disk, letter);

        Ok(Self {
            ops,
            disk,
            letter,
            stage,
            held: true,
        })
    }

    pub fn letter(&self) -> DriveLetter {
        self.letter
    }

    pub fn release(mut self) -> Result<(), BuildError> {
        self.held = false;
        self.ops
            .unmount_system_partition(self.disk, self.letter)
            .map_err(BuildError::unmount(self.stage))
    }
}

impl<O: VolumeOps + ?Sized> Drop for SystemPartitionMount<'_, O> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Err(e) = self.ops.unmount_system_partition(self.disk, self.letter) {
            warn!(
                "Failed to unmount system partition {} of disk {}: {}",
                self.letter, self.disk, e
            );
        }
    }
}
