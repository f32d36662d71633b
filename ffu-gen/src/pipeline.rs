// SPDX-License-Identifier: GPL-3.0-only

//! The imaging pipeline
//!
//! A fixed, linear sequence over one staging disk:
//!
//! 1. load the device profile
//! 2. stage a blank virtual disk
//! 3. mount it and resolve its volume letter
//! 4. apply the Windows image
//! 5. consolidate slabs
//! 6. mark files for compression
//! 7. configure the boot manager on the system partition
//! 8. run the profile's supplemental BCD commands, if any
//! 9. inject the driver pack
//! 10. dismount the disk
//! 11. package the FFU
//! 12. delete the staging disk
//!
//! Each external tool is attempted exactly once. A failing step releases
//! the mounts held at that point and leaves the staging disk for inspection.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ffu_sys::{VolumeOps, tools};
use ffu_types::{
    DeviceProfile, DiskId, DriveLetter, GenerateOptions, PipelineConfig, SupplementalPolicy,
};
use tracing::{debug, info, warn};

use crate::error::{BuildError, Stage};
use crate::ledger::Ledger;
use crate::mounts::{SystemPartitionMount, VolumeMount};

/// Result of a successful build
#[derive(Debug)]
pub struct BuildOutcome {
    pub ffu_path: PathBuf,
    pub staging_disk: PathBuf,
    /// Deleting the staging disk failed; the FFU is still valid
    pub cleanup_error: Option<BuildError>,
    /// Ledger kept behind for a staging disk that could not be deleted
    pub ledger: Option<PathBuf>,
}

pub struct Pipeline<'a, O: VolumeOps + ?Sized> {
    ops: &'a O,
    config: &'a PipelineConfig,
}

fn enter(stage: Stage) {
    info!(stage = %stage, "Entering stage: {}", stage);
}

impl<'a, O: VolumeOps + ?Sized> Pipeline<'a, O> {
    pub fn new(ops: &'a O, config: &'a PipelineConfig) -> Self {
        Self { ops, config }
    }

    /// Build the FFU described by `options`
    pub fn generate(&self, options: &GenerateOptions) -> Result<BuildOutcome, BuildError> {
        let mut ledger = Ledger::open(self.config.ledger_dir.as_deref());

        match self.run(options, &mut ledger) {
            Ok(mut outcome) => {
                if outcome.cleanup_error.is_some() {
                    outcome.ledger = ledger.path().map(Path::to_path_buf);
                } else {
                    ledger.close();
                }
                Ok(outcome)
            }
            Err(error) => {
                ledger.record_failure(&error);
                if let Some(path) = ledger.path()
                    && ledger.record().staging_disk.is_some()
                {
                    warn!("Staging resources of the failed run are recorded in {:?}", path);
                }
                Err(error)
            }
        }
    }

    fn run(
        &self,
        options: &GenerateOptions,
        ledger: &mut Ledger,
    ) -> Result<BuildOutcome, BuildError> {
        enter(Stage::LoadProfile);
        let profile = DeviceProfile::load(&options.device_profile)?;

        enter(Stage::StageDisk);
        let vhd = self.ops.blank_vhd(&profile).map_err(BuildError::Staging)?;
        ledger.update(|record| {
            record.stage = Stage::StageDisk;
            record.staging_disk = Some(vhd.clone());
        });

        enter(Stage::MountDisk);
        let volume = VolumeMount::mount(self.ops, &vhd)?;
        ledger.update(|record| {
            record.stage = Stage::MountDisk;
            record.disk_id = Some(volume.disk());
            record.volume_mounted = true;
        });
        let letter = match self.ops.volume_letter(volume.disk()) {
            Ok(letter) => letter,
            Err(source) => {
                release_after_failure(volume, ledger);
                return Err(BuildError::Mount {
                    stage: Stage::MountDisk,
                    source,
                });
            }
        };
        ledger.update(|record| record.volume_letter = Some(letter));
        info!("Staging volume mounted at {}", letter);

        if let Err(error) =
            self.service_volume(&profile, options, volume.disk(), letter, ledger)
        {
            release_after_failure(volume, ledger);
            return Err(error);
        }

        enter(Stage::DismountDisk);
        volume.dismount()?;
        ledger.update(|record| {
            record.stage = Stage::DismountDisk;
            record.volume_mounted = false;
        });

        enter(Stage::PackageFfu);
        ledger.update(|record| record.stage = Stage::PackageFfu);
        let ffu_path = self.package(&profile, options, &vhd)?;

        enter(Stage::Cleanup);
        ledger.update(|record| record.stage = Stage::Cleanup);
        info!("Deleting Temp VHD");
        let cleanup_error = match fs::remove_file(&vhd) {
            Ok(()) => None,
            Err(source) => {
                warn!("Failed to delete staging disk {:?}: {}", vhd, source);
                Some(BuildError::Cleanup {
                    path: vhd.clone(),
                    source,
                })
            }
        };

        info!("FFU written to {:?}", ffu_path);
        Ok(BuildOutcome {
            ffu_path,
            staging_disk: vhd,
            cleanup_error,
            ledger: None,
        })
    }

    /// Steps 4 to 9, all against the mounted volume
    fn service_volume(
        &self,
        profile: &DeviceProfile,
        options: &GenerateOptions,
        disk: DiskId,
        volume: DriveLetter,
        ledger: &mut Ledger,
    ) -> Result<(), BuildError> {
        enter(Stage::ApplyImage);
        ledger.update(|record| record.stage = Stage::ApplyImage);
        let image_apply = self.config.tool_path(&self.config.tools.image_apply);
        self.ops
            .apply_windows_image(
                &image_apply,
                &options.windows_dvd,
                options.windows_index,
                volume,
            )
            .map_err(BuildError::tool(Stage::ApplyImage))?;

        enter(Stage::Optimize);
        ledger.update(|record| record.stage = Stage::Optimize);
        self.ops
            .optimize_slabs(volume)
            .map_err(BuildError::tool(Stage::Optimize))?;

        enter(Stage::CompactFlags);
        ledger.update(|record| record.stage = Stage::CompactFlags);
        self.ops
            .apply_compact_flags(volume)
            .map_err(BuildError::tool(Stage::CompactFlags))?;

        enter(Stage::ConfigureBoot);
        self.with_system_partition(Stage::ConfigureBoot, disk, ledger, |system| {
            self.ops
                .configure_boot_manager(volume, system)
                .map_err(BuildError::tool(Stage::ConfigureBoot))
        })?;

        if profile.has_supplemental_boot_commands() {
            enter(Stage::SupplementalBoot);
            self.with_system_partition(Stage::SupplementalBoot, disk, ledger, |system| {
                self.run_supplemental_commands(profile, system)
            })?;
        }

        enter(Stage::InjectDrivers);
        ledger.update(|record| record.stage = Stage::InjectDrivers);
        info!("Adding drivers");
        let invocation = tools::driver_updater(
            self.config,
            &options.driver_pack,
            &profile.driver_definition_path,
            volume,
        );
        self.ops
            .run_program(&invocation)
            .map_err(BuildError::tool(Stage::InjectDrivers))?;

        Ok(())
    }

    /// Run `body` with the system partition mounted, unmounting it afterwards
    /// whether or not `body` succeeded
    fn with_system_partition<T>(
        &self,
        stage: Stage,
        disk: DiskId,
        ledger: &mut Ledger,
        body: impl FnOnce(DriveLetter) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        let mount = SystemPartitionMount::mount(
            self.ops,
            disk,
            self.config.system_partition_letter,
            stage,
        )?;
        let letter = mount.letter();
        ledger.update(|record| {
            record.stage = stage;
            record.system_partition = Some(letter);
        });

        let (result, released) = match body(letter) {
            Ok(value) => match mount.release() {
                Ok(()) => (Ok(value), true),
                Err(error) => (Err(error), false),
            },
            Err(error) => {
                let released = match mount.release() {
                    Ok(()) => true,
                    Err(unmount) => {
                        warn!("{}", unmount);
                        false
                    }
                };
                (Err(error), released)
            }
        };

        if released {
            ledger.update(|record| record.system_partition = None);
        }
        result
    }

    fn run_supplemental_commands(
        &self,
        profile: &DeviceProfile,
        system: DriveLetter,
    ) -> Result<(), BuildError> {
        info!("Configuring supplemental boot");

        let mut failed = Vec::new();
        let mut first_error = None;
        for command in &profile.supplementary_bcd_commands {
            let invocation = tools::bcd_edit(self.config, system, command);
            if let Err(error) = self.ops.run_program(&invocation) {
                warn!("Supplemental boot command {:?} failed: {}", command, error);
                failed.push(command.clone());
                first_error.get_or_insert(error);

                if self.config.supplemental_policy == SupplementalPolicy::StopOnFirstFailure {
                    break;
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(source) => Err(BuildError::BootCommands { failed, source }),
        }
    }

    fn package(
        &self,
        profile: &DeviceProfile,
        options: &GenerateOptions,
        vhd: &Path,
    ) -> Result<PathBuf, BuildError> {
        info!("Making FFU");
        let invocation = tools::ffu_packager(
            self.config,
            vhd,
            &options.output,
            profile,
            &options.windows_ver,
        );
        let ffu_path = PathBuf::from(tools::ffu_output_path(
            &options.output,
            &profile.ffu_file_name,
        ));
        let previous = ArtifactState::read(&ffu_path);

        if let Err(source) = self.ops.run_program(&invocation) {
            discard_partial_artifact(&ffu_path, previous);
            return Err(BuildError::Packaging(source));
        }
        Ok(ffu_path)
    }
}

/// Dismount the staging disk on a failure path, keeping the ledger in step
fn release_after_failure<O: VolumeOps + ?Sized>(
    volume: VolumeMount<'_, O>,
    ledger: &mut Ledger,
) {
    match volume.dismount() {
        Ok(()) => ledger.update(|record| record.volume_mounted = false),
        Err(e) => warn!("{}", e),
    }
}

/// Size and modification time of a file at the output path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArtifactState {
    len: u64,
    modified: Option<SystemTime>,
}

impl ArtifactState {
    fn read(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Remove what a failed packaging run wrote, leaving an untouched earlier FFU
fn discard_partial_artifact(path: &Path, previous: Option<ArtifactState>) {
    let Some(current) = ArtifactState::read(path) else {
        return;
    };
    if previous == Some(current) {
        debug!("Keeping existing FFU {:?}", path);
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => info!("Removed partial FFU {:?}", path),
        Err(e) => warn!("Failed to remove partial FFU {:?}: {}", path, e),
    }
}
