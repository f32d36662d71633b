// SPDX-License-Identifier: GPL-3.0-only

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use ffu_sys::{SysError, Tool, ToolInvocation, ToolOutput, VolumeOps};
use ffu_types::{DeviceProfile, DiskId, DriveLetter, GenerateOptions, PipelineConfig};

pub const STAGED_DISK: DiskId = DiskId(3);

/// Calls made against the fake, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BlankVhd(PathBuf),
    MountDisk(PathBuf),
    VolumeLetter(DiskId),
    ApplyImage { dvd: String, index: u32, target: DriveLetter },
    OptimizeSlabs(DriveLetter),
    CompactFlags(DriveLetter),
    MountSystem(DriveLetter),
    ConfigureBoot { volume: DriveLetter, system: DriveLetter },
    UnmountSystem(DriveLetter),
    Dismount(PathBuf),
    Program(ToolInvocation),
}

/// Steps the fake should fail
#[derive(Debug, Default)]
pub struct Failures {
    pub mount_disk: bool,
    pub volume_letter: bool,
    pub apply_image: bool,
    pub configure_boot: bool,
    pub unmount_system: bool,
    pub dismount: bool,
    /// Programs of this kind fail
    pub tools: Vec<Tool>,
    /// Boot editor calls carrying one of these tokens fail
    pub bcd_tokens: Vec<String>,
    /// The packager leaves a file at its `-f` path before exiting
    pub packager_writes_output: bool,
    /// Stage a directory instead of a file so it cannot be deleted as one
    pub stage_directory: bool,
}

/// Recording `VolumeOps` that stages real files under a scratch directory
pub struct FakeOps {
    root: PathBuf,
    pub fail: Failures,
    events: RefCell<Vec<Event>>,
}

fn failure(tool: Tool, command: String) -> SysError {
    SysError::ToolFailed {
        tool,
        command,
        status: "exit code: 1".to_string(),
        stderr: "simulated failure".to_string(),
    }
}

impl FakeOps {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fail: Failures::default(),
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn with_failures(root: &Path, fail: Failures) -> Self {
        Self {
            fail,
            ..Self::new(root)
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn programs(&self, tool: Tool) -> Vec<ToolInvocation> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Program(invocation) if invocation.tool == tool => Some(invocation.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|&event| matches(event)).count()
    }

    pub fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events.borrow().iter().position(matches)
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

impl VolumeOps for FakeOps {
    fn blank_vhd(&self, _profile: &DeviceProfile) -> ffu_sys::Result<PathBuf> {
        let vhd = self.root.join("staging.vhdx");
        if self.fail.stage_directory {
            fs::create_dir_all(&vhd)?;
        } else {
            fs::write(&vhd, b"vhdx")?;
        }
        self.record(Event::BlankVhd(vhd.clone()));
        Ok(vhd)
    }

    fn mount_virtual_disk(&self, vhd: &Path, _read_only: bool) -> ffu_sys::Result<DiskId> {
        self.record(Event::MountDisk(vhd.to_path_buf()));
        if self.fail.mount_disk {
            return Err(failure(Tool::Shell, "Mount-VHD".to_string()));
        }
        Ok(STAGED_DISK)
    }

    fn volume_letter(&self, disk: DiskId) -> ffu_sys::Result<DriveLetter> {
        self.record(Event::VolumeLetter(disk));
        if self.fail.volume_letter {
            return Err(SysError::UnexpectedOutput {
                tool: Tool::Shell,
                output: String::new(),
            });
        }
        Ok("E:".parse().expect("valid letter"))
    }

    fn apply_windows_image(
        &self,
        _tool: &Path,
        windows_dvd: &str,
        index: u32,
        target: DriveLetter,
    ) -> ffu_sys::Result<()> {
        self.record(Event::ApplyImage {
            dvd: windows_dvd.to_string(),
            index,
            target,
        });
        if self.fail.apply_image {
            return Err(failure(Tool::ImageApply, "wimlib-imagex.exe apply".to_string()));
        }
        Ok(())
    }

    fn optimize_slabs(&self, volume: DriveLetter) -> ffu_sys::Result<()> {
        self.record(Event::OptimizeSlabs(volume));
        Ok(())
    }

    fn apply_compact_flags(&self, volume: DriveLetter) -> ffu_sys::Result<()> {
        self.record(Event::CompactFlags(volume));
        Ok(())
    }

    fn mount_system_partition(&self, _disk: DiskId, mount: DriveLetter) -> ffu_sys::Result<()> {
        self.record(Event::MountSystem(mount));
        Ok(())
    }

    fn configure_boot_manager(
        &self,
        volume: DriveLetter,
        system: DriveLetter,
    ) -> ffu_sys::Result<()> {
        self.record(Event::ConfigureBoot { volume, system });
        if self.fail.configure_boot {
            return Err(failure(Tool::BootFiles, "bcdboot.exe".to_string()));
        }
        Ok(())
    }

    fn unmount_system_partition(&self, _disk: DiskId, mount: DriveLetter) -> ffu_sys::Result<()> {
        self.record(Event::UnmountSystem(mount));
        if self.fail.unmount_system {
            return Err(failure(Tool::Shell, "Remove-PartitionAccessPath".to_string()));
        }
        Ok(())
    }

    fn dismount_virtual_disk(&self, vhd: &Path) -> ffu_sys::Result<()> {
        self.record(Event::Dismount(vhd.to_path_buf()));
        if self.fail.dismount {
            return Err(failure(Tool::Shell, "Dismount-VHD".to_string()));
        }
        Ok(())
    }

    fn run_program(&self, invocation: &ToolInvocation) -> ffu_sys::Result<ToolOutput> {
        self.record(Event::Program(invocation.clone()));

        if invocation.tool == ffu_sys::Tool::FfuPackager
            && self.fail.packager_writes_output
            && let Some(i) = invocation.args.iter().position(|arg| arg == "-f")
        {
            fs::write(&invocation.args[i + 1], b"partial")?;
        }

        let token_failed = invocation.tool == Tool::BcdEditor
            && invocation
                .args
                .iter()
                .any(|arg| self.fail.bcd_tokens.contains(arg));
        if token_failed || self.fail.tools.contains(&invocation.tool) {
            return Err(failure(invocation.tool, invocation.render()));
        }
        Ok(ToolOutput::default())
    }
}

/// Write a profile document into `dir`
pub fn write_profile(
    dir: &Path,
    sector_size: u32,
    platform_ids: &[&str],
    supplemental: &[&str],
) -> PathBuf {
    let items = |values: &[&str]| -> String {
        values
            .iter()
            .map(|value| format!("<string>{}</string>", escape(value)))
            .collect()
    };

    let xml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<DeviceProfile xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <DiskSectorSize>{sector_size}</DiskSectorSize>
  <DiskTotalSize>68719476736</DiskTotalSize>
  <PlatformIDs>{}</PlatformIDs>
  <FFUFileName>device.ffu</FFUFileName>
  <DriverDefinitionPath>\definitions\Desktop\ARM64\Internal\device.txt</DriverDefinitionPath>
  <SupplementaryBCDCommands>{}</SupplementaryBCDCommands>
</DeviceProfile>
"#,
        items(platform_ids),
        items(supplemental)
    );

    let path = dir.join("profile.xml");
    fs::write(&path, xml).expect("write profile");
    path
}

fn escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn options(dir: &Path, profile: PathBuf) -> GenerateOptions {
    GenerateOptions {
        device_profile: profile,
        windows_dvd: "F:".to_string(),
        windows_index: 3,
        driver_pack: "C:\\DriverPack".to_string(),
        output: dir.join("out").display().to_string(),
        windows_ver: "10.0.22621.1".to_string(),
    }
}

pub fn config(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.tool_dir = Some(dir.join("tools"));
    config
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}
