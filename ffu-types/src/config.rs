// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration
//!
//! Every value the imaging pipeline would otherwise hardcode lives here so
//! that separate runs can use separate mount letters and staging locations.
//! The on-disk form is TOML; every key is optional.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::volume::DriveLetter;

/// Payload block size handed to the packaging tool
pub const DEFAULT_PAYLOAD_BLOCK_SIZE: u32 = 4000;

/// What happens to the remaining supplemental BCD commands after one fails
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SupplementalPolicy {
    /// Attempt every command, then fail if any of them failed
    #[default]
    RunAll,
    /// Skip the remaining commands after the first failure
    StopOnFirstFailure,
}

/// File names of the external tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolNames {
    pub image_apply: String,
    pub driver_updater: String,
    pub ffu_packager: String,
    pub bcd_editor: String,
    pub boot_files: String,
    pub shell: String,
    pub defrag: String,
    pub compact: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            image_apply: "wimlib-imagex.exe".to_string(),
            driver_updater: "DriverUpdater.exe".to_string(),
            ffu_packager: "Img2Ffu.exe".to_string(),
            bcd_editor: "bcdedit.exe".to_string(),
            boot_files: "bcdboot.exe".to_string(),
            shell: "powershell.exe".to_string(),
            defrag: "defrag.exe".to_string(),
            compact: "compact.exe".to_string(),
        }
    }
}

impl ToolNames {
    /// Tools shipped alongside FirmwareGen rather than with the OS
    pub fn required(&self) -> [&str; 3] {
        [
            self.image_apply.as_str(),
            self.ffu_packager.as_str(),
            self.driver_updater.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where the system partition is mounted during boot configuration
    pub system_partition_letter: DriveLetter,
    pub payload_block_size: u32,
    /// Directory for blank staging disks; the OS temp dir when unset
    pub staging_dir: Option<PathBuf>,
    /// Directory searched for the external tools before `PATH`
    pub tool_dir: Option<PathBuf>,
    /// When set, a ledger of held staging resources is kept here
    pub ledger_dir: Option<PathBuf>,
    pub supplemental_policy: SupplementalPolicy,
    /// BCD edits applied as part of boot-manager setup
    pub boot_manager_commands: Vec<String>,
    pub tools: ToolNames,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_partition_letter: DriveLetter::SYSTEM_PARTITION,
            payload_block_size: DEFAULT_PAYLOAD_BLOCK_SIZE,
            staging_dir: None,
            tool_dir: None,
            ledger_dir: None,
            supplemental_policy: SupplementalPolicy::default(),
            boot_manager_commands: vec![
                "/set {default} testsigning on".to_string(),
                "/set {default} nointegritychecks on".to_string(),
            ],
            tools: ToolNames::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Program path for a tool
    ///
    /// Inside `tool_dir` when configured. Otherwise a copy in the working
    /// directory wins over the bare name, which is left to `PATH` lookup.
    pub fn tool_path(&self, name: &str) -> PathBuf {
        match &self.tool_dir {
            Some(dir) => dir.join(name),
            None if Path::new(name).is_file() => Path::new(".").join(name),
            None => PathBuf::from(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{PipelineConfig, SupplementalPolicy};
    use crate::error::ConfigError;

    #[test]
    fn defaults_match_stock_tooling() {
        let config = PipelineConfig::default();
        assert_eq!(config.system_partition_letter.to_string(), "Y:");
        assert_eq!(config.payload_block_size, 4000);
        assert_eq!(config.supplemental_policy, SupplementalPolicy::RunAll);
        assert_eq!(
            config.tools.required(),
            ["wimlib-imagex.exe", "Img2Ffu.exe", "DriverUpdater.exe"]
        );
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmwaregen.toml");
        fs::write(
            &path,
            r#"
system_partition_letter = "s"
supplemental_policy = "stop-on-first-failure"
boot_manager_commands = []

[tools]
ffu_packager = "img2ffu-nightly.exe"
"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.system_partition_letter.to_string(), "S:");
        assert_eq!(
            config.supplemental_policy,
            SupplementalPolicy::StopOnFirstFailure
        );
        assert!(config.boot_manager_commands.is_empty());
        assert_eq!(config.tools.ffu_packager, "img2ffu-nightly.exe");
        assert_eq!(config.tools.driver_updater, "DriverUpdater.exe");
        assert_eq!(config.payload_block_size, 4000);
    }

    #[test]
    fn invalid_letter_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "system_partition_letter = \"YZ\"\n").unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn tool_path_prefers_tool_dir() {
        let mut config = PipelineConfig::default();
        assert_eq!(
            config.tool_path("no-such-tool.exe"),
            std::path::PathBuf::from("no-such-tool.exe")
        );

        config.tool_dir = Some("/opt/firmwaregen".into());
        assert_eq!(
            config.tool_path("Img2Ffu.exe"),
            std::path::PathBuf::from("/opt/firmwaregen/Img2Ffu.exe")
        );
    }
}
