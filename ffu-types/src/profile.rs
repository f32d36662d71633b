// SPDX-License-Identifier: GPL-3.0-only

//! Device profile model
//!
//! Profiles are XML documents in the shape written by the .NET
//! `XmlSerializer`: one element per field, list fields wrapped in one
//! `<string>` element per entry.
//!
//! ```xml
//! <DeviceProfile>
//!   <DiskSectorSize>4096</DiskSectorSize>
//!   <FFUFileName>device.ffu</FFUFileName>
//!   <PlatformIDs><string>ABC&amp;123</string></PlatformIDs>
//!   <SupplementaryBCDCommands />
//!   <DriverDefinitionPath>\definitions\device.txt</DriverDefinitionPath>
//! </DeviceProfile>
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::ProfileError;

/// Staging disk size used when a profile does not carry `DiskTotalSize` (32 GiB)
pub const DEFAULT_DISK_TOTAL_SIZE: u64 = 32 * 1024 * 1024 * 1024;

/// Imaging parameters of a target device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename = "DeviceProfile")]
pub struct DeviceProfile {
    /// Physical and logical sector size in bytes
    #[serde(rename = "DiskSectorSize")]
    pub disk_sector_size: u32,

    /// Maximum size of the staging virtual disk in bytes
    #[serde(rename = "DiskTotalSize", default = "default_disk_total_size")]
    pub disk_total_size: u64,

    #[serde(rename = "PlatformIDs", default, deserialize_with = "string_list")]
    pub platform_ids: Vec<String>,

    #[serde(rename = "FFUFileName")]
    pub ffu_file_name: String,

    /// Appended verbatim to the driver pack root
    #[serde(rename = "DriverDefinitionPath")]
    pub driver_definition_path: String,

    /// Raw argument fragments for the boot-configuration editor, in execution order
    #[serde(
        rename = "SupplementaryBCDCommands",
        default,
        deserialize_with = "string_list"
    )]
    pub supplementary_bcd_commands: Vec<String>,
}

fn default_disk_total_size() -> u64 {
    DEFAULT_DISK_TOTAL_SIZE
}

#[derive(Deserialize)]
struct StringList {
    #[serde(rename = "string", default)]
    items: Vec<String>,
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    StringList::deserialize(deserializer).map(|list| list.items)
}

impl DeviceProfile {
    /// Read, parse and validate a profile document
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let profile = Self::parse(&raw).map_err(|source| ProfileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        profile.validate().map_err(|reason| ProfileError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(profile)
    }

    /// Parse a profile document without validating field values
    pub fn parse(raw: &str) -> Result<Self, quick_xml::DeError> {
        // XmlSerializer output usually starts with a UTF-8 byte order mark.
        quick_xml::de::from_str(raw.trim_start_matches('\u{feff}'))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.disk_sector_size == 0 {
            return Err("DiskSectorSize must be positive".to_string());
        }
        if self.disk_total_size == 0 {
            return Err("DiskTotalSize must be positive".to_string());
        }
        if self.ffu_file_name.trim().is_empty() {
            return Err("FFUFileName must not be empty".to_string());
        }
        Ok(())
    }

    /// Cluster size handed to the packaging tool: four sectors
    pub fn cluster_size(&self) -> u64 {
        u64::from(self.disk_sector_size) * 4
    }

    /// Platform identifiers as a single `;`-separated token
    pub fn joined_platform_ids(&self) -> String {
        self.platform_ids.join(";")
    }

    pub fn has_supplemental_boot_commands(&self) -> bool {
        !self.supplementary_bcd_commands.is_empty()
    }
}
