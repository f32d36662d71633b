// SPDX-License-Identifier: GPL-3.0-only

//! Handles produced by disk operations: the OS disk number of an attached
//! virtual disk and the drive letter a volume is reachable through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VolumeIdError;

/// Disk number assigned by the OS when a virtual disk is attached
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiskId(pub u32);

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DiskId {
    type Err = VolumeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(DiskId)
            .map_err(|_| VolumeIdError::DiskId(s.to_string()))
    }
}

/// A drive letter, always rendered as `X:`
///
/// Parsing accepts `X`, `x:` and `X:\`; the letter is stored upper-case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DriveLetter(char);

impl DriveLetter {
    /// Mount letter conventionally used for the EFI system partition
    pub const SYSTEM_PARTITION: DriveLetter = DriveLetter('Y');

    pub fn new(letter: char) -> Result<Self, VolumeIdError> {
        if letter.is_ascii_alphabetic() {
            Ok(Self(letter.to_ascii_uppercase()))
        } else {
            Err(VolumeIdError::DriveLetter(letter.to_string()))
        }
    }

    pub fn letter(&self) -> char {
        self.0
    }

    /// Root directory of the volume, e.g. `E:\`
    pub fn root(&self) -> String {
        format!("{}:\\", self.0)
    }

    /// Join a relative Windows path onto the volume, e.g. `E:\Windows`
    pub fn join(&self, relative: &str) -> String {
        format!("{}:\\{}", self.0, relative.trim_start_matches('\\'))
    }
}

impl fmt::Display for DriveLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.0)
    }
}

impl FromStr for DriveLetter {
    type Err = VolumeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed.strip_suffix('\\').unwrap_or(trimmed);
        let body = body.strip_suffix(':').unwrap_or(body);

        let mut chars = body.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => {
                Self::new(letter).map_err(|_| VolumeIdError::DriveLetter(s.to_string()))
            }
            _ => Err(VolumeIdError::DriveLetter(s.to_string())),
        }
    }
}

impl TryFrom<String> for DriveLetter {
    type Error = VolumeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DriveLetter> for String {
    fn from(value: DriveLetter) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{DiskId, DriveLetter};

    #[test]
    fn drive_letter_accepts_common_spellings() {
        for raw in ["e", "E", "e:", "E:\\", " E: "] {
            let letter: DriveLetter = raw.parse().unwrap();
            assert_eq!(letter.to_string(), "E:");
        }
    }

    #[test]
    fn drive_letter_rejects_paths_and_digits() {
        assert!("EF:".parse::<DriveLetter>().is_err());
        assert!("1:".parse::<DriveLetter>().is_err());
        assert!("".parse::<DriveLetter>().is_err());
        assert!("C:\\Windows".parse::<DriveLetter>().is_err());
    }

    #[test]
    fn drive_letter_joins_relative_paths() {
        let letter = DriveLetter::new('y').unwrap();
        assert_eq!(letter.root(), "Y:\\");
        assert_eq!(
            letter.join("EFI\\Microsoft\\Boot\\BCD"),
            "Y:\\EFI\\Microsoft\\Boot\\BCD"
        );
        assert_eq!(letter.join("\\Windows"), "Y:\\Windows");
    }

    #[test]
    fn disk_id_parses_tool_output() {
        assert_eq!("3\r\n".parse::<DiskId>().unwrap(), DiskId(3));
        assert!("".parse::<DiskId>().is_err());
    }
}
