// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a device profile
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("cannot read device profile {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed device profile {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("invalid device profile {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Errors raised while reading the pipeline configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VolumeIdError {
    #[error("not a drive letter: {0:?}")]
    DriveLetter(String),

    #[error("not a disk number: {0:?}")]
    DiskId(String),
}
