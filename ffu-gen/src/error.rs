// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::path::PathBuf;

use ffu_sys::SysError;
use ffu_types::ProfileError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Steps of the build, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Preflight,
    LoadProfile,
    StageDisk,
    MountDisk,
    ApplyImage,
    Optimize,
    CompactFlags,
    ConfigureBoot,
    SupplementalBoot,
    InjectDrivers,
    DismountDisk,
    PackageFfu,
    Cleanup,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Preflight => "preflight",
            Stage::LoadProfile => "load profile",
            Stage::StageDisk => "stage disk",
            Stage::MountDisk => "mount disk",
            Stage::ApplyImage => "apply base image",
            Stage::Optimize => "optimize",
            Stage::CompactFlags => "apply compression flags",
            Stage::ConfigureBoot => "configure boot",
            Stage::SupplementalBoot => "supplemental boot commands",
            Stage::InjectDrivers => "inject drivers",
            Stage::DismountDisk => "dismount disk",
            Stage::PackageFfu => "package FFU",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal error of a build, attributed to the stage that failed
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Some components could not be found.")]
    Preflight,

    #[error("load profile: {0}")]
    ProfileLoad(#[from] ProfileError),

    #[error("stage disk: {0}")]
    Staging(#[source] SysError),

    #[error("{stage}: mount failed: {source}")]
    Mount {
        stage: Stage,
        #[source]
        source: SysError,
    },

    #[error("{stage}: unmount failed: {source}")]
    Unmount {
        stage: Stage,
        #[source]
        source: SysError,
    },

    #[error("{stage}: {source}")]
    ExternalTool {
        stage: Stage,
        #[source]
        source: SysError,
    },

    #[error("supplemental boot commands failed: {}", .failed.join(", "))]
    BootCommands {
        failed: Vec<String>,
        /// Error of the first failing command
        #[source]
        source: SysError,
    },

    #[error("package FFU: {0}")]
    Packaging(#[source] SysError),

    #[error("cleanup: failed to delete staging disk {path:?}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger {path:?}: {reason}")]
    Ledger { path: PathBuf, reason: String },
}

impl BuildError {
    pub fn stage(&self) -> Stage {
        match self {
            BuildError::Preflight => Stage::Preflight,
            BuildError::ProfileLoad(_) => Stage::LoadProfile,
            BuildError::Staging(_) => Stage::StageDisk,
            BuildError::Mount { stage, .. }
            | BuildError::Unmount { stage, .. }
            | BuildError::ExternalTool { stage, .. } => *stage,
            BuildError::BootCommands { .. } => Stage::SupplementalBoot,
            BuildError::Packaging(_) => Stage::PackageFfu,
            BuildError::Cleanup { .. } | BuildError::Ledger { .. } => Stage::Cleanup,
        }
    }

    pub(crate) fn tool(stage: Stage) -> impl FnOnce(SysError) -> BuildError {
        move |source| BuildError::ExternalTool { stage, source }
    }

    pub(crate) fn mount(stage: Stage) -> impl FnOnce(SysError) -> BuildError {
        move |source| BuildError::Mount { stage, source }
    }

    pub(crate) fn unmount(stage: Stage) -> impl FnOnce(SysError) -> BuildError {
        move |source| BuildError::Unmount { stage, source }
    }
}
