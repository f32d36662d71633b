// SPDX-License-Identifier: GPL-3.0-only

//! Component presence check
//!
//! Run before any staging work so a missing tool is caught before a disk is
//! created. Passing the check does not guarantee later calls succeed.

use std::path::PathBuf;

use ffu_types::PipelineConfig;
use tracing::{debug, error};
use which::which;

/// Resolve the program the pipeline will launch for a tool
///
/// Checks exactly what [`PipelineConfig::tool_path`] hands to the runner: a
/// configured tool directory is authoritative, otherwise a copy in the
/// working directory, then `PATH`.
pub fn locate(config: &PipelineConfig, name: &str) -> Option<PathBuf> {
    let program = config.tool_path(name);
    if program.is_file() {
        return Some(program);
    }
    if config.tool_dir.is_some() {
        return None;
    }

    which(name).ok()
}

/// Required tools that could not be located
pub fn missing_components(config: &PipelineConfig) -> Vec<String> {
    config
        .tools
        .required()
        .into_iter()
        .filter(|name| locate(config, name).is_none())
        .map(str::to_string)
        .collect()
}

pub fn verify_all_components_are_present(config: &PipelineConfig) -> bool {
    let missing = missing_components(config);
    if missing.is_empty() {
        return true;
    }

    for name in &missing {
        debug!(tool = %name, "component not found");
    }
    error!("Some components could not be found.");
    false
}
