// SPDX-License-Identifier: GPL-3.0-only

//! Staging ledger
//!
//! A JSON record of the staging resources a run currently holds. A failed
//! run leaves its staging disk in place; the ledger tells `recover` what to
//! release and delete.

use std::fs;
use std::path::{Path, PathBuf};

use ffu_sys::VolumeOps;
use ffu_types::{DiskId, DriveLetter};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BuildError, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRecord {
    pub run_id: String,
    pub stage: Stage,
    pub staging_disk: Option<PathBuf>,
    pub disk_id: Option<DiskId>,
    pub volume_letter: Option<DriveLetter>,
    pub volume_mounted: bool,
    /// Letter the system partition is mounted on, while it is mounted
    pub system_partition: Option<DriveLetter>,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
    pub updated_at: String,
}

impl StagingRecord {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            stage: Stage::LoadProfile,
            staging_disk: None,
            disk_id: None,
            volume_letter: None,
            volume_mounted: false,
            system_partition: None,
            failed_stage: None,
            error: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub fn state_path(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("firmwaregen-{}.json", run_id))
}

pub fn load(path: &Path) -> Result<StagingRecord, BuildError> {
    let raw = fs::read_to_string(path).map_err(|error| BuildError::Ledger {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    serde_json::from_str(&raw).map_err(|error| BuildError::Ledger {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

pub fn save(path: &Path, record: &StagingRecord) -> Result<(), BuildError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|error| BuildError::Ledger {
            path: dir.to_path_buf(),
            reason: error.to_string(),
        })?;
    }

    let content = serde_json::to_string_pretty(record).map_err(|error| BuildError::Ledger {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;

    fs::write(path, content).map_err(|error| BuildError::Ledger {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

pub fn remove(path: &Path) -> Result<(), BuildError> {
    if path.exists() {
        fs::remove_file(path).map_err(|error| BuildError::Ledger {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;
    }
    Ok(())
}

/// Ledger of one pipeline run; inert when no ledger directory is configured
///
/// Write failures are logged and never fail the build.
#[derive(Debug)]
pub struct Ledger {
    path: Option<PathBuf>,
    record: StagingRecord,
}

impl Ledger {
    pub fn open(dir: Option<&Path>) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self {
            path: dir.map(|dir| state_path(dir, &run_id)),
            record: StagingRecord::new(&run_id),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&self) -> &StagingRecord {
        &self.record
    }

    pub fn update(&mut self, change: impl FnOnce(&mut StagingRecord)) {
        change(&mut self.record);
        self.record.updated_at = chrono::Utc::now().to_rfc3339();

        // Nothing is staged before the disk exists.
        if self.record.staging_disk.is_none() {
            return;
        }
        if let Some(path) = &self.path
            && let Err(e) = save(path, &self.record)
        {
            warn!("Failed to write staging ledger: {}", e);
        }
    }

    pub fn record_failure(&mut self, error: &BuildError) {
        let stage = error.stage();
        let message = error.to_string();
        self.update(|record| {
            record.failed_stage = Some(stage);
            record.error = Some(message);
        });
    }

    /// Drop the ledger file once nothing is left to clean up
    pub fn close(self) {
        if let Some(path) = &self.path
            && let Err(e) = remove(path)
        {
            warn!("Failed to remove staging ledger: {}", e);
        }
    }
}

/// Release and delete what a failed run left behind
///
/// Unmount failures are logged and skipped, since the ledger may describe a
/// mount that was already released; failing to delete the staging disk is
/// an error and keeps the ledger in place.
pub fn recover<O: VolumeOps + ?Sized>(ops: &O, path: &Path) -> Result<StagingRecord, BuildError> {
    let record = load(path)?;
    info!("Recovering run {} (stage: {})", record.run_id, record.stage);

    if let (Some(disk), Some(letter)) = (record.disk_id, record.system_partition)
        && let Err(e) = ops.unmount_system_partition(disk, letter)
    {
        warn!("Failed to unmount system partition {}: {}", letter, e);
    }

    if let Some(vhd) = &record.staging_disk {
        if record.volume_mounted
            && let Err(e) = ops.dismount_virtual_disk(vhd)
        {
            warn!("Failed to dismount staging disk {:?}: {}", vhd, e);
        }

        if vhd.exists() {
            info!("Deleting staging disk {:?}", vhd);
            fs::remove_file(vhd).map_err(|source| BuildError::Cleanup {
                path: vhd.clone(),
                source,
            })?;
        }
    }

    remove(path)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::{Ledger, StagingRecord, load, save, state_path};
    use crate::error::Stage;

    #[test]
    fn persists_and_loads_staging_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = state_path(dir.path(), "run-1");

        let mut record = StagingRecord::new("run-1");
        record.stage = Stage::ApplyImage;
        record.staging_disk = Some(dir.path().join("stage.vhdx"));
        record.disk_id = Some(ffu_types::DiskId(4));
        record.volume_letter = Some("E:".parse().unwrap());
        record.volume_mounted = true;
        save(&path, &record).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, record);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"stage\": \"apply-image\""));
        assert!(raw.contains("\"volume_letter\": \"E:\""));
    }

    #[test]
    fn ledger_is_written_only_once_a_disk_is_staged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::open(Some(dir.path()));
        let path = ledger.path().unwrap().to_path_buf();

        ledger.update(|record| record.stage = Stage::LoadProfile);
        assert!(!path.exists());

        ledger.update(|record| {
            record.stage = Stage::StageDisk;
            record.staging_disk = Some(dir.path().join("stage.vhdx"));
        });
        assert!(path.exists());

        ledger.close();
        assert!(!path.exists());
    }

    #[test]
    fn disabled_ledger_writes_nothing() {
        let mut ledger = Ledger::open(None);
        ledger.update(|record| record.staging_disk = Some("stage.vhdx".into()));
        assert!(ledger.path().is_none());
        assert_eq!(ledger.record().staging_disk, Some("stage.vhdx".into()));
    }
}
