// SPDX-License-Identifier: GPL-3.0-only

//! FFU generation
//!
//! Drives a staging virtual disk through the fixed build sequence: stage,
//! mount, apply the Windows image, configure boot, inject drivers, dismount,
//! package and clean up. All disk work goes through [`ffu_sys::VolumeOps`].

pub mod error;
pub mod ledger;
pub mod logging;
pub mod mounts;
pub mod pipeline;

pub use error::{BuildError, Stage};
pub use ledger::{Ledger, StagingRecord, recover};
pub use pipeline::{BuildOutcome, Pipeline};
