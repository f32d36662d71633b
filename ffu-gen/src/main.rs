// SPDX-License-Identifier: GPL-3.0-only

//! Command line entry point of the FFU builder

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use ffu_gen::{BuildError, Pipeline, logging, recover};
use ffu_sys::{WindowsVolumeOps, verify_all_components_are_present};
use ffu_types::{GenerateOptions, PipelineConfig};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "firmwaregen")]
#[command(about = "Builds flashable FFU images for Windows devices", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Pipeline configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build an FFU from Windows media, a driver pack and a device profile
    Generate(GenerateArgs),
    /// Verify that the required external tools can be found
    Check,
    /// Release and delete the staging disk of a failed run
    Cleanup {
        /// Ledger file left behind by the failed run
        #[arg(long)]
        ledger: PathBuf,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Device profile XML
    #[arg(long)]
    device_profile: PathBuf,
    /// Windows media root, or an install image file
    #[arg(long)]
    windows_dvd: String,
    /// Image index inside the media
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    windows_index: u32,
    /// Driver pack root directory
    #[arg(long)]
    driver_pack: String,
    /// Directory receiving the FFU
    #[arg(long)]
    output: String,
    /// Windows version tag recorded in the FFU
    #[arg(long)]
    windows_ver: String,
}

impl From<GenerateArgs> for GenerateOptions {
    fn from(args: GenerateArgs) -> Self {
        Self {
            device_profile: args.device_profile,
            windows_dvd: args.windows_dvd,
            windows_index: args.windows_index,
            driver_pack: args.driver_pack,
            output: args.output,
            windows_ver: args.windows_ver,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref());

    let config = PipelineConfig::load_or_default(cli.config.as_deref())
        .context("failed to load pipeline configuration")?;

    match cli.command {
        Command::Check => {
            if !verify_all_components_are_present(&config) {
                bail!(BuildError::Preflight);
            }
            info!("All components are present");
        }
        Command::Generate(args) => {
            if !verify_all_components_are_present(&config) {
                bail!(BuildError::Preflight);
            }

            let options = GenerateOptions::from(args);
            let ops = WindowsVolumeOps::new(&config);
            let outcome = Pipeline::new(&ops, &config).generate(&options)?;

            if let Some(error) = &outcome.cleanup_error {
                warn!("{}", error);
                if let Some(ledger) = &outcome.ledger {
                    warn!(
                        "Run `firmwaregen cleanup --ledger {}` to retry",
                        ledger.display()
                    );
                }
            }
            println!("{}", outcome.ffu_path.display());
        }
        Command::Cleanup { ledger } => {
            let ops = WindowsVolumeOps::new(&config);
            let record = recover(&ops, &ledger)
                .with_context(|| format!("failed to recover from {}", ledger.display()))?;
            info!("Run {} cleaned up", record.run_id);
        }
    }

    Ok(())
}
