//! CLI argument parsing for dashstash.

use clap::Parser;
use dashstash_core::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dashstash")]
#[command(version, about = "Shares dashcam and music images with the vehicle over USB and archives clips when the archive is in range")]
pub struct Cli {
    /// Config file (TOML). Missing file means defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log file; overrides `log.path` from the config
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Seconds to wait after the archive becomes reachable; overrides `settle_delay_secs`
    #[arg(long)]
    pub settle_delay: Option<u64>,

    /// Boot, run one maintenance cycle, and exit
    #[arg(long)]
    pub once: bool,

    /// Validate the config, print the effective config as JSON, and exit
    #[arg(long)]
    pub check_config: bool,
}
