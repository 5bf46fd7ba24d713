use anyhow::Context;
use clap::Parser;
use dashstash_core::config::Config;
use dashstash_core::logging;
use dashstash_core::singleton::{acquire_singleton, Singleton};
use dashstash_error::StashError;
use dashstash_hal::{LinuxHal, SystemHal};
use dashstash_workflow::control_loop::ControlLoop;
use dashstash_workflow::{preflight, wiring};
use std::sync::Arc;

pub mod cli;

pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let cfg = load_config(&cli)?;

    if cli.check_config {
        cfg.validate()?;
        cfg.archive_endpoint()?;
        let json = serde_json::to_string_pretty(&cfg).context("Failed to render config")?;
        println!("{json}");
        return Ok(());
    }

    logging::init(&cfg.log.path);
    log::info!("dashstash {} starting", env!("CARGO_PKG_VERSION"));
    cfg.validate()?;

    let _lock = match acquire_singleton(&cfg.lock_path)? {
        Singleton::Held(lock) => lock,
        Singleton::Denied => {
            log::warn!("Another instance holds {}", cfg.lock_path.display());
            return Err(StashError::AlreadyRunning(cfg.lock_path.display().to_string()).into());
        }
    };

    preflight::run(&cfg);

    let hal: Arc<dyn SystemHal> =
        Arc::new(LinuxHal::new().with_platform_root(cfg.gadget.platform_root.clone()));
    let parts = wiring::production_parts(&cfg, Arc::clone(&hal))?;
    let max_cycles = cli.once.then_some(1);
    ControlLoop::new(Arc::new(cfg), hal, parts).run(max_cycles)
}

/// Config file plus CLI overrides.
pub fn load_config(cli: &cli::Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::load(&cli.config)?;
    if let Some(path) = &cli.log_file {
        cfg.log.path = path.clone();
    }
    if let Some(secs) = cli.settle_delay {
        cfg.settle_delay_secs = secs;
    }
    Ok(cfg)
}
