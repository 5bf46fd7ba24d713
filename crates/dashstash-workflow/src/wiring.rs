//! Production collaborators, chosen from configuration.

use crate::control_loop::LoopParts;
use anyhow::{Context, Result};
use dashstash_core::collaborators::{
    ArchiveTransport, CommandKeepAwake, CommandSnapshotter, DisabledTransport, GadgetIdleProbe,
    KeepAwake, LogNotifier, NoKeepAwake, Notifier, RcloneTransport, RsyncTransport,
    SessionHooks, WebhookNotifier,
};
use dashstash_core::config::{Config, TransportKind};
use dashstash_core::reachability::EndpointProbe;
use dashstash_core::status_led::indicator_from_config;
use dashstash_core::waiter::PollWaiter;
use dashstash_error::StashError;
use dashstash_hal::SystemHal;
use std::sync::Arc;
use std::time::Duration;

pub fn production_parts(cfg: &Config, hal: Arc<dyn SystemHal>) -> Result<LoopParts> {
    let endpoint = cfg.archive_endpoint()?;
    log::info!(
        "Archive: {} at {}{}",
        endpoint.kind,
        if endpoint.address.is_empty() { "-" } else { endpoint.address.as_str() },
        endpoint.port.map(|p| format!(":{p}")).unwrap_or_default()
    );

    Ok(LoopParts {
        probe: Arc::new(EndpointProbe::new(Arc::clone(&hal), endpoint)),
        waiter: Box::new(PollWaiter::new(cfg.timing.poll_interval())),
        transport: transport(cfg, Arc::clone(&hal))?,
        keep_awake: keep_awake(cfg, Arc::clone(&hal)),
        notifier: notifier(cfg)?,
        snapshotter: Arc::new(CommandSnapshotter::new(
            Arc::clone(&hal),
            cfg.snapshots.command.clone(),
        )),
        idle: Arc::new(GadgetIdleProbe::new(
            hal,
            Duration::from_secs(cfg.snapshots.idle_wait_secs),
        )),
        indicator: indicator_from_config(&cfg.led),
    })
}

fn transport(cfg: &Config, hal: Arc<dyn SystemHal>) -> Result<Arc<dyn ArchiveTransport>> {
    if cfg.archive.kind == TransportKind::Disabled {
        return Ok(Arc::new(DisabledTransport));
    }
    let destination = cfg.archive.destination.clone().ok_or_else(|| {
        StashError::Config(format!(
            "archive.kind = {} requires archive.destination",
            cfg.archive.kind
        ))
    })?;
    let hooks = SessionHooks {
        connect: cfg.archive.connect_command.clone(),
        disconnect: cfg.archive.disconnect_command.clone(),
    };
    let music = cfg.archive.music_source.clone();
    let transport: Arc<dyn ArchiveTransport> = match cfg.archive.kind {
        TransportKind::SyncToCloud => {
            Arc::new(RcloneTransport::new(hal, destination, music, hooks))
        }
        _ => Arc::new(RsyncTransport::new(hal, destination, music, hooks)),
    };
    Ok(transport)
}

fn keep_awake(cfg: &Config, hal: Arc<dyn SystemHal>) -> Arc<dyn KeepAwake> {
    match (
        &cfg.keep_awake.status_command,
        &cfg.keep_awake.enable_command,
        &cfg.keep_awake.disable_command,
    ) {
        (Some(status), Some(enable), Some(disable)) => Arc::new(CommandKeepAwake::new(
            hal,
            status.clone(),
            enable.clone(),
            disable.clone(),
        )),
        _ => Arc::new(NoKeepAwake),
    }
}

fn notifier(cfg: &Config) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match &cfg.notify.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone()).context("Failed to set up webhook notifications")?,
        ),
        None => Arc::new(LogNotifier),
    };
    Ok(notifier)
}
