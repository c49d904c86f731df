use uuid::Uuid;

use his_sync_store::AutoSyncSettings;

use crate::commands::eligible_configurations;
use crate::context::Context;
use crate::error::CliResult;

/// `start-auto-sync` has nothing to do once the monitor tasks are
/// spawned — the process itself is the daemon. Blocks on Ctrl-C, then
/// stops every configuration it started before returning.
pub async fn run_until_interrupted(ctx: &Context, config_id: Option<Uuid>) -> CliResult<()> {
    let configs = eligible_configurations(ctx, config_id)?;
    for config in &configs {
        match ctx.scheduler.start(config.id).await {
            Ok(()) => tracing::info!(config_id = %config.id, "auto-sync started"),
            Err(err) => tracing::warn!(config_id = %config.id, error = %err, "failed to start auto-sync"),
        }
    }

    tracing::info!("auto-sync running, press ctrl-c to stop");
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");

    for config in &configs {
        if let Err(err) = ctx.scheduler.stop(config.id).await {
            tracing::debug!(config_id = %config.id, error = %err, "nothing to stop");
        }
    }
    Ok(())
}

/// Disables auto-sync for the selected configuration(s) and, best-effort,
/// stops a monitor task if one happens to be live in this same process
/// (the common case when `stop-auto-sync` runs against a daemon started
/// in-process, e.g. under test). A separate CLI invocation has its own
/// in-memory `Scheduler`, so the durable `is_enabled = false` flip is
/// what actually reaches a daemon started by an earlier invocation — its
/// next tick observes the disabled flag and idles.
pub async fn stop(ctx: &Context, config_id: Option<Uuid>) -> CliResult<()> {
    let targets: Vec<_> = match config_id {
        Some(id) => vec![ctx.store.get_auto_sync(id)?.ok_or(crate::error::CliError::NoSuchConfiguration(id))?],
        None => ctx.store.list_auto_sync_enabled()?,
    };
    for mut settings in targets {
        settings.is_enabled = false;
        ctx.store.put_auto_sync(&settings)?;
        match ctx.scheduler.stop(settings.config_id).await {
            Ok(()) => tracing::info!(config_id = %settings.config_id, "auto-sync stopped"),
            Err(err) => tracing::debug!(config_id = %settings.config_id, error = %err, "no live monitor task in this process"),
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn setup(
    ctx: &Context,
    config_id: Uuid,
    interval_secs: u64,
    max_per_hour: u32,
    cooldown_secs: u64,
    delay_secs: u64,
) -> CliResult<()> {
    // Validates the configuration exists before persisting its settings.
    ctx.store.get_configuration(config_id).map_err(|_| crate::error::CliError::NoSuchConfiguration(config_id))?;
    let mut settings = match ctx.store.get_auto_sync(config_id)? {
        Some(existing) => existing,
        None => AutoSyncSettings::new(config_id, interval_secs.max(60))?,
    };
    settings.check_interval_secs = interval_secs.max(60);
    settings.max_syncs_per_hour = max_per_hour;
    settings.cooldown_after_error_secs = cooldown_secs;
    settings.delay_before_sync_secs = delay_secs;
    ctx.store.put_auto_sync(&settings)?;
    tracing::info!(%config_id, "auto-sync settings saved");
    Ok(())
}
