pub mod auto_sync;
pub mod cleanup;
pub mod config;
pub mod instance;
pub mod test_sync;

use uuid::Uuid;

use crate::error::{CliError, CliResult};
use crate::context::Context;
use his_sync_store::{ExecutionMode, SyncConfiguration};

/// Resolves the set of configurations a subcommand should act on: the
/// named one if `--config-id` was given, otherwise every configuration
/// currently eligible for automatic execution (spec.md §6: "all default
/// to operating on every eligible configuration when the optional id is
/// omitted").
pub fn eligible_configurations(ctx: &Context, config_id: Option<Uuid>) -> CliResult<Vec<SyncConfiguration>> {
    if let Some(id) = config_id {
        let config = ctx.store.get_configuration(id).map_err(|_| CliError::NoSuchConfiguration(id))?;
        return Ok(vec![config]);
    }
    let configs: Vec<SyncConfiguration> = ctx
        .store
        .list_configurations()?
        .into_iter()
        .filter(|c| c.active && c.execution_mode == ExecutionMode::Automatic)
        .collect();
    if configs.is_empty() {
        return Err(CliError::NoEligibleConfigurations);
    }
    Ok(configs)
}
