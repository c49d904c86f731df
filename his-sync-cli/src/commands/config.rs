use uuid::Uuid;

use his_sync_store::{ExecutionMode, ImportStrategyKind, MergeModeKind, SyncConfiguration, SyncType};

use crate::context::Context;
use crate::error::CliResult;

#[allow(clippy::too_many_arguments)]
pub fn add(
    ctx: &Context,
    source_id: Uuid,
    destination_id: Uuid,
    sync_type: SyncType,
    import_strategy: ImportStrategyKind,
    merge_mode: MergeModeKind,
    execution_mode: ExecutionMode,
    page_size: u32,
) -> CliResult<SyncConfiguration> {
    let config = SyncConfiguration::new(
        source_id,
        destination_id,
        sync_type,
        import_strategy,
        merge_mode,
        execution_mode,
        page_size,
        None,
        None,
    )?;
    ctx.store.put_configuration(&config)?;
    Ok(config)
}

pub fn list(ctx: &Context) -> CliResult<Vec<SyncConfiguration>> {
    Ok(ctx.store.list_configurations()?)
}
