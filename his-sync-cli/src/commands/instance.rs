use his_sync_store::Instance;

use crate::context::Context;
use crate::error::CliResult;

#[allow(clippy::too_many_arguments)]
pub fn add(
    ctx: &Context,
    name: String,
    base_url: String,
    username: String,
    password: String,
    is_source: bool,
    is_destination: bool,
) -> CliResult<Instance> {
    let instance = Instance::new(name, base_url, username, password, is_source, is_destination)?;
    ctx.store.put_instance(&instance)?;
    Ok(instance)
}

pub fn list(ctx: &Context) -> CliResult<Vec<Instance>> {
    Ok(ctx.store.list_instances()?)
}
