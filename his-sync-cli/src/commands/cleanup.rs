use his_sync_client::canonicalize_base_url;

use crate::context::Context;
use crate::error::CliResult;

/// Re-canonicalizes every stored instance's base URL (spec.md §6: "exactly
/// one trailing separator ... normalized on save"). Catches URLs that
/// predate a canonicalization change, or were written directly to the
/// store outside the CLI.
pub fn run(ctx: &Context, dry_run: bool) -> CliResult<usize> {
    let mut changed = 0usize;
    for mut instance in ctx.store.list_instances()? {
        let canonical = canonicalize_base_url(&instance.base_url);
        if canonical == instance.base_url {
            continue;
        }
        changed += 1;
        tracing::info!(instance = %instance.name, from = %instance.base_url, to = %canonical, dry_run, "url needs normalization");
        if !dry_run {
            instance.base_url = canonical;
            ctx.store.put_instance(&instance)?;
        }
    }
    Ok(changed)
}
