//! Drives a [`SyncPlan`]'s phases against one [`Job`], in the fixed
//! order metadata → tracker → events → aggregate (spec.md §4.3).

mod error;
mod options;

pub use error::{OrchestratorError, OrchestratorResult};
pub use options::JobOptions;

use his_sync_client::Dhis2Client;
use his_sync_data::{run_aggregate, run_events, run_tracker};
use his_sync_lifecycle::{Phase, SyncPlan};
use his_sync_metadata::run_families;
use his_sync_store::{Job, JobStatus};

/// Runs every phase in `plan`, updating `job`'s counters and log as it
/// goes, and sets its final status (spec.md §4.3, §4.4). Returns `Ok`
/// even when the job ends FAILED: a failed Job is a normal outcome, not
/// an orchestrator error. `Err` is reserved for bugs in the pipelines
/// themselves that escape their own error handling.
pub async fn run_job(
    source: &dyn Dhis2Client,
    destination: &dyn Dhis2Client,
    job: &mut Job,
    plan: &SyncPlan,
    options: &JobOptions,
) -> OrchestratorResult<()> {
    job.start();

    if let Err(err) = probe_both(source, destination).await {
        job.log_line(format!("✗ probe failed: {err}"));
        job.finish(JobStatus::Failed);
        job.last_error = Some(err.to_string());
        return Ok(());
    }

    let phases_requested = plan.phases.len() as u32;
    let mut catastrophic_failures = 0u32;
    let errors_before = job.error_count;

    for phase in &plan.phases {
        match run_phase(source, destination, *phase, options, job).await {
            Ok(()) => {}
            Err(err) => {
                catastrophic_failures += 1;
                job.error_count += 1;
                job.log_line(format!("✗ {phase:?} phase failed: {err}"));
                tracing::error!(?phase, error = %err, "phase failed catastrophically");
            }
        }
    }

    let status = if phases_requested > 0 && catastrophic_failures == phases_requested {
        JobStatus::Failed
    } else if job.error_count > errors_before {
        JobStatus::CompletedWithWarnings
    } else {
        JobStatus::Completed
    };

    job.log_line(format!(
        "Job summary: phases={phases_requested} processed={} success={} errors={} warnings={}",
        job.processed_items, job.success_count, job.error_count, job.warning_count
    ));
    job.finish(status);

    Ok(())
}

async fn probe_both(source: &dyn Dhis2Client, destination: &dyn Dhis2Client) -> Result<(), his_sync_client::ClientError> {
    source.probe().await?;
    destination.probe().await?;
    Ok(())
}

async fn run_phase(
    source: &dyn Dhis2Client,
    destination: &dyn Dhis2Client,
    phase: Phase,
    options: &JobOptions,
    job: &mut Job,
) -> OrchestratorResult<()> {
    match phase {
        Phase::Metadata => {
            run_families(source, destination, &options.families, options.metadata, job).await?;
        }
        Phase::Tracker => {
            let outcome = run_tracker(source, destination, &options.tracker).await?;
            job.success_count += outcome.tracked_entity_counts.created
                + outcome.tracked_entity_counts.updated
                + outcome.enrollment_counts.created
                + outcome.enrollment_counts.updated
                + outcome.event_counts.created
                + outcome.event_counts.updated;
            job.error_count += outcome.tracked_entity_counts.errors + outcome.enrollment_counts.errors + outcome.event_counts.errors;
            job.warning_count +=
                outcome.tracked_entity_counts.warnings + outcome.enrollment_counts.warnings + outcome.event_counts.warnings;
            job.set_progress(job.processed_items + outcome.tracked_entities, job.total_items + outcome.tracked_entities);
            job.log_line(format!(
                "✓ tracker: programs={} entities={} enrollments={} events={}{}",
                outcome.programs_processed,
                outcome.tracked_entities,
                outcome.enrollments,
                outcome.events,
                if outcome.used_legacy_fallback { " (legacy fallback)" } else { "" }
            ));
        }
        Phase::Events => {
            let outcome = run_events(source, destination, &options.events).await?;
            job.success_count += outcome.counts.created + outcome.counts.updated;
            job.error_count += outcome.counts.errors;
            job.warning_count += outcome.counts.warnings;
            job.set_progress(job.processed_items + outcome.source_count, job.total_items + outcome.source_count);
            job.log_line(format!(
                "✓ events: programs={} Source={} | Created={}, Updated={} | Errors={}, Warnings={}",
                outcome.programs_processed, outcome.source_count, outcome.counts.created, outcome.counts.updated, outcome.counts.errors, outcome.counts.warnings
            ));
        }
        Phase::Aggregate => {
            let outcome = run_aggregate(source, destination, &options.aggregate).await?;
            job.success_count += outcome.counts.created + outcome.counts.updated;
            job.error_count += outcome.counts.errors;
            job.warning_count += outcome.counts.warnings;
            job.set_progress(job.processed_items + outcome.source_count, job.total_items + outcome.source_count);
            job.log_line(format!(
                "✓ aggregate: Source={} | Created={}, Updated={} | Errors={}, Warnings={}",
                outcome.source_count, outcome.counts.created, outcome.counts.updated, outcome.counts.errors, outcome.counts.warnings
            ));
        }
    }
    Ok(())
}
