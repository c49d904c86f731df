use his_sync_data::{AggregateOptions, EventOptions, TrackerOptions};
use his_sync_metadata::{Family, PipelineOptions};

/// Everything [`crate::run_job`] needs beyond the two clients: which
/// metadata families to drive and how each pipeline should be
/// parameterized (spec.md §6's per-configuration knobs).
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub families: Vec<Family>,
    pub metadata: PipelineOptions,
    pub aggregate: AggregateOptions,
    pub events: EventOptions,
    pub tracker: TrackerOptions,
}
