//! Aggregate, event and tracker data replication (spec.md §4.2).

pub mod aggregate;
pub mod chunk;
pub mod error;
pub mod events;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::{run_aggregate, AggregateOptions, AggregateOutcome};
pub use chunk::{into_chunks, DEFAULT_AGGREGATE_CHUNK, DEFAULT_EVENT_CHUNK, DEFAULT_TRACKER_ORG_UNIT_CAP};
pub use error::{DataError, DataResult};
pub use events::{run_events, EventOptions, EventOutcome};
pub use tracker::{run_tracker, TrackerOptions, TrackerOutcome};
