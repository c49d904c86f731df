//! HTTP client for the hierarchical health-information server API.
//!
//! One [`HttpDhis2Client`] is built per [`Endpoint`] and reused across
//! calls; pipelines depend on the [`Dhis2Client`] trait rather than the
//! concrete type so tests can swap in an in-memory fake.

mod client;
mod endpoint;
mod error;
mod report;
mod types;

pub use client::{
    AggregateQuery, Dhis2Client, EventQuery, HttpDhis2Client, MetadataQuery, TrackerBundle, TrackerQuery,
};
pub use endpoint::{canonicalize_base_url, Endpoint};
pub use error::{ClientError, ClientResult};
pub use report::{ImportCounts, ImportReport, TrackerImportReport};
pub use types::{Pager, SystemInfo};
