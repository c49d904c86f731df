//! Dependency-ordered metadata replication (spec.md §4.1).
//!
//! [`families`] resolves the family DAG into an execution order;
//! [`resources`] is the closed set of resource descriptors driven by
//! [`pipeline::run_families`]; [`sanitize`] implements the cross-reference
//! cleanup applied before each POST.

pub mod error;
pub mod families;
pub mod pipeline;
pub mod resources;
pub mod sanitize;

pub use error::{MetadataError, MetadataResult};
pub use families::{resolve_order, Family};
pub use pipeline::{load_destination_directory, run_families, sync_resource, PipelineOptions, ResourceOutcome};
pub use resources::{all_descriptors, known_resource_names, resources_in_order, ResourceDescriptor, Sanitizer};
pub use sanitize::{sanitize_sharing, sanitize_user_roles, sanitize_visualization_refs, DestinationDirectory, SanitizeReport};
