use serde::{Deserialize, Serialize};

/// Mirrors spec.md §3's `import_strategy` enum, rendered for the
/// `importStrategy` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStrategy {
    CreateOnly,
    UpdateOnly,
    CreateAndUpdate,
    Delete,
}

impl ImportStrategy {
    pub fn as_param(self) -> &'static str {
        match self {
            ImportStrategy::CreateOnly => "CREATE",
            ImportStrategy::UpdateOnly => "UPDATE",
            ImportStrategy::CreateAndUpdate => "CREATE_AND_UPDATE",
            ImportStrategy::Delete => "DELETE",
        }
    }
}

/// Mirrors spec.md §3's `merge_mode` enum, rendered for `mergeMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    Replace,
    Merge,
}

impl MergeMode {
    pub fn as_param(self) -> &'static str {
        match self {
            MergeMode::Replace => "REPLACE",
            MergeMode::Merge => "MERGE",
        }
    }
}

/// System-info probe response, used both for reachability checks
/// (spec.md §4.3 step 2) and to detect the server version on first probe
/// (spec.md §3, Instance lifecycle).
#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub version: Option<String>,
    #[serde(rename = "serverDate")]
    pub server_date: Option<String>,
}

/// The `pager` sub-object DHIS2-style list endpoints return, used by the
/// change detector (spec.md §4.5) to read `pager.total` off a
/// `pageSize=1` probe.
#[derive(Debug, Clone, Deserialize)]
pub struct Pager {
    pub total: u64,
    pub page: Option<u64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u64>,
}
