//! Phase selection: which of {metadata, tracker, events, aggregate} a
//! given sync_type implies, and how that narrows to the phases an
//! incremental run actually needs (spec.md §4.1 phase order, §4.6 step 5).

use his_sync_detector::DetectionResult;
use his_sync_store::SyncType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Metadata,
    Tracker,
    Events,
    Aggregate,
}

/// Fixed phase order within one Job (spec.md §4.3 step 3 / §5: "metadata
/// must complete before any data phase begins"; data phases run
/// tracker → events → aggregate).
pub const PHASE_ORDER: [Phase; 4] = [Phase::Metadata, Phase::Tracker, Phase::Events, Phase::Aggregate];

/// Phases a sync_type implies (spec.md §3's sync_type enum).
pub fn implied_phases(sync_type: SyncType) -> Vec<Phase> {
    match sync_type {
        SyncType::Metadata => vec![Phase::Metadata],
        SyncType::AggregateData => vec![Phase::Aggregate],
        SyncType::Events => vec![Phase::Events],
        SyncType::Tracker => vec![Phase::Tracker],
        SyncType::AggregateMetadata => vec![Phase::Metadata, Phase::Aggregate],
        SyncType::AllData => vec![Phase::Tracker, Phase::Events, Phase::Aggregate],
        SyncType::Complete => vec![Phase::Metadata, Phase::Tracker, Phase::Events, Phase::Aggregate],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// `true` for an initial full sync (spec.md §4.6 step 5, INITIAL
    /// lifecycle state); `false` for an incremental run.
    pub initial: bool,
    /// Phases to run, already filtered to `sync_type` and ordered per
    /// [`PHASE_ORDER`].
    pub phases: Vec<Phase>,
}

fn ordered(mut phases: Vec<Phase>) -> Vec<Phase> {
    phases.sort_by_key(|p| PHASE_ORDER.iter().position(|x| x == p).unwrap());
    phases.dedup();
    phases
}

/// Builds the full-sync plan: every phase the sync_type implies, in
/// fixed order.
pub fn full_plan(sync_type: SyncType) -> SyncPlan {
    SyncPlan { initial: true, phases: ordered(implied_phases(sync_type)) }
}

/// Builds the incremental plan: only phases whose change flag is set,
/// intersected with what the sync_type implies. Falls back to a full
/// plan if `detection.has_changes` is true but no specific category was
/// flagged (spec.md §4.6 step 5, "if no specific change is identified
/// but has_changes is true, run a full sync").
pub fn incremental_plan(sync_type: SyncType, detection: &DetectionResult) -> SyncPlan {
    let implied = implied_phases(sync_type);
    let mut phases = Vec::new();
    if detection.metadata_changes && implied.contains(&Phase::Metadata) {
        phases.push(Phase::Metadata);
    }
    if detection.details.tracker.has_changes && implied.contains(&Phase::Tracker) {
        phases.push(Phase::Tracker);
    }
    if detection.details.events.has_changes && implied.contains(&Phase::Events) {
        phases.push(Phase::Events);
    }
    if detection.details.aggregate.has_changes && implied.contains(&Phase::Aggregate) {
        phases.push(Phase::Aggregate);
    }

    if phases.is_empty() && detection.has_changes {
        return full_plan(sync_type);
    }

    SyncPlan { initial: false, phases: ordered(phases) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use his_sync_detector::{CategoryChange, ChangeDetails};

    fn detection(metadata: bool, aggregate: bool, events: bool, tracker: bool) -> DetectionResult {
        DetectionResult {
            has_changes: metadata || aggregate || events || tracker,
            metadata_changes: metadata,
            data_changes: aggregate || events || tracker,
            details: ChangeDetails {
                metadata: if metadata { vec!["users".into()] } else { vec![] },
                aggregate: CategoryChange { has_changes: aggregate, count: aggregate as u64 },
                events: CategoryChange { has_changes: events, count: events as u64 },
                tracker: CategoryChange { has_changes: tracker, count: tracker as u64 },
            },
        }
    }

    #[test]
    fn full_plan_respects_phase_order() {
        let plan = full_plan(SyncType::Complete);
        assert_eq!(plan.phases, vec![Phase::Metadata, Phase::Tracker, Phase::Events, Phase::Aggregate]);
        assert!(plan.initial);
    }

    #[test]
    fn incremental_plan_only_includes_changed_categories() {
        let plan = incremental_plan(SyncType::Complete, &detection(true, false, true, false));
        assert_eq!(plan.phases, vec![Phase::Metadata, Phase::Events]);
        assert!(!plan.initial);
    }

    #[test]
    fn incremental_plan_falls_back_to_full_when_unspecific() {
        let mut detection = detection(false, false, false, false);
        detection.has_changes = true;
        let plan = incremental_plan(SyncType::Complete, &detection);
        assert!(plan.initial);
        assert_eq!(plan.phases, vec![Phase::Metadata, Phase::Tracker, Phase::Events, Phase::Aggregate]);
    }

    #[test]
    fn plan_narrows_to_sync_type() {
        let plan = incremental_plan(SyncType::AggregateData, &detection(true, true, true, true));
        assert_eq!(plan.phases, vec![Phase::Aggregate]);
    }
}
