//! Tracked-entity/enrollment/event replication (spec.md §4.2).

use his_sync_client::{ClientError, Dhis2Client, ImportCounts, MetadataQuery, TrackerBundle, TrackerQuery};
use serde_json::Value;

use crate::chunk::DEFAULT_TRACKER_ORG_UNIT_CAP;
use crate::error::DataResult;

#[derive(Debug, Clone, Default)]
pub struct TrackerOptions {
    /// Programs to sync; empty means "all programs with registration".
    pub programs: Vec<String>,
    pub last_updated_start_date: Option<String>,
    /// spec.md §9, design note 2: a configuration value rather than a
    /// hard-coded constant, defaulting to 10.
    pub org_unit_cap: usize,
}

impl TrackerOptions {
    pub fn new() -> Self {
        Self { org_unit_cap: DEFAULT_TRACKER_ORG_UNIT_CAP, ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerOutcome {
    pub programs_processed: u32,
    pub org_units_capped: Vec<String>,
    pub tracked_entities: u64,
    pub enrollments: u64,
    pub events: u64,
    pub tracked_entity_counts: ImportCounts,
    pub enrollment_counts: ImportCounts,
    pub event_counts: ImportCounts,
    pub conflicts: Vec<String>,
    pub used_legacy_fallback: bool,
}

async fn with_registration_programs(source: &dyn Dhis2Client) -> DataResult<Vec<String>> {
    let programs = source
        .get_metadata(
            "programs",
            &MetadataQuery {
                fields: "id,programType,organisationUnits[id]".into(),
                filter: Some("programType:eq:WITH_REGISTRATION".into()),
                page_size: 1000,
            },
        )
        .await?;
    Ok(programs.iter().filter_map(|p| p.get("id").and_then(Value::as_str).map(str::to_string)).collect())
}

/// Org units associated with `program_id`, capped at `cap` (spec.md §4.2,
/// "§9 design note 2" — the destination cannot handle a wider query).
/// Returns `(org_units, was_capped)`.
async fn program_org_units(source: &dyn Dhis2Client, program_id: &str, cap: usize) -> DataResult<(Vec<String>, bool)> {
    let programs = source
        .get_metadata(
            "programs",
            &MetadataQuery {
                fields: "id,organisationUnits[id]".into(),
                filter: Some(format!("id:eq:{program_id}")),
                page_size: 1,
            },
        )
        .await?;
    let org_units: Vec<String> = programs
        .first()
        .and_then(|p| p.get("organisationUnits"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|ou| ou.get("id").and_then(Value::as_str).map(str::to_string)).collect())
        .unwrap_or_default();

    let was_capped = org_units.len() > cap;
    let capped: Vec<String> = org_units.into_iter().take(cap).collect();
    Ok((capped, was_capped))
}

/// Flattens one tracked-entity-instance payload into parallel lists:
/// the entity itself (with `enrollments` stripped), the enrollments (with
/// `events` stripped), and the events (spec.md §4.2).
fn flatten(tei: Value) -> (Value, Vec<Value>, Vec<Value>) {
    let mut tei = tei;
    let enrollments_raw = tei.get_mut("enrollments").map(Value::take).unwrap_or(Value::Array(vec![]));
    let mut enrollments = Vec::new();
    let mut events = Vec::new();
    if let Value::Array(items) = enrollments_raw {
        for mut enrollment in items {
            if let Some(events_raw) = enrollment.get_mut("events").map(Value::take) {
                if let Value::Array(ev) = events_raw {
                    events.extend(ev);
                }
            }
            enrollments.push(enrollment);
        }
    }
    (tei, enrollments, events)
}

/// For each program with registration, resolves its (capped) org units,
/// fetches tracked-entity instances in a last-updated window with
/// descendant scope, flattens the response, and imports the bundle.
/// Falls back to three sequential legacy POSTs if the combined tracker
/// endpoint rejects the bundle (spec.md §4.2).
pub async fn run_tracker(
    source: &dyn Dhis2Client,
    destination: &dyn Dhis2Client,
    options: &TrackerOptions,
) -> DataResult<TrackerOutcome> {
    let programs = if options.programs.is_empty() {
        with_registration_programs(source).await?
    } else {
        options.programs.clone()
    };
    let cap = if options.org_unit_cap == 0 { DEFAULT_TRACKER_ORG_UNIT_CAP } else { options.org_unit_cap };

    let mut outcome = TrackerOutcome { programs_processed: programs.len() as u32, ..Default::default() };

    for program in &programs {
        let (org_units, was_capped) = program_org_units(source, program, cap).await?;
        if was_capped {
            outcome.org_units_capped.push(program.clone());
            tracing::warn!(program, cap, "tracker org-unit cap reached, truncating selection");
        }

        for org_unit in org_units {
            let query = TrackerQuery {
                program: program.clone(),
                org_unit,
                ou_mode: "DESCENDANTS".to_string(),
                last_updated_start_date: options.last_updated_start_date.clone(),
            };
            let teis = source.get_tracked_entities(&query).await?;

            let mut bundle = TrackerBundle::default();
            for tei in teis {
                let (entity, enrollments, events) = flatten(tei);
                bundle.tracked_entities.push(entity);
                bundle.enrollments.extend(enrollments);
                bundle.events.extend(events);
            }
            outcome.tracked_entities += bundle.tracked_entities.len() as u64;
            outcome.enrollments += bundle.enrollments.len() as u64;
            outcome.events += bundle.events.len() as u64;

            if bundle.tracked_entities.is_empty() && bundle.enrollments.is_empty() && bundle.events.is_empty() {
                continue;
            }

            let report = match destination.post_tracker_bundle(&bundle).await {
                Ok(report) => report,
                Err(ClientError::UnexpectedStatus { .. }) => {
                    outcome.used_legacy_fallback = true;
                    destination.post_tracker_legacy(&bundle).await?
                }
                Err(err) => return Err(err.into()),
            };

            outcome.tracked_entity_counts.add(&report.tracked_entity);
            outcome.enrollment_counts.add(&report.enrollment);
            outcome.event_counts.add(&report.event);
            outcome.conflicts.extend(report.conflicts.iter().cloned());
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_unpacks_enrollments_and_events() {
        let tei = serde_json::json!({
            "trackedEntityInstance": "te1",
            "enrollments": [
                {"enrollment": "en1", "events": [{"event": "ev1"}, {"event": "ev2"}]}
            ]
        });
        let (entity, enrollments, events) = flatten(tei);
        assert_eq!(entity["trackedEntityInstance"], "te1");
        assert!(entity.get("enrollments").is_none());
        assert_eq!(enrollments.len(), 1);
        assert!(enrollments[0].get("events").is_none());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn flatten_handles_entity_with_no_enrollments() {
        let tei = serde_json::json!({"trackedEntityInstance": "te1"});
        let (entity, enrollments, events) = flatten(tei);
        assert_eq!(entity["trackedEntityInstance"], "te1");
        assert!(enrollments.is_empty());
        assert!(events.is_empty());
    }
}
