use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// The canonical counter tuple every import report shape normalizes to.
///
/// Mirrors spec.md §4.1's result-aggregation contract: `created + updated +
/// ignored` should equal the number of objects sent, with `errors` covering
/// anything the destination rejected outright.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportCounts {
    pub created: u64,
    pub updated: u64,
    pub ignored: u64,
    pub deleted: u64,
    pub errors: u64,
    pub warnings: u64,
}

impl ImportCounts {
    pub fn add(&mut self, other: &ImportCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.ignored += other.ignored;
        self.deleted += other.deleted;
        self.errors += other.errors;
        self.warnings += other.warnings;
    }

    pub fn total(&self) -> u64 {
        self.created + self.updated + self.ignored + self.deleted
    }
}

/// One metadata/data import report from the destination.
///
/// The destination returns either a legacy `importSummary` shape or a
/// modern `typeReports` shape (spec.md §6, §9). Both are parsed into this
/// sum type and then normalized via [`ImportReport::counts`] /
/// [`ImportReport::conflicts`] so downstream code never has to branch on
/// server version.
#[derive(Debug, Clone)]
pub enum ImportReport {
    Legacy {
        counts: ImportCounts,
        conflicts: Vec<String>,
    },
    Modern {
        counts: ImportCounts,
        conflicts: Vec<String>,
    },
}

impl ImportReport {
    pub fn counts(&self) -> ImportCounts {
        match self {
            ImportReport::Legacy { counts, .. } | ImportReport::Modern { counts, .. } => *counts,
        }
    }

    pub fn conflicts(&self) -> &[String] {
        match self {
            ImportReport::Legacy { conflicts, .. } | ImportReport::Modern { conflicts, .. } => conflicts,
        }
    }

    /// Parses either `{response: {importSummary: ...}}` or
    /// `{response: {typeReports: [...]}}`, falling back to treating the
    /// whole body as the `response` object (some endpoints omit the
    /// wrapper on a bare import).
    pub fn parse(body: &Value, url: &str) -> Result<Self, ClientError> {
        let response = body.get("response").unwrap_or(body);

        if let Some(summary) = response.get("importSummary").or_else(|| response.get("importSummaries").and_then(|v| v.get(0))) {
            return Ok(Self::from_legacy_summary(summary));
        }

        if let Some(reports) = response.get("typeReports").and_then(Value::as_array) {
            return Ok(Self::from_type_reports(reports));
        }

        // A lone object with importCount/conflicts, no wrapper.
        if response.get("importCount").is_some() {
            return Ok(Self::from_legacy_summary(response));
        }

        Err(ClientError::UnrecognizedReportShape { url: url.to_string() })
    }

    fn from_legacy_summary(summary: &Value) -> Self {
        let count = summary.get("importCount").cloned().unwrap_or(Value::Null);
        let counts = ImportCounts {
            created: field_u64(&count, "imported"),
            updated: field_u64(&count, "updated"),
            ignored: field_u64(&count, "ignored"),
            deleted: field_u64(&count, "deleted"),
            errors: 0,
            warnings: 0,
        };
        let conflicts = summary
            .get("conflicts")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(describe_conflict).collect())
            .unwrap_or_default();
        let mut counts = counts;
        counts.errors = conflicts.len() as u64;
        ImportReport::Legacy { counts, conflicts }
    }

    fn from_type_reports(reports: &[Value]) -> Self {
        let mut counts = ImportCounts::default();
        let mut conflicts = Vec::new();

        for report in reports {
            let stats = report.get("stats").cloned().unwrap_or(Value::Null);
            counts.created += field_u64(&stats, "created");
            counts.updated += field_u64(&stats, "updated");
            counts.ignored += field_u64(&stats, "ignored");
            counts.deleted += field_u64(&stats, "deleted");

            if let Some(object_reports) = report.get("objectReports").and_then(Value::as_array) {
                for obj in object_reports {
                    if let Some(errors) = obj.get("errorReports").and_then(Value::as_array) {
                        for err in errors {
                            conflicts.push(describe_conflict(err));
                        }
                    }
                }
            }
        }
        counts.errors = conflicts.len() as u64;
        ImportReport::Modern { counts, conflicts }
    }
}

fn field_u64(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn describe_conflict(entry: &Value) -> String {
    if let Some(s) = entry.as_str() {
        return s.to_string();
    }
    let object = entry.get("object").and_then(Value::as_str).unwrap_or("?");
    let message = entry
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| entry.get("value").and_then(Value::as_str))
        .unwrap_or("unspecified error");
    format!("{object}: {message}")
}

/// A tracker bundle import report, per spec.md §6:
/// `{bundleReport: {typeReportMap: {TRACKED_ENTITY, ENROLLMENT, EVENT}}}`.
#[derive(Debug, Clone, Default)]
pub struct TrackerImportReport {
    pub tracked_entity: ImportCounts,
    pub enrollment: ImportCounts,
    pub event: ImportCounts,
    pub conflicts: Vec<String>,
}

impl TrackerImportReport {
    pub fn parse(body: &Value) -> Self {
        let mut report = TrackerImportReport::default();
        let Some(map) = body
            .get("bundleReport")
            .and_then(|b| b.get("typeReportMap"))
        else {
            return report;
        };

        if let Some(te) = map.get("TRACKED_ENTITY") {
            let parsed = ImportReport::from_type_reports(std::slice::from_ref(te));
            report.tracked_entity = parsed.counts();
            report.conflicts.extend(parsed.conflicts().iter().cloned());
        }
        if let Some(en) = map.get("ENROLLMENT") {
            let parsed = ImportReport::from_type_reports(std::slice::from_ref(en));
            report.enrollment = parsed.counts();
            report.conflicts.extend(parsed.conflicts().iter().cloned());
        }
        if let Some(ev) = map.get("EVENT") {
            let parsed = ImportReport::from_type_reports(std::slice::from_ref(ev));
            report.event = parsed.counts();
            report.conflicts.extend(parsed.conflicts().iter().cloned());
        }
        report
    }

    pub fn total(&self) -> ImportCounts {
        let mut total = ImportCounts::default();
        total.add(&self.tracked_entity);
        total.add(&self.enrollment);
        total.add(&self.event);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_legacy_shape() {
        let body = json!({
            "response": {
                "importSummary": {
                    "importCount": {"imported": 2, "updated": 1, "ignored": 0, "deleted": 0},
                    "conflicts": [{"object": "abc", "message": "bad ref"}]
                }
            }
        });
        let report = ImportReport::parse(&body, "http://x").unwrap();
        let counts = report.counts();
        assert_eq!(counts.created, 2);
        assert_eq!(counts.updated, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(report.conflicts(), &["abc: bad ref".to_string()]);
    }

    #[test]
    fn parses_modern_shape() {
        let body = json!({
            "response": {
                "typeReports": [
                    {"stats": {"created": 3, "updated": 0, "ignored": 1, "deleted": 0}, "objectReports": []},
                    {"stats": {"created": 0, "updated": 2, "ignored": 0, "deleted": 0}, "objectReports": [
                        {"errorReports": [{"message": "dangling ref"}]}
                    ]}
                ]
            }
        });
        let report = ImportReport::parse(&body, "http://x").unwrap();
        let counts = report.counts();
        assert_eq!(counts.created, 3);
        assert_eq!(counts.updated, 2);
        assert_eq!(counts.ignored, 1);
        assert_eq!(counts.errors, 1);
    }

    #[test]
    fn unrecognized_shape_errors() {
        let body = json!({"response": {"something_else": true}});
        assert!(ImportReport::parse(&body, "http://x").is_err());
    }
}
