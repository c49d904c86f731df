//! Sanitization rules of spec.md §4.1: strips references that would
//! dangle on the destination before the object is posted.

use std::collections::BTreeSet;

use serde_json::Value;

/// What the destination currently has, needed to decide what to drop.
#[derive(Debug, Clone, Default)]
pub struct DestinationDirectory {
    pub user_ids: BTreeSet<String>,
    pub user_group_ids: BTreeSet<String>,
    pub role_ids: BTreeSet<String>,
    /// `(id, name)` pairs, used to pick a default role (spec.md §4.1).
    pub roles: Vec<(String, String)>,
}

/// Tally of how many references were dropped, for the Job log
/// (spec.md §7, "Referential sanitization warning" — logged, not a Job
/// error).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub users_removed: u32,
    pub user_groups_removed: u32,
    pub roles_removed: u32,
    pub default_role_injected: bool,
}

impl SanitizeReport {
    pub fn merge(&mut self, other: SanitizeReport) {
        self.users_removed += other.users_removed;
        self.user_groups_removed += other.user_groups_removed;
        self.roles_removed += other.roles_removed;
        self.default_role_injected |= other.default_role_injected;
    }

    /// French-language note used verbatim in the job log (spec.md §8
    /// scenario 2, carried over from the source system's operator
    /// messages).
    pub fn describe(&self) -> String {
        format!(
            "{} users invalides, {} userGroups invalides retirés",
            self.users_removed, self.user_groups_removed
        )
    }
}

/// Drops sharing entries naming users/userGroups absent from `directory`.
/// Handles both the dict-keyed form (`users`, `userGroups`) and the
/// list-of-access-objects form (`userAccesses`, `userGroupAccesses`).
/// Idempotent: running it twice on an already-cleaned object removes
/// nothing further (spec.md §8).
pub fn sanitize_sharing(object: &mut Value, directory: &DestinationDirectory) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    let Some(sharing) = object.get_mut("sharing") else {
        return report;
    };
    let Some(sharing) = sharing.as_object_mut() else {
        return report;
    };

    if let Some(users) = sharing.get_mut("users").and_then(Value::as_object_mut) {
        let before = users.len();
        users.retain(|id, _| directory.user_ids.contains(id));
        report.users_removed += (before - users.len()) as u32;
    }
    if let Some(groups) = sharing.get_mut("userGroups").and_then(Value::as_object_mut) {
        let before = groups.len();
        groups.retain(|id, _| directory.user_group_ids.contains(id));
        report.user_groups_removed += (before - groups.len()) as u32;
    }
    if let Some(accesses) = sharing.get_mut("userAccesses").and_then(Value::as_array_mut) {
        let before = accesses.len();
        accesses.retain(|entry| {
            entry
                .get("id")
                .and_then(Value::as_str)
                .map(|id| directory.user_ids.contains(id))
                .unwrap_or(false)
        });
        report.users_removed += (before - accesses.len()) as u32;
    }
    if let Some(accesses) = sharing.get_mut("userGroupAccesses").and_then(Value::as_array_mut) {
        let before = accesses.len();
        accesses.retain(|entry| {
            entry
                .get("id")
                .and_then(Value::as_str)
                .map(|id| directory.user_group_ids.contains(id))
                .unwrap_or(false)
        });
        report.user_groups_removed += (before - accesses.len()) as u32;
    }
    report
}

/// Drops role references absent on the destination; if that leaves a
/// user with no roles, injects a single default role (spec.md §4.1,
/// "pick a role whose name contains one of `data entry`, `user`, `basic`;
/// fall back to the first available").
pub fn sanitize_user_roles(user: &mut Value, directory: &DestinationDirectory) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    let Some(roles) = user.get_mut("userRoles").and_then(Value::as_array_mut) else {
        return report;
    };
    let before = roles.len();
    roles.retain(|role| {
        role.get("id")
            .and_then(Value::as_str)
            .map(|id| directory.role_ids.contains(id))
            .unwrap_or(false)
    });
    report.roles_removed = (before - roles.len()) as u32;

    if roles.is_empty() {
        if let Some(default_role) = pick_default_role(directory) {
            roles.push(serde_json::json!({ "id": default_role }));
            report.default_role_injected = true;
        }
    }
    report
}

fn pick_default_role(directory: &DestinationDirectory) -> Option<String> {
    const PREFERRED: [&str; 3] = ["data entry", "user", "basic"];
    for needle in PREFERRED {
        if let Some((id, _)) = directory
            .roles
            .iter()
            .find(|(_, name)| name.to_lowercase().contains(needle))
        {
            return Some(id.clone());
        }
    }
    directory.roles.first().map(|(id, _)| id.clone())
}

/// Strips references known to cause destination-side proxy errors on
/// visualizations (spec.md §4.1) — detached category-combo dimension
/// items that the destination cannot resolve without their parent
/// category being imported first.
pub fn sanitize_visualization_refs(visualization: &mut Value) {
    let Some(items) = visualization
        .get_mut("dataDimensionItems")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    items.retain(|item| {
        item.get("categoryOptionCombo")
            .map(|cc| cc.get("id").and_then(Value::as_str).is_some())
            .unwrap_or(true)
    });
}
