//! The family/dependency DAG of spec.md §4.1, reproduced verbatim.
//!
//! Represented as a pair of tables (priority order, dependency adjacency)
//! and resolved to a topological order once per pipeline run rather than
//! re-derived per job, per spec.md §9's re-architecture guidance.

use std::collections::BTreeSet;

/// One of the sixteen families in spec.md §4.1's ordering table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    Users,
    Organisation,
    Categories,
    Options,
    System,
    DataElements,
    Indicators,
    DataSets,
    Tracker,
    SystemMisc,
    Programs,
    Validation,
    Predictors,
    Legends,
    Analytics,
    Misc,
}

impl Family {
    pub const ALL: [Family; 16] = [
        Family::Users,
        Family::Organisation,
        Family::Categories,
        Family::Options,
        Family::System,
        Family::DataElements,
        Family::Indicators,
        Family::DataSets,
        Family::Tracker,
        Family::SystemMisc,
        Family::Programs,
        Family::Validation,
        Family::Predictors,
        Family::Legends,
        Family::Analytics,
        Family::Misc,
    ];

    /// Priority, 1-indexed as in spec.md §4.1's table.
    pub fn priority(self) -> u8 {
        match self {
            Family::Users => 1,
            Family::Organisation => 2,
            Family::Categories => 3,
            Family::Options => 4,
            Family::System => 5,
            Family::DataElements => 6,
            Family::Indicators => 7,
            Family::DataSets => 8,
            Family::Tracker => 9,
            Family::SystemMisc => 10,
            Family::Programs => 11,
            Family::Validation => 12,
            Family::Predictors => 13,
            Family::Legends => 14,
            Family::Analytics => 15,
            Family::Misc => 16,
        }
    }

    /// Direct dependencies, exactly as listed in spec.md §4.1's "Depends
    /// on" column.
    pub fn depends_on(self) -> &'static [Family] {
        match self {
            Family::Users => &[],
            Family::Organisation => &[Family::Users],
            Family::Categories => &[Family::Organisation],
            Family::Options => &[],
            Family::System => &[],
            Family::DataElements => &[Family::System, Family::Categories, Family::Options],
            Family::Indicators => &[Family::DataElements],
            Family::DataSets => &[Family::DataElements, Family::Categories],
            Family::Tracker => &[Family::Options, Family::Organisation],
            Family::SystemMisc => &[],
            Family::Programs => &[Family::Tracker, Family::DataElements, Family::Categories, Family::SystemMisc],
            Family::Validation => &[Family::DataElements, Family::Programs],
            Family::Predictors => &[Family::DataElements, Family::Indicators],
            Family::Legends => &[],
            Family::Analytics => &[Family::Indicators, Family::DataElements, Family::Programs, Family::Legends],
            Family::Misc => &[],
        }
    }

    /// Resource names in rank order (spec.md §4.1, "Members" column). The
    /// rank is the resource's index within this slice.
    pub fn members(self) -> &'static [&'static str] {
        match self {
            Family::Users => &["userRoles", "users", "userGroups"],
            Family::Organisation => &[
                "organisationUnitLevels",
                "organisationUnits",
                "organisationUnitGroups",
                "organisationUnitGroupSets",
            ],
            Family::Categories => &[
                "categoryOptions",
                "categories",
                "categoryCombos",
                "categoryOptionCombos",
                "categoryOptionGroups",
                "categoryOptionGroupSets",
            ],
            Family::Options => &["options", "optionSets", "optionGroups", "optionGroupSets"],
            Family::System => &["attributes", "constants"],
            Family::DataElements => &["dataElements", "dataElementGroups", "dataElementGroupSets"],
            Family::Indicators => &["indicatorTypes", "indicators", "indicatorGroups", "indicatorGroupSets"],
            Family::DataSets => &[
                "dataEntryForms",
                "dataSets",
                "dataSetElements",
                "dataInputPeriods",
                "dataSetNotificationTemplates",
            ],
            Family::Tracker => &["trackedEntityTypes", "trackedEntityAttributes", "trackedEntityAttributeGroups"],
            Family::SystemMisc => &["relationshipTypes"],
            Family::Programs => &[
                "programs",
                "programStages",
                "programStageSections",
                "programRuleVariables",
                "programRules",
                "programRuleActions",
                "programIndicators",
                "programNotificationTemplates",
            ],
            Family::Validation => &["validationRules", "validationRuleGroups", "validationNotificationTemplates"],
            Family::Predictors => &["predictors", "predictorGroups"],
            Family::Legends => &["legends", "legendSets"],
            Family::Analytics => &["maps", "visualizations", "eventReports", "dashboards"],
            Family::Misc => &["documents", "interpretations"],
        }
    }
}

/// Resolves the transitive closure of `selected` (pulling in any family
/// whose dependencies are unsatisfied), then returns families in priority
/// order — a topological order with respect to [`Family::depends_on`].
pub fn resolve_order(selected: &[Family]) -> Vec<Family> {
    let mut closure: BTreeSet<Family> = BTreeSet::new();
    let mut stack: Vec<Family> = selected.to_vec();
    while let Some(family) = stack.pop() {
        if closure.insert(family) {
            stack.extend(family.depends_on());
        }
    }
    let mut ordered: Vec<Family> = closure.into_iter().collect();
    ordered.sort_by_key(|f| f.priority());
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulls_in_transitive_dependencies() {
        // programs depends on tracker, data_elements, categories, system_misc,
        // each of which pulls in further ancestors.
        let order = resolve_order(&[Family::Programs]);
        assert!(order.contains(&Family::Users));
        assert!(order.contains(&Family::Organisation));
        assert!(order.contains(&Family::Categories));
        assert!(order.contains(&Family::Options));
        assert!(order.contains(&Family::System));
        assert!(order.contains(&Family::DataElements));
        assert!(order.contains(&Family::Tracker));
        assert!(order.contains(&Family::SystemMisc));
        assert!(order.contains(&Family::Programs));
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        for &family in Family::ALL.iter() {
            let order = resolve_order(&[family]);
            let position = |f: Family| order.iter().position(|&x| x == f).unwrap();
            let here = position(family);
            for &dep in family.depends_on() {
                assert!(position(dep) < here, "{family:?} must come after {dep:?}");
            }
        }
    }

    #[test]
    fn order_is_stable_priority_order() {
        let order = resolve_order(&[Family::Analytics, Family::Users]);
        let mut sorted = order.clone();
        sorted.sort_by_key(|f| f.priority());
        assert_eq!(order, sorted);
    }
}
