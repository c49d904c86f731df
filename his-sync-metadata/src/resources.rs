//! Closed set of resource descriptors (spec.md §9's re-architecture
//! guidance): each metadata resource is a record naming its family, its
//! rank within that family, the fields-string requested from the source,
//! and which sanitizers apply. A single generic pipeline routine
//! ([`crate::pipeline::sync_resource`]) drives every descriptor instead of
//! per-resource special-casing.

use crate::families::Family;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sanitizer {
    /// Drops sharing entries naming users/userGroups absent on the
    /// destination (spec.md §4.1, "Sharing references").
    Sharing,
    /// Drops role references absent on the destination, injecting a
    /// default role if that empties the set (spec.md §4.1, "User role
    /// references").
    UserRoles,
    /// Strips references known to cause destination-side proxy errors
    /// (spec.md §4.1, "Visualization references").
    VisualizationRefs,
}

/// One metadata resource, as requested from the source and posted to the
/// destination.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub family: Family,
    /// Index within `family.members()` — the fixed per-resource import
    /// rank of spec.md §4.1.
    pub rank: usize,
    pub fields: &'static str,
    pub sanitizers: &'static [Sanitizer],
    /// `true` for resources posted with `skipSharing=true` (currently
    /// only visualizations, spec.md §4.1).
    pub skip_sharing: bool,
}

const SHARING_FIELDS: &str = ",sharing[owner,public,external,users,userGroups,userAccesses,userGroupAccesses]";

macro_rules! descriptor {
    ($name:literal, $family:expr, $rank:expr, $fields:expr) => {
        ResourceDescriptor {
            name: $name,
            family: $family,
            rank: $rank,
            fields: $fields,
            sanitizers: &[Sanitizer::Sharing],
            skip_sharing: false,
        }
    };
    ($name:literal, $family:expr, $rank:expr, $fields:expr, [$($s:expr),*], $skip:expr) => {
        ResourceDescriptor {
            name: $name,
            family: $family,
            rank: $rank,
            fields: $fields,
            sanitizers: &[$($s),*],
            skip_sharing: $skip,
        }
    };
}

const GENERIC_FIELDS: &str = "id,name,code,created,lastUpdated";

/// All resources the pipeline knows how to sync, in no particular order
/// (families.rs's [`crate::families::resolve_order`] and each family's
/// `members()` rank establish the execution order).
pub fn all_descriptors() -> Vec<ResourceDescriptor> {
    vec![
        descriptor!("userRoles", Family::Users, 0, "id,name,authorities"),
        descriptor!(
            "users",
            Family::Users,
            1,
            "id,username,firstName,surname,email,userRoles[id,name],organisationUnits[id]",
            [Sanitizer::Sharing, Sanitizer::UserRoles],
            false
        ),
        descriptor!("userGroups", Family::Users, 2, const_concat(GENERIC_FIELDS, ",users[id]")),
        descriptor!(
            "organisationUnitLevels",
            Family::Organisation,
            0,
            "id,name,level"
        ),
        descriptor!(
            "organisationUnits",
            Family::Organisation,
            1,
            const_concat("id,name,code,shortName,parent[id],level,path,geometry", SHARING_FIELDS)
        ),
        descriptor!("organisationUnitGroups", Family::Organisation, 2, const_concat(GENERIC_FIELDS, ",organisationUnits[id]")),
        descriptor!("organisationUnitGroupSets", Family::Organisation, 3, const_concat(GENERIC_FIELDS, ",organisationUnitGroups[id]")),
        descriptor!("categoryOptions", Family::Categories, 0, GENERIC_FIELDS),
        descriptor!("categories", Family::Categories, 1, const_concat(GENERIC_FIELDS, ",categoryOptions[id]")),
        descriptor!("categoryCombos", Family::Categories, 2, const_concat(GENERIC_FIELDS, ",categories[id]")),
        descriptor!("categoryOptionCombos", Family::Categories, 3, "id,name,categoryCombo[id],categoryOptions[id]"),
        descriptor!("categoryOptionGroups", Family::Categories, 4, const_concat(GENERIC_FIELDS, ",categoryOptions[id]")),
        descriptor!("categoryOptionGroupSets", Family::Categories, 5, const_concat(GENERIC_FIELDS, ",categoryOptionGroups[id]")),
        descriptor!("options", Family::Options, 0, "id,name,code,optionSet[id]"),
        descriptor!("optionSets", Family::Options, 1, const_concat(GENERIC_FIELDS, ",valueType,options[id]")),
        descriptor!("optionGroups", Family::Options, 2, const_concat(GENERIC_FIELDS, ",options[id]")),
        descriptor!("optionGroupSets", Family::Options, 3, const_concat(GENERIC_FIELDS, ",optionGroups[id]")),
        descriptor!("attributes", Family::System, 0, "id,name,valueType,mandatory"),
        descriptor!("constants", Family::System, 1, "id,name,value"),
        descriptor!("dataElements", Family::DataElements, 0, const_concat("id,name,code,shortName,valueType,domainType,categoryCombo[id]", SHARING_FIELDS)),
        descriptor!("dataElementGroups", Family::DataElements, 1, const_concat(GENERIC_FIELDS, ",dataElements[id]")),
        descriptor!("dataElementGroupSets", Family::DataElements, 2, const_concat(GENERIC_FIELDS, ",dataElementGroups[id]")),
        descriptor!("indicatorTypes", Family::Indicators, 0, "id,name,factor,number"),
        descriptor!("indicators", Family::Indicators, 1, "id,name,code,numerator,denominator,indicatorType[id]"),
        descriptor!("indicatorGroups", Family::Indicators, 2, const_concat(GENERIC_FIELDS, ",indicators[id]")),
        descriptor!("indicatorGroupSets", Family::Indicators, 3, const_concat(GENERIC_FIELDS, ",indicatorGroups[id]")),
        descriptor!("dataEntryForms", Family::DataSets, 0, "id,name,htmlCode"),
        descriptor!("dataSets", Family::DataSets, 1, "id,name,code,periodType,categoryCombo[id],dataSetElements[dataElement[id]]"),
        descriptor!("dataSetElements", Family::DataSets, 2, "dataSet[id],dataElement[id],categoryCombo[id]"),
        descriptor!("dataInputPeriods", Family::DataSets, 3, "dataSet[id],period[id],openingDate,closingDate"),
        descriptor!("dataSetNotificationTemplates", Family::DataSets, 4, const_concat(GENERIC_FIELDS, ",dataSets[id]")),
        descriptor!("trackedEntityTypes", Family::Tracker, 0, const_concat(GENERIC_FIELDS, ",trackedEntityTypeAttributes")),
        descriptor!("trackedEntityAttributes", Family::Tracker, 1, "id,name,code,valueType,optionSet[id]"),
        descriptor!("trackedEntityAttributeGroups", Family::Tracker, 2, const_concat(GENERIC_FIELDS, ",attributes[id]")),
        descriptor!("relationshipTypes", Family::SystemMisc, 0, "id,name,fromToName,toFromName"),
        descriptor!(
            "programs",
            Family::Programs,
            0,
            const_concat("id,name,code,programType,trackedEntityType[id],categoryCombo[id],organisationUnits[id]", SHARING_FIELDS)
        ),
        descriptor!("programStages", Family::Programs, 1, const_concat(GENERIC_FIELDS, ",program[id],programStageDataElements[dataElement[id]]")),
        descriptor!("programStageSections", Family::Programs, 2, const_concat(GENERIC_FIELDS, ",programStage[id]")),
        descriptor!("programRuleVariables", Family::Programs, 3, const_concat(GENERIC_FIELDS, ",program[id]")),
        descriptor!("programRules", Family::Programs, 4, const_concat(GENERIC_FIELDS, ",program[id],condition")),
        descriptor!("programRuleActions", Family::Programs, 5, "id,programRule[id],programRuleActionType"),
        descriptor!("programIndicators", Family::Programs, 6, const_concat(GENERIC_FIELDS, ",program[id],expression")),
        descriptor!("programNotificationTemplates", Family::Programs, 7, const_concat(GENERIC_FIELDS, ",program[id]")),
        descriptor!("validationRules", Family::Validation, 0, const_concat(GENERIC_FIELDS, ",leftSide,rightSide,operator")),
        descriptor!("validationRuleGroups", Family::Validation, 1, const_concat(GENERIC_FIELDS, ",validationRules[id]")),
        descriptor!("validationNotificationTemplates", Family::Validation, 2, const_concat(GENERIC_FIELDS, ",validationRules[id]")),
        descriptor!("predictors", Family::Predictors, 0, const_concat(GENERIC_FIELDS, ",output[id],generator")),
        descriptor!("predictorGroups", Family::Predictors, 1, const_concat(GENERIC_FIELDS, ",predictors[id]")),
        descriptor!("legends", Family::Legends, 0, "id,name,startValue,endValue,legendSet[id]"),
        descriptor!("legendSets", Family::Legends, 1, const_concat(GENERIC_FIELDS, ",legends[id]")),
        descriptor!("maps", Family::Analytics, 0, GENERIC_FIELDS),
        descriptor!(
            "visualizations",
            Family::Analytics,
            1,
            const_concat(GENERIC_FIELDS, ",type,dataDimensionItems"),
            [Sanitizer::Sharing, Sanitizer::VisualizationRefs],
            true
        ),
        descriptor!("eventReports", Family::Analytics, 2, const_concat(GENERIC_FIELDS, ",program[id]")),
        descriptor!("dashboards", Family::Analytics, 3, const_concat(GENERIC_FIELDS, ",dashboardItems")),
        descriptor!("documents", Family::Misc, 0, GENERIC_FIELDS),
        descriptor!("interpretations", Family::Misc, 1, "id,text,created"),
    ]
}

/// `const fn`-friendly string concatenation isn't available for `&str` in
/// stable Rust without a helper macro; this is a plain runtime helper
/// leaked for the lifetime of the process (the descriptor table is built
/// once).
fn const_concat(a: &'static str, b: &'static str) -> &'static str {
    Box::leak(format!("{a}{b}").into_boxed_str())
}

/// Resources in the fixed execution order: families resolved via
/// [`crate::families::resolve_order`], members within a family sorted by
/// rank.
pub fn resources_in_order(families: &[Family]) -> Vec<ResourceDescriptor> {
    let order = crate::families::resolve_order(families);
    let all = all_descriptors();
    let mut out = Vec::new();
    for family in order {
        let mut in_family: Vec<_> = all.iter().filter(|d| d.family == family).cloned().collect();
        in_family.sort_by_key(|d| d.rank);
        out.extend(in_family);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_family_ranks_match_spec_example() {
        let resources = resources_in_order(&[Family::Users]);
        let names: Vec<&str> = resources.iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["userRoles", "users", "userGroups"]);
    }

    #[test]
    fn categories_family_ranks_match_spec_example() {
        let resources = resources_in_order(&[Family::Categories]);
        let names: Vec<&str> = resources.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "categoryOptions",
                "categories",
                "categoryCombos",
                "categoryOptionCombos",
                "categoryOptionGroups",
                "categoryOptionGroupSets",
            ]
        );
    }

    #[test]
    fn every_resource_belongs_to_its_family_member_list() {
        for descriptor in all_descriptors() {
            assert!(
                descriptor.family.members().contains(&descriptor.name),
                "{} missing from {:?} members",
                descriptor.name,
                descriptor.family
            );
        }
    }
}
