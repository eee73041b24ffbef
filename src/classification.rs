//! Partition of every observed contract code into revenue centers, cost
//! centers and non-revenue clients.
//!
//! The observed code set is the union of positive-revenue forecast codes,
//! logged-hours codes, expense codes and configured cost-center codes. Each
//! code lands in exactly one table.

use crate::config::PipelineConfig;
use crate::error::{ReconciliationError, Result};
use crate::normalize::normalize_contract_code;
use crate::schema::{
    Bucket, CostCenter, ExpenseRecord, HoursRecord, NonRevenueClient, ProformaProject,
    RevenueCenter,
};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeClass {
    RevenueCenter,
    CostCenter,
    NonRevenueClient,
}

/// The three disjoint tables produced by [`classify`]. Cost columns are
/// zero until the cost computer fills them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub revenue_centers: Vec<RevenueCenter>,
    pub cost_centers: Vec<CostCenter>,
    pub non_revenue_clients: Vec<NonRevenueClient>,
}

impl Classification {
    pub fn class_of(&self, code: &str) -> Option<CodeClass> {
        if self.revenue_centers.iter().any(|r| r.contract_code == code) {
            Some(CodeClass::RevenueCenter)
        } else if self.cost_centers.iter().any(|c| c.contract_code == code) {
            Some(CodeClass::CostCenter)
        } else if self.non_revenue_clients.iter().any(|n| n.contract_code == code) {
            Some(CodeClass::NonRevenueClient)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.revenue_centers.len() + self.cost_centers.len() + self.non_revenue_clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Classifies a single code.
///
/// Explicit cost-center membership conflicts with revenue; the prefix
/// convention defers to it.
pub fn classify_code(
    code: &str,
    is_revenue_center: bool,
    configured: &BTreeSet<String>,
    internal_prefix: Option<&str>,
) -> Result<CodeClass> {
    let explicit = configured.contains(code);

    if is_revenue_center && explicit {
        return Err(ReconciliationError::ClassificationConflict {
            codes: vec![code.to_string()],
        });
    }
    if is_revenue_center {
        return Ok(CodeClass::RevenueCenter);
    }
    if explicit || internal_prefix.is_some_and(|p| code.starts_with(p)) {
        return Ok(CodeClass::CostCenter);
    }
    Ok(CodeClass::NonRevenueClient)
}

/// First non-empty project name logged against each code, in input order.
fn names_from_hours(hours: &[HoursRecord]) -> BTreeMap<&str, &str> {
    let mut names = BTreeMap::new();
    for record in hours {
        if let Some(name) = record.project_name.as_deref().filter(|n| !n.is_empty()) {
            names.entry(record.contract_code.as_str()).or_insert(name);
        }
    }
    names
}

pub fn classify(
    projects: &[ProformaProject],
    hours: &[HoursRecord],
    expenses: &[ExpenseRecord],
    config: &PipelineConfig,
) -> Result<Classification> {
    let configured: BTreeMap<String, (&str, Bucket)> = config
        .cost_centers
        .iter()
        .filter_map(|entry| {
            normalize_contract_code(&entry.code)
                .map(|code| (code, (entry.description.trim(), entry.pool)))
        })
        .collect();
    let configured_codes = config.cost_center_codes();
    let prefix = config.internal_prefix();

    let revenue: BTreeMap<&str, &ProformaProject> = projects
        .iter()
        .filter(|p| p.revenue > 0.0)
        .map(|p| (p.contract_code.as_str(), p))
        .collect();

    let conflicts: Vec<String> = revenue
        .keys()
        .filter(|code| configured_codes.contains(**code))
        .map(|code| code.to_string())
        .collect();
    if !conflicts.is_empty() {
        return Err(ReconciliationError::ClassificationConflict { codes: conflicts });
    }

    let forecast_names: BTreeMap<&str, &str> = projects
        .iter()
        .filter(|p| !p.project_name.is_empty())
        .map(|p| (p.contract_code.as_str(), p.project_name.as_str()))
        .collect();
    let hours_names = names_from_hours(hours);

    let mut observed: BTreeSet<&str> = revenue.keys().copied().collect();
    observed.extend(hours.iter().map(|h| h.contract_code.as_str()));
    observed.extend(expenses.iter().map(|e| e.contract_code.as_str()));
    observed.extend(configured_codes.iter().map(String::as_str));

    let mut result = Classification::default();

    for code in observed {
        match classify_code(code, revenue.contains_key(code), &configured_codes, prefix)? {
            CodeClass::RevenueCenter => {
                if let Some(project) = revenue.get(code) {
                    result.revenue_centers.push(RevenueCenter::from_project(project));
                }
            }
            CodeClass::CostCenter => {
                let recovered = hours_names.get(code).copied().unwrap_or_default();
                let (description, pool, auto_recognized) = match configured.get(code) {
                    Some((description, pool)) if !description.is_empty() => {
                        (description.to_string(), *pool, false)
                    }
                    Some((_, pool)) => (recovered.to_string(), *pool, false),
                    None => (recovered.to_string(), Bucket::Sga, true),
                };
                result.cost_centers.push(CostCenter {
                    contract_code: code.to_string(),
                    description,
                    pool,
                    auto_recognized,
                    labor_cost: 0.0,
                    expense_cost: 0.0,
                    total_cost: 0.0,
                });
            }
            CodeClass::NonRevenueClient => {
                let project_name = hours_names
                    .get(code)
                    .or_else(|| forecast_names.get(code))
                    .copied()
                    .unwrap_or_default();
                result.non_revenue_clients.push(NonRevenueClient {
                    contract_code: code.to_string(),
                    project_name: project_name.to_string(),
                    labor_cost: 0.0,
                    expense_cost: 0.0,
                    total_cost: 0.0,
                });
            }
        }
    }

    let auto = result.cost_centers.iter().filter(|c| c.auto_recognized).count();
    if auto > 0 {
        debug!("{} cost centers recognized by internal code prefix", auto);
    }
    info!(
        "Classified {} codes: {} revenue centers, {} cost centers, {} non-revenue clients",
        result.len(),
        result.revenue_centers.len(),
        result.cost_centers.len(),
        result.non_revenue_clients.len()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostCenterEntry;
    use crate::schema::{AllocationTag, BillableFlag};

    fn project(code: &str, name: &str, revenue: f64) -> ProformaProject {
        ProformaProject {
            contract_code: code.to_string(),
            project_name: name.to_string(),
            section: None,
            analysis_category: "Unknown".to_string(),
            allocation_tag: None,
            revenue,
        }
    }

    fn hours(code: &str, name: Option<&str>) -> HoursRecord {
        HoursRecord {
            date: None,
            contract_code: code.to_string(),
            staff_key: "Smith".to_string(),
            hours: 2.0,
            project_name: name.map(str::to_string),
        }
    }

    fn expense(code: &str) -> ExpenseRecord {
        ExpenseRecord {
            date: None,
            contract_code: code.to_string(),
            amount: 50.0,
            billable: BillableFlag::NonReimbursable,
        }
    }

    fn config_with(codes: &[(&str, Bucket)]) -> PipelineConfig {
        PipelineConfig {
            cost_centers: codes
                .iter()
                .map(|(code, pool)| CostCenterEntry {
                    code: code.to_string(),
                    description: String::new(),
                    pool: *pool,
                })
                .collect(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_three_way_partition() {
        let mut tagged = project("BEH-01", "Alpha", 1000.0);
        tagged.allocation_tag = Some(AllocationTag::Data);
        let projects = vec![tagged, project("BEH-02", "Dormant", 0.0)];
        let hours = vec![
            hours("BEH-01", Some("Alpha")),
            hours("ADMIN", Some("Administration")),
            hours("BEH-02", None),
        ];
        let expenses = vec![expense("CLIENT-9")];
        let config = config_with(&[("ADMIN", Bucket::Sga), ("DATA-OPS", Bucket::Data)]);

        let result = classify(&projects, &hours, &expenses, &config).unwrap();

        assert_eq!(result.revenue_centers.len(), 1);
        assert_eq!(result.revenue_centers[0].allocation_tag, Some(AllocationTag::Data));
        assert_eq!(result.class_of("ADMIN"), Some(CodeClass::CostCenter));
        assert_eq!(result.class_of("DATA-OPS"), Some(CodeClass::CostCenter));
        assert_eq!(result.class_of("BEH-02"), Some(CodeClass::NonRevenueClient));
        assert_eq!(result.class_of("CLIENT-9"), Some(CodeClass::NonRevenueClient));
        assert_eq!(result.len(), 5);

        let admin = result.cost_centers.iter().find(|c| c.contract_code == "ADMIN").unwrap();
        assert_eq!(admin.description, "Administration");
        assert!(!admin.auto_recognized);

        let dormant = result
            .non_revenue_clients
            .iter()
            .find(|n| n.contract_code == "BEH-02")
            .unwrap();
        assert_eq!(dormant.project_name, "Dormant");
    }

    #[test]
    fn test_configured_revenue_code_conflicts() {
        let projects = vec![project("BEH-01", "Alpha", 10.0), project("BEH-03", "Gamma", 5.0)];
        let config = config_with(&[("BEH-03", Bucket::Sga), ("BEH-01", Bucket::Data)]);

        let err = classify(&projects, &[], &[], &config).unwrap_err();
        match err {
            ReconciliationError::ClassificationConflict { codes } => {
                assert_eq!(codes, vec!["BEH-01".to_string(), "BEH-03".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_prefixed_code_with_revenue_stays_revenue_center() {
        let projects = vec![project("INT-Research", "Research", 500.0)];
        let hours = vec![hours("INT-Research", None), hours("INT-Ops", Some("Operations"))];

        let result = classify(&projects, &hours, &[], &PipelineConfig::default()).unwrap();

        assert_eq!(result.class_of("INT-Research"), Some(CodeClass::RevenueCenter));
        let ops = &result.cost_centers[0];
        assert_eq!(ops.contract_code, "INT-Ops");
        assert_eq!(ops.description, "Operations");
        assert_eq!(ops.pool, Bucket::Sga);
        assert!(ops.auto_recognized);
    }

    #[test]
    fn test_prefix_disabled() {
        let config = PipelineConfig {
            internal_code_prefix: None,
            ..PipelineConfig::default()
        };
        let result = classify(&[], &[hours("INT-Ops", None)], &[], &config).unwrap();
        assert_eq!(result.class_of("INT-Ops"), Some(CodeClass::NonRevenueClient));
    }

    #[test]
    fn test_classify_code_direct() {
        let configured: BTreeSet<String> = ["ADMIN".to_string()].into_iter().collect();
        assert_eq!(
            classify_code("X", true, &configured, Some("INT-")).unwrap(),
            CodeClass::RevenueCenter
        );
        assert_eq!(
            classify_code("ADMIN", false, &configured, None).unwrap(),
            CodeClass::CostCenter
        );
        assert!(classify_code("ADMIN", true, &configured, None).is_err());
    }
}
