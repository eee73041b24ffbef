use crate::classification::Classification;
use crate::schema::{CompensationRecord, ExpenseRecord, HoursRecord};
use crate::utils::format_money;
use log::{debug, warn};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CodeLabor {
    /// Hours logged by staff with a compensation record.
    pub hours: f64,
    pub labor_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedStaff {
    pub staff_key: String,
    pub hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaborCosts {
    pub by_code: BTreeMap<String, CodeLabor>,
    /// Staff with logged hours but no compensation entry, sorted by key.
    pub excluded: Vec<ExcludedStaff>,
}

impl LaborCosts {
    pub fn excluded_hours(&self) -> f64 {
        self.excluded.iter().map(|s| s.hours).sum()
    }

    pub fn get(&self, code: &str) -> CodeLabor {
        self.by_code.get(code).copied().unwrap_or_default()
    }

    pub fn total_labor_cost(&self) -> f64 {
        self.by_code.values().map(|l| l.labor_cost).sum()
    }

    pub fn exclusion_message(&self) -> Option<String> {
        exclusion_message(&self.excluded)
    }
}

/// Hourly cost per staff key. The first entry wins on duplicates.
pub fn hourly_rates(compensation: &[CompensationRecord]) -> BTreeMap<&str, f64> {
    let mut rates: BTreeMap<&str, f64> = BTreeMap::new();
    for record in compensation {
        rates.entry(record.staff_key.as_str()).or_insert(record.hourly_cost);
    }
    rates
}

/// Staff with logged hours but no compensation entry, sorted by key.
pub fn unmatched_staff(
    hours: &[HoursRecord],
    compensation: &[CompensationRecord],
) -> Vec<ExcludedStaff> {
    let rates = hourly_rates(compensation);
    let mut missing: BTreeMap<&str, f64> = BTreeMap::new();
    for record in hours.iter().filter(|h| !rates.contains_key(h.staff_key.as_str())) {
        *missing.entry(record.staff_key.as_str()).or_insert(0.0) += record.hours;
    }
    missing
        .into_iter()
        .map(|(staff_key, hours)| ExcludedStaff {
            staff_key: staff_key.to_string(),
            hours,
        })
        .collect()
}

/// The exclusion warning, or `None` when every staff key matched.
pub fn exclusion_message(excluded: &[ExcludedStaff]) -> Option<String> {
    if excluded.is_empty() {
        return None;
    }
    let listed: Vec<String> = excluded
        .iter()
        .map(|s| format!("{} ({:.1}h)", s.staff_key, s.hours))
        .collect();
    Some(format!(
        "{} staff missing compensation records ({:.1} hours excluded from labor cost): {}",
        excluded.len(),
        excluded.iter().map(|s| s.hours).sum::<f64>(),
        listed.join(", ")
    ))
}

/// Joins hours to hourly cost by staff key and sums hours and labor per code.
///
/// Rows from staff absent from compensation are dropped before grouping and
/// reported in `excluded`.
pub fn calculate_labor_costs(
    hours: &[HoursRecord],
    compensation: &[CompensationRecord],
) -> LaborCosts {
    let rates = hourly_rates(compensation);

    let mut by_code: BTreeMap<String, CodeLabor> = BTreeMap::new();
    for record in hours {
        if let Some(rate) = rates.get(record.staff_key.as_str()) {
            let entry = by_code.entry(record.contract_code.clone()).or_default();
            entry.hours += record.hours;
            entry.labor_cost += record.hours * rate;
        }
    }

    let labor = LaborCosts {
        by_code,
        excluded: unmatched_staff(hours, compensation),
    };

    if let Some(message) = labor.exclusion_message() {
        warn!("{}", message);
    }
    debug!(
        "Labor cost {} across {} codes",
        format_money(labor.total_labor_cost()),
        labor.by_code.len()
    );

    labor
}

/// Sums already-filtered expenses per code.
pub fn calculate_expense_costs(expenses: &[ExpenseRecord]) -> BTreeMap<String, f64> {
    let mut by_code: BTreeMap<String, f64> = BTreeMap::new();
    for expense in expenses {
        *by_code.entry(expense.contract_code.clone()).or_insert(0.0) += expense.amount;
    }
    by_code
}

/// Left-joins labor and expense onto every classified row. Codes without
/// activity get zeros.
pub fn merge_direct_costs(
    classification: &mut Classification,
    labor: &LaborCosts,
    expenses: &BTreeMap<String, f64>,
) {
    let expense_for = |code: &str| expenses.get(code).copied().unwrap_or(0.0);

    for center in &mut classification.revenue_centers {
        let code_labor = labor.get(&center.contract_code);
        center.hours = code_labor.hours;
        center.labor_cost = code_labor.labor_cost;
        center.expense_cost = expense_for(&center.contract_code);
    }

    for center in &mut classification.cost_centers {
        center.labor_cost = labor.get(&center.contract_code).labor_cost;
        center.expense_cost = expense_for(&center.contract_code);
        center.total_cost = center.labor_cost + center.expense_cost;
    }

    for client in &mut classification.non_revenue_clients {
        client.labor_cost = labor.get(&client.contract_code).labor_cost;
        client.expense_cost = expense_for(&client.contract_code);
        client.total_cost = client.labor_cost + client.expense_cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        BillableFlag, Bucket, CostCenter, CostStrategy, NonRevenueClient, ProformaProject,
        RevenueCenter,
    };

    fn rate(staff: &str, hourly_cost: f64) -> CompensationRecord {
        CompensationRecord {
            staff_key: staff.to_string(),
            hourly_cost,
            strategy: CostStrategy::Direct,
        }
    }

    fn logged(code: &str, staff: &str, hours: f64) -> HoursRecord {
        HoursRecord {
            date: None,
            contract_code: code.to_string(),
            staff_key: staff.to_string(),
            hours,
            project_name: None,
        }
    }

    #[test]
    fn test_labor_excludes_unmatched_staff() {
        let hours = vec![
            logged("BEH-01", "Smith", 10.0),
            logged("BEH-01", "Ghost", 4.0),
            logged("BEH-02", "Jones", 2.0),
            logged("BEH-02", "Ghost", 1.5),
        ];
        let comp = vec![rate("Smith", 100.0), rate("Jones", 50.0)];

        let labor = calculate_labor_costs(&hours, &comp);

        assert_eq!(labor.get("BEH-01").labor_cost, 1000.0);
        assert_eq!(labor.get("BEH-01").hours, 10.0);
        assert_eq!(labor.get("BEH-02").hours, 2.0);
        assert_eq!(labor.get("BEH-02").labor_cost, 100.0);
        assert_eq!(labor.excluded.len(), 1);
        assert_eq!(labor.excluded[0].staff_key, "Ghost");
        assert_eq!(labor.excluded_hours(), 5.5);

        let message = labor.exclusion_message().unwrap();
        assert!(message.starts_with("1 staff missing compensation records (5.5 hours"));
    }

    #[test]
    fn test_unmatched_only_staff_leaves_no_hours() {
        let labor = calculate_labor_costs(&[logged("BEH-07", "Ghost", 5.0)], &[rate("Smith", 100.0)]);
        assert_eq!(labor.get("BEH-07"), CodeLabor::default());
        assert_eq!(
            unmatched_staff(&[logged("BEH-07", "Ghost", 5.0)], &[rate("Smith", 100.0)]),
            vec![ExcludedStaff {
                staff_key: "Ghost".to_string(),
                hours: 5.0
            }]
        );
    }

    #[test]
    fn test_first_rate_wins_on_duplicate_staff() {
        let labor = calculate_labor_costs(
            &[logged("A", "Smith", 1.0)],
            &[rate("Smith", 80.0), rate("Smith", 999.0)],
        );
        assert_eq!(labor.get("A").labor_cost, 80.0);
        assert!(labor.exclusion_message().is_none());
    }

    #[test]
    fn test_expense_costs_group_by_code() {
        let expense = |code: &str, amount| ExpenseRecord {
            date: None,
            contract_code: code.to_string(),
            amount,
            billable: BillableFlag::NonReimbursable,
        };
        let totals = calculate_expense_costs(&[expense("A", 10.0), expense("A", 5.5), expense("B", 1.0)]);
        assert_eq!(totals.get("A"), Some(&15.5));
        assert_eq!(totals.get("B"), Some(&1.0));
    }

    #[test]
    fn test_merge_fills_missing_with_zero() {
        let mut classification = Classification {
            revenue_centers: vec![
                RevenueCenter::from_project(&ProformaProject {
                    contract_code: "BEH-01".to_string(),
                    project_name: "Alpha".to_string(),
                    section: None,
                    analysis_category: "Unknown".to_string(),
                    allocation_tag: None,
                    revenue: 1000.0,
                }),
                RevenueCenter::from_project(&ProformaProject {
                    contract_code: "BEH-09".to_string(),
                    project_name: "Idle".to_string(),
                    section: None,
                    analysis_category: "Unknown".to_string(),
                    allocation_tag: None,
                    revenue: 200.0,
                }),
            ],
            cost_centers: vec![CostCenter {
                contract_code: "ADMIN".to_string(),
                description: "Admin".to_string(),
                pool: Bucket::Sga,
                auto_recognized: false,
                labor_cost: 0.0,
                expense_cost: 0.0,
                total_cost: 0.0,
            }],
            non_revenue_clients: vec![NonRevenueClient {
                contract_code: "PRO-BONO".to_string(),
                project_name: String::new(),
                labor_cost: 0.0,
                expense_cost: 0.0,
                total_cost: 0.0,
            }],
        };

        let labor = calculate_labor_costs(
            &[logged("BEH-01", "Smith", 3.0), logged("ADMIN", "Smith", 1.0)],
            &[rate("Smith", 100.0)],
        );
        let mut expenses = BTreeMap::new();
        expenses.insert("ADMIN".to_string(), 20.0);
        expenses.insert("PRO-BONO".to_string(), 7.0);

        merge_direct_costs(&mut classification, &labor, &expenses);

        let alpha = &classification.revenue_centers[0];
        assert_eq!((alpha.hours, alpha.labor_cost, alpha.expense_cost), (3.0, 300.0, 0.0));
        let idle = &classification.revenue_centers[1];
        assert_eq!((idle.hours, idle.labor_cost, idle.expense_cost), (0.0, 0.0, 0.0));
        assert_eq!(classification.cost_centers[0].total_cost, 120.0);
        assert_eq!(classification.non_revenue_clients[0].total_cost, 7.0);
    }
}
