//! Shaping of the raw source records before classification: code
//! normalization, revenue-forecast aggregation, expense reimbursability
//! filtering, the hours month window and compensation strategies.

use crate::config::PipelineConfig;
use crate::error::{ReconciliationError, Result};
use crate::normalize::{normalize_contract_code, normalize_staff_key};
use crate::schema::{
    AllocationTag, BillableFlag, CompensationRecord, CostStrategy, ExpenseRecord, HoursRecord,
    ProformaProject, ProformaRow,
};
use crate::utils::RunMonth;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// Working hours in a month used to turn monthly compensation into an hourly cost.
pub const EXPECTED_HOURS_PER_MONTH: f64 = 216.6667;

fn code_for(raw: &str, source_name: &str, row: usize) -> Result<String> {
    normalize_contract_code(raw).ok_or_else(|| ReconciliationError::InvalidContractCode {
        source_name: source_name.to_string(),
        row,
        reason: format!("'{}' is empty after normalization", raw),
    })
}

/// Folds duplicate forecast rows into one project per code.
///
/// Revenue is summed, the first non-empty name and section are kept and the
/// allocation tag is reconciled across rows. A code tagged `Data` on one row
/// and `Wellness` on another fails with [`ReconciliationError::AllocationTagConflict`].
pub fn aggregate_proforma(
    rows: &[ProformaRow],
    config: &PipelineConfig,
) -> Result<Vec<ProformaProject>> {
    struct Accumulator {
        project_name: String,
        section: Option<String>,
        tags: BTreeSet<AllocationTag>,
        revenue: f64,
    }

    let mut by_code: BTreeMap<String, Accumulator> = BTreeMap::new();

    for (idx, row) in rows.iter().enumerate() {
        let code = code_for(&row.contract_code, "revenue forecast", idx + 1)?;
        let acc = by_code.entry(code).or_insert_with(|| Accumulator {
            project_name: String::new(),
            section: None,
            tags: BTreeSet::new(),
            revenue: 0.0,
        });

        if acc.project_name.is_empty() {
            acc.project_name = row.project_name.trim().to_string();
        }
        if acc.section.is_none() {
            acc.section = row
                .section
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
        }
        if let Some(tag) = row.allocation_tag {
            acc.tags.insert(tag);
        }
        acc.revenue += row.revenue;
    }

    for (code, acc) in &by_code {
        if acc.tags.contains(&AllocationTag::Data) && acc.tags.contains(&AllocationTag::Wellness) {
            return Err(ReconciliationError::AllocationTagConflict { code: code.clone() });
        }
    }

    let duplicates = rows.len() - by_code.len();
    if duplicates > 0 {
        info!("Aggregated {} duplicate contract code rows", duplicates);
    }

    let projects: Vec<ProformaProject> = by_code
        .into_iter()
        .map(|(contract_code, acc)| {
            let analysis_category = config.analysis_category(acc.section.as_deref());
            ProformaProject {
                contract_code,
                project_name: acc.project_name,
                section: acc.section,
                analysis_category,
                allocation_tag: acc.tags.into_iter().next(),
                revenue: acc.revenue,
            }
        })
        .collect();

    let count = |tag| projects.iter().filter(|p| p.allocation_tag == tag).count();
    debug!(
        "Allocation tags: {} Data, {} Wellness, {} untagged",
        count(Some(AllocationTag::Data)),
        count(Some(AllocationTag::Wellness)),
        count(None)
    );

    Ok(projects)
}

/// Trims staff keys; a row without a key cannot be joined and is rejected.
pub fn normalize_compensation(records: &[CompensationRecord]) -> Result<Vec<CompensationRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let staff_key = normalize_staff_key(&r.staff_key).ok_or_else(|| {
                ReconciliationError::Load {
                    source_name: "compensation".to_string(),
                    details: format!("row {} has an empty staff key", idx + 1),
                }
            })?;
            Ok(CompensationRecord {
                staff_key,
                ..r.clone()
            })
        })
        .collect()
}

pub fn normalize_hours(records: &[HoursRecord]) -> Result<Vec<HoursRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let contract_code = code_for(&r.contract_code, "hours", idx + 1)?;
            let staff_key = normalize_staff_key(&r.staff_key).ok_or_else(|| {
                ReconciliationError::Load {
                    source_name: "hours".to_string(),
                    details: format!("row {} has an empty staff key", idx + 1),
                }
            })?;
            Ok(HoursRecord {
                contract_code,
                staff_key,
                project_name: r
                    .project_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
                ..r.clone()
            })
        })
        .collect()
}

pub fn normalize_expenses(records: &[ExpenseRecord]) -> Result<Vec<ExpenseRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            Ok(ExpenseRecord {
                contract_code: code_for(&r.contract_code, "expenses", idx + 1)?,
                ..r.clone()
            })
        })
        .collect()
}

/// Hours rows that fall inside the run month, plus how many were dropped.
/// Undated rows are kept.
pub fn filter_hours_to_month(hours: Vec<HoursRecord>, month: &RunMonth) -> (Vec<HoursRecord>, usize) {
    let before = hours.len();
    let kept: Vec<HoursRecord> = hours
        .into_iter()
        .filter(|h| h.date.map_or(true, |d| month.contains(d)))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseSplit {
    /// Non-reimbursable plus unknown-flag expenses; these are costs.
    pub included: Vec<ExpenseRecord>,
    pub reimbursable_excluded: usize,
    pub unknown_included: usize,
}

/// Drops reimbursable expenses. Unknown billable values stay in as costs.
pub fn split_reimbursable(expenses: Vec<ExpenseRecord>) -> ExpenseSplit {
    let mut split = ExpenseSplit::default();

    for expense in expenses {
        match expense.billable {
            BillableFlag::Reimbursable => split.reimbursable_excluded += 1,
            BillableFlag::NonReimbursable => split.included.push(expense),
            BillableFlag::Unknown => {
                split.unknown_included += 1;
                split.included.push(expense);
            }
        }
    }

    if split.reimbursable_excluded > 0 {
        info!(
            "Excluded {} reimbursable expenses (Billable=Yes)",
            split.reimbursable_excluded
        );
    }

    split
}

/// Monthly compensation components used when no total is exported.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompensationComponents {
    pub base: f64,
    pub taxes: f64,
    pub ichra: f64,
    pub retirement_match: f64,
    pub assistant: f64,
    pub wellbeing: f64,
    pub travel: f64,
}

impl CompensationComponents {
    pub fn monthly_total(&self) -> f64 {
        self.base
            + self.taxes
            + self.ichra
            + self.retirement_match
            + self.assistant
            + self.wellbeing
            + self.travel
    }
}

/// Strategy A: the export carries an hourly cost.
pub fn direct_compensation(staff_key: &str, hourly_cost: f64) -> CompensationRecord {
    CompensationRecord {
        staff_key: staff_key.trim().to_string(),
        hourly_cost,
        strategy: CostStrategy::Direct,
    }
}

/// Strategy B: hourly cost derived from monthly compensation.
pub fn computed_compensation(staff_key: &str, monthly_cost: f64) -> CompensationRecord {
    CompensationRecord {
        staff_key: staff_key.trim().to_string(),
        hourly_cost: monthly_cost / EXPECTED_HOURS_PER_MONTH,
        strategy: CostStrategy::Computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(code: &str, name: &str, tag: Option<AllocationTag>, revenue: f64) -> ProformaRow {
        ProformaRow {
            contract_code: code.to_string(),
            project_name: name.to_string(),
            section: Some("BEH".to_string()),
            allocation_tag: tag,
            revenue,
        }
    }

    #[test]
    fn test_duplicates_are_summed_and_tag_reconciled() {
        let mut config = PipelineConfig::default();
        config
            .category_mapping
            .insert("BEH".to_string(), "Next Gen Advisory".to_string());

        let rows = vec![
            row("BEH-01 ", "Alpha", None, 1000.0),
            row("\u{00A0}BEH-01", "", Some(AllocationTag::Data), 500.0),
            row("BEH-02", "Beta", None, 250.0),
        ];

        let projects = aggregate_proforma(&rows, &config).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].contract_code, "BEH-01");
        assert_eq!(projects[0].project_name, "Alpha");
        assert_eq!(projects[0].revenue, 1500.0);
        assert_eq!(projects[0].allocation_tag, Some(AllocationTag::Data));
        assert_eq!(projects[0].analysis_category, "Next Gen Advisory");
        assert_eq!(projects[1].allocation_tag, None);
    }

    #[test]
    fn test_contradictory_tags_fail() {
        let rows = vec![
            row("WWB-9", "Gamma", Some(AllocationTag::Data), 10.0),
            row("WWB-9", "Gamma", Some(AllocationTag::Wellness), 20.0),
        ];

        let err = aggregate_proforma(&rows, &PipelineConfig::default()).unwrap_err();
        match err {
            ReconciliationError::AllocationTagConflict { code } => assert_eq!(code, "WWB-9"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_code_fails_with_row_number() {
        let rows = vec![row("A", "A", None, 1.0), row("  ", "Blank", None, 1.0)];
        let err = aggregate_proforma(&rows, &PipelineConfig::default()).unwrap_err();
        match err {
            ReconciliationError::InvalidContractCode { row, .. } => assert_eq!(row, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_expense_split() {
        let expense = |billable| ExpenseRecord {
            date: None,
            contract_code: "X".to_string(),
            amount: 10.0,
            billable,
        };
        let split = split_reimbursable(vec![
            expense(BillableFlag::Reimbursable),
            expense(BillableFlag::NonReimbursable),
            expense(BillableFlag::Unknown),
        ]);

        assert_eq!(split.included.len(), 2);
        assert_eq!(split.reimbursable_excluded, 1);
        assert_eq!(split.unknown_included, 1);
    }

    #[test]
    fn test_hours_month_window() {
        let month = RunMonth::parse("November2025").unwrap();
        let hours = |date| HoursRecord {
            date,
            contract_code: "X".to_string(),
            staff_key: "Smith".to_string(),
            hours: 1.0,
            project_name: None,
        };
        let (kept, dropped) = filter_hours_to_month(
            vec![
                hours(NaiveDate::from_ymd_opt(2025, 11, 3)),
                hours(NaiveDate::from_ymd_opt(2025, 12, 1)),
                hours(None),
            ],
            &month,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_compensation_strategies() {
        let a = direct_compensation(" Smith ", 85.0);
        assert_eq!(a.staff_key, "Smith");
        assert_eq!(a.strategy, CostStrategy::Direct);

        let components = CompensationComponents {
            base: 15000.0,
            taxes: 1200.0,
            ichra: 600.0,
            retirement_match: 450.0,
            assistant: 0.0,
            wellbeing: 100.0,
            travel: 316.6667,
        };
        let b = computed_compensation("Jones", components.monthly_total());
        assert_eq!(b.strategy, CostStrategy::Computed);
        assert!((b.hourly_cost - 81.5384).abs() < 0.001);
    }
}
