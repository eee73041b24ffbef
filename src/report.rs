//! Output artifacts for one run month.
//!
//! Everything is rendered in memory first and written into a staging
//! directory that is renamed into `<output_root>/<month>/` only once every
//! file is on disk. A failed run therefore never leaves partial outputs.

use crate::allocation::Pool;
use crate::costs::hourly_rates;
use crate::error::{ReconciliationError, Result};
use crate::schema::{
    AllocationTag, BillableFlag, CompensationRecord, CostCenter, ExpenseRecord, HoursRecord,
    NonRevenueClient, RevenueCenter,
};
use crate::utils::{format_money, round_cents};
use crate::validation::{Severity, ValidationResult};
use crate::AnalysisResult;
use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const REVENUE_CENTERS_FILE: &str = "revenue_centers.csv";
pub const COST_CENTERS_FILE: &str = "cost_centers.csv";
pub const NON_REVENUE_CLIENTS_FILE: &str = "non_revenue_clients.csv";
pub const VALIDATION_REPORT_FILE: &str = "validation_report.md";
pub const POOLS_FILE: &str = "_pools.json";
pub const HOURS_DETAIL_FILE: &str = "_hours_detail.csv";
pub const EXPENSES_DETAIL_FILE: &str = "_expenses_detail.csv";

const REVENUE_CENTER_COLUMNS: [&str; 13] = [
    "contract_code",
    "project_name",
    "proforma_section",
    "analysis_category",
    "allocation_tag",
    "revenue",
    "labor_cost",
    "non_reimbursable_expense",
    "sga_allocation",
    "data_infrastructure_allocation",
    "workplace_wellbeing_allocation",
    "margin_dollars",
    "margin_percent",
];

const COST_CENTER_COLUMNS: [&str; 6] = [
    "cost_center_code",
    "description",
    "labor_cost",
    "non_reimbursable_expense",
    "total_cost",
    "notes",
];

const NON_REVENUE_CLIENT_COLUMNS: [&str; 5] = [
    "project_code",
    "project_name",
    "labor_cost",
    "non_reimbursable_expense",
    "total_cost",
];

const HOURS_DETAIL_COLUMNS: [&str; 7] = [
    "date",
    "contract_code",
    "staff_key",
    "project_name",
    "hours",
    "hourly_cost",
    "labor_cost",
];

const EXPENSES_DETAIL_COLUMNS: [&str; 4] = ["date", "contract_code", "amount", "billable"];

#[derive(Serialize)]
struct RevenueCenterRow<'a> {
    contract_code: &'a str,
    project_name: &'a str,
    proforma_section: &'a str,
    analysis_category: &'a str,
    allocation_tag: &'a str,
    revenue: f64,
    labor_cost: f64,
    non_reimbursable_expense: f64,
    sga_allocation: f64,
    data_infrastructure_allocation: f64,
    workplace_wellbeing_allocation: f64,
    margin_dollars: f64,
    margin_percent: f64,
}

impl<'a> From<&'a RevenueCenter> for RevenueCenterRow<'a> {
    fn from(c: &'a RevenueCenter) -> Self {
        Self {
            contract_code: &c.contract_code,
            project_name: &c.project_name,
            proforma_section: c.section.as_deref().unwrap_or(""),
            analysis_category: &c.analysis_category,
            allocation_tag: c.allocation_tag.as_ref().map_or("", AllocationTag::as_str),
            revenue: round_cents(c.revenue),
            labor_cost: round_cents(c.labor_cost),
            non_reimbursable_expense: round_cents(c.expense_cost),
            sga_allocation: round_cents(c.sga_allocation),
            data_infrastructure_allocation: round_cents(c.data_allocation),
            workplace_wellbeing_allocation: round_cents(c.workplace_allocation),
            margin_dollars: round_cents(c.margin_dollars),
            margin_percent: round_cents(c.margin_percent),
        }
    }
}

#[derive(Serialize)]
struct CostCenterRow<'a> {
    cost_center_code: &'a str,
    description: &'a str,
    labor_cost: f64,
    non_reimbursable_expense: f64,
    total_cost: f64,
    notes: String,
}

impl<'a> From<&'a CostCenter> for CostCenterRow<'a> {
    fn from(c: &'a CostCenter) -> Self {
        let notes = if c.auto_recognized {
            format!("{} pool; auto-recognized by internal code prefix", c.pool.as_str())
        } else {
            format!("{} pool", c.pool.as_str())
        };
        Self {
            cost_center_code: &c.contract_code,
            description: &c.description,
            labor_cost: round_cents(c.labor_cost),
            non_reimbursable_expense: round_cents(c.expense_cost),
            total_cost: round_cents(c.total_cost),
            notes,
        }
    }
}

#[derive(Serialize)]
struct NonRevenueClientRow<'a> {
    project_code: &'a str,
    project_name: &'a str,
    labor_cost: f64,
    non_reimbursable_expense: f64,
    total_cost: f64,
}

impl<'a> From<&'a NonRevenueClient> for NonRevenueClientRow<'a> {
    fn from(c: &'a NonRevenueClient) -> Self {
        Self {
            project_code: &c.contract_code,
            project_name: &c.project_name,
            labor_cost: round_cents(c.labor_cost),
            non_reimbursable_expense: round_cents(c.expense_cost),
            total_cost: round_cents(c.total_cost),
        }
    }
}

/// Cost columns stay empty for staff without a compensation record.
#[derive(Serialize)]
struct HoursDetailRow<'a> {
    date: Option<NaiveDate>,
    contract_code: &'a str,
    staff_key: &'a str,
    project_name: &'a str,
    hours: f64,
    hourly_cost: Option<f64>,
    labor_cost: Option<f64>,
}

#[derive(Serialize)]
struct ExpenseDetailRow<'a> {
    date: Option<NaiveDate>,
    contract_code: &'a str,
    amount: f64,
    billable: &'static str,
}

fn billable_label(flag: BillableFlag) -> &'static str {
    match flag {
        BillableFlag::Reimbursable => "reimbursable",
        BillableFlag::NonReimbursable => "non_reimbursable",
        BillableFlag::Unknown => "unknown",
    }
}

/// The header is written explicitly so empty tables still carry one.
fn to_csv<T: Serialize>(columns: &[&str], rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ReconciliationError::IoError(e.into_error()))
}

pub fn revenue_centers_csv(centers: &[RevenueCenter]) -> Result<Vec<u8>> {
    to_csv(&REVENUE_CENTER_COLUMNS, centers.iter().map(RevenueCenterRow::from))
}

pub fn cost_centers_csv(centers: &[CostCenter]) -> Result<Vec<u8>> {
    to_csv(&COST_CENTER_COLUMNS, centers.iter().map(CostCenterRow::from))
}

pub fn non_revenue_clients_csv(clients: &[NonRevenueClient]) -> Result<Vec<u8>> {
    to_csv(
        &NON_REVENUE_CLIENT_COLUMNS,
        clients.iter().map(NonRevenueClientRow::from),
    )
}

/// Source hours behind the labor columns, sorted by code, staff and date.
pub fn hours_detail_csv(
    hours: &[HoursRecord],
    compensation: &[CompensationRecord],
) -> Result<Vec<u8>> {
    let rates = hourly_rates(compensation);
    let mut rows: Vec<HoursDetailRow> = hours
        .iter()
        .map(|h| {
            let rate = rates.get(h.staff_key.as_str()).copied();
            HoursDetailRow {
                date: h.date,
                contract_code: &h.contract_code,
                staff_key: &h.staff_key,
                project_name: h.project_name.as_deref().unwrap_or(""),
                hours: round_cents(h.hours),
                hourly_cost: rate.map(round_cents),
                labor_cost: rate.map(|r| round_cents(h.hours * r)),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.contract_code
            .cmp(b.contract_code)
            .then_with(|| a.staff_key.cmp(b.staff_key))
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.hours.total_cmp(&b.hours))
    });
    to_csv(&HOURS_DETAIL_COLUMNS, rows)
}

/// Expenses counted as cost, sorted by code and date.
pub fn expenses_detail_csv(expenses: &[ExpenseRecord]) -> Result<Vec<u8>> {
    let mut rows: Vec<ExpenseDetailRow> = expenses
        .iter()
        .map(|e| ExpenseDetailRow {
            date: e.date,
            contract_code: &e.contract_code,
            amount: round_cents(e.amount),
            billable: billable_label(e.billable),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.contract_code
            .cmp(b.contract_code)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.amount.total_cmp(&b.amount))
            .then_with(|| a.billable.cmp(b.billable))
    });
    to_csv(&EXPENSES_DETAIL_COLUMNS, rows)
}

pub fn validation_report_markdown(
    month: &str,
    results: &ValidationResult,
    metadata: &[(String, String)],
) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Validation Report - {}\n\n", month));
    output.push_str(&format!("**Summary:** {}\n\n", results.summary()));

    if !metadata.is_empty() {
        output.push_str("## Metadata\n\n");
        for (key, value) in metadata {
            output.push_str(&format!("- **{}:** {}\n", key, value));
        }
        output.push('\n');
    }

    let sections = [
        (Severity::Pass, "Passing Checks", results.passes()),
        (Severity::Warn, "Warnings", results.warnings()),
        (Severity::Fail, "Failures", results.failures()),
    ];
    for (severity, title, messages) in sections {
        if messages.is_empty() {
            continue;
        }
        output.push_str(&format!("## {} {}\n\n", severity.marker(), title));
        for message in messages {
            output.push_str(&format!("- {} {}\n", severity.marker(), message));
        }
        output.push('\n');
    }

    output
}

/// Pool totals plus the revenue bases they were spread over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolsSummary {
    pub sga_pool: f64,
    pub data_pool: f64,
    pub workplace_pool: f64,
    pub total_revenue: f64,
    pub data_tagged_revenue: f64,
    pub wellness_tagged_revenue: f64,
}

impl PoolsSummary {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let centers = &result.revenue_centers;
        Self {
            sga_pool: round_cents(result.pools.sga_pool),
            data_pool: round_cents(result.pools.data_pool),
            workplace_pool: round_cents(result.pools.workplace_pool),
            total_revenue: round_cents(Pool::Sga.cohort_revenue(centers)),
            data_tagged_revenue: round_cents(Pool::Data.cohort_revenue(centers)),
            wellness_tagged_revenue: round_cents(Pool::Workplace.cohort_revenue(centers)),
        }
    }
}

fn report_metadata(result: &AnalysisResult) -> Vec<(String, String)> {
    vec![
        ("Month".to_string(), result.month.to_string()),
        (
            "Revenue forecast total".to_string(),
            format_money(result.source_revenue_total),
        ),
        (
            "Revenue centers".to_string(),
            result.revenue_centers.len().to_string(),
        ),
        ("Cost centers".to_string(), result.cost_centers.len().to_string()),
        (
            "Non-revenue clients".to_string(),
            result.non_revenue_clients.len().to_string(),
        ),
        ("P&L accounts".to_string(), result.ledger.len().to_string()),
        ("SG&A pool".to_string(), format_money(result.pools.sga_pool)),
        (
            "Data Infrastructure pool".to_string(),
            format_money(result.pools.data_pool),
        ),
        (
            "Workplace Well-being pool".to_string(),
            format_money(result.pools.workplace_pool),
        ),
    ]
}

/// Every artifact for a run, as `(file name, contents)`.
pub fn render_outputs(result: &AnalysisResult) -> Result<Vec<(&'static str, Vec<u8>)>> {
    let month = result.month.to_string();
    let report =
        validation_report_markdown(&month, &result.validation, &report_metadata(result));
    let pools = serde_json::to_string_pretty(&PoolsSummary::from_result(result))?;

    Ok(vec![
        (REVENUE_CENTERS_FILE, revenue_centers_csv(&result.revenue_centers)?),
        (COST_CENTERS_FILE, cost_centers_csv(&result.cost_centers)?),
        (
            NON_REVENUE_CLIENTS_FILE,
            non_revenue_clients_csv(&result.non_revenue_clients)?,
        ),
        (VALIDATION_REPORT_FILE, report.into_bytes()),
        (POOLS_FILE, pools.into_bytes()),
        (
            HOURS_DETAIL_FILE,
            hours_detail_csv(&result.hours, &result.compensation)?,
        ),
        (EXPENSES_DETAIL_FILE, expenses_detail_csv(&result.expenses)?),
    ])
}

fn write_files(dir: &Path, files: &[(&'static str, Vec<u8>)]) -> Result<()> {
    fs::create_dir_all(dir)?;
    for (name, contents) in files {
        fs::write(dir.join(name), contents)?;
        debug!("Wrote {}", dir.join(name).display());
    }
    Ok(())
}

/// Writes all artifacts to `<output_root>/<month>/`, replacing a previous
/// run for the same month. Other months are never touched.
pub fn write_outputs(output_root: &Path, result: &AnalysisResult) -> Result<PathBuf> {
    let month = result.month.to_string();
    let files = render_outputs(result)?;

    let final_dir = output_root.join(&month);
    let staging_dir = output_root.join(format!(".{}.staging", month));

    if staging_dir.exists() {
        fs::remove_dir_all(&staging_dir)?;
    }
    if let Err(e) = write_files(&staging_dir, &files) {
        let _ = fs::remove_dir_all(&staging_dir);
        return Err(e);
    }

    if final_dir.exists() {
        fs::remove_dir_all(&final_dir)?;
    }
    fs::rename(&staging_dir, &final_dir)?;

    info!("Outputs written to {}", final_dir.display());
    Ok(final_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Bucket, ProformaProject};
    use crate::validation::RuleFamily;

    fn center() -> RevenueCenter {
        let mut center = RevenueCenter::from_project(&ProformaProject {
            contract_code: "BEH-01".to_string(),
            project_name: "Alpha, Inc".to_string(),
            section: Some("BEH".to_string()),
            analysis_category: "Next Gen Advisory".to_string(),
            allocation_tag: Some(AllocationTag::Data),
            revenue: 1000.0,
        });
        center.labor_cost = 333.333;
        center.margin_dollars = 666.667;
        center.margin_percent = 66.6667;
        center
    }

    #[test]
    fn test_revenue_centers_csv() {
        let bytes = revenue_centers_csv(&[center()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next().unwrap(), REVENUE_CENTER_COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "BEH-01,\"Alpha, Inc\",BEH,Next Gen Advisory,Data,1000.0,333.33,0.0,0.0,0.0,0.0,666.67,66.67"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_tables_keep_headers() {
        let text = String::from_utf8(non_revenue_clients_csv(&[]).unwrap()).unwrap();
        assert_eq!(
            text,
            "project_code,project_name,labor_cost,non_reimbursable_expense,total_cost\n"
        );
    }

    #[test]
    fn test_cost_center_notes() {
        let cc = CostCenter {
            contract_code: "INT-Ops".to_string(),
            description: "Operations".to_string(),
            pool: Bucket::Sga,
            auto_recognized: true,
            labor_cost: 10.0,
            expense_cost: 5.0,
            total_cost: 15.0,
        };
        let text = String::from_utf8(cost_centers_csv(&[cc]).unwrap()).unwrap();
        assert!(text.ends_with(
            "INT-Ops,Operations,10.0,5.0,15.0,SGA pool; auto-recognized by internal code prefix\n"
        ));
    }

    #[test]
    fn test_hours_detail_sorted_with_blank_cost_for_unmatched() {
        let logged = |code: &str, staff: &str, day, hours| HoursRecord {
            date: NaiveDate::from_ymd_opt(2025, 11, day),
            contract_code: code.to_string(),
            staff_key: staff.to_string(),
            hours,
            project_name: Some("Alpha".to_string()),
        };
        let hours = vec![
            logged("BEH-02", "Smith", 3, 1.0),
            logged("BEH-01", "Smith", 4, 2.5),
            logged("BEH-01", "Ghost", 5, 1.0),
        ];
        let compensation = vec![CompensationRecord {
            staff_key: "Smith".to_string(),
            hourly_cost: 81.538_46,
            strategy: crate::schema::CostStrategy::Computed,
        }];

        let text = String::from_utf8(hours_detail_csv(&hours, &compensation).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HOURS_DETAIL_COLUMNS.join(","));
        assert_eq!(lines[1], "2025-11-05,BEH-01,Ghost,Alpha,1.0,,");
        assert_eq!(lines[2], "2025-11-04,BEH-01,Smith,Alpha,2.5,81.54,203.85");
        assert_eq!(lines[3], "2025-11-03,BEH-02,Smith,Alpha,1.0,81.54,81.54");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_expenses_detail_rounds_and_sorts() {
        let expense = |code: &str, day, amount, billable| ExpenseRecord {
            date: NaiveDate::from_ymd_opt(2025, 11, day),
            contract_code: code.to_string(),
            amount,
            billable,
        };
        let expenses = vec![
            expense("B", 2, 10.005_1, BillableFlag::Unknown),
            expense("A", 9, 40.0, BillableFlag::NonReimbursable),
        ];

        let text = String::from_utf8(expenses_detail_csv(&expenses).unwrap()).unwrap();
        assert_eq!(
            text,
            "date,contract_code,amount,billable\n\
             2025-11-09,A,40.0,non_reimbursable\n\
             2025-11-02,B,10.01,unknown\n"
        );
    }

    #[test]
    fn test_validation_report_layout() {
        let mut results = ValidationResult::new();
        results.add_pass(RuleFamily::Completeness, "Revenue centers loaded");
        results.add_warning(RuleFamily::Reasonableness, "1 revenue centers have revenue but no hours: X");

        let report = validation_report_markdown(
            "November2025",
            &results,
            &[("Month".to_string(), "November2025".to_string())],
        );

        assert!(report.starts_with("# Validation Report - November2025\n\n**Summary:** PASS: 1 | WARN: 1 | FAIL: 0\n"));
        assert!(report.contains("## Metadata\n\n- **Month:** November2025\n"));
        assert!(report.contains("## ✓ Passing Checks\n\n- ✓ Revenue centers loaded\n"));
        assert!(report.contains("## ⚠ Warnings\n\n- ⚠ 1 revenue centers"));
        assert!(!report.contains("Failures"));
    }
}
