//! CSV loaders for the five monthly exports. Each one resolves its columns
//! through [`ColumnResolver`] and hands back the record shapes in
//! [`crate::schema`]; none of them does any business logic.

use crate::columns::ColumnResolver;
use crate::error::{ReconciliationError, Result};
use crate::ingestion::{computed_compensation, direct_compensation, CompensationComponents};
use crate::schema::{
    AllocationTag, BillableFlag, CompensationRecord, ExpenseRecord, HoursRecord, LedgerLine,
    PipelineInputs, ProformaRow, ProformaTable,
};
use crate::utils::{format_money, RunMonth};
use chrono::NaiveDate;
use csv::StringRecord;
use log::{debug, info};
use std::path::{Path, PathBuf};

const STAFF_KEY: &[&str] = &["Last Name", "LastName"];
const HOURLY_COST: &[&str] = &["Base Cost Per Hour", "Base Cost/Hour", "Hourly Cost"];
const MONTHLY_TOTAL: &[&str] = &["Total", "Total Compensation", "Monthly Total"];
const BASE: &[&str] = &["Base Compensation", "Base", "Base Comp"];
const TAXES: &[&str] = &["Company Taxes Paid", "Taxes", "Company Taxes"];
const ICHRA: &[&str] = &["ICHRA Contribution", "ICHRA"];
const RETIREMENT: &[&str] = &["401k Match", "401k", "401K Match"];
const ASSISTANT: &[&str] = &["Executive Assistant", "Assistant", "Exec Assistant"];
const WELLBEING: &[&str] = &["Well Being Card", "Wellbeing", "Well-being"];
const TRAVEL: &[&str] = &["Travel & Expenses", "Travel", "Travel and Expenses"];

const HOURS_DATE: &[&str] = &["Date", "Spent Date", "Work Date"];
const EXPENSE_DATE: &[&str] = &["Date", "Spent Date", "Expense Date"];
const PROJECT_CODE: &[&str] = &["Project Code", "Project", "Code"];
const PROJECT_NAME: &[&str] = &["Project Name", "Client Project"];
const HOURS: &[&str] = &["Hours", "Hours (h)", "Hours (decimal)"];
const PERSON: &[&str] = &["Last Name", "LastName", "Person"];
const AMOUNT: &[&str] = &["Amount", "Total Amount", "Amount (USD)"];
const BILLABLE: &[&str] = &["Billable", "Is Billable", "Billable?"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%d.%m.%Y"];

/// Paths of the five exports for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFiles {
    pub proforma: PathBuf,
    pub compensation: PathBuf,
    pub hours: PathBuf,
    pub expenses: PathBuf,
    pub pnl: PathBuf,
}

impl InputFiles {
    /// Human label and path of every input that does not exist.
    pub fn missing(&self) -> Vec<(&'static str, &Path)> {
        [
            ("Pro Forma", self.proforma.as_path()),
            ("Compensation", self.compensation.as_path()),
            ("Hours", self.hours.as_path()),
            ("Expenses", self.expenses.as_path()),
            ("P&L", self.pnl.as_path()),
        ]
        .into_iter()
        .filter(|(_, p)| !p.exists())
        .collect()
    }

    pub fn load(&self, month: &RunMonth) -> Result<PipelineInputs> {
        Ok(PipelineInputs {
            proforma: load_proforma(&self.proforma, month)?,
            compensation: load_compensation(&self.compensation)?,
            hours: load_hours(&self.hours)?,
            expenses: load_expenses(&self.expenses)?,
            pnl: load_pnl(&self.pnl)?,
        })
    }
}

/// Parses `1234.5`, `$1,234.50`, `(200.00)` and ` -7 `. Blank is `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };
    let cleaned: String = body.chars().filter(|c| !matches!(c, '$' | ',' | ' ')).collect();
    let value: f64 = cleaned.parse().ok()?;
    Some(if negative { -value } else { value })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // Spreadsheet exports sometimes append a midnight time component.
    let date_part = trimmed.split([' ', 'T']).next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

fn bad_value(source_name: &str, row: usize, column: &str, value: &str) -> ReconciliationError {
    ReconciliationError::Load {
        source_name: source_name.to_string(),
        details: format!("row {}: cannot read {} from '{}'", row, column, value),
    }
}

fn required_amount(record: &StringRecord, idx: usize, source_name: &str, row: usize, column: &str) -> Result<f64> {
    let raw = field(record, idx);
    parse_amount(raw).ok_or_else(|| bad_value(source_name, row, column, raw))
}

fn optional_amount(record: &StringRecord, idx: usize, source_name: &str, row: usize, column: &str) -> Result<f64> {
    let raw = field(record, idx);
    if raw.is_empty() {
        return Ok(0.0);
    }
    parse_amount(raw).ok_or_else(|| bad_value(source_name, row, column, raw))
}

fn optional_date(record: &StringRecord, idx: usize, source_name: &str, row: usize) -> Result<Option<NaiveDate>> {
    let raw = field(record, idx);
    if raw.is_empty() {
        return Ok(None);
    }
    parse_date(raw)
        .map(Some)
        .ok_or_else(|| bad_value(source_name, row, "date", raw))
}

fn open(path: &Path, has_headers: bool) -> Result<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_path(path)?)
}

/// Staff compensation. Reads an hourly cost directly when the export has
/// one (strategy A), otherwise derives it from monthly compensation
/// (strategy B).
pub fn load_compensation(path: impl AsRef<Path>) -> Result<Vec<CompensationRecord>> {
    const SRC: &str = "compensation";
    let mut reader = open(path.as_ref(), true)?;
    let columns = ColumnResolver::new(SRC, reader.headers()?.iter());

    let staff_col = columns.require("staff key", STAFF_KEY)?;
    let hourly_col = columns.find(HOURLY_COST);
    let total_col = columns.find(MONTHLY_TOTAL);

    enum Source {
        Hourly(usize),
        Total(usize),
        Components([usize; 7]),
    }

    let source = match (hourly_col, total_col) {
        (Some(idx), _) => {
            info!("Compensation strategy A: reading hourly cost directly");
            Source::Hourly(idx)
        }
        (None, Some(idx)) => {
            info!("Compensation strategy B: computing hourly cost from monthly total");
            Source::Total(idx)
        }
        (None, None) => {
            info!("Compensation strategy B: computing hourly cost from components");
            Source::Components([
                columns.require("base compensation", BASE)?,
                columns.require("company taxes", TAXES)?,
                columns.require("ICHRA contribution", ICHRA)?,
                columns.require("401k match", RETIREMENT)?,
                columns.require("executive assistant", ASSISTANT)?,
                columns.require("well-being card", WELLBEING)?,
                columns.require("travel", TRAVEL)?,
            ])
        }
    };

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = idx + 2;
        if is_blank(&record) {
            continue;
        }
        let staff_key = field(&record, staff_col);
        let entry = match &source {
            Source::Hourly(col) => {
                direct_compensation(staff_key, required_amount(&record, *col, SRC, row, "hourly cost")?)
            }
            Source::Total(col) => computed_compensation(
                staff_key,
                required_amount(&record, *col, SRC, row, "monthly total")?,
            ),
            Source::Components(cols) => {
                let amount = |i: usize, name: &str| optional_amount(&record, cols[i], SRC, row, name);
                let components = CompensationComponents {
                    base: amount(0, "base compensation")?,
                    taxes: amount(1, "company taxes")?,
                    ichra: amount(2, "ICHRA contribution")?,
                    retirement_match: amount(3, "401k match")?,
                    assistant: amount(4, "executive assistant")?,
                    wellbeing: amount(5, "well-being card")?,
                    travel: amount(6, "travel")?,
                };
                computed_compensation(staff_key, components.monthly_total())
            }
        };
        records.push(entry);
    }

    if !records.is_empty() {
        let avg = records.iter().map(|r| r.hourly_cost).sum::<f64>() / records.len() as f64;
        info!("Compensation: {} staff members, avg {}/hr", records.len(), format_money(avg));
    }
    Ok(records)
}

pub fn load_hours(path: impl AsRef<Path>) -> Result<Vec<HoursRecord>> {
    const SRC: &str = "hours";
    let mut reader = open(path.as_ref(), true)?;
    let columns = ColumnResolver::new(SRC, reader.headers()?.iter());

    let date_col = columns.require("date", HOURS_DATE)?;
    let code_col = columns.require("project code", PROJECT_CODE)?;
    let hours_col = columns.require("hours", HOURS)?;
    let person_col = columns.require("staff key", PERSON)?;
    let name_col = columns.find(PROJECT_NAME);

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = idx + 2;
        if is_blank(&record) {
            continue;
        }
        records.push(HoursRecord {
            date: optional_date(&record, date_col, SRC, row)?,
            contract_code: field(&record, code_col).to_string(),
            staff_key: field(&record, person_col).to_string(),
            hours: optional_amount(&record, hours_col, SRC, row, "hours")?,
            project_name: name_col
                .map(|c| field(&record, c).to_string())
                .filter(|n| !n.is_empty()),
        });
    }

    info!(
        "Hours: {} rows, {:.1} total hours",
        records.len(),
        records.iter().map(|r| r.hours).sum::<f64>()
    );
    Ok(records)
}

pub fn load_expenses(path: impl AsRef<Path>) -> Result<Vec<ExpenseRecord>> {
    const SRC: &str = "expenses";
    let mut reader = open(path.as_ref(), true)?;
    let columns = ColumnResolver::new(SRC, reader.headers()?.iter());

    let date_col = columns.require("date", EXPENSE_DATE)?;
    let code_col = columns.require("project code", PROJECT_CODE)?;
    let amount_col = columns.require("amount", AMOUNT)?;
    let billable_col = columns.require("billable", BILLABLE)?;

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = idx + 2;
        if is_blank(&record) {
            continue;
        }
        let billable = field(&record, billable_col);
        records.push(ExpenseRecord {
            date: optional_date(&record, date_col, SRC, row)?,
            contract_code: field(&record, code_col).to_string(),
            amount: optional_amount(&record, amount_col, SRC, row, "amount")?,
            billable: BillableFlag::parse(Some(billable).filter(|b| !b.is_empty())),
        });
    }

    info!("Expenses: {} rows", records.len());
    Ok(records)
}

/// Ledger extract: account name in the first column, amount in the column
/// headed "Total" or, failing that, the rightmost column holding numbers.
pub fn load_pnl(path: impl AsRef<Path>) -> Result<Vec<LedgerLine>> {
    const SRC: &str = "P&L";
    let mut reader = open(path.as_ref(), true)?;
    let headers = reader.headers()?.clone();
    let rows: Vec<StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;

    let total_col = headers
        .iter()
        .position(|h| h.to_lowercase().contains("total"))
        .or_else(|| {
            (1..headers.len()).rev().find(|&c| {
                rows.iter()
                    .take(10)
                    .any(|r| parse_amount(field(r, c)).is_some())
            })
        })
        .ok_or_else(|| ReconciliationError::Load {
            source_name: SRC.to_string(),
            details: "cannot find a Total column".to_string(),
        })?;

    let lines: Vec<LedgerLine> = rows
        .iter()
        .filter_map(|r| {
            let account_name = field(r, 0);
            let amount = parse_amount(field(r, total_col))?;
            (!account_name.is_empty()).then(|| LedgerLine {
                account_name: account_name.to_string(),
                amount,
            })
        })
        .collect();

    debug!("P&L: {} accounts with an amount", lines.len());
    Ok(lines)
}

/// Revenue forecast laid out as a sheet: a header row of month names within
/// the first ten rows, then tag / name / code columns with section header
/// rows (a name without a code) between projects. A "Base Revenue" or
/// "Forecasted Revenue" row in the first twenty rows carries the total.
pub fn load_proforma(path: impl AsRef<Path>, month: &RunMonth) -> Result<ProformaTable> {
    const SRC: &str = "revenue forecast";
    let mut reader = open(path.as_ref(), false)?;
    let rows: Vec<StringRecord> = reader.records().collect::<std::result::Result<_, _>>()?;
    let load_err = |details: String| ReconciliationError::Load {
        source_name: SRC.to_string(),
        details,
    };

    let header_idx = rows
        .iter()
        .take(10)
        .position(|r| {
            let text = r.iter().collect::<Vec<_>>().join(" ");
            ["Jan", "Feb", "Mar"].iter().all(|m| text.contains(m))
        })
        .ok_or_else(|| load_err("cannot find header row with month sequence (Jan, Feb, Mar)".to_string()))?;

    let header = &rows[header_idx];
    let month_col = find_month_column(header, month).ok_or_else(|| {
        load_err(format!("cannot find month column for '{}'", month.name()))
    })?;

    let total_idx = rows.iter().take(20).position(|r| {
        let label = field(r, 1).to_lowercase();
        label.contains("base revenue") || label.contains("forecasted revenue")
    });
    let reported_total = total_idx.and_then(|i| parse_amount(field(&rows[i], month_col)));
    if reported_total.is_none() {
        debug!("Revenue forecast has no total row; reconciling against the row sum");
    }

    let mut table = ProformaTable {
        rows: Vec::new(),
        reported_total,
    };
    let mut section: Option<String> = None;

    for (idx, record) in rows.iter().enumerate().skip(header_idx + 1) {
        if Some(idx) == total_idx {
            continue;
        }
        let name = field(record, 1);
        let code = field(record, 2);
        match (name.is_empty(), code.is_empty()) {
            (true, true) => continue,
            (false, true) => section = Some(name.to_string()),
            (_, false) => {
                let revenue = match field(record, month_col) {
                    "" => 0.0,
                    raw => parse_amount(raw).ok_or_else(|| {
                        load_err(format!("row {}: cannot read revenue from '{}'", idx + 1, raw))
                    })?,
                };
                table.rows.push(ProformaRow {
                    contract_code: code.to_string(),
                    project_name: name.to_string(),
                    section: section.clone(),
                    allocation_tag: AllocationTag::parse(field(record, 0)),
                    revenue,
                });
            }
        }
    }

    if table.rows.is_empty() {
        return Err(load_err("no projects found after parsing".to_string()));
    }

    info!(
        "Pro Forma: {} project rows, revenue {}",
        table.rows.len(),
        format_money(table.source_total())
    );
    Ok(table)
}

/// Full month name first, then the three-letter abbreviation, then any case.
fn find_month_column(header: &StringRecord, month: &RunMonth) -> Option<usize> {
    let full = month.name();
    let abbrev = &full[..3];
    header
        .iter()
        .position(|h| h.trim() == full)
        .or_else(|| header.iter().position(|h| h.trim() == abbrev))
        .or_else(|| {
            header.iter().position(|h| {
                let h = h.trim().to_lowercase();
                h == full.to_lowercase() || h == abbrev.to_lowercase()
            })
        })
}
