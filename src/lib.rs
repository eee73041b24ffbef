//! # Margin Reconciliation
//!
//! A deterministic monthly margin pipeline. Five exports (revenue forecast,
//! compensation, logged hours, expenses and the P&L ledger) go in; a
//! per-project margin table, cost-center and non-revenue-client roll-ups,
//! overhead pool totals and an audited validation report come out.
//!
//! ## Core Concepts
//!
//! - **Contract code**: the normalized join key across every table
//! - **Classification**: every observed code is exactly one of revenue
//!   center, cost center or non-revenue client
//! - **Overhead pools**: SG&A, Data Infrastructure and Workplace Well-being,
//!   each spread pro-rata by revenue over its own cohort
//! - **Validation**: completeness, key integrity and reconciliation failures
//!   block the run; reasonableness issues are reported as warnings
//!
//! ## Example
//!
//! ```rust,ignore
//! use margin_reconciliation::*;
//!
//! let config = PipelineConfig::load_dir("config")?;
//! let files = InputFiles {
//!     proforma: "data/proforma.csv".into(),
//!     compensation: "data/compensation.csv".into(),
//!     hours: "data/hours.csv".into(),
//!     expenses: "data/expenses.csv".into(),
//!     pnl: "data/pnl.csv".into(),
//! };
//!
//! let (result, dir) = run_analysis("November2025", &files, &config, "output")?;
//! println!("{} -> {}", result.validation.summary(), dir.display());
//! ```

pub mod allocation;
pub mod classification;
pub mod columns;
pub mod config;
pub mod costs;
pub mod error;
pub mod ingestion;
pub mod loaders;
pub mod margins;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod tagging;
pub mod utils;
pub mod validation;

pub use allocation::{OverheadAllocator, Pool};
pub use classification::{classify, classify_code, Classification, CodeClass};
pub use columns::ColumnResolver;
pub use config::{CostCenterEntry, MatchType, PipelineConfig, TagRule, UnmatchedStaffPolicy};
pub use costs::{calculate_expense_costs, calculate_labor_costs, merge_direct_costs, LaborCosts};
pub use error::{ReconciliationError, Result};
pub use loaders::InputFiles;
pub use margins::calculate_margins;
pub use normalize::normalize_contract_code;
pub use report::write_outputs;
pub use schema::*;
pub use tagging::LedgerTagger;
pub use utils::RunMonth;
pub use validation::{
    run_all_validations, RuleFamily, Severity, ValidationContext, ValidationRecord,
    ValidationResult,
};

use ingestion::{
    aggregate_proforma, filter_hours_to_month, normalize_compensation, normalize_expenses,
    normalize_hours, split_reimbursable,
};
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything one successful run produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    #[serde(serialize_with = "serialize_month")]
    pub month: RunMonth,
    pub revenue_centers: Vec<RevenueCenter>,
    pub cost_centers: Vec<CostCenter>,
    pub non_revenue_clients: Vec<NonRevenueClient>,
    pub pools: OverheadPools,
    pub ledger: Vec<LedgerAccount>,
    pub validation: ValidationResult,
    /// Month-filtered hours, costed or not, for the drill-down detail.
    pub hours: Vec<HoursRecord>,
    /// Expenses counted as cost.
    pub expenses: Vec<ExpenseRecord>,
    pub compensation: Vec<CompensationRecord>,
    /// Authoritative revenue-forecast total the revenue centers reconcile to.
    pub source_revenue_total: f64,
}

fn serialize_month<S: serde::Serializer>(
    month: &RunMonth,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(month)
}

pub struct MonthlyReconciliation;

impl MonthlyReconciliation {
    pub fn process(
        month: &str,
        inputs: &PipelineInputs,
        config: &PipelineConfig,
    ) -> Result<AnalysisResult> {
        config.validate()?;
        let month = RunMonth::parse(month)?;

        info!("Processing margin reconciliation for {}", month);
        debug!(
            "Inputs: {} forecast rows, {} compensation, {} hours, {} expenses, {} P&L lines",
            inputs.proforma.rows.len(),
            inputs.compensation.len(),
            inputs.hours.len(),
            inputs.expenses.len(),
            inputs.pnl.len()
        );

        let mut results = ValidationResult::new();

        let projects = aggregate_proforma(&inputs.proforma.rows, config)?;
        let source_revenue_total = inputs.proforma.source_total();

        let compensation = normalize_compensation(&inputs.compensation)?;
        let (hours, dropped) = filter_hours_to_month(normalize_hours(&inputs.hours)?, &month);
        if dropped > 0 {
            results.add_warning(
                RuleFamily::Reasonableness,
                format!("{} hours rows dated outside {} were dropped", dropped, month),
            );
        }

        let expenses = split_reimbursable(normalize_expenses(&inputs.expenses)?);
        if expenses.unknown_included > 0 {
            results.add_warning(
                RuleFamily::Reasonableness,
                format!(
                    "{} expenses have unknown Billable values (included as non-reimbursable)",
                    expenses.unknown_included
                ),
            );
        }

        let ledger = LedgerTagger::new(&config.pnl_tag_rules)?.tag_ledger(&inputs.pnl);

        let mut classification = classify(&projects, &hours, &expenses.included, config)?;

        let labor = calculate_labor_costs(&hours, &compensation);
        let expense_costs = calculate_expense_costs(&expenses.included);
        merge_direct_costs(&mut classification, &labor, &expense_costs);

        let allocator = OverheadAllocator::new(config.allocation_tolerance);
        let pools = allocator.calculate_pools(
            &ledger,
            &classification.cost_centers,
            config.include_cost_center_overhead_in_sga,
        );

        let Classification {
            mut revenue_centers,
            cost_centers,
            non_revenue_clients,
        } = classification;
        allocator.allocate_all(&mut revenue_centers, &pools)?;
        calculate_margins(&mut revenue_centers);

        let ctx = ValidationContext {
            revenue_centers: &revenue_centers,
            cost_centers: &cost_centers,
            non_revenue_clients: &non_revenue_clients,
            pools: &pools,
            source_revenue_total,
            compensation: &compensation,
            hours: &hours,
            expenses: &expenses.included,
            ledger: &ledger,
            tolerance: config.allocation_tolerance,
            unmatched_staff_policy: config.unmatched_staff_policy,
        };
        let validation = run_all_validations(&ctx, results)?;

        Ok(AnalysisResult {
            month,
            revenue_centers,
            cost_centers,
            non_revenue_clients,
            pools,
            ledger,
            validation,
            hours,
            expenses: expenses.included,
            compensation,
            source_revenue_total,
        })
    }

    /// Loads the exports, runs the pipeline and writes the month's outputs.
    /// Nothing is written unless the run succeeds.
    pub fn process_files(
        month: &str,
        files: &InputFiles,
        config: &PipelineConfig,
        output_root: impl AsRef<Path>,
    ) -> Result<(AnalysisResult, PathBuf)> {
        let run_month = RunMonth::parse(month)?;
        let inputs = files.load(&run_month)?;
        let result = Self::process(month, &inputs, config)?;
        let dir = write_outputs(output_root.as_ref(), &result)?;
        Ok((result, dir))
    }
}

pub fn run_pipeline(
    month: &str,
    inputs: &PipelineInputs,
    config: &PipelineConfig,
) -> Result<AnalysisResult> {
    MonthlyReconciliation::process(month, inputs, config)
}

pub fn run_analysis(
    month: &str,
    files: &InputFiles,
    config: &PipelineConfig,
    output_root: impl AsRef<Path>,
) -> Result<(AnalysisResult, PathBuf)> {
    MonthlyReconciliation::process_files(month, files, config, output_root)
}
