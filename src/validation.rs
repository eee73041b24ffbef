//! Run-level validation.
//!
//! Four rule families run over the final tables without short-circuiting,
//! so one report carries every issue. Completeness, key integrity and
//! reconciliation failures block the run; reasonableness only warns.

use crate::allocation::Pool;
use crate::config::UnmatchedStaffPolicy;
use crate::costs::{exclusion_message, unmatched_staff};
use crate::error::{ReconciliationError, Result};
use crate::schema::{
    CompensationRecord, CostCenter, ExpenseRecord, HoursRecord, LedgerAccount, MatchedBy,
    NonRevenueClient, OverheadPools, RevenueCenter,
};
use crate::utils::{format_money, within_tolerance};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Pass,
    Warn,
    Fail,
}

impl Severity {
    pub fn marker(&self) -> &'static str {
        match self {
            Severity::Pass => "✓",
            Severity::Warn => "⚠",
            Severity::Fail => "✗",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Completeness,
    KeyIntegrity,
    Reconciliation,
    Reasonableness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub family: RuleFamily,
    pub severity: Severity,
    pub message: String,
}

/// Append-only ledger of pass/warn/fail records, in the order they were
/// recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    records: Vec<ValidationRecord>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, family: RuleFamily, severity: Severity, message: impl Into<String>) {
        self.records.push(ValidationRecord {
            family,
            severity,
            message: message.into(),
        });
    }

    pub fn add_pass(&mut self, family: RuleFamily, message: impl Into<String>) {
        self.push(family, Severity::Pass, message);
    }

    pub fn add_warning(&mut self, family: RuleFamily, message: impl Into<String>) {
        self.push(family, Severity::Warn, message);
    }

    pub fn add_failure(&mut self, family: RuleFamily, message: impl Into<String>) {
        self.push(family, Severity::Fail, message);
    }

    pub fn records(&self) -> &[ValidationRecord] {
        &self.records
    }

    fn messages(&self, severity: Severity) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.severity == severity)
            .map(|r| r.message.as_str())
            .collect()
    }

    pub fn passes(&self) -> Vec<&str> {
        self.messages(Severity::Pass)
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.messages(Severity::Warn)
    }

    pub fn failures(&self) -> Vec<&str> {
        self.messages(Severity::Fail)
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|r| r.severity == Severity::Fail)
    }

    pub fn summary(&self) -> String {
        format!(
            "PASS: {} | WARN: {} | FAIL: {}",
            self.passes().len(),
            self.warnings().len(),
            self.failures().len()
        )
    }

    /// Turns accumulated failures into the error of the first failing
    /// family, in the order completeness, key integrity, reconciliation.
    pub fn escalate(self) -> Result<Self> {
        let first_failing = self
            .records
            .iter()
            .filter(|r| r.severity == Severity::Fail)
            .map(|r| r.family)
            .min();

        let Some(family) = first_failing else {
            return Ok(self);
        };

        let summary = self.summary();
        let failures: Vec<String> = self.failures().into_iter().map(str::to_string).collect();
        Err(match family {
            RuleFamily::Completeness => ReconciliationError::CompletenessFailure { summary, failures },
            RuleFamily::KeyIntegrity => ReconciliationError::KeyIntegrityFailure { summary, failures },
            // Reasonableness never records failures.
            RuleFamily::Reconciliation | RuleFamily::Reasonableness => {
                ReconciliationError::ReconciliationFailure { summary, failures }
            }
        })
    }
}

/// Everything the rule families look at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub revenue_centers: &'a [RevenueCenter],
    pub cost_centers: &'a [CostCenter],
    pub non_revenue_clients: &'a [NonRevenueClient],
    pub pools: &'a OverheadPools,
    /// Authoritative revenue-forecast total.
    pub source_revenue_total: f64,
    pub compensation: &'a [CompensationRecord],
    pub hours: &'a [HoursRecord],
    pub expenses: &'a [ExpenseRecord],
    pub ledger: &'a [LedgerAccount],
    pub tolerance: f64,
    pub unmatched_staff_policy: UnmatchedStaffPolicy,
}

pub fn validate_completeness(ctx: &ValidationContext, results: &mut ValidationResult) {
    let family = RuleFamily::Completeness;

    if ctx.revenue_centers.is_empty() {
        results.add_failure(family, "No revenue centers found");
    } else {
        results.add_pass(family, "Revenue centers loaded");
    }

    let pools = [ctx.pools.sga_pool, ctx.pools.data_pool, ctx.pools.workplace_pool];
    if pools.iter().all(|p| p.is_finite()) {
        results.add_pass(family, "Overhead pools calculated");
    } else {
        results.add_failure(
            family,
            "Overhead pools missing required values (sga_pool, data_pool, workplace_pool)",
        );
    }

    if ctx.compensation.is_empty() {
        results.add_failure(family, "Compensation data missing or empty");
    } else {
        results.add_pass(family, "Compensation loaded");
    }

    if ctx.hours.is_empty() {
        results.add_warning(family, "Hours table is empty");
    }
    if ctx.expenses.is_empty() {
        results.add_warning(family, "Expenses table is empty");
    }
}

pub fn validate_key_integrity(ctx: &ValidationContext, results: &mut ValidationResult) {
    let family = RuleFamily::KeyIntegrity;

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for record in ctx.compensation {
        *seen.entry(record.staff_key.as_str()).or_insert(0) += 1;
    }
    let duplicates: Vec<&str> = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(key, _)| *key)
        .collect();
    if duplicates.is_empty() {
        results.add_pass(family, "Unique staff keys in compensation");
    } else {
        results.add_failure(
            family,
            format!("Duplicate staff keys in compensation: {}", duplicates.join(", ")),
        );
    }

    let excluded = unmatched_staff(ctx.hours, ctx.compensation);
    match (exclusion_message(&excluded), ctx.unmatched_staff_policy) {
        (None, _) => results.add_pass(family, "All hours staff have compensation records"),
        (Some(_), UnmatchedStaffPolicy::Fail) => {
            let keys: Vec<&str> = excluded.iter().map(|s| s.staff_key.as_str()).collect();
            results.add_failure(
                family,
                format!("Hours staff missing in compensation: {}", keys.join(", ")),
            );
        }
        (Some(message), UnmatchedStaffPolicy::Warn) => results.add_warning(family, message),
    }

    let revenue: BTreeSet<&str> = ctx
        .revenue_centers
        .iter()
        .map(|r| r.contract_code.as_str())
        .collect();
    let cost: BTreeSet<&str> = ctx
        .cost_centers
        .iter()
        .map(|c| c.contract_code.as_str())
        .collect();
    let clients: BTreeSet<&str> = ctx
        .non_revenue_clients
        .iter()
        .map(|n| n.contract_code.as_str())
        .collect();

    let revenue_cost: Vec<&str> = revenue.intersection(&cost).copied().collect();
    if revenue_cost.is_empty() {
        results.add_pass(family, "No revenue/cost center code conflicts");
    } else {
        results.add_failure(
            family,
            format!(
                "Codes appear as both revenue and cost centers: {}",
                revenue_cost.join(", ")
            ),
        );
    }

    let mut client_overlap: BTreeSet<&str> = clients.intersection(&revenue).copied().collect();
    client_overlap.extend(clients.intersection(&cost).copied());
    if !client_overlap.is_empty() {
        results.add_failure(
            family,
            format!(
                "Non-revenue client codes also classified elsewhere: {}",
                client_overlap.into_iter().collect::<Vec<_>>().join(", ")
            ),
        );
    }
}

pub fn validate_reconciliation(ctx: &ValidationContext, results: &mut ValidationResult) {
    let family = RuleFamily::Reconciliation;

    let revenue_total: f64 = ctx.revenue_centers.iter().map(|r| r.revenue).sum();
    if within_tolerance(revenue_total, ctx.source_revenue_total, ctx.tolerance) {
        results.add_pass(
            family,
            format!("Revenue sum matches revenue forecast (±{})", ctx.tolerance),
        );
    } else {
        results.add_failure(
            family,
            format!(
                "Revenue sum {} does not match revenue forecast {} (diff {})",
                format_money(revenue_total),
                format_money(ctx.source_revenue_total),
                format_money((revenue_total - ctx.source_revenue_total).abs())
            ),
        );
    }

    for pool in Pool::ALL {
        let allocated = pool.allocated(ctx.revenue_centers);
        let pool_total = pool.total(ctx.pools);
        if within_tolerance(allocated, pool_total, ctx.tolerance) {
            results.add_pass(
                family,
                format!("{} allocation sums to pool (±{})", pool.label(), ctx.tolerance),
            );
        } else {
            results.add_failure(
                family,
                format!(
                    "{} allocation does not sum to pool: allocated {} of {} (diff {})",
                    pool.label(),
                    format_money(allocated),
                    format_money(pool_total),
                    format_money((allocated - pool_total).abs())
                ),
            );
        }
    }
}

pub fn validate_reasonableness(ctx: &ValidationContext, results: &mut ValidationResult) {
    let family = RuleFamily::Reasonableness;

    let no_hours: Vec<&str> = ctx
        .revenue_centers
        .iter()
        .filter(|r| r.hours == 0.0)
        .map(|r| r.contract_code.as_str())
        .collect();
    if !no_hours.is_empty() {
        results.add_warning(
            family,
            format!(
                "{} revenue centers have revenue but no hours: {}",
                no_hours.len(),
                no_hours.join(", ")
            ),
        );
    }

    let classified: BTreeSet<&str> = ctx
        .revenue_centers
        .iter()
        .map(|r| r.contract_code.as_str())
        .chain(ctx.cost_centers.iter().map(|c| c.contract_code.as_str()))
        .collect();
    let unbilled: BTreeSet<&str> = ctx
        .hours
        .iter()
        .map(|h| h.contract_code.as_str())
        .filter(|code| !classified.contains(code))
        .collect();
    if !unbilled.is_empty() {
        results.add_warning(
            family,
            format!(
                "{} codes have hours but no revenue (non-revenue clients): {}",
                unbilled.len(),
                unbilled.into_iter().collect::<Vec<_>>().join(", ")
            ),
        );
    }

    let unmatched: Vec<&str> = ctx
        .ledger
        .iter()
        .filter(|a| a.matched_by == MatchedBy::Default)
        .map(|a| a.account_name.as_str())
        .collect();
    if unmatched.is_empty() {
        results.add_pass(family, "All P&L accounts matched by tagging rules");
    } else {
        results.add_warning(
            family,
            format!(
                "{} P&L accounts defaulted to SG&A (unmatched): {}",
                unmatched.len(),
                unmatched.join(", ")
            ),
        );
    }
}

/// Runs every rule family into `results`, then escalates any failure.
pub fn run_all_validations(
    ctx: &ValidationContext,
    mut results: ValidationResult,
) -> Result<ValidationResult> {
    validate_completeness(ctx, &mut results);
    validate_key_integrity(ctx, &mut results);
    validate_reconciliation(ctx, &mut results);
    validate_reasonableness(ctx, &mut results);

    for record in results.records() {
        match record.severity {
            Severity::Warn => warn!("{}", record.message),
            Severity::Fail => warn!("FAIL: {}", record.message),
            Severity::Pass => {}
        }
    }
    info!("Validation: {}", results.summary());

    results.escalate()
}
