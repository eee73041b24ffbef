use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum AllocationTag {
    #[schemars(description = "Project draws a share of the Data Infrastructure pool")]
    Data,

    #[schemars(description = "Project draws a share of the Workplace Well-being pool")]
    Wellness,
}

impl AllocationTag {
    /// Revenue-forecast tag column values; anything else means untagged.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Data" => Some(Self::Data),
            "Wellness" => Some(Self::Wellness),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "Data",
            Self::Wellness => "Wellness",
        }
    }
}

/// Overhead bucket of a ledger account, also used as a cost center's pool label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bucket {
    #[schemars(description = "Data infrastructure spend, allocated to Data-tagged projects")]
    Data,

    #[schemars(description = "Workplace well-being spend, allocated to Wellness-tagged projects")]
    Workplace,

    #[schemars(description = "Not an overhead item (e.g. revenue, direct cost already counted)")]
    Nil,

    #[schemars(description = "Selling, general and administrative overhead, allocated to every project")]
    Sga,
}

impl Bucket {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DATA" => Some(Self::Data),
            "WORKPLACE" => Some(Self::Workplace),
            "NIL" => Some(Self::Nil),
            "SGA" | "SG&A" => Some(Self::Sga),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Workplace => "WORKPLACE",
            Self::Nil => "NIL",
            Self::Sga => "SGA",
        }
    }

    pub const ALL: [Bucket; 4] = [Bucket::Data, Bucket::Workplace, Bucket::Nil, Bucket::Sga];
}

/// Which way a staff member's hourly cost was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CostStrategy {
    /// Read directly from an hourly-cost column.
    #[serde(rename = "A")]
    Direct,
    /// Derived from monthly compensation divided by expected monthly hours.
    #[serde(rename = "B")]
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillableFlag {
    /// Billed back to the client; never a cost to the firm.
    Reimbursable,
    NonReimbursable,
    /// Blank or unrecognized value; treated as a cost.
    Unknown,
}

impl BillableFlag {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(value) = raw else {
            return Self::Unknown;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Self::Reimbursable,
            "no" | "n" | "false" | "0" => Self::NonReimbursable,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    Exact,
    Contains,
    Pattern,
    Default,
}

// ---- Source tables, as handed over by the loaders ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaRow {
    /// Raw code; normalized by the pipeline.
    pub contract_code: String,
    pub project_name: String,
    pub section: Option<String>,
    pub allocation_tag: Option<AllocationTag>,
    pub revenue: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProformaTable {
    pub rows: Vec<ProformaRow>,
    /// Total revenue as printed in the forecast, when the export carries one.
    pub reported_total: Option<f64>,
}

impl ProformaTable {
    /// The authoritative revenue total the revenue-center table must reconcile to.
    pub fn source_total(&self) -> f64 {
        self.reported_total
            .unwrap_or_else(|| self.rows.iter().map(|r| r.revenue).sum())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub staff_key: String,
    pub hourly_cost: f64,
    pub strategy: CostStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoursRecord {
    pub date: Option<NaiveDate>,
    pub contract_code: String,
    pub staff_key: String,
    pub hours: f64,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub date: Option<NaiveDate>,
    pub contract_code: String,
    pub amount: f64,
    pub billable: BillableFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub account_name: String,
    pub amount: f64,
}

/// The five monthly exports, already shaped into records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInputs {
    pub proforma: ProformaTable,
    pub compensation: Vec<CompensationRecord>,
    pub hours: Vec<HoursRecord>,
    pub expenses: Vec<ExpenseRecord>,
    pub pnl: Vec<LedgerLine>,
}

// ---- Derived tables ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub account_name: String,
    pub amount: f64,
    pub bucket: Bucket,
    pub matched_by: MatchedBy,
}

/// One revenue-forecast project after duplicate rows are folded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProformaProject {
    pub contract_code: String,
    pub project_name: String,
    pub section: Option<String>,
    pub analysis_category: String,
    pub allocation_tag: Option<AllocationTag>,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueCenter {
    pub contract_code: String,
    pub project_name: String,
    pub section: Option<String>,
    pub analysis_category: String,
    pub allocation_tag: Option<AllocationTag>,
    pub revenue: f64,
    pub hours: f64,
    pub labor_cost: f64,
    pub expense_cost: f64,
    pub sga_allocation: f64,
    pub data_allocation: f64,
    pub workplace_allocation: f64,
    pub margin_dollars: f64,
    pub margin_percent: f64,
}

impl RevenueCenter {
    /// A revenue center with no costs or allocations attached yet.
    pub fn from_project(project: &ProformaProject) -> Self {
        Self {
            contract_code: project.contract_code.clone(),
            project_name: project.project_name.clone(),
            section: project.section.clone(),
            analysis_category: project.analysis_category.clone(),
            allocation_tag: project.allocation_tag,
            revenue: project.revenue,
            hours: 0.0,
            labor_cost: 0.0,
            expense_cost: 0.0,
            sga_allocation: 0.0,
            data_allocation: 0.0,
            workplace_allocation: 0.0,
            margin_dollars: 0.0,
            margin_percent: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCenter {
    pub contract_code: String,
    pub description: String,
    pub pool: Bucket,
    /// Recognized by the internal-code prefix rather than listed in configuration.
    pub auto_recognized: bool,
    pub labor_cost: f64,
    pub expense_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonRevenueClient {
    pub contract_code: String,
    pub project_name: String,
    pub labor_cost: f64,
    pub expense_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverheadPools {
    pub sga_pool: f64,
    pub data_pool: f64,
    pub workplace_pool: f64,
}
