use crate::error::{ReconciliationError, Result};
use crate::normalize::normalize_contract_code;
use crate::schema::Bucket;
use crate::tagging::LedgerTagger;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.json";
pub const COST_CENTERS_FILE: &str = "cost_centers.csv";
pub const PNL_TAGS_FILE: &str = "pnl_account_tags.csv";
pub const CATEGORY_MAPPING_FILE: &str = "category_mapping.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[schemars(description = "Account name equals the pattern exactly (case-sensitive). Highest priority.")]
    Exact,

    #[schemars(description = "Account name contains the pattern (case-insensitive). Checked after all exact rules.")]
    Contains,

    #[serde(alias = "regex")]
    #[schemars(description = "Account name matches the pattern as a case-insensitive regular expression. Checked last.")]
    Pattern,
}

impl MatchType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "contains" => Some(Self::Contains),
            "pattern" | "regex" => Some(Self::Pattern),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TagRule {
    pub match_type: MatchType,
    pub pattern: String,
    pub bucket: Bucket,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CostCenterEntry {
    #[schemars(description = "Contract code of the internal cost pool")]
    pub code: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_pool")]
    #[schemars(description = "Overhead pool this cost center's spend rolls into (SGA or DATA; other labels never feed a pool)")]
    pub pool: Bucket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedStaffPolicy {
    #[default]
    #[schemars(description = "Hours logged by staff without compensation block the run")]
    Fail,

    #[schemars(description = "Such hours are excluded from labor cost and reported as a warning")]
    Warn,
}

/// Every knob the pipeline reads. Nothing is taken from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    #[schemars(description = "Explicitly configured cost centers. A code listed here that also carries revenue is a classification conflict.")]
    pub cost_centers: Vec<CostCenterEntry>,

    #[serde(default)]
    #[schemars(description = "Ledger account tagging rules. Unmatched accounts fall into SGA and are flagged.")]
    pub pnl_tag_rules: Vec<TagRule>,

    #[serde(default)]
    #[schemars(description = "Revenue-forecast section label to analysis category. Unmapped sections become 'Unknown'.")]
    pub category_mapping: BTreeMap<String, String>,

    #[serde(default = "default_tolerance")]
    #[schemars(description = "Maximum absolute difference, in dollars, accepted by every reconciliation check")]
    pub allocation_tolerance: f64,

    #[serde(default = "default_true", alias = "include_cost_center_overhead_in_sga_pool")]
    #[schemars(description = "Roll cost-center spend into the SGA and DATA pools according to each cost center's pool label. Never affects the workplace pool.")]
    pub include_cost_center_overhead_in_sga: bool,

    #[serde(default = "default_internal_prefix")]
    #[schemars(description = "Codes starting with this prefix are cost centers unless they carry revenue. Null or empty disables auto-recognition.")]
    pub internal_code_prefix: Option<String>,

    #[serde(default)]
    pub unmatched_staff_policy: UnmatchedStaffPolicy,
}

fn default_pool() -> Bucket {
    Bucket::Sga
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

fn default_internal_prefix() -> Option<String> {
    Some("INT-".to_string())
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cost_centers: Vec::new(),
            pnl_tag_rules: Vec::new(),
            category_mapping: BTreeMap::new(),
            allocation_tolerance: default_tolerance(),
            include_cost_center_overhead_in_sga: true,
            internal_code_prefix: default_internal_prefix(),
            unmatched_staff_policy: UnmatchedStaffPolicy::Fail,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CostCenterCsvRow {
    code: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    pool: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagRuleCsvRow {
    match_type: String,
    pattern: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct CategoryCsvRow {
    pro_forma_category: String,
    analysis_category: String,
}

impl PipelineConfig {
    /// Reads `settings.json`, `cost_centers.csv`, `pnl_account_tags.csv` and the
    /// optional `category_mapping.csv` from one directory. Missing settings fall
    /// back to defaults; entries from the CSV files are appended after any
    /// already present in `settings.json`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let settings_path = dir.join(SETTINGS_FILE);
        let mut config: PipelineConfig = if settings_path.exists() {
            let text = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&text)?
        } else {
            PipelineConfig::default()
        };

        let cc_path = dir.join(COST_CENTERS_FILE);
        if cc_path.exists() {
            let mut reader = csv::Reader::from_path(&cc_path)?;
            for row in reader.deserialize::<CostCenterCsvRow>() {
                let row = row?;
                let pool = match row.pool.as_deref().map(str::trim) {
                    None | Some("") => Bucket::Sga,
                    Some(label) => Bucket::parse(label).ok_or_else(|| {
                        ReconciliationError::InvalidConfig(format!(
                            "cost center '{}' has unknown pool label '{}'",
                            row.code, label
                        ))
                    })?,
                };
                config.cost_centers.push(CostCenterEntry {
                    code: row.code,
                    description: row.description.unwrap_or_default().trim().to_string(),
                    pool,
                });
            }
        }

        let tags_path = dir.join(PNL_TAGS_FILE);
        if tags_path.exists() {
            let mut reader = csv::Reader::from_path(&tags_path)?;
            for row in reader.deserialize::<TagRuleCsvRow>() {
                let row = row?;
                let match_type = MatchType::parse(&row.match_type).ok_or_else(|| {
                    ReconciliationError::InvalidConfig(format!(
                        "unknown match_type '{}' for pattern '{}'",
                        row.match_type, row.pattern
                    ))
                })?;
                let bucket = Bucket::parse(&row.bucket).ok_or_else(|| {
                    ReconciliationError::InvalidConfig(format!(
                        "unknown bucket '{}' for pattern '{}'",
                        row.bucket, row.pattern
                    ))
                })?;
                config.pnl_tag_rules.push(TagRule {
                    match_type,
                    pattern: row.pattern,
                    bucket,
                });
            }
        }

        let mapping_path = dir.join(CATEGORY_MAPPING_FILE);
        if mapping_path.exists() {
            let mut reader = csv::Reader::from_path(&mapping_path)?;
            for row in reader.deserialize::<CategoryCsvRow>() {
                let row = row?;
                config.category_mapping.insert(
                    row.pro_forma_category.trim().to_string(),
                    row.analysis_category.trim().to_string(),
                );
            }
        }

        debug!(
            "Loaded config from {}: {} cost centers, {} tagging rules, {} category mappings",
            dir.display(),
            config.cost_centers.len(),
            config.pnl_tag_rules.len(),
            config.category_mapping.len()
        );

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.allocation_tolerance.is_finite() || self.allocation_tolerance < 0.0 {
            return Err(ReconciliationError::InvalidConfig(format!(
                "allocation_tolerance must be a non-negative number, got {}",
                self.allocation_tolerance
            )));
        }

        for (idx, entry) in self.cost_centers.iter().enumerate() {
            if normalize_contract_code(&entry.code).is_none() {
                return Err(ReconciliationError::InvalidConfig(format!(
                    "cost center #{} has an empty code",
                    idx
                )));
            }
        }

        // Compiled here only to surface bad patterns at load time.
        LedgerTagger::new(&self.pnl_tag_rules)?;

        Ok(())
    }

    /// Normalized codes of the explicitly configured cost centers.
    pub fn cost_center_codes(&self) -> BTreeSet<String> {
        self.cost_centers
            .iter()
            .filter_map(|c| normalize_contract_code(&c.code))
            .collect()
    }

    /// The active internal-code prefix, if auto-recognition is enabled.
    pub fn internal_prefix(&self) -> Option<&str> {
        self.internal_code_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn analysis_category(&self, section: Option<&str>) -> String {
        section
            .and_then(|s| self.category_mapping.get(s.trim()))
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.allocation_tolerance, 0.01);
        assert!(config.include_cost_center_overhead_in_sga);
        assert_eq!(config.internal_prefix(), Some("INT-"));
        assert_eq!(config.unmatched_staff_policy, UnmatchedStaffPolicy::Fail);
    }

    #[test]
    fn test_settings_json_with_legacy_key() {
        let json = r#"{
            "allocation_tolerance": 0.05,
            "include_cost_center_overhead_in_sga_pool": false,
            "internal_code_prefix": null
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.allocation_tolerance, 0.05);
        assert!(!config.include_cost_center_overhead_in_sga);
        assert_eq!(config.internal_prefix(), None);
        assert!(config.cost_centers.is_empty());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"allocation_tolerance": 0.01, "unmatched_staff_policy": "warn"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(COST_CENTERS_FILE),
            "code,description,pool\nADMIN-01,Administration,SGA\nDATA-OPS,Data platform,DATA\nMKT-01,Marketing,\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PNL_TAGS_FILE),
            "match_type,pattern,bucket\nexact,Software Subscriptions,DATA\ncontains,wellness,WORKPLACE\nregex,^Revenue,NIL\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(CATEGORY_MAPPING_FILE),
            "pro_forma_category,analysis_category\nBEH,Next Gen Advisory\nWWB,Wellness\n",
        )
        .unwrap();

        let config = PipelineConfig::load_dir(dir.path()).unwrap();
        assert_eq!(config.unmatched_staff_policy, UnmatchedStaffPolicy::Warn);
        assert_eq!(config.cost_centers.len(), 3);
        assert_eq!(config.cost_centers[1].pool, Bucket::Data);
        assert_eq!(config.cost_centers[2].pool, Bucket::Sga);
        assert_eq!(config.pnl_tag_rules.len(), 3);
        assert_eq!(config.pnl_tag_rules[2].match_type, MatchType::Pattern);
        assert_eq!(config.analysis_category(Some("BEH")), "Next Gen Advisory");
        assert_eq!(config.analysis_category(Some("XYZ")), "Unknown");
        assert_eq!(config.analysis_category(None), "Unknown");
    }

    #[test]
    fn test_load_dir_rejects_unknown_bucket() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PNL_TAGS_FILE),
            "match_type,pattern,bucket\nexact,Rent,OFFICE\n",
        )
        .unwrap();

        let err = PipelineConfig::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ReconciliationError::InvalidConfig(_)));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let config = PipelineConfig {
            allocation_tolerance: -1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_pattern_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(PNL_TAGS_FILE),
            "match_type,pattern,bucket\npattern,(unclosed,DATA\n",
        )
        .unwrap();

        let err = PipelineConfig::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ReconciliationError::InvalidTagRule { index: 0, .. }));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = PipelineConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("allocation_tolerance"));
        assert!(schema_json.contains("pnl_tag_rules"));
        assert!(schema_json.contains("internal_code_prefix"));
    }
}
