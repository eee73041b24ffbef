use crate::config::{MatchType, TagRule};
use crate::error::{ReconciliationError, Result};
use crate::schema::{Bucket, LedgerAccount, LedgerLine, MatchedBy};
use crate::utils::format_money;
use log::{debug, warn};
use regex::{Regex, RegexBuilder};

/// A tagging rule compiled for matching.
#[derive(Debug, Clone)]
pub enum MatchRule {
    Exact(String),
    /// Lower-cased needle.
    Contains(String),
    Pattern(Regex),
}

impl MatchRule {
    pub fn matches(&self, account_name: &str) -> bool {
        match self {
            Self::Exact(pattern) => account_name == pattern,
            Self::Contains(needle) => account_name.to_lowercase().contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(account_name),
        }
    }

    fn matched_by(&self) -> MatchedBy {
        match self {
            Self::Exact(_) => MatchedBy::Exact,
            Self::Contains(_) => MatchedBy::Contains,
            Self::Pattern(_) => MatchedBy::Pattern,
        }
    }
}

/// Buckets ledger accounts. Every exact rule is tried before any contains
/// rule, and every contains rule before any pattern; within a tier the
/// configured order wins. Unmatched accounts land in SGA.
#[derive(Debug, Clone)]
pub struct LedgerTagger {
    rules: Vec<(MatchRule, Bucket)>,
}

impl LedgerTagger {
    pub fn new(rules: &[TagRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());

        for tier in [MatchType::Exact, MatchType::Contains, MatchType::Pattern] {
            for (index, rule) in rules.iter().enumerate() {
                if rule.match_type != tier {
                    continue;
                }
                let matcher = match rule.match_type {
                    MatchType::Exact => MatchRule::Exact(rule.pattern.trim().to_string()),
                    MatchType::Contains => MatchRule::Contains(rule.pattern.to_lowercase()),
                    MatchType::Pattern => {
                        let re = RegexBuilder::new(&rule.pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| ReconciliationError::InvalidTagRule {
                                index,
                                pattern: rule.pattern.clone(),
                                reason: e.to_string(),
                            })?;
                        MatchRule::Pattern(re)
                    }
                };
                compiled.push((matcher, rule.bucket));
            }
        }

        Ok(Self { rules: compiled })
    }

    pub fn classify(&self, account_name: &str) -> (Bucket, MatchedBy) {
        self.rules
            .iter()
            .find(|(rule, _)| rule.matches(account_name))
            .map(|(rule, bucket)| (*bucket, rule.matched_by()))
            .unwrap_or((Bucket::Sga, MatchedBy::Default))
    }

    /// Buckets every non-zero ledger line.
    pub fn tag_ledger(&self, lines: &[LedgerLine]) -> Vec<LedgerAccount> {
        let accounts: Vec<LedgerAccount> = lines
            .iter()
            .filter(|line| line.amount != 0.0 && line.amount.is_finite())
            .map(|line| {
                let account_name = line.account_name.trim().to_string();
                let (bucket, matched_by) = self.classify(&account_name);
                LedgerAccount {
                    account_name,
                    amount: line.amount,
                    bucket,
                    matched_by,
                }
            })
            .collect();

        let unmatched: Vec<&str> = accounts
            .iter()
            .filter(|a| a.matched_by == MatchedBy::Default)
            .map(|a| a.account_name.as_str())
            .collect();
        if !unmatched.is_empty() {
            warn!(
                "{} P&L accounts defaulted to SG&A (unmatched): {}",
                unmatched.len(),
                unmatched.join(", ")
            );
        }

        for bucket in Bucket::ALL {
            let (total, count) = bucket_total(&accounts, bucket);
            debug!("{}: {} ({} accounts)", bucket.as_str(), format_money(total), count);
        }

        accounts
    }
}

/// Sum and count of the accounts in one bucket.
pub fn bucket_total(accounts: &[LedgerAccount], bucket: Bucket) -> (f64, usize) {
    accounts
        .iter()
        .filter(|a| a.bucket == bucket)
        .fold((0.0, 0), |(sum, n), a| (sum + a.amount, n + 1))
}
