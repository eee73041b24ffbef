use crate::error::{ReconciliationError, Result};
use chrono::{Datelike, NaiveDate};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// A calendar month the pipeline is run for, e.g. `November2025`.
///
/// Only built through [`RunMonth::parse`], so `month` is always 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMonth {
    year: i32,
    month: u32,
}

impl RunMonth {
    /// Parses labels such as `November2025`, `Nov2025` or `November 2025`.
    pub fn parse(label: &str) -> Result<Self> {
        let invalid = || ReconciliationError::InvalidMonth(label.to_string());

        let compact: String = label.split_whitespace().collect();
        let split_at = compact
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (name, year) = compact.split_at(split_at);

        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month = month_number(name).ok_or_else(invalid)?;

        Ok(Self { year, month })
    }

    /// Full English month name, as forecast headers spell it.
    pub fn name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// Canonical label, also used as the output directory name.
impl std::fmt::Display for RunMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name(), self.year)
    }
}

/// Matches on the first three letters, any case, so `Sept` and `November`
/// both resolve.
pub fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.trim().chars().take(3).collect::<String>().to_ascii_lowercase();
    if prefix.len() < 3 {
        return None;
    }
    MONTH_NAMES
        .iter()
        .position(|m| m.to_ascii_lowercase().starts_with(&prefix))
        .map(|idx| idx as u32 + 1)
}

/// Rounds a money amount to whole cents for presentation.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Absolute difference check used by every reconciliation in the crate.
pub fn within_tolerance(actual: f64, expected: f64, tolerance: f64) -> bool {
    (actual - expected).abs() <= tolerance
}

/// `$1,234.56` style money formatting for log lines and reports.
pub fn format_money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_month() {
        let m = RunMonth::parse("November2025").unwrap();
        assert_eq!(m, RunMonth { year: 2025, month: 11 });
        assert_eq!(m.name(), "November");

        assert_eq!(RunMonth::parse("Feb2024").unwrap().month, 2);
        assert_eq!(RunMonth::parse("march 2023").unwrap().month, 3);
        assert_eq!(RunMonth::parse("Sept2025").unwrap().month, 9);
        assert_eq!(RunMonth::parse("JUNE2025").unwrap().to_string(), "June2025");
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(RunMonth::parse("nov 2025").unwrap().to_string(), "November2025");
    }

    #[test]
    fn test_parse_run_month_rejects_garbage() {
        assert!(RunMonth::parse("2025-11").is_err());
        assert!(RunMonth::parse("Nob2025").is_err());
        assert!(RunMonth::parse("No2025").is_err());
        assert!(RunMonth::parse("November25").is_err());
        assert!(RunMonth::parse("November").is_err());
    }

    #[test]
    fn test_every_parsed_month_has_a_name() {
        for (idx, name) in MONTH_NAMES.iter().enumerate() {
            let m = RunMonth::parse(&format!("{}2025", &name[..3])).unwrap();
            assert_eq!(m.month, idx as u32 + 1);
            assert_eq!(m.to_string(), format!("{name}2025"));
        }
    }

    #[test]
    fn test_month_window() {
        let m = RunMonth::parse("February2024").unwrap();
        assert!(m.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));
        assert!(m.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(!m.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(!m.contains(NaiveDate::from_ymd_opt(2023, 2, 15).unwrap()));
    }

    #[test]
    fn test_money_helpers() {
        assert_eq!(round_cents(5400.000000001), 5400.0);
        assert_eq!(round_cents(2.346), 2.35);
        assert!(within_tolerance(100.004, 100.0, 0.01));
        assert!(!within_tolerance(100.02, 100.0, 0.01));
        assert_eq!(format_money(1234567.891), "$1,234,567.89");
        assert_eq!(format_money(-42.5), "-$42.50");
        assert_eq!(format_money(0.0), "$0.00");
    }
}
