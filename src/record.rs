// 📥 Contribution Records - ingestion from the external data source
//
// Records are immutable once loaded. Classification output is attached
// alongside (see `hybrid::ClassificationResult`), never written back here.

use crate::category::CategoryLabel;
use crate::error::ClassifierError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Contribution cap applied when no configuration is supplied.
pub const DEFAULT_MAX_CONTRIBUTION_AMOUNT: f64 = 100_000.0;

// ============================================================================
// RAW ROW (as delivered by the data source)
// ============================================================================

/// One CSV row before validation. Every field is optional so that a bad row
/// surfaces as a typed rejection instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawContribution {
    #[serde(default)]
    pub contributor_name: Option<String>,

    #[serde(default)]
    pub contributor_employer: Option<String>,

    #[serde(default)]
    pub contribution_amount: Option<String>,

    #[serde(default, alias = "current_category")]
    pub existing_category: Option<String>,
}

// ============================================================================
// AMOUNT COERCION
// ============================================================================

/// Why an amount was coerced. Reported as a warning, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AmountIssue {
    Missing,
    NotNumeric(String),
    Negative(f64),
    NotFinite,
}

/// Coerce a raw amount to a non-negative number.
///
/// Missing, non-numeric, negative and non-finite inputs become `0.0`
/// together with the issue that caused it. Currency symbols and thousands
/// separators are tolerated ("$1,250.00").
pub fn coerce_amount(raw: Option<&str>) -> (f64, Option<AmountIssue>) {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return (0.0, Some(AmountIssue::Missing));
    };

    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();

    match cleaned.parse::<f64>() {
        Ok(value) if !value.is_finite() => (0.0, Some(AmountIssue::NotFinite)),
        Ok(value) if value < 0.0 => (0.0, Some(AmountIssue::Negative(value))),
        Ok(value) => (value, None),
        Err(_) => (0.0, Some(AmountIssue::NotNumeric(raw.to_string()))),
    }
}

// ============================================================================
// CONTRIBUTION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionRecord {
    /// Required, non-empty. Primary key for identity-based rules.
    pub contributor_name: String,

    pub contributor_employer: Option<String>,

    /// Always `>= 0`.
    pub contribution_amount: f64,

    /// Prior label as delivered, if any.
    pub existing_category: Option<String>,

    /// Amount exceeded the configured cap. Flagged, not rejected.
    #[serde(default)]
    pub amount_flagged: bool,

    /// Coercion applied to the amount, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_issue: Option<AmountIssue>,

    /// 1-based source line (0 when built in memory).
    #[serde(default)]
    pub line_number: usize,
}

impl ContributionRecord {
    /// Build a record in memory against the default cap.
    pub fn new(name: &str, employer: Option<&str>, amount: f64) -> Self {
        Self::with_cap(name, employer, amount, DEFAULT_MAX_CONTRIBUTION_AMOUNT)
    }

    /// Build a record in memory, flagging amounts above `max_amount`.
    pub fn with_cap(name: &str, employer: Option<&str>, amount: f64, max_amount: f64) -> Self {
        let (amount, issue) = if amount.is_finite() && amount >= 0.0 {
            (amount, None)
        } else if amount.is_finite() {
            (0.0, Some(AmountIssue::Negative(amount)))
        } else {
            (0.0, Some(AmountIssue::NotFinite))
        };

        ContributionRecord {
            contributor_name: name.to_string(),
            contributor_employer: employer.map(str::to_string),
            contribution_amount: amount,
            existing_category: None,
            amount_flagged: false,
            amount_issue: issue,
            line_number: 0,
        }
        .flag_above(max_amount)
    }

    /// Recompute the cap flag, e.g. for records read back from the store
    /// under a different configuration.
    pub fn flag_above(mut self, max_amount: f64) -> Self {
        self.amount_flagged = self.contribution_amount > max_amount;
        self
    }

    pub fn with_existing_category(mut self, category: &str) -> Self {
        self.existing_category = Some(category.to_string());
        self
    }

    /// Validate a raw row.
    ///
    /// Fails only when the contributor name is absent or blank. Amount
    /// problems are coerced and logged.
    pub fn from_raw(
        raw: RawContribution,
        line_number: usize,
        max_amount: f64,
    ) -> Result<Self, ClassifierError> {
        let name = raw
            .contributor_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ClassifierError::MissingField {
                field: "contributor_name",
                line: line_number,
            })?;

        let (amount, issue) = coerce_amount(raw.contribution_amount.as_deref());
        if let Some(issue) = &issue {
            if *issue != AmountIssue::Missing {
                tracing::warn!(line = line_number, ?issue, "invalid contribution amount coerced to 0.0");
            }
        }

        let flagged = amount > max_amount;
        if flagged {
            tracing::warn!(line = line_number, amount, cap = max_amount, "contribution above cap");
        }

        Ok(ContributionRecord {
            contributor_name: name,
            contributor_employer: raw.contributor_employer,
            contribution_amount: amount,
            existing_category: raw.existing_category.filter(|c| !c.trim().is_empty()),
            amount_flagged: flagged,
            amount_issue: issue,
            line_number,
        })
    }

    pub fn employer(&self) -> Option<&str> {
        self.contributor_employer.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.contributor_name
    }

    /// Prior label parsed into the closed enumeration (`None` when absent).
    pub fn existing_label(&self) -> Option<CategoryLabel> {
        self.existing_category
            .as_deref()
            .map(|c| CategoryLabel::parse_or_default(Some(c)))
    }

    /// Idempotency hash used by the store to deduplicate rows.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.contributor_name,
            self.contributor_employer.as_deref().unwrap_or(""),
            self.contribution_amount
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Outcome of loading one CSV file.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub records: Vec<ContributionRecord>,
    pub rejected: Vec<ClassifierError>,
    pub coerced_amounts: usize,
}

pub fn load_csv(csv_path: &Path, max_amount: f64) -> Result<LoadSummary> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", csv_path))?
        .clone();
    let mut summary = LoadSummary::default();

    for result in rdr.records() {
        let row = result.with_context(|| format!("Failed to read CSV row: {:?}", csv_path))?;
        // line where the row starts; quoted fields may span several lines
        let line = row.position().map_or(0, |p| p.line() as usize);
        let raw: RawContribution = row
            .deserialize(Some(&headers))
            .with_context(|| format!("Failed to deserialize row at line {}", line))?;

        match ContributionRecord::from_raw(raw, line, max_amount) {
            Ok(record) => {
                if matches!(
                    record.amount_issue,
                    Some(ref issue) if *issue != AmountIssue::Missing
                ) {
                    summary.coerced_amounts += 1;
                }
                summary.records.push(record);
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected contribution row");
                summary.rejected.push(e);
            }
        }
    }

    tracing::info!(
        path = ?csv_path,
        loaded = summary.records.len(),
        rejected = summary.rejected.len(),
        "loaded contribution records"
    );

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount(Some("250")), (250.0, None));
        assert_eq!(coerce_amount(Some(" $1,250.50 ")), (1250.5, None));
        assert_eq!(coerce_amount(None), (0.0, Some(AmountIssue::Missing)));
        assert_eq!(
            coerce_amount(Some("-20")),
            (0.0, Some(AmountIssue::Negative(-20.0)))
        );
        assert_eq!(
            coerce_amount(Some("abc")),
            (0.0, Some(AmountIssue::NotNumeric("abc".to_string())))
        );
        assert_eq!(coerce_amount(Some("NaN")), (0.0, Some(AmountIssue::NotFinite)));
    }

    #[test]
    fn test_missing_name_rejected() {
        let raw = RawContribution {
            contributor_name: Some("   ".to_string()),
            contributor_employer: Some("Retired".to_string()),
            contribution_amount: Some("10".to_string()),
            existing_category: None,
        };

        let err = ContributionRecord::from_raw(raw, 7, DEFAULT_MAX_CONTRIBUTION_AMOUNT).unwrap_err();
        match err {
            ClassifierError::MissingField { field, line } => {
                assert_eq!(field, "contributor_name");
                assert_eq!(line, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_amount_over_cap_is_flagged_not_rejected() {
        let raw = RawContribution {
            contributor_name: Some("Big Donor".to_string()),
            contributor_employer: None,
            contribution_amount: Some("250000".to_string()),
            existing_category: Some("Others".to_string()),
        };

        let record = ContributionRecord::from_raw(raw, 2, 100_000.0).unwrap();
        assert!(record.amount_flagged);
        assert_eq!(record.contribution_amount, 250_000.0);
        assert_eq!(record.existing_label(), Some(CategoryLabel::Others));
    }

    #[test]
    fn test_idempotency_hash_stable() {
        let a = ContributionRecord::new("Jane Roe", Some("Acme"), 50.0);
        let b = ContributionRecord::new("Jane Roe", Some("Acme"), 50.0);
        let c = ContributionRecord::new("Jane Roe", Some("Acme"), 51.0);
        assert_eq!(a.compute_idempotency_hash(), b.compute_idempotency_hash());
        assert_ne!(a.compute_idempotency_hash(), c.compute_idempotency_hash());
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "contributor_name,contributor_employer,contribution_amount,current_category"
        )
        .unwrap();
        writeln!(file, "Jane Roe,Winthrop & Weinstine,500,Lawyer").unwrap();
        writeln!(file, ",Nobody,10,Others").unwrap();
        writeln!(file, "Bob Owner,ABC LLC,oops,").unwrap();

        let summary = load_csv(file.path(), DEFAULT_MAX_CONTRIBUTION_AMOUNT).unwrap();

        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.coerced_amounts, 1);
        assert_eq!(summary.records[0].existing_label(), Some(CategoryLabel::Lawyer));
        assert_eq!(summary.records[1].contribution_amount, 0.0);
        assert_eq!(summary.records[1].existing_category, None);
        assert_eq!(summary.records[1].line_number, 4);
    }

    #[test]
    fn test_load_csv_multiline_field_line_numbers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "contributor_name,contributor_employer,contribution_amount").unwrap();
        writeln!(file, "Jane Roe,\"Winthrop\n& Weinstine\",500").unwrap();
        writeln!(file, ",Nobody,10").unwrap();
        writeln!(file, "Bob Owner,ABC LLC,150000").unwrap();

        let summary = load_csv(file.path(), 100_000.0).unwrap();

        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.records[0].line_number, 2);
        assert_eq!(summary.records[0].employer(), Some("Winthrop\n& Weinstine"));
        assert_eq!(summary.records[1].line_number, 5);
        assert!(summary.records[1].amount_flagged);
        match &summary.rejected[..] {
            [ClassifierError::MissingField { line, .. }] => assert_eq!(*line, 4),
            other => panic!("unexpected rejections: {other:?}"),
        }
    }

    #[test]
    fn test_configured_cap_flags_in_memory_records() {
        assert!(!ContributionRecord::new("Pat Doe", None, 5_000.0).amount_flagged);
        assert!(ContributionRecord::with_cap("Pat Doe", None, 5_000.0, 1_000.0).amount_flagged);
        assert!(!ContributionRecord::with_cap("Pat Doe", None, 1_000.0, 1_000.0).amount_flagged);

        let stored = ContributionRecord::new("Pat Doe", None, 5_000.0);
        assert!(stored.clone().flag_above(2_500.0).amount_flagged);
        assert!(!stored.flag_above(10_000.0).amount_flagged);
    }
}
