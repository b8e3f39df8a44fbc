// ✅ Data Quality Engine - record validation and batch quality score
//
// Per-record checks produce a QualityReport; the batch summary rolls them up
// into a 0-100 score: (completeness - duplicate share - invalid-amount share) * 100.

use crate::category::CategoryLabel;
use crate::record::{AmountIssue, ContributionRecord, DEFAULT_MAX_CONTRIBUTION_AMOUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub confidence: f64,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: 1.0,
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: match severity {
                Severity::Critical => 0.0,
                Severity::Warning => 0.5,
                Severity::Info => 0.8,
            },
            severity,
        }
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub line_number: usize,
    pub contributor_name: String,
    pub overall_quality: f64,
    pub overall_confidence: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub needs_review: bool,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "Quality: {:.1}%, Confidence: {:.1}%, Issues: {} ({} critical)",
            self.overall_quality * 100.0,
            self.overall_confidence * 100.0,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }

    pub fn is_high_quality(&self) -> bool {
        self.overall_quality >= 0.8 && self.overall_confidence >= 0.7
    }

    pub fn has_critical_issues(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == Severity::Critical)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Record cannot be trusted as-is
    Warning,  // Questionable or incomplete
    Info,     // Valid but could be improved
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_records: usize,
    pub high_quality_count: usize,
    pub needs_review_count: usize,
    pub critical_issues_count: usize,
    pub average_quality: f64,
    pub average_confidence: f64,
    pub missing_employers: usize,
    pub missing_existing_categories: usize,
    pub duplicate_records: usize,
    pub invalid_amounts: usize,
    pub flagged_amounts: usize,
    /// 0-100
    pub quality_score: f64,
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Amounts above this are flagged for review
    max_amount: f64,

    /// Minimum confidence threshold for "needs_review"
    review_threshold: f64,
}

impl DataQualityEngine {
    pub fn new(max_amount: f64) -> Self {
        DataQualityEngine {
            max_amount,
            review_threshold: 0.7,
        }
    }

    fn check(
        validations: &mut Vec<ValidationResult>,
        issues: &mut Vec<QualityIssue>,
        result: ValidationResult,
        recommendation: &str,
    ) {
        if !result.passed {
            issues.push(QualityIssue {
                severity: result.severity.clone(),
                field: result.field.clone(),
                issue: result.message.clone(),
                recommendation: recommendation.to_string(),
            });
        }
        validations.push(result);
    }

    /// Validate a record and generate quality report
    pub fn validate(&self, record: &ContributionRecord) -> QualityReport {
        let mut validations = Vec::new();
        let mut issues = Vec::new();

        // Rule 1: Contributor name present
        Self::check(
            &mut validations,
            &mut issues,
            self.validate_name(&record.contributor_name),
            "Records without a contributor name cannot be classified",
        );

        // Rule 2: Employer present
        Self::check(
            &mut validations,
            &mut issues,
            self.validate_employer(record.employer()),
            "Add employer information; empty employers default to Individual",
        );

        // Rule 3: Amount parsed cleanly
        Self::check(
            &mut validations,
            &mut issues,
            self.validate_amount(record.amount_issue.as_ref()),
            "Verify the contribution amount in the source data",
        );

        // Rule 4: Amount under cap
        Self::check(
            &mut validations,
            &mut issues,
            self.validate_amount_cap(record.contribution_amount),
            "Confirm unusually large contributions manually",
        );

        // Rule 5: Existing category recognized
        Self::check(
            &mut validations,
            &mut issues,
            self.validate_existing_category(record.existing_category.as_deref()),
            "Use one of: Lawyer, Developer, BusinessOwner, Individual, Association, Others",
        );

        // Calculate overall metrics
        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;
        let overall_quality = passed_count as f64 / validations.len() as f64;

        let overall_confidence: f64 =
            validations.iter().map(|v| v.confidence).sum::<f64>() / validations.len() as f64;

        let needs_review = overall_confidence < self.review_threshold;

        QualityReport {
            line_number: record.line_number,
            contributor_name: record.contributor_name.clone(),
            overall_quality,
            overall_confidence,
            validations,
            issues,
            passed_count,
            failed_count,
            needs_review,
        }
    }

    /// Batch validate multiple records
    pub fn validate_batch(&self, records: &[ContributionRecord]) -> Vec<QualityReport> {
        records.iter().map(|r| self.validate(r)).collect()
    }

    /// Generate summary statistics and the batch quality score
    pub fn batch_summary(&self, records: &[ContributionRecord], reports: &[QualityReport]) -> BatchSummary {
        let total = records.len();
        let high_quality = reports.iter().filter(|r| r.is_high_quality()).count();
        let needs_review = reports.iter().filter(|r| r.needs_review).count();
        let has_critical = reports.iter().filter(|r| r.has_critical_issues()).count();

        let mean = |sum: f64, n: usize| if n == 0 { 0.0 } else { sum / n as f64 };
        let avg_quality = mean(reports.iter().map(|r| r.overall_quality).sum(), reports.len());
        let avg_confidence = mean(reports.iter().map(|r| r.overall_confidence).sum(), reports.len());

        let missing_employers = records
            .iter()
            .filter(|r| r.employer().map_or(true, |e| e.trim().is_empty()))
            .count();
        let missing_existing = records.iter().filter(|r| r.existing_category.is_none()).count();
        let missing_amounts = records
            .iter()
            .filter(|r| r.amount_issue == Some(AmountIssue::Missing))
            .count();
        let invalid_amounts = records
            .iter()
            .filter(|r| matches!(r.amount_issue, Some(ref i) if *i != AmountIssue::Missing))
            .count();
        let flagged_amounts = records.iter().filter(|r| r.amount_flagged).count();

        let mut seen = HashSet::new();
        let duplicate_records = records
            .iter()
            .filter(|r| !seen.insert(r.compute_idempotency_hash()))
            .count();

        // four source fields per record: name, employer, amount, category
        let total_fields = total * 4;
        let total_missing = missing_employers + missing_existing + missing_amounts;
        let completeness = if total_fields > 0 {
            1.0 - total_missing as f64 / total_fields as f64
        } else {
            0.0
        };
        let duplicate_penalty = mean(duplicate_records as f64, total);
        let invalid_penalty = mean(invalid_amounts as f64, total);
        let quality_score = ((completeness - duplicate_penalty - invalid_penalty) * 100.0).max(0.0);

        BatchSummary {
            total_records: total,
            high_quality_count: high_quality,
            needs_review_count: needs_review,
            critical_issues_count: has_critical,
            average_quality: avg_quality,
            average_confidence: avg_confidence,
            missing_employers,
            missing_existing_categories: missing_existing,
            duplicate_records,
            invalid_amounts,
            flagged_amounts,
            quality_score,
        }
    }

    // ========================================================================
    // VALIDATION RULES
    // ========================================================================

    fn validate_name(&self, name: &str) -> ValidationResult {
        if name.trim().is_empty() {
            return ValidationResult::fail(
                "name_empty",
                "contributor_name",
                "Contributor name is empty",
                Severity::Critical,
            );
        }

        ValidationResult::pass("name_present", "contributor_name", "Contributor name present")
    }

    fn validate_employer(&self, employer: Option<&str>) -> ValidationResult {
        match employer.map(str::trim) {
            None | Some("") => ValidationResult::fail(
                "employer_empty",
                "contributor_employer",
                "Employer is empty",
                Severity::Warning,
            ),
            Some(e) => ValidationResult::pass(
                "employer_present",
                "contributor_employer",
                &format!("Employer present: {}", e),
            ),
        }
    }

    fn validate_amount(&self, issue: Option<&AmountIssue>) -> ValidationResult {
        match issue {
            None => ValidationResult::pass("amount_valid", "contribution_amount", "Amount is valid"),
            Some(AmountIssue::Missing) => ValidationResult::fail(
                "amount_missing",
                "contribution_amount",
                "Amount is missing (coerced to 0.00)",
                Severity::Warning,
            ),
            Some(AmountIssue::Negative(v)) => ValidationResult::fail(
                "amount_negative",
                "contribution_amount",
                &format!("Negative amount {:.2} (coerced to 0.00)", v),
                Severity::Critical,
            ),
            Some(AmountIssue::NotNumeric(raw)) => ValidationResult::fail(
                "amount_not_numeric",
                "contribution_amount",
                &format!("Amount is not a number: {}", raw),
                Severity::Critical,
            ),
            Some(AmountIssue::NotFinite) => ValidationResult::fail(
                "amount_not_finite",
                "contribution_amount",
                "Amount is not a finite number",
                Severity::Critical,
            ),
        }
    }

    fn validate_amount_cap(&self, amount: f64) -> ValidationResult {
        if amount > self.max_amount {
            return ValidationResult::fail(
                "amount_over_cap",
                "contribution_amount",
                &format!("Amount ${:.2} exceeds cap ${:.2}", amount, self.max_amount),
                Severity::Warning,
            );
        }

        ValidationResult::pass("amount_under_cap", "contribution_amount", "Amount within cap")
    }

    fn validate_existing_category(&self, category: Option<&str>) -> ValidationResult {
        let Some(category) = category else {
            return ValidationResult::fail(
                "category_empty",
                "existing_category",
                "No existing category",
                Severity::Info,
            );
        };

        if CategoryLabel::from_label(category).is_none() {
            return ValidationResult::fail(
                "category_unknown",
                "existing_category",
                &format!("Unknown category: {}", category),
                Severity::Info,
            );
        }

        ValidationResult::pass(
            "category_known",
            "existing_category",
            &format!("Category is known: {}", category),
        )
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTRIBUTION_AMOUNT)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RawContribution;

    fn good_record() -> ContributionRecord {
        ContributionRecord::new("Jane Roe", Some("Winthrop & Weinstine"), 250.0)
            .with_existing_category("Lawyer")
    }

    #[test]
    fn test_valid_record() {
        let engine = DataQualityEngine::default();
        let report = engine.validate(&good_record());

        assert_eq!(report.failed_count, 0);
        assert!(report.is_high_quality());
        assert!(!report.needs_review);
    }

    #[test]
    fn test_invalid_amount_is_critical() {
        let engine = DataQualityEngine::default();
        let raw = RawContribution {
            contributor_name: Some("Bob".to_string()),
            contributor_employer: None,
            contribution_amount: Some("-50".to_string()),
            existing_category: Some("Mystery".to_string()),
        };
        let record = ContributionRecord::from_raw(raw, 3, DEFAULT_MAX_CONTRIBUTION_AMOUNT).unwrap();
        let report = engine.validate(&record);

        assert!(report.has_critical_issues());
        assert_eq!(report.failed_count, 3);
        assert!(report.summary().contains("1 critical"));
    }

    #[test]
    fn test_amount_over_cap_is_warning() {
        let engine = DataQualityEngine::new(1000.0);
        let record = ContributionRecord::new("Big Donor", Some("Acme"), 5000.0);
        let report = engine.validate(&record);

        let over = report
            .validations
            .iter()
            .find(|v| v.rule_name == "amount_over_cap")
            .unwrap();
        assert_eq!(over.severity, Severity::Warning);
        assert!(!report.has_critical_issues());
    }

    #[test]
    fn test_batch_quality_score() {
        let engine = DataQualityEngine::default();
        let records = vec![good_record(), good_record(), good_record(), good_record()];
        let reports = engine.validate_batch(&records);
        let summary = engine.batch_summary(&records, &reports);

        // 3 duplicates out of 4, fully complete
        assert_eq!(summary.duplicate_records, 3);
        assert!((summary.quality_score - 25.0).abs() < 1e-9);

        let records = vec![
            good_record(),
            ContributionRecord::new("Pat Doe", None, 10.0).with_existing_category("Individual"),
        ];
        let reports = engine.validate_batch(&records);
        let summary = engine.batch_summary(&records, &reports);
        assert_eq!(summary.missing_employers, 1);
        assert!((summary.quality_score - 87.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch() {
        let engine = DataQualityEngine::default();
        let summary = engine.batch_summary(&[], &[]);
        assert_eq!(summary.total_records, 0);
        assert_eq!(summary.quality_score, 0.0);
    }
}
