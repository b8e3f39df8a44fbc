// 📊 Analysis Report - tallies, gap analysis, recommendations, writers
//
// Everything here is derived from records plus their ClassificationResult;
// nothing feeds back into classification.

use crate::category::CategoryLabel;
use crate::config::Thresholds;
use crate::data_quality::BatchSummary;
use crate::discovery::ClusterSummary;
use crate::hybrid::ClassificationResult;
use crate::ml::EvaluationReport;
use crate::normalize::{clean_text, normalize};
use crate::record::ContributionRecord;
use crate::suggest::SuggestionSummary;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Gap-analysis lists are cut to this many entries.
const TOP_N: usize = 10;
/// Employers seen at least this often in Others are reported.
const MIN_EMPLOYER_FREQUENCY: usize = 3;

const STANDING_ADVICE: [&str; 4] = [
    "Implement regular retraining of ML classifier with new data",
    "Consider industry-specific categories (Healthcare, Technology, Finance)",
    "Add contribution frequency patterns to classification logic",
    "Monitor classification accuracy and adjust thresholds periodically",
];

// ============================================================================
// DATA SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmountStats {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (n - 1).
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub q75: f64,
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

impl AmountStats {
    pub fn from_amounts(amounts: &[f64]) -> Self {
        if amounts.is_empty() {
            return Self::default();
        }

        let mut sorted = amounts.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = if sorted.len() > 1 {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };

        AmountStats {
            mean,
            median: quantile(&sorted, 0.5),
            std,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            q25: quantile(&sorted, 0.25),
            q75: quantile(&sorted, 0.75),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTally {
    pub category: CategoryLabel,
    pub count: usize,
    /// Share of all records, in percent.
    pub percentage: f64,
    pub total_amount: f64,
    pub mean_amount: f64,
}

/// Per-category tallies in `CategoryLabel::ALL` order; empty categories included.
pub fn category_tallies(
    records: &[ContributionRecord],
    categories: impl Iterator<Item = CategoryLabel>,
) -> Vec<CategoryTally> {
    let mut sums: BTreeMap<CategoryLabel, (usize, f64)> =
        CategoryLabel::ALL.iter().map(|c| (*c, (0, 0.0))).collect();

    for (record, category) in records.iter().zip(categories) {
        let entry = sums.entry(category).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.contribution_amount;
    }

    let total = records.len();
    CategoryLabel::ALL
        .iter()
        .map(|category| {
            let (count, amount) = sums.get(category).copied().unwrap_or((0, 0.0));
            CategoryTally {
                category: *category,
                count,
                percentage: if total > 0 { count as f64 / total as f64 * 100.0 } else { 0.0 },
                total_amount: amount,
                mean_amount: if count > 0 { amount / count as f64 } else { 0.0 },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_records: usize,
    pub unique_contributors: usize,
    pub unique_employers: usize,
    pub total_amount: f64,
    pub amount_stats: AmountStats,
    /// Counts of the delivered `existing_category` values (raw strings).
    pub existing_distribution: BTreeMap<String, usize>,
}

impl DataSummary {
    pub fn from_records(records: &[ContributionRecord]) -> Self {
        let contributors: HashSet<&str> = records.iter().map(|r| r.name()).collect();
        let employers: HashSet<&str> = records.iter().filter_map(|r| r.employer()).collect();
        let amounts: Vec<f64> = records.iter().map(|r| r.contribution_amount).collect();

        let mut existing_distribution = BTreeMap::new();
        for category in records.iter().filter_map(|r| r.existing_category.as_deref()) {
            *existing_distribution.entry(category.to_string()).or_insert(0) += 1;
        }

        DataSummary {
            total_records: records.len(),
            unique_contributors: contributors.len(),
            unique_employers: employers.len(),
            total_amount: amounts.iter().sum(),
            amount_stats: AmountStats::from_amounts(&amounts),
            existing_distribution,
        }
    }
}

// ============================================================================
// GAP ANALYSIS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighValueRecord {
    pub contributor_name: String,
    pub contributor_employer: Option<String>,
    pub contribution_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentEmployer {
    /// `clean_text` form of the employer.
    pub employer: String,
    pub count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapAnalysis {
    pub others_count: usize,
    pub others_pct: f64,
    pub others_total_amount: f64,
    pub others_mean_amount: f64,
    /// Others above the high-value threshold.
    pub high_value_count: usize,
    /// Largest `TOP_N` of those, by amount.
    pub high_value_others: Vec<HighValueRecord>,
    pub frequent_employers: Vec<FrequentEmployer>,
}

impl GapAnalysis {
    /// `others` are the records whose final category is `Others`.
    pub fn analyze(others: &[&ContributionRecord], total_records: usize, high_value: f64) -> Self {
        if others.is_empty() {
            return Self::default();
        }

        let others_total_amount: f64 = others.iter().map(|r| r.contribution_amount).sum();

        let mut high: Vec<&ContributionRecord> = others
            .iter()
            .copied()
            .filter(|r| r.contribution_amount > high_value)
            .collect();
        high.sort_by(|a, b| b.contribution_amount.total_cmp(&a.contribution_amount));
        let high_value_count = high.len();

        let mut groups: HashMap<String, (usize, f64)> = HashMap::new();
        for record in others {
            if normalize(record.employer()).is_empty() {
                continue;
            }
            let entry = groups.entry(clean_text(record.employer())).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += record.contribution_amount;
        }
        let mut frequent: Vec<FrequentEmployer> = groups
            .into_iter()
            .filter(|(_, (count, _))| *count >= MIN_EMPLOYER_FREQUENCY)
            .map(|(employer, (count, total_amount))| FrequentEmployer {
                employer,
                count,
                total_amount,
            })
            .collect();
        frequent.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.employer.cmp(&b.employer)));
        frequent.truncate(TOP_N);

        GapAnalysis {
            others_count: others.len(),
            others_pct: if total_records > 0 {
                others.len() as f64 / total_records as f64 * 100.0
            } else {
                0.0
            },
            others_total_amount,
            others_mean_amount: others_total_amount / others.len() as f64,
            high_value_count,
            high_value_others: high
                .into_iter()
                .take(TOP_N)
                .map(|r| HighValueRecord {
                    contributor_name: r.contributor_name.clone(),
                    contributor_employer: r.contributor_employer.clone(),
                    contribution_amount: r.contribution_amount,
                })
                .collect(),
            frequent_employers: frequent,
        }
    }
}

/// Recommendations from the gap analysis, the discovered clusters and the
/// confidence bands of the model's predictions.
pub fn recommendations(gap: &GapAnalysis, clusters: usize, bands: &ConfidenceBands) -> Vec<String> {
    let mut out = Vec::new();

    if gap.others_pct > 30.0 {
        out.push(format!(
            "High percentage of Others ({:.1}%) - consider adding more specific rules",
            gap.others_pct
        ));
    }
    if gap.high_value_count > 10 {
        out.push(format!(
            "{} high-value contributions in Others - prioritize manual review",
            gap.high_value_count
        ));
    }
    if gap.frequent_employers.len() > 5 {
        out.push(format!(
            "{} frequent unclassified employers - add them as explicit rules",
            gap.frequent_employers.len()
        ));
    }
    if clusters > 0 {
        out.push(format!(
            "Found {} potential new categories through clustering analysis",
            clusters
        ));
    }

    if bands.review_candidates > 0 {
        out.push(format!(
            "{} records where the model disagrees with the rules at medium confidence - review them",
            bands.review_candidates
        ));
    }

    out.extend(STANDING_ADVICE.iter().map(|s| s.to_string()));
    out
}

// ============================================================================
// CONFIDENCE BANDS
// ============================================================================

/// Model predictions of one run bucketed by confidence.
///
/// Only `high` predictions may override the rules. Medium-band predictions
/// that disagree with the rule category are the ambiguous cases worth a
/// manual look.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBands {
    /// confidence > high_confidence
    pub high: usize,
    /// medium_confidence <= confidence <= high_confidence
    pub medium: usize,
    /// confidence < medium_confidence
    pub low: usize,
    pub review_candidates: usize,
}

impl ConfidenceBands {
    pub fn from_results(results: &[ClassificationResult], thresholds: &Thresholds) -> Self {
        let mut bands = ConfidenceBands::default();

        for result in results {
            let Some(ml) = result.ml_category else {
                continue;
            };
            if result.confidence > thresholds.high_confidence {
                bands.high += 1;
            } else if result.confidence >= thresholds.medium_confidence {
                bands.medium += 1;
                if ml != result.rule_category {
                    bands.review_candidates += 1;
                }
            } else {
                bands.low += 1;
            }
        }

        bands
    }

    pub fn predicted(&self) -> usize {
        self.high + self.medium + self.low
    }
}

// ============================================================================
// BEFORE / AFTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShift {
    pub from: CategoryLabel,
    pub to: CategoryLabel,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeforeAfter {
    /// Records that carried an existing category.
    pub compared: usize,
    pub unchanged: usize,
    pub changed: usize,
    /// Others before, something else after.
    pub resolved_from_others: usize,
    pub shifts: Vec<CategoryShift>,
}

impl BeforeAfter {
    pub fn compare(records: &[ContributionRecord], results: &[ClassificationResult]) -> Self {
        let mut shifts: BTreeMap<(CategoryLabel, CategoryLabel), usize> = BTreeMap::new();
        let mut compared = 0;
        let mut unchanged = 0;

        for (record, result) in records.iter().zip(results) {
            let Some(before) = record.existing_label() else {
                continue;
            };
            compared += 1;
            if before == result.final_category {
                unchanged += 1;
            } else {
                *shifts.entry((before, result.final_category)).or_insert(0) += 1;
            }
        }

        let resolved_from_others = shifts
            .iter()
            .filter(|((from, _), _)| *from == CategoryLabel::Others)
            .map(|(_, count)| count)
            .sum();

        let mut shifts: Vec<CategoryShift> = shifts
            .into_iter()
            .map(|((from, to), count)| CategoryShift { from, to, count })
            .collect();
        shifts.sort_by(|a, b| b.count.cmp(&a.count));

        BeforeAfter {
            compared,
            unchanged,
            changed: compared - unchanged,
            resolved_from_others,
            shifts,
        }
    }
}

// ============================================================================
// ANALYSIS REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub data_summary: DataSummary,
    pub quality: BatchSummary,
    pub category_tallies: Vec<CategoryTally>,
    /// Records where ML replaced the rule category.
    pub ml_overrides: usize,
    #[serde(default)]
    pub confidence_bands: ConfidenceBands,
    pub gap_analysis: GapAnalysis,
    pub before_after: BeforeAfter,
    pub cluster_analysis: BTreeMap<String, ClusterSummary>,
    pub suggestions: SuggestionSummary,
    pub model_trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationReport>,
    pub sql_function: String,
    pub recommendations: Vec<String>,
}

impl AnalysisReport {
    pub fn tally(&self, category: CategoryLabel) -> Option<&CategoryTally> {
        self.category_tallies.iter().find(|t| t.category == category)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ensure_parent(path.as_ref())?;
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write report: {:?}", path.as_ref()))
    }

    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read report: {:?}", path.as_ref()))?;
        serde_json::from_str(&content).context("Failed to parse report JSON")
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ClassifiedRow<'a> {
    contributor_name: &'a str,
    contributor_employer: &'a str,
    contribution_amount: f64,
    existing_category: &'a str,
    rule_category: &'static str,
    ml_category: &'static str,
    ml_confidence: f64,
    final_category: &'static str,
    matched_rule: &'a str,
}

/// Write one row per record with its rule, ML and final category.
pub fn write_classified_csv<P: AsRef<Path>>(
    path: P,
    records: &[ContributionRecord],
    results: &[ClassificationResult],
) -> Result<()> {
    ensure_parent(path.as_ref())?;
    let mut writer = csv::Writer::from_path(path.as_ref())
        .with_context(|| format!("Failed to create CSV: {:?}", path.as_ref()))?;

    for (record, result) in records.iter().zip(results) {
        writer
            .serialize(ClassifiedRow {
                contributor_name: &record.contributor_name,
                contributor_employer: record.employer().unwrap_or(""),
                contribution_amount: record.contribution_amount,
                existing_category: record.existing_category.as_deref().unwrap_or(""),
                rule_category: result.rule_category.as_str(),
                ml_category: result.ml_category.map(|c| c.as_str()).unwrap_or(""),
                ml_confidence: result.confidence,
                final_category: result.final_category.as_str(),
                matched_rule: result.matched_rule.as_deref().unwrap_or(""),
            })
            .context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV")?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rule: CategoryLabel, final_category: CategoryLabel) -> ClassificationResult {
        ClassificationResult {
            rule_category: rule,
            ml_category: None,
            confidence: 0.0,
            final_category,
            matched_rule: None,
            tier: None,
        }
    }

    #[test]
    fn test_amount_stats() {
        let stats = AmountStats::from_amounts(&[10.0, 20.0, 30.0, 40.0]);
        assert_eq!(stats.mean, 25.0);
        assert_eq!(stats.median, 25.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 40.0);
        assert_eq!(stats.q25, 17.5);
        assert_eq!(stats.q75, 32.5);
        assert!((stats.std - 12.909944487358056).abs() < 1e-9);

        assert_eq!(AmountStats::from_amounts(&[]), AmountStats::default());
    }

    #[test]
    fn test_category_tallies() {
        let records = vec![
            ContributionRecord::new("A", Some("Law"), 100.0),
            ContributionRecord::new("B", Some("Law"), 300.0),
            ContributionRecord::new("C", None, 50.0),
            ContributionRecord::new("D", Some("?"), 50.0),
        ];
        let labels = [
            CategoryLabel::Lawyer,
            CategoryLabel::Lawyer,
            CategoryLabel::Individual,
            CategoryLabel::Others,
        ];

        let tallies = category_tallies(&records, labels.into_iter());
        assert_eq!(tallies.len(), CategoryLabel::ALL.len());

        let lawyer = &tallies[CategoryLabel::Lawyer.index()];
        assert_eq!(lawyer.count, 2);
        assert_eq!(lawyer.percentage, 50.0);
        assert_eq!(lawyer.total_amount, 400.0);
        assert_eq!(lawyer.mean_amount, 200.0);
        assert_eq!(tallies[CategoryLabel::Developer.index()].count, 0);
    }

    #[test]
    fn test_gap_analysis() {
        let mut records = Vec::new();
        for i in 0..4 {
            records.push(ContributionRecord::new(&format!("P{}", i), Some("Blue Plate Diner"), 20.0));
        }
        records.push(ContributionRecord::new("Whale", Some("Mystery Co"), 5000.0));
        records.push(ContributionRecord::new("Small", Some("blue plate diner "), 10.0));
        let others: Vec<&ContributionRecord> = records.iter().collect();

        let gap = GapAnalysis::analyze(&others, 12, 1000.0);
        assert_eq!(gap.others_count, 6);
        assert_eq!(gap.others_pct, 50.0);
        assert_eq!(gap.high_value_count, 1);
        assert_eq!(gap.high_value_others[0].contributor_name, "Whale");
        assert_eq!(gap.frequent_employers.len(), 1);
        assert_eq!(gap.frequent_employers[0].employer, "BLUE PLATE DINER");
        assert_eq!(gap.frequent_employers[0].count, 5);

        let recs = recommendations(&gap, 2, &ConfidenceBands::default());
        assert!(recs[0].starts_with("High percentage of Others (50.0%)"));
        assert!(recs.iter().any(|r| r.contains("Found 2 potential new categories")));
        assert_eq!(recs.len(), 2 + STANDING_ADVICE.len());
    }

    #[test]
    fn test_recommendations_only_standing_advice() {
        let recs = recommendations(&GapAnalysis::default(), 0, &ConfidenceBands::default());
        assert_eq!(recs.len(), STANDING_ADVICE.len());
    }

    fn ml_result(rule: CategoryLabel, ml: Option<CategoryLabel>, confidence: f64) -> ClassificationResult {
        ClassificationResult {
            rule_category: rule,
            ml_category: ml,
            confidence,
            final_category: rule,
            matched_rule: None,
            tier: None,
        }
    }

    #[test]
    fn test_confidence_bands() {
        use CategoryLabel::*;
        let results = vec![
            ml_result(Others, Some(BusinessOwner), 0.9),
            ml_result(Others, Some(BusinessOwner), 0.7),
            ml_result(Lawyer, Some(Lawyer), 0.6),
            ml_result(Others, Some(Individual), 0.5),
            ml_result(Others, Some(Individual), 0.49),
            ml_result(Lawyer, None, 0.0),
        ];

        let bands = ConfidenceBands::from_results(&results, &Thresholds::default());
        assert_eq!(bands.high, 1);
        assert_eq!(bands.medium, 3);
        assert_eq!(bands.low, 1);
        assert_eq!(bands.review_candidates, 2);
        assert_eq!(bands.predicted(), 5);

        let recs = recommendations(&GapAnalysis::default(), 0, &bands);
        assert!(recs[0].starts_with("2 records where the model disagrees"));
    }

    #[test]
    fn test_before_after() {
        let records = vec![
            ContributionRecord::new("A", Some("X"), 1.0).with_existing_category("Others"),
            ContributionRecord::new("B", Some("X"), 1.0).with_existing_category("Lawyer"),
            ContributionRecord::new("C", Some("X"), 1.0).with_existing_category("Pohlad family"),
            ContributionRecord::new("D", Some("X"), 1.0),
        ];
        let results = vec![
            result(CategoryLabel::Individual, CategoryLabel::Individual),
            result(CategoryLabel::Lawyer, CategoryLabel::Lawyer),
            result(CategoryLabel::BusinessOwner, CategoryLabel::BusinessOwner),
            result(CategoryLabel::Others, CategoryLabel::Others),
        ];

        let diff = BeforeAfter::compare(&records, &results);
        assert_eq!(diff.compared, 3);
        assert_eq!(diff.unchanged, 2);
        assert_eq!(diff.changed, 1);
        assert_eq!(diff.resolved_from_others, 1);
        assert_eq!(diff.shifts[0].to, CategoryLabel::Individual);
    }

    #[test]
    fn test_classified_csv_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("classified.csv");
        let records = vec![ContributionRecord::new("Jane Roe", Some("Winthrop & Weinstine"), 25.0)];
        let mut res = result(CategoryLabel::Lawyer, CategoryLabel::Lawyer);
        res.matched_rule = Some("override_winthrop".to_string());

        write_classified_csv(&path, &records, &[res]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("contributor_name,contributor_employer"));
        let row = lines.next().unwrap();
        assert!(row.contains("Jane Roe"));
        assert!(row.contains("Lawyer"));
        assert!(row.contains("override_winthrop"));
    }
}
