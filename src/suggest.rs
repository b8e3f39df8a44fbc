// 💡 Rule Suggestions - candidate rules mined from the Others residue
//
// Scans unclassified employers for business, professional and public-sector
// terms. A pattern is proposed once its volume exceeds the family threshold.
// Suggestions are advisory; a reviewer adopts one with `RuleSet::with_rule`.

use crate::category::CategoryLabel;
use crate::normalize::normalize;
use crate::record::ContributionRecord;
use crate::rules::{MatchKind, PatternRule, RuleScope, RuleTier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const BUSINESS_PATTERNS: [&str; 16] = [
    "LLC", "INC", "CORP", "COMPANY", "BUSINESS", "ENTERPRISES", "GROUP", "CONSULTING",
    "SERVICES", "SOLUTIONS", "PARTNERS", "CAPITAL", "INVESTMENTS", "MANAGEMENT", "HOLDINGS",
    "VENTURES",
];

const PROFESSIONAL_PATTERNS: [(&str, CategoryLabel); 15] = [
    ("ATTORNEY", CategoryLabel::Lawyer),
    ("LAW FIRM", CategoryLabel::Lawyer),
    ("LEGAL", CategoryLabel::Lawyer),
    ("COUNSELOR", CategoryLabel::Lawyer),
    ("BARRISTER", CategoryLabel::Lawyer),
    ("ACCOUNTANT", CategoryLabel::BusinessOwner),
    ("CPA", CategoryLabel::BusinessOwner),
    ("ACCOUNTING", CategoryLabel::BusinessOwner),
    ("FINANCIAL", CategoryLabel::BusinessOwner),
    ("ADVISOR", CategoryLabel::BusinessOwner),
    ("CONSULTANT", CategoryLabel::BusinessOwner),
    ("ENGINEERING", CategoryLabel::BusinessOwner),
    ("ARCHITECT", CategoryLabel::BusinessOwner),
    ("MEDICAL", CategoryLabel::BusinessOwner),
    ("DOCTOR", CategoryLabel::BusinessOwner),
];

const GOVERNMENT_PATTERNS: [&str; 10] = [
    "CITY OF", "COUNTY", "STATE OF", "GOVERNMENT", "PUBLIC", "MUNICIPAL", "SCHOOL DISTRICT",
    "UNIVERSITY", "COLLEGE", "DEPARTMENT OF",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternFamily {
    Business,
    Professional,
    Government,
}

impl PatternFamily {
    /// Matches required before a pattern is proposed (strictly more than).
    pub fn min_volume(&self) -> usize {
        match self {
            PatternFamily::Business => 5,
            PatternFamily::Professional => 3,
            PatternFamily::Government => 2,
        }
    }

    fn tier(&self, suggested: CategoryLabel) -> RuleTier {
        match (self, suggested) {
            (PatternFamily::Professional, CategoryLabel::Lawyer) => RuleTier::Professional,
            (PatternFamily::Government, _) => RuleTier::Individual,
            _ => RuleTier::Business,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub pattern: String,
    pub family: PatternFamily,
    pub suggested_category: CategoryLabel,
    pub volume: usize,
    pub total_amount: f64,
}

impl RuleSuggestion {
    /// Rule form of this suggestion, ranked below the builtin rules of its tier.
    pub fn to_pattern_rule(&self) -> PatternRule {
        let slug: String = self
            .pattern
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();

        PatternRule::new(
            &format!("suggested_{}", slug),
            self.family.tier(self.suggested_category),
            RuleScope::Employer,
            MatchKind::Substring,
            &[self.pattern.as_str()],
            self.suggested_category,
            0,
        )
        .with_description(&format!(
            "Suggested from {} unclassified records (${:.2})",
            self.volume, self.total_amount
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSummary {
    pub suggestions: Vec<RuleSuggestion>,
    pub others_total: usize,
    /// Distinct records covered by at least one suggestion.
    pub reclassifiable: usize,
    /// Share of Others the suggestions would remove, in percent.
    pub potential_reduction_pct: f64,
}

/// Mine suggestions from records currently classified as `Others`.
pub fn suggest_rules(others: &[&ContributionRecord]) -> SuggestionSummary {
    let employers: Vec<String> = others.iter().map(|r| normalize(r.employer())).collect();

    let families = BUSINESS_PATTERNS
        .iter()
        .map(|p| (*p, PatternFamily::Business, CategoryLabel::BusinessOwner))
        .chain(
            PROFESSIONAL_PATTERNS
                .iter()
                .map(|(p, c)| (*p, PatternFamily::Professional, *c)),
        )
        .chain(
            GOVERNMENT_PATTERNS
                .iter()
                .map(|p| (*p, PatternFamily::Government, CategoryLabel::Individual)),
        );

    let mut suggestions = Vec::new();
    let mut covered: HashSet<usize> = HashSet::new();

    for (pattern, family, suggested) in families {
        let matches: Vec<usize> = employers
            .iter()
            .enumerate()
            .filter(|(_, e)| e.contains(pattern))
            .map(|(i, _)| i)
            .collect();

        if matches.len() > family.min_volume() {
            let total_amount = matches.iter().map(|&i| others[i].contribution_amount).sum();
            tracing::debug!(pattern, volume = matches.len(), "rule suggestion");
            covered.extend(matches.iter().copied());
            suggestions.push(RuleSuggestion {
                pattern: pattern.to_string(),
                family,
                suggested_category: suggested,
                volume: matches.len(),
                total_amount,
            });
        }
    }

    let potential_reduction_pct = if others.is_empty() {
        0.0
    } else {
        covered.len() as f64 / others.len() as f64 * 100.0
    };

    SuggestionSummary {
        suggestions,
        others_total: others.len(),
        reclassifiable: covered.len(),
        potential_reduction_pct,
    }
}

// ============================================================================
// TESTS
// ============================================================================
