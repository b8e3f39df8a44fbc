// 🏷️ Classification Rules - Rules as Data
// Ordered, tiered pattern matching of (employer, contributor name) → category
//
// Evaluation order: tiers ascending (1 = explicit employer overrides ...
// 8 = legacy lists), then priority descending, then rule id. The first
// matching rule wins; no match falls through to `Others`.
//
// Keyword membership is substring containment on the normalized text, not
// whole-word matching. "PUBLICITY WORKS" hits the PUBLIC keyword. Changing
// that would silently reclassify the historical corpus, so it stays.

use crate::category::CategoryLabel;
use crate::error::ClassifierError;
use crate::normalize::normalize;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

// ============================================================================
// RULE TIERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleTier {
    /// Known high-volume employers mapped straight to a category.
    EmployerOverride,
    /// A marker in name or employer that forces a fixed category.
    SpecialEntity,
    /// Legal-practice keywords.
    Professional,
    /// Real-estate, construction and architecture keywords.
    Industry,
    /// Entity suffixes, ownership titles, financial-sector terms.
    Business,
    /// Public sector, not employed, or no employer at all.
    Individual,
    /// Collective, labor and advocacy keywords.
    Association,
    /// Exact and substring lists kept from the previous ruleset.
    Legacy,
}

impl RuleTier {
    pub const ALL: [RuleTier; 8] = [
        RuleTier::EmployerOverride,
        RuleTier::SpecialEntity,
        RuleTier::Professional,
        RuleTier::Industry,
        RuleTier::Business,
        RuleTier::Individual,
        RuleTier::Association,
        RuleTier::Legacy,
    ];

    /// 1-based evaluation rank. Lower ranks are evaluated first.
    pub fn rank(&self) -> u8 {
        match self {
            RuleTier::EmployerOverride => 1,
            RuleTier::SpecialEntity => 2,
            RuleTier::Professional => 3,
            RuleTier::Industry => 4,
            RuleTier::Business => 5,
            RuleTier::Individual => 6,
            RuleTier::Association => 7,
            RuleTier::Legacy => 8,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RuleTier::EmployerOverride => "explicit employer overrides",
            RuleTier::SpecialEntity => "special-entity override",
            RuleTier::Professional => "professional-service keywords",
            RuleTier::Industry => "industry-sector keywords",
            RuleTier::Business => "business entity / title / financial keywords",
            RuleTier::Individual => "individual signals",
            RuleTier::Association => "association signals",
            RuleTier::Legacy => "legacy fallback lists",
        }
    }
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// Which text a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleScope {
    /// Normalized employer.
    Employer,
    /// Normalized employer, or the trimmed upper-cased employer as entered.
    EmployerAnyForm,
    /// Employer exactly as supplied (case-sensitive, untrimmed).
    RawEmployer,
    /// Normalized contributor name.
    Name,
    /// Normalized name or normalized employer.
    NameOrEmployer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Field equals one of the patterns.
    Exact,
    /// Field contains the pattern.
    Substring,
    /// Field contains any keyword of the list.
    KeywordList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Rule ID for tracking
    pub id: String,

    pub tier: RuleTier,

    pub scope: RuleScope,

    pub match_kind: MatchKind,

    pub patterns: Vec<String>,

    /// Category to assign
    pub target: CategoryLabel,

    /// Priority within the tier (higher = applied first)
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Description/notes about this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_priority() -> i32 {
    0
}

/// The texts a rule can look at, computed once per classification call.
#[derive(Debug, Clone)]
pub struct FieldView<'a> {
    pub employer: String,
    pub employer_upper: String,
    pub employer_raw: Option<&'a str>,
    pub name: String,
}

impl<'a> FieldView<'a> {
    pub fn new(employer: Option<&'a str>, name: Option<&str>) -> Self {
        FieldView {
            employer: normalize(employer),
            employer_upper: employer.map(|e| e.trim().to_uppercase()).unwrap_or_default(),
            employer_raw: employer,
            name: normalize(name),
        }
    }
}

impl PatternRule {
    pub fn new(
        id: &str,
        tier: RuleTier,
        scope: RuleScope,
        match_kind: MatchKind,
        patterns: &[&str],
        target: CategoryLabel,
        priority: i32,
    ) -> Self {
        PatternRule {
            id: id.to_string(),
            tier,
            scope,
            match_kind,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            target,
            priority,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Canonical form of the patterns for this rule's scope.
    ///
    /// Raw-employer patterns are kept verbatim. Exact patterns on normalized
    /// text are normalized themselves ("N/A" → "N A"). Containment patterns
    /// are only trimmed and upper-cased, and empty ones are dropped since
    /// they would match everything.
    fn compile(mut self) -> Self {
        let scope = self.scope;
        let kind = self.match_kind;
        self.patterns = self
            .patterns
            .into_iter()
            .filter_map(|p| match (scope, kind) {
                (RuleScope::RawEmployer, MatchKind::Exact) => Some(p),
                (RuleScope::RawEmployer, _) => (!p.is_empty()).then_some(p),
                (_, MatchKind::Exact) => Some(normalize(Some(&p))),
                _ => {
                    let upper = p.trim().to_uppercase();
                    (!upper.is_empty()).then_some(upper)
                }
            })
            .collect();
        self
    }

    fn texts<'v>(&self, view: &'v FieldView<'_>) -> Vec<&'v str> {
        match self.scope {
            RuleScope::Employer => vec![view.employer.as_str()],
            RuleScope::EmployerAnyForm => vec![view.employer.as_str(), view.employer_upper.as_str()],
            RuleScope::RawEmployer => view.employer_raw.into_iter().collect(),
            RuleScope::Name => vec![view.name.as_str()],
            RuleScope::NameOrEmployer => vec![view.name.as_str(), view.employer.as_str()],
        }
    }

    /// Check whether this (compiled) rule matches the given fields.
    pub fn matches(&self, view: &FieldView<'_>) -> bool {
        let texts = self.texts(view);
        match self.match_kind {
            MatchKind::Exact => texts
                .iter()
                .any(|t| self.patterns.iter().any(|p| p.as_str() == *t)),
            MatchKind::Substring | MatchKind::KeywordList => texts
                .iter()
                .any(|t| self.patterns.iter().any(|p| !p.is_empty() && t.contains(p.as_str()))),
        }
    }
}

// ============================================================================
// RULE SET (configuration data)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<PatternRule>,
}

impl RuleSet {
    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let set: RuleSet =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;
        set.validate()?;

        Ok(set)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write rules file: {:?}", path.as_ref()))
    }

    /// Adopt an extra rule (e.g. an accepted suggestion).
    pub fn with_rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Reject definitions that cannot be evaluated deterministically.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let mut seen = HashSet::new();

        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ClassifierError::InvalidRule(format!(
                    "duplicate rule id `{}`",
                    rule.id
                )));
            }

            if rule.patterns.is_empty() {
                return Err(ClassifierError::InvalidRule(format!(
                    "rule `{}` has no patterns",
                    rule.id
                )));
            }

            if rule.match_kind != MatchKind::Exact
                && rule.patterns.iter().any(|p| p.trim().is_empty())
            {
                return Err(ClassifierError::InvalidRule(format!(
                    "rule `{}` has an empty containment pattern",
                    rule.id
                )));
            }
        }

        Ok(())
    }

    /// The ruleset shipped with the classifier.
    pub fn builtin() -> Self {
        let mut rules = Vec::new();

        // Tier 1: explicit employer overrides, one rule per employer so the
        // listed order is the evaluation order.
        let overrides: [(&str, CategoryLabel); 14] = [
            ("BUSINESS OWNER", CategoryLabel::BusinessOwner),
            ("CONRAD LLC", CategoryLabel::BusinessOwner),
            ("WINTHROP & WEINSTINE", CategoryLabel::Lawyer),
            ("EDINA REALTY", CategoryLabel::BusinessOwner),
            ("TCF BANK", CategoryLabel::BusinessOwner),
            ("AMERIPRISE FINANCIAL", CategoryLabel::BusinessOwner),
            ("THOMSON REUTERS", CategoryLabel::BusinessOwner),
            ("BEST BUY", CategoryLabel::BusinessOwner),
            ("MEDICA", CategoryLabel::BusinessOwner),
            ("ALLINA HEALTH", CategoryLabel::BusinessOwner),
            ("STATE OF MN", CategoryLabel::Individual),
            // Minneapolis Public Schools
            ("MPS", CategoryLabel::Individual),
            ("RETIRED / RETIRED", CategoryLabel::Individual),
            ("BOTH RETIRED", CategoryLabel::Individual),
        ];
        for (ordinal, (employer, target)) in overrides.iter().enumerate() {
            let slug: String = employer
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect();
            rules.push(PatternRule::new(
                &format!("override_{}", slug),
                RuleTier::EmployerOverride,
                RuleScope::EmployerAnyForm,
                MatchKind::Substring,
                &[employer],
                *target,
                100 - ordinal as i32,
            ));
        }

        // Tier 2: the Pohlad family, merged into BusinessOwner
        rules.push(
            PatternRule::new(
                "special_entity_pohlad",
                RuleTier::SpecialEntity,
                RuleScope::NameOrEmployer,
                MatchKind::Substring,
                &["POHLAD"],
                CategoryLabel::BusinessOwner,
                100,
            )
            .with_description("Pohlad family conglomerate; formerly its own category"),
        );

        rules.push(PatternRule::new(
            "professional_legal",
            RuleTier::Professional,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "LAW", "ATTORNEY", "LEGAL", "ADVOCATE", "COUNSEL", "BARRISTER", "SOLICITOR",
                "LITIGATION", "LAW FIRM", "COUNSELOR", "PARALEGAL",
            ],
            CategoryLabel::Lawyer,
            100,
        ));

        rules.push(PatternRule::new(
            "industry_real_estate",
            RuleTier::Industry,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "DEVELOPMENT", "CONSTRUCTION", "REAL ESTATE", "ARCHITECT", "BUILDER", "PROPERTY",
                "REALTOR", "CONTRACTOR", "ENGINEERING", "DESIGN", "PLANNING", "URBAN",
                "RESIDENTIAL", "COMMERCIAL",
            ],
            CategoryLabel::Developer,
            100,
        ));

        // Tier 5 is a union of three independent checks
        rules.push(PatternRule::new(
            "business_entity_suffix",
            RuleTier::Business,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &["LLC", "INC", "CORP", "COMPANY", "BUSINESS", "CONSULTING", "SERVICES"],
            CategoryLabel::BusinessOwner,
            100,
        ));
        rules.push(PatternRule::new(
            "business_owner_keywords",
            RuleTier::Business,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "CEO", "OWNER", "FOUNDER", "PRESIDENT", "PRINCIPAL", "PARTNER", "EXECUTIVE",
                "DIRECTOR", "MANAGER", "ENTREPRENEUR", "CONSULTANT", "LLC", "INC", "CORP",
                "COMPANY", "BUSINESS", "ENTERPRISES", "GROUP", "CONSULTING", "SERVICES",
                "SOLUTIONS", "PARTNERS", "CAPITAL", "INVESTMENTS", "MANAGEMENT", "HOLDINGS",
                "VENTURES", "ACCOUNTANT", "CPA", "ACCOUNTING", "FINANCIAL", "ADVISOR",
                "ENGINEERING", "MEDICAL", "DOCTOR", "POHLAD",
            ],
            CategoryLabel::BusinessOwner,
            99,
        ));
        rules.push(PatternRule::new(
            "business_financial_sector",
            RuleTier::Business,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &["BANK", "FINANCIAL", "CAPITAL", "INVESTMENT", "REALTY", "INSURANCE"],
            CategoryLabel::BusinessOwner,
            98,
        ));

        rules.push(PatternRule::new(
            "individual_keywords",
            RuleTier::Individual,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "RETIRED", "NOT EMPLOYED", "SELF-EMPLOYED", "HOMEMAKER", "STUDENT",
                "UNEMPLOYED", "VOLUNTEER", "FREELANCE", "CITY OF", "STATE OF", "COUNTY",
                "FEDERAL", "GOVERNMENT", "PUBLIC", "MUNICIPAL", "DEPARTMENT", "AGENCY",
                "BUREAU", "SCHOOL DISTRICT", "UNIVERSITY", "COLLEGE",
            ],
            CategoryLabel::Individual,
            100,
        ));
        // Only reached once every earlier tier had its chance on the name
        rules.push(PatternRule::new(
            "individual_placeholder_employer",
            RuleTier::Individual,
            RuleScope::Employer,
            MatchKind::Exact,
            &["", "NONE", "N/A", "UNKNOWN"],
            CategoryLabel::Individual,
            99,
        ));

        rules.push(PatternRule::new(
            "association_keywords",
            RuleTier::Association,
            RuleScope::NameOrEmployer,
            MatchKind::KeywordList,
            &[
                "PAC", "COMMITTEE", "UNION", "ASSOCIATION", "FEDERATION", "COALITION",
                "ALLIANCE", "COUNCIL", "FUND", "FOUNDATION", "SOCIETY", "ORGANIZATION",
                "INSTITUTE", "LEAGUE",
            ],
            CategoryLabel::Association,
            100,
        ));

        rules.extend(legacy_rules());

        RuleSet { rules }
    }
}

fn legacy_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "legacy_lawyer_exact",
            RuleTier::Legacy,
            RuleScope::RawEmployer,
            MatchKind::Exact,
            &[
                "North State Advisors", "Lockridge Grindal Nauen", "Attorney",
                "McGrann Shea Carnival Straughn and Lamb", "Dykema", "Faegre Baker Daniels",
                "Stinson Leonard Street", "Goff Public Relations", "Redmond Associates, Inc.",
                "Dominium", "Lobbyist", "Messerli Kramer", "Kaplan Strangis", "Faegre Baker Ds",
                "Faegre Baker D", "Brlol and Associates", "Lockridge Grindai Nauen",
                "Maslon, Edelman, Borman & Brand", "McGrann Shea C", "McGrahn Shea Carnival Stra",
                "North State Adv", "North State Advi", "Western Litigation",
            ],
            CategoryLabel::Lawyer,
            100,
        ),
        PatternRule::new(
            "legacy_lawyer_patterns",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &["HOFFNER", "LGN", "DYKEMA", "BAKER", "LINDQUIST", "ADVOCACY"],
            CategoryLabel::Lawyer,
            99,
        ),
        PatternRule::new(
            "legacy_developer_exact",
            RuleTier::Legacy,
            RuleScope::RawEmployer,
            MatchKind::Exact,
            &[
                "Keller Williams Realty", "Developer", "Developers", "Hillcrest Develop",
                "Kraus Anderson", "Ryan Construction", "Weis Builders", "Brighton Development",
                "Mortenson Construction", "Mortensori Construction", "RSP Architects",
                "Building Manager", "Realtor", "Dunbar Development", "Keller Williams R",
                "Prospect Park Properties", "Ryan Companies", "Kleinman Realty Company",
                "Opus Group", "Contractor", "Hyde Development", "Provident Real Estate Venture",
                "Thor Construction", "Thor Constructs", "Alatus", "Young Quinlan Building",
                "Hillcrest Development", "Wellington Development", "Lupe Development",
                "Abdo Market House", "StevenScott Management", "Duval Development",
                "Welsh Companies", "Lakes Area Realty",
            ],
            CategoryLabel::Developer,
            98,
        ),
        PatternRule::new(
            "legacy_developer_patterns",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "DORAN", "CPM COMPANIES", "RYAN CO", "WINDSOR MANAG", "PROPERTIES", "ACKERBERG",
                "PROP", "SOLHEM", "LANDER", "DEVELOPMENT", "SCHAFER", "MANAGEMENT", "METROPELIGO",
                "COLDWELL", "BANKER", "GRECO", "HOSPITALITY", "DESIGN", "COMMERCIAL", "BKV",
                "MORTENSON", "COLLIERS", "REAL ESTATE", "FRANA", "LOUCKS", "PERKINS", "ARCHITECT",
            ],
            CategoryLabel::Developer,
            97,
        ),
        PatternRule::new(
            "legacy_business_exact",
            RuleTier::Legacy,
            RuleScope::RawEmployer,
            MatchKind::Exact,
            &[
                "Ramsey Excavating", "Timeshare Systems", "Kelber Catering", "Minnesota Vikings",
                "Broadway Liquor", "Hirshfields", "Minnesota Twins", "Delta Dental Foundation",
                "Restauranteur", "Wall Companies", "Dakota Jazz Club", "March Enterprises",
                "Le Meredien Chambers", "Atomic Recycling", "Pohlad Companies", "Businessman",
                "The Language Bank", "Dunbar Enterprises", "Wells Fargo",
                "Standard Heating and Air", "Blue Ox", "Minnesota Timberwolves",
                "Parasole Restaurants", "Minneapolis Entertainment, Inc.", "Deja Vu of Minnesota",
            ],
            CategoryLabel::BusinessOwner,
            96,
        ),
        PatternRule::new(
            "legacy_business_patterns",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &[
                "WINE", "NEWBERRY", "STUDIO", "NUWAY", "HK&OK", "OUTDOOR", "BARR", "MAHAL",
                "UROLOGY", "CHERRYHOMES", "TACO", "TURKEY", "DERMATOLOG", "EVENT", "BACHELOR",
                "PLATE", "TOWING", "CAFE", "MEADOW", "KNOWRE", "LIGHTWELL", "MAKES IT", "MASTER",
                "MENTOR PLANET", "NINA", "NORTH", "PRESS",
            ],
            CategoryLabel::BusinessOwner,
            95,
        ),
    ]
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// RULE MATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub category: CategoryLabel,
    pub rule_id: Option<String>,
    pub tier: Option<RuleTier>,
}

impl Default for RuleMatch {
    fn default() -> Self {
        RuleMatch {
            category: CategoryLabel::Others,
            rule_id: None,
            tier: None,
        }
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

/// Immutable once built; share it by reference or `Arc`.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<PatternRule>,
}

impl RuleEngine {
    /// Engine over the builtin ruleset.
    pub fn builtin() -> Self {
        RuleEngine::from_rule_set(RuleSet::builtin())
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(RuleEngine::from_rule_set(RuleSet::from_file(path)?))
    }

    /// Compile and order a ruleset.
    ///
    /// Sort key is (tier rank, priority descending, id) so the outcome never
    /// depends on the order rules were listed or loaded in.
    pub fn from_rule_set(set: RuleSet) -> Self {
        let mut rules: Vec<PatternRule> = set
            .rules
            .into_iter()
            .map(PatternRule::compile)
            .filter(|rule| {
                if rule.patterns.is_empty() {
                    tracing::warn!(rule = %rule.id, "rule has no usable patterns; skipped");
                    false
                } else {
                    true
                }
            })
            .collect();

        rules.sort_by(|a, b| {
            (a.tier.rank(), Reverse(a.priority), &a.id).cmp(&(b.tier.rank(), Reverse(b.priority), &b.id))
        });

        RuleEngine { rules }
    }

    /// Classify an (employer, name) pair. Total: always returns a label.
    pub fn classify(&self, employer: Option<&str>, name: Option<&str>) -> CategoryLabel {
        self.evaluate(employer, name).category
    }

    /// Classify and report which rule decided.
    pub fn evaluate(&self, employer: Option<&str>, name: Option<&str>) -> RuleMatch {
        let view = FieldView::new(employer, name);

        // Find first matching rule (already in evaluation order)
        for rule in &self.rules {
            if rule.matches(&view) {
                return RuleMatch {
                    category: rule.target,
                    rule_id: Some(rule.id.clone()),
                    tier: Some(rule.tier),
                };
            }
        }

        RuleMatch::default()
    }

    /// Compiled rules in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn engine() -> RuleEngine {
        RuleEngine::builtin()
    }

    #[test]
    fn test_builtin_rules_validate() {
        let set = RuleSet::builtin();
        assert!(set.validate().is_ok());
        assert_eq!(engine().rule_count(), set.rules.len());
    }

    #[test]
    fn test_tiers_evaluated_in_rank_order() {
        let engine = engine();
        let ranks: Vec<u8> = engine.rules().iter().map(|r| r.tier.rank()).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert_eq!(engine.rules()[0].id, "override_business_owner");
    }

    #[test]
    fn test_scenarios() {
        let engine = engine();
        let cases = [
            (Some("Winthrop & Weinstine"), Some("Jane Roe"), CategoryLabel::Lawyer),
            (Some("ABC LLC"), Some("Bob Owner"), CategoryLabel::BusinessOwner),
            (Some("State of MN"), Some("Worker"), CategoryLabel::Individual),
            (Some("Teamsters Union Local 100"), Some("Pat Doe"), CategoryLabel::Association),
            (Some("Conrad LLC"), Some("John Smith"), CategoryLabel::BusinessOwner),
            (Some("Best Buy"), Some("Employee Name"), CategoryLabel::BusinessOwner),
            (Some("MPS"), Some("Jordan Lee"), CategoryLabel::Individual),
            (Some("XYZ Inc"), Some("CEO Name"), CategoryLabel::BusinessOwner),
            (Some("Consulting Services"), Some("Consultant Name"), CategoryLabel::BusinessOwner),
            (Some("Law Firm Partners"), Some("Attorney Name"), CategoryLabel::Lawyer),
            (Some("Legal Services"), Some("Lawyer Name"), CategoryLabel::Lawyer),
            (Some("Retired"), Some("Retiree Name"), CategoryLabel::Individual),
            (Some("Real Estate Development"), Some("Developer Name"), CategoryLabel::Developer),
        ];

        for (employer, name, expected) in cases {
            assert_eq!(
                engine.classify(employer, name),
                expected,
                "employer={:?} name={:?}",
                employer,
                name
            );
        }
    }

    #[test]
    fn test_tier_precedence_professional_over_business() {
        let result = engine().evaluate(Some("Smith Law LLC"), Some("Jane Smith"));
        assert_eq!(result.category, CategoryLabel::Lawyer);
        assert_eq!(result.tier, Some(RuleTier::Professional));
    }

    #[test]
    fn test_special_entity_supremacy() {
        let engine = engine();
        assert_eq!(
            engine.classify(Some("Retired"), Some("Jane Pohlad")),
            CategoryLabel::BusinessOwner
        );
        assert_eq!(
            engine.classify(Some("Not employed"), Some("Sara Pohlad")),
            CategoryLabel::BusinessOwner
        );
        assert_eq!(
            engine.classify(Some("Pohlad Family Foundation"), Some("Jim Pohlad")),
            CategoryLabel::BusinessOwner
        );
    }

    #[test]
    fn test_empty_employer_falls_back_to_individual() {
        let engine = engine();
        for employer in [None, Some(""), Some("   "), Some("None"), Some("N/A"), Some("unknown")] {
            let result = engine.evaluate(employer, Some("John Smith"));
            assert_eq!(result.category, CategoryLabel::Individual, "employer={:?}", employer);
            assert_eq!(result.rule_id.as_deref(), Some("individual_placeholder_employer"));
        }
    }

    #[test]
    fn test_name_tiers_beat_empty_employer() {
        // Association keywords are checked on the name before the employer
        // would be considered; the empty employer still wins at tier 6.
        let engine = engine();
        assert_eq!(
            engine.classify(None, Some("Friends of Pohlad")),
            CategoryLabel::BusinessOwner
        );
        assert_eq!(engine.classify(None, Some("Carpenters PAC")), CategoryLabel::Individual);
        assert_eq!(
            engine.classify(Some("Volunteer Fire Dept"), Some("Firefighters Union PAC")),
            CategoryLabel::Individual
        );
        assert_eq!(
            engine.classify(Some("Acme"), Some("Firefighters Union PAC")),
            CategoryLabel::Association
        );
    }

    #[test]
    fn test_substring_false_positive_preserved() {
        let result = engine().evaluate(Some("Publicity Works"), Some("Pat Doe"));
        assert_eq!(result.category, CategoryLabel::Individual);
        assert_eq!(result.rule_id.as_deref(), Some("individual_keywords"));
    }

    #[test]
    fn test_legacy_exact_is_case_sensitive_raw_match() {
        let engine = engine();
        let result = engine.evaluate(Some("Alatus"), Some("Pat Doe"));
        assert_eq!(result.category, CategoryLabel::Developer);
        assert_eq!(result.tier, Some(RuleTier::Legacy));

        // Not on the exact list once the casing changes, and no keyword hits
        assert_eq!(engine.classify(Some("ALATUS"), Some("Pat Doe")), CategoryLabel::Others);
    }

    #[test]
    fn test_raw_override_matches_unnormalized_form() {
        let result = engine().evaluate(Some("Retired / Retired"), Some("Pat Doe"));
        assert_eq!(result.rule_id.as_deref(), Some("override_retired___retired"));
    }

    #[test]
    fn test_default_others() {
        let result = engine().evaluate(Some("Zzyzx"), Some("Quinn Qu"));
        assert_eq!(result, RuleMatch::default());
    }

    #[test]
    fn test_totality_on_sampled_inputs() {
        let engine = engine();
        let fragments = [
            "", " ", "Law", "llc", "Retired", "union", "Pohlad", "N/A", "Bank", "zz", "!!",
            "Design", "City of", "é", "Public", "Taco", "Dykema",
        ];
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let employer = if rng.random_bool(0.2) {
                None
            } else {
                let a = fragments[rng.random_range(0..fragments.len())];
                let b = fragments[rng.random_range(0..fragments.len())];
                Some(format!("{} {}", a, b))
            };
            let name = if rng.random_bool(0.1) {
                None
            } else {
                Some(fragments[rng.random_range(0..fragments.len())].to_string())
            };

            let label = engine.classify(employer.as_deref(), name.as_deref());
            assert!(CategoryLabel::ALL.contains(&label));
        }
    }

    #[test]
    fn test_priority_not_insertion_order() {
        let low = PatternRule::new(
            "b_low",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::Substring,
            &["ACME"],
            CategoryLabel::Developer,
            1,
        );
        let high = PatternRule::new(
            "a_high",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::Substring,
            &["ACME"],
            CategoryLabel::Lawyer,
            50,
        );

        let forward = RuleEngine::from_rule_set(RuleSet { rules: vec![low.clone(), high.clone()] });
        let reverse = RuleEngine::from_rule_set(RuleSet { rules: vec![high, low] });

        assert_eq!(forward.classify(Some("Acme"), None), CategoryLabel::Lawyer);
        assert_eq!(reverse.classify(Some("Acme"), None), CategoryLabel::Lawyer);
    }

    #[test]
    fn test_empty_pattern_lists_degrade_to_others() {
        let rule = PatternRule {
            patterns: vec!["  ".to_string()],
            ..PatternRule::new(
                "blank",
                RuleTier::Business,
                RuleScope::Employer,
                MatchKind::KeywordList,
                &[],
                CategoryLabel::BusinessOwner,
                0,
            )
        };
        let set = RuleSet { rules: vec![rule] };
        assert!(set.validate().is_err());

        let engine = RuleEngine::from_rule_set(set);
        assert_eq!(engine.rule_count(), 0);
        assert_eq!(engine.classify(Some("Anything"), Some("At All")), CategoryLabel::Others);
    }

    #[test]
    fn test_rules_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");

        RuleSet::builtin().to_file(&path).unwrap();
        let loaded = RuleEngine::from_file(&path).unwrap();

        assert_eq!(loaded.rules(), engine().rules());
    }

    #[test]
    fn test_adopted_rule_takes_effect() {
        let set = RuleSet::builtin().with_rule(PatternRule::new(
            "adopted_hospital",
            RuleTier::Legacy,
            RuleScope::Employer,
            MatchKind::KeywordList,
            &["HOSPITAL"],
            CategoryLabel::BusinessOwner,
            200,
        ));
        let engine = RuleEngine::from_rule_set(set);
        assert_eq!(
            engine.classify(Some("Abbott Hospital"), Some("Pat Doe")),
            CategoryLabel::BusinessOwner
        );
    }
}
