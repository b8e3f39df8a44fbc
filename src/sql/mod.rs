// 🗄️ Generated Rule Text - the ruleset rendered as a SQL function
//
// One WHEN arm per rule, in engine evaluation order, so the warehouse
// evaluates the same first-match-wins chain as `RuleEngine::classify`.
// Literals use BigQuery quoting: backslash escapes inside single quotes.
// `eval` parses this text back and evaluates it, which is how the
// equivalence of both forms is tested.

pub mod eval;

pub use eval::{CaseExpression, RuleFunction};

use crate::category::CategoryLabel;
use crate::rules::{MatchKind, PatternRule, RuleEngine, RuleScope};
use serde::{Deserialize, Serialize};

/// Employer argument of the generated function.
pub const EMPLOYER_PARAM: &str = "ContributorsEmployer";
/// Name argument of the generated function.
pub const NAME_PARAM: &str = "ContributorName";

// ============================================================================
// TARGET
// ============================================================================

/// Fully-qualified location of the generated function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlTarget {
    pub project: String,
    pub dataset: String,
    pub function_name: String,
}

impl Default for SqlTarget {
    fn default() -> Self {
        SqlTarget {
            project: "campaign-finance".to_string(),
            dataset: "contributions".to_string(),
            function_name: "classify_contributor".to_string(),
        }
    }
}

impl SqlTarget {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.function_name)
            .replace('`', "")
    }
}

// ============================================================================
// LITERALS
// ============================================================================

/// Quote a string as a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Escape LIKE metacharacters so the pattern matches literally.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// RENDERING
// ============================================================================

fn normalize_expr(param: &str) -> String {
    format!(
        "TRIM(REGEXP_REPLACE(REGEXP_REPLACE(UPPER(COALESCE({}, '')), r'[^A-Z0-9 &\\-.]', ' '), r'\\s+', ' '))",
        param
    )
}

fn columns(scope: RuleScope) -> &'static [&'static str] {
    match scope {
        RuleScope::Employer => &["emp"],
        RuleScope::EmployerAnyForm => &["emp", "emp_upper"],
        RuleScope::RawEmployer => &["emp_raw"],
        RuleScope::Name => &["name"],
        RuleScope::NameOrEmployer => &["name", "emp"],
    }
}

/// Render the predicate of one rule, or `None` if it has no patterns.
pub fn render_condition(rule: &PatternRule) -> Option<String> {
    if rule.patterns.is_empty() {
        return None;
    }

    let mut terms = Vec::new();
    for column in columns(rule.scope) {
        match rule.match_kind {
            MatchKind::Exact => {
                let values: Vec<String> = rule.patterns.iter().map(|p| quote_literal(p)).collect();
                terms.push(format!("{} IN ({})", column, values.join(", ")));
            }
            MatchKind::Substring | MatchKind::KeywordList => {
                for pattern in &rule.patterns {
                    let like = format!("%{}%", escape_like(pattern));
                    terms.push(format!("{} LIKE {}", column, quote_literal(&like)));
                }
            }
        }
    }

    Some(format!("({})", terms.join(" OR ")))
}

fn comment_safe(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// The CASE expression alone, over the columns `emp`, `name`, `emp_upper`
/// and `emp_raw`.
pub fn render_case(engine: &RuleEngine) -> String {
    let mut sql = String::from("CASE\n");

    for rule in engine.rules() {
        let Some(condition) = render_condition(rule) else {
            continue;
        };
        sql.push_str(&format!(
            "    -- [tier {}] {}\n",
            rule.tier.rank(),
            comment_safe(&rule.id)
        ));
        sql.push_str(&format!(
            "    WHEN {} THEN {}\n",
            condition,
            quote_literal(rule.target.as_str())
        ));
    }

    sql.push_str(&format!(
        "    ELSE {}\n  END",
        quote_literal(CategoryLabel::Others.as_str())
    ));
    sql
}

/// Full `CREATE OR REPLACE FUNCTION` statement for the warehouse.
pub fn render_function(engine: &RuleEngine, target: &SqlTarget) -> String {
    format!(
        "-- Contributor category rules ({} rules, evaluated top to bottom, first match wins)\n\
         CREATE OR REPLACE FUNCTION `{name}`({emp} STRING, {person} STRING)\n\
         RETURNS STRING AS ((\n\
         \x20 SELECT {case}\n\
         \x20 FROM (\n\
         \x20   SELECT\n\
         \x20     {emp_norm} AS emp,\n\
         \x20     {name_norm} AS name,\n\
         \x20     UPPER(TRIM(COALESCE({emp}, ''))) AS emp_upper,\n\
         \x20     {emp} AS emp_raw\n\
         \x20 )\n\
         ));\n",
        engine.rule_count(),
        name = target.qualified_name(),
        emp = EMPLOYER_PARAM,
        person = NAME_PARAM,
        case = render_case(engine),
        emp_norm = normalize_expr(EMPLOYER_PARAM),
        name_norm = normalize_expr(NAME_PARAM),
    )
}

// ============================================================================
// TESTS
// ============================================================================
