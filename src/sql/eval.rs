// 🔍 Rule Text Evaluator
//
// Reads generated rule text back and evaluates it for one (employer, name)
// pair. Supports exactly the subset the renderer emits:
//
//   cond    := and (OR and)*
//   and     := primary (AND primary)*
//   primary := '(' cond ')' | column LIKE str | column IN '(' str, ... ')' | column = str
//   scalar  := param | str | NULL | func '(' scalar, ... ')'
//
// `CaseExpression` evaluates the CASE chain over columns bound natively from
// the rule engine's `FieldView`. `RuleFunction` also parses the projection
// that derives those columns from the function arguments, so UPPER, TRIM,
// COALESCE and REGEXP_REPLACE are evaluated from the text itself. A NULL
// column makes every predicate on it false.

use crate::category::CategoryLabel;
use crate::error::ClassifierError;
use crate::rules::FieldView;
use crate::sql::{EMPLOYER_PARAM, NAME_PARAM};


// ============================================================================
// LEXER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Quoted(String),
    Symbol(char),
}

fn err(msg: impl Into<String>) -> ClassifierError {
    ClassifierError::RuleText(msg.into())
}

fn read_string(chars: &[char], start: usize, raw: bool) -> Result<(String, usize), ClassifierError> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut out = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' && !raw {
            let Some(&next) = chars.get(i + 1) else {
                break;
            };
            out.push(match next {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            i += 2;
            continue;
        }
        if c == '\\' && raw {
            // raw strings keep the backslash but still cannot end on `\'`
            out.push(c);
            if let Some(&next) = chars.get(i + 1) {
                out.push(next);
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(err(format!("unterminated string literal at offset {}", start)))
}

fn tokenize(text: &str) -> Result<Vec<Token>, ClassifierError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
        } else if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '\'' || c == '"' {
            let (s, next) = read_string(&chars, i, false)?;
            tokens.push(Token::Str(s));
            i = next;
        } else if (c == 'r' || c == 'R') && matches!(chars.get(i + 1), Some('\'') | Some('"')) {
            let (s, next) = read_string(&chars, i + 1, true)?;
            tokens.push(Token::Str(s));
            i = next;
        } else if c == '`' {
            let end = chars[i + 1..]
                .iter()
                .position(|&ch| ch == '`')
                .ok_or_else(|| err("unterminated quoted identifier"))?;
            tokens.push(Token::Quoted(chars[i + 1..i + 1 + end].iter().collect()));
            i += end + 2;
        } else if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Symbol(c));
            i += 1;
        }
    }

    Ok(tokens)
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// Normalized employer.
    Emp,
    /// Normalized name.
    Name,
    /// Trimmed upper-cased employer.
    EmpUpper,
    /// Employer as supplied; NULL when absent.
    EmpRaw,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Emp, Column::Name, Column::EmpUpper, Column::EmpRaw];

    fn parse(word: &str) -> Option<Column> {
        match word.to_ascii_lowercase().as_str() {
            "emp" => Some(Column::Emp),
            "name" => Some(Column::Name),
            "emp_upper" => Some(Column::EmpUpper),
            "emp_raw" => Some(Column::EmpRaw),
            _ => None,
        }
    }

    fn bind<'a>(&self, row: &'a Row) -> Option<&'a str> {
        match self {
            Column::Emp => row.emp.as_deref(),
            Column::Name => row.name.as_deref(),
            Column::EmpUpper => row.emp_upper.as_deref(),
            Column::EmpRaw => row.emp_raw.as_deref(),
        }
    }
}

/// Column values of one evaluated row; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub emp: Option<String>,
    pub name: Option<String>,
    pub emp_upper: Option<String>,
    pub emp_raw: Option<String>,
}

impl Row {
    fn slot(&mut self, column: Column) -> &mut Option<String> {
        match column {
            Column::Emp => &mut self.emp,
            Column::Name => &mut self.name,
            Column::EmpUpper => &mut self.emp_upper,
            Column::EmpRaw => &mut self.emp_raw,
        }
    }
}

impl From<&FieldView<'_>> for Row {
    fn from(view: &FieldView<'_>) -> Self {
        Row {
            emp: Some(view.employer.clone()),
            name: Some(view.name.clone()),
            emp_upper: Some(view.employer_upper.clone()),
            emp_raw: view.employer_raw.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Or(Vec<Predicate>),
    And(Vec<Predicate>),
    Like(Column, String),
    In(Column, Vec<String>),
    Eq(Column, String),
}

impl Predicate {
    fn eval(&self, row: &Row) -> bool {
        match self {
            Predicate::Or(parts) => parts.iter().any(|p| p.eval(row)),
            Predicate::And(parts) => parts.iter().all(|p| p.eval(row)),
            Predicate::Like(col, pattern) => col
                .bind(row)
                .is_some_and(|value| like_match(value, pattern)),
            Predicate::In(col, values) => col
                .bind(row)
                .is_some_and(|value| values.iter().any(|v| v == value)),
            Predicate::Eq(col, expected) => col.bind(row).is_some_and(|value| value == expected),
        }
    }
}

/// Argument of the generated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Employer,
    Name,
}

impl Param {
    fn parse(word: &str) -> Option<Param> {
        if word.eq_ignore_ascii_case(EMPLOYER_PARAM) {
            Some(Param::Employer)
        } else if word.eq_ignore_ascii_case(NAME_PARAM) {
            Some(Param::Name)
        } else {
            None
        }
    }
}

/// String-valued expression over the function arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Param(Param),
    Literal(String),
    Null,
    Upper(Box<ScalarExpr>),
    Trim(Box<ScalarExpr>),
    Coalesce(Vec<ScalarExpr>),
    RegexpReplace(Box<ScalarExpr>, CharPattern, String),
}

fn check_arity(function: &str, args: &[ScalarExpr], expected: usize) -> Result<(), ClassifierError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(err(format!(
            "{} takes {} argument(s), found {}",
            function,
            expected,
            args.len()
        )))
    }
}

fn literal_arg(function: &str, arg: Option<ScalarExpr>) -> Result<String, ClassifierError> {
    match arg {
        Some(ScalarExpr::Literal(s)) => Ok(s),
        other => Err(err(format!("{} expects a string literal, found {:?}", function, other))),
    }
}

impl ScalarExpr {
    fn call(function: &str, mut args: Vec<ScalarExpr>) -> Result<Self, ClassifierError> {
        let upper = function.to_ascii_uppercase();
        match upper.as_str() {
            "UPPER" => {
                check_arity(&upper, &args, 1)?;
                Ok(ScalarExpr::Upper(Box::new(args.remove(0))))
            }
            "TRIM" => {
                check_arity(&upper, &args, 1)?;
                Ok(ScalarExpr::Trim(Box::new(args.remove(0))))
            }
            "COALESCE" => Ok(ScalarExpr::Coalesce(args)),
            "REGEXP_REPLACE" => {
                check_arity(&upper, &args, 3)?;
                let replacement = literal_arg(&upper, args.pop())?;
                if replacement.contains('\\') {
                    return Err(err("REGEXP_REPLACE backreferences are not supported"));
                }
                let pattern = CharPattern::parse(&literal_arg(&upper, args.pop())?)?;
                let text = args.remove(0);
                Ok(ScalarExpr::RegexpReplace(Box::new(text), pattern, replacement))
            }
            _ => Err(err(format!("unsupported function `{}`", function))),
        }
    }

    /// Evaluate with SQL NULL propagation.
    pub fn eval(&self, employer: Option<&str>, name: Option<&str>) -> Option<String> {
        match self {
            ScalarExpr::Param(Param::Employer) => employer.map(str::to_string),
            ScalarExpr::Param(Param::Name) => name.map(str::to_string),
            ScalarExpr::Literal(s) => Some(s.clone()),
            ScalarExpr::Null => None,
            ScalarExpr::Upper(inner) => inner.eval(employer, name).map(|s| s.to_uppercase()),
            ScalarExpr::Trim(inner) => inner.eval(employer, name).map(|s| s.trim().to_string()),
            ScalarExpr::Coalesce(args) => args.iter().find_map(|a| a.eval(employer, name)),
            ScalarExpr::RegexpReplace(inner, pattern, replacement) => inner
                .eval(employer, name)
                .map(|s| pattern.replace_all(&s, replacement)),
        }
    }
}

// ============================================================================
// REGEX
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ClassItem {
    Range(char, char),
    Space,
    Digit,
    WordChar,
}

impl ClassItem {
    fn matches(&self, c: char) -> bool {
        match self {
            ClassItem::Range(lo, hi) => (*lo..=*hi).contains(&c),
            ClassItem::Space => matches!(c, ' ' | '\t' | '\n' | '\x0C' | '\r'),
            ClassItem::Digit => c.is_ascii_digit(),
            ClassItem::WordChar => c.is_ascii_alphanumeric() || c == '_',
        }
    }
}

fn class_escape(c: char) -> ClassItem {
    match c {
        's' => ClassItem::Space,
        'd' => ClassItem::Digit,
        'w' => ClassItem::WordChar,
        other => ClassItem::Range(other, other),
    }
}

/// One regex atom (`.`, `\s`, a literal or a bracket class) with an
/// optional `+`. This is the only regex shape the renderer emits.
#[derive(Debug, Clone, PartialEq)]
pub struct CharPattern {
    any: bool,
    negated: bool,
    items: Vec<ClassItem>,
    repeat: bool,
}

impl CharPattern {
    pub fn parse(pattern: &str) -> Result<Self, ClassifierError> {
        let unsupported = || err(format!("unsupported regex `{}`", pattern));
        let chars: Vec<char> = pattern.chars().collect();

        let (mut parsed, mut i) = match chars.first() {
            Some('[') => Self::parse_class(&chars).ok_or_else(unsupported)?,
            Some('\\') => {
                let escaped = *chars.get(1).ok_or_else(unsupported)?;
                (Self::single(class_escape(escaped)), 2)
            }
            Some('.') => (
                CharPattern {
                    any: true,
                    negated: false,
                    items: Vec::new(),
                    repeat: false,
                },
                1,
            ),
            Some(&c) if !"+*?()|{}^$]".contains(c) => (Self::single(ClassItem::Range(c, c)), 1),
            _ => return Err(unsupported()),
        };

        if chars.get(i) == Some(&'+') {
            parsed.repeat = true;
            i += 1;
        }
        if i != chars.len() {
            return Err(unsupported());
        }
        Ok(parsed)
    }

    fn single(item: ClassItem) -> Self {
        CharPattern {
            any: false,
            negated: false,
            items: vec![item],
            repeat: false,
        }
    }

    /// `chars[0]` is `[`; returns the class and the index after `]`.
    fn parse_class(chars: &[char]) -> Option<(Self, usize)> {
        let mut i = 1;
        let negated = chars.get(i) == Some(&'^');
        if negated {
            i += 1;
        }

        let mut items = Vec::new();
        loop {
            let c = *chars.get(i)?;
            if c == ']' {
                break;
            }
            let lo = if c == '\\' {
                let escaped = *chars.get(i + 1)?;
                i += 2;
                match class_escape(escaped) {
                    ClassItem::Range(lo, _) => lo,
                    shorthand => {
                        items.push(shorthand);
                        continue;
                    }
                }
            } else {
                i += 1;
                c
            };

            match (chars.get(i), chars.get(i + 1)) {
                (Some('-'), Some(&hi)) if hi != ']' && hi != '\\' => {
                    if hi < lo {
                        return None;
                    }
                    items.push(ClassItem::Range(lo, hi));
                    i += 2;
                }
                _ => items.push(ClassItem::Range(lo, lo)),
            }
        }

        if items.is_empty() {
            return None;
        }
        Some((
            CharPattern {
                any: false,
                negated,
                items,
                repeat: false,
            },
            i + 1,
        ))
    }

    fn matches(&self, c: char) -> bool {
        if self.any {
            return c != '\n';
        }
        self.items.iter().any(|item| item.matches(c)) != self.negated
    }

    /// Replace every leftmost-longest match, like REGEXP_REPLACE.
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut in_match = false;
        for c in text.chars() {
            if self.matches(c) {
                if !(self.repeat && in_match) {
                    out.push_str(replacement);
                }
                in_match = true;
            } else {
                out.push(c);
                in_match = false;
            }
        }
        out
    }
}

// ============================================================================
// LIKE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum LikeToken {
    Many,
    One,
    Literal(char),
}

fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Many,
            '_' => LikeToken::One,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            other => LikeToken::Literal(other),
        });
    }
    tokens
}

/// SQL LIKE with `%`, `_` and backslash escapes. Case-sensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let tokens = like_tokens(pattern);
    let text: Vec<char> = text.chars().collect();

    let (mut ti, mut pi) = (0, 0);
    // (pattern index of last %, text index it is currently absorbing up to)
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < text.len() {
        match tokens.get(pi) {
            Some(LikeToken::Many) => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(LikeToken::One) => {
                ti += 1;
                pi += 1;
            }
            Some(LikeToken::Literal(c)) if *c == text[ti] => {
                ti += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    pi = star + 1;
                    ti = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }

    while matches!(tokens.get(pi), Some(LikeToken::Many)) {
        pi += 1;
    }
    pi == tokens.len()
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Position the parser just after the first CASE keyword in `text`.
    fn at_case(text: &str) -> Result<Self, ClassifierError> {
        let tokens = tokenize(text)?;
        let start = tokens
            .iter()
            .position(|t| matches!(t, Token::Word(w) if w.eq_ignore_ascii_case("CASE")))
            .ok_or_else(|| err("no CASE expression found"))?;

        Ok(Parser {
            tokens,
            pos: start + 1,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn peek_symbol(&self, symbol: char) -> bool {
        matches!(self.peek(), Some(Token::Symbol(c)) if *c == symbol)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ClassifierError> {
        match self.next() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(err(format!("expected {}, found {:?}", keyword, other))),
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), ClassifierError> {
        match self.next() {
            Some(Token::Symbol(c)) if c == symbol => Ok(()),
            other => Err(err(format!("expected `{}`, found {:?}", symbol, other))),
        }
    }

    fn string(&mut self) -> Result<String, ClassifierError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            other => Err(err(format!("expected string literal, found {:?}", other))),
        }
    }

    fn label(&mut self) -> Result<CategoryLabel, ClassifierError> {
        let text = self.string()?;
        CategoryLabel::from_label(&text).ok_or_else(|| err(format!("unknown category `{}`", text)))
    }

    fn case_expression(&mut self) -> Result<CaseExpression, ClassifierError> {
        let mut arms = Vec::new();
        while self.peek_keyword("WHEN") {
            self.pos += 1;
            let condition = self.condition()?;
            self.expect_keyword("THEN")?;
            arms.push((condition, self.label()?));
        }

        let default = if self.peek_keyword("ELSE") {
            self.pos += 1;
            self.label()?
        } else {
            CategoryLabel::Others
        };
        self.expect_keyword("END")?;

        Ok(CaseExpression { arms, default })
    }

    fn condition(&mut self) -> Result<Predicate, ClassifierError> {
        let mut parts = vec![self.conjunction()?];
        while self.peek_keyword("OR") {
            self.pos += 1;
            parts.push(self.conjunction()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::Or(parts) })
    }

    fn conjunction(&mut self) -> Result<Predicate, ClassifierError> {
        let mut parts = vec![self.primary()?];
        while self.peek_keyword("AND") {
            self.pos += 1;
            parts.push(self.primary()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Predicate::And(parts) })
    }

    fn primary(&mut self) -> Result<Predicate, ClassifierError> {
        match self.next() {
            Some(Token::Symbol('(')) => {
                let inner = self.condition()?;
                self.expect_symbol(')')?;
                Ok(inner)
            }
            Some(Token::Word(word)) => {
                let column =
                    Column::parse(&word).ok_or_else(|| err(format!("unknown column `{}`", word)))?;

                match self.next() {
                    Some(Token::Word(op)) if op.eq_ignore_ascii_case("LIKE") => {
                        Ok(Predicate::Like(column, self.string()?))
                    }
                    Some(Token::Word(op)) if op.eq_ignore_ascii_case("IN") => {
                        self.expect_symbol('(')?;
                        let mut values = vec![self.string()?];
                        while self.peek_symbol(',') {
                            self.pos += 1;
                            values.push(self.string()?);
                        }
                        self.expect_symbol(')')?;
                        Ok(Predicate::In(column, values))
                    }
                    Some(Token::Symbol('=')) => Ok(Predicate::Eq(column, self.string()?)),
                    other => Err(err(format!("expected LIKE, IN or =, found {:?}", other))),
                }
            }
            other => Err(err(format!("expected predicate, found {:?}", other))),
        }
    }

    fn scalar(&mut self) -> Result<ScalarExpr, ClassifierError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(ScalarExpr::Literal(s)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(ScalarExpr::Null),
            Some(Token::Word(w)) if self.peek_symbol('(') => {
                self.pos += 1;
                let mut args = vec![self.scalar()?];
                while self.peek_symbol(',') {
                    self.pos += 1;
                    args.push(self.scalar()?);
                }
                self.expect_symbol(')')?;
                ScalarExpr::call(&w, args)
            }
            Some(Token::Word(w)) => Param::parse(&w)
                .map(ScalarExpr::Param)
                .ok_or_else(|| err(format!("unknown parameter `{}`", w))),
            other => Err(err(format!("expected expression, found {:?}", other))),
        }
    }

    /// `FROM ( SELECT scalar AS column, ... )`
    fn projection(&mut self) -> Result<Vec<(Column, ScalarExpr)>, ClassifierError> {
        self.expect_keyword("FROM")?;
        self.expect_symbol('(')?;
        self.expect_keyword("SELECT")?;

        let mut columns = Vec::new();
        loop {
            let expr = self.scalar()?;
            self.expect_keyword("AS")?;
            let column = match self.next() {
                Some(Token::Word(w)) => {
                    Column::parse(&w).ok_or_else(|| err(format!("unknown column `{}`", w)))?
                }
                other => return Err(err(format!("expected column alias, found {:?}", other))),
            };
            columns.push((column, expr));

            if !self.peek_symbol(',') {
                break;
            }
            self.pos += 1;
        }
        self.expect_symbol(')')?;

        for column in Column::ALL {
            if !columns.iter().any(|(c, _)| *c == column) {
                return Err(err(format!("column {:?} is not projected", column)));
            }
        }
        Ok(columns)
    }
}

// ============================================================================
// CASE EXPRESSION
// ============================================================================

/// A parsed CASE/WHEN chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpression {
    pub arms: Vec<(Predicate, CategoryLabel)>,
    pub default: CategoryLabel,
}

impl CaseExpression {
    /// Parse the first CASE expression found in `text`.
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        Parser::at_case(text)?.case_expression()
    }

    /// Evaluate the chain for one pair, first matching arm wins.
    pub fn evaluate(&self, employer: Option<&str>, name: Option<&str>) -> CategoryLabel {
        let view = FieldView::new(employer, name);
        self.evaluate_row(&Row::from(&view))
    }

    pub fn evaluate_row(&self, row: &Row) -> CategoryLabel {
        self.arms
            .iter()
            .find(|(predicate, _)| predicate.eval(row))
            .map(|(_, label)| *label)
            .unwrap_or(self.default)
    }
}

// ============================================================================
// RULE FUNCTION
// ============================================================================

/// A parsed rule function: the CASE chain plus the projection deriving its
/// columns from the two arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFunction {
    pub case: CaseExpression,
    pub columns: Vec<(Column, ScalarExpr)>,
}

impl RuleFunction {
    pub fn parse(text: &str) -> Result<Self, ClassifierError> {
        let mut parser = Parser::at_case(text)?;
        let case = parser.case_expression()?;
        let columns = parser.projection()?;
        Ok(RuleFunction { case, columns })
    }

    /// Column values as the projection computes them.
    pub fn row(&self, employer: Option<&str>, name: Option<&str>) -> Row {
        let mut row = Row::default();
        for (column, expr) in &self.columns {
            *row.slot(*column) = expr.eval(employer, name);
        }
        row
    }

    pub fn evaluate(&self, employer: Option<&str>, name: Option<&str>) -> CategoryLabel {
        self.case.evaluate_row(&self.row(employer, name))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::rules::{MatchKind, PatternRule, RuleEngine, RuleScope, RuleSet, RuleTier};
    use crate::sql::{render_case, render_function, SqlTarget};
    use rand::rngs::StdRng;
    use rand::seq::IndexedRandom;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_like_match() {
        assert!(like_match("SMITH LAW LLC", "%LAW%"));
        assert!(!like_match("SMITH LLC", "%LAW%"));
        assert!(like_match("ABC", "A_C"));
        assert!(like_match("", "%%"));
        assert!(!like_match("", "%A%"));
        assert!(like_match("50% OFF", "%50\\%%"));
        assert!(!like_match("500 OFF", "%50\\%%"));
        assert!(like_match("A_B", "A\\_B"));
        assert!(!like_match("AXB", "A\\_B"));
        assert!(like_match("AAAB", "%AAB"));
    }

    #[test]
    fn test_parse_simple_case() {
        let sql = "SELECT CASE WHEN (emp LIKE '%LAW%' AND name = 'X') THEN 'Lawyer' \
                   WHEN emp_raw IN ('Dykema', 'O\\'Neil') THEN 'Developer' ELSE 'Others' END";
        let case = CaseExpression::parse(sql).unwrap();

        assert_eq!(case.arms.len(), 2);
        assert_eq!(case.evaluate(Some("Law Firm"), Some("x")), CategoryLabel::Lawyer);
        assert_eq!(case.evaluate(Some("Law Firm"), Some("y")), CategoryLabel::Others);
        assert_eq!(case.evaluate(Some("O'Neil"), None), CategoryLabel::Developer);
        assert_eq!(case.evaluate(None, None), CategoryLabel::Others);
    }

    #[test]
    fn test_parse_errors() {
        assert!(CaseExpression::parse("SELECT 1").is_err());
        assert!(CaseExpression::parse("CASE WHEN emp LIKE 'X' THEN 'Nope' END").is_err());
        assert!(CaseExpression::parse("CASE WHEN salary LIKE 'X' THEN 'Lawyer' END").is_err());
        assert!(CaseExpression::parse("CASE WHEN emp LIKE 'X THEN 'Lawyer' END").is_err());
    }

    #[test]
    fn test_char_pattern_subset() {
        let class = CharPattern::parse("[^A-Z0-9 &\\-.]").unwrap();
        assert_eq!(class.replace_all("AB-C.D&E", "_"), "AB-C.D&E");
        assert_eq!(class.replace_all("a,b;C", "_"), "____C");
        assert_eq!(CharPattern::parse("\\s+").unwrap().replace_all("A  \t B C", " "), "A B C");
        assert_eq!(CharPattern::parse("[a-c]").unwrap().replace_all("abcd", "X"), "XXXd");
        assert_eq!(CharPattern::parse("[a-c]+").unwrap().replace_all("abcdab", "X"), "XdX");

        assert!(CharPattern::parse("(a|b)").is_err());
        assert!(CharPattern::parse("ab").is_err());
        assert!(CharPattern::parse("a*").is_err());
        assert!(CharPattern::parse("[z-a]").is_err());
        assert!(CharPattern::parse("[abc").is_err());
    }

    #[test]
    fn test_scalar_null_propagation() {
        let sql = "CASE ELSE 'Others' END FROM (SELECT \
                   UPPER(ContributorsEmployer) AS emp, \
                   COALESCE(ContributorName, NULL, 'none') AS name, \
                   TRIM(ContributorsEmployer) AS emp_upper, \
                   ContributorsEmployer AS emp_raw)";
        let function = RuleFunction::parse(sql).unwrap();

        let row = function.row(None, None);
        assert_eq!(row.emp, None);
        assert_eq!(row.name.as_deref(), Some("none"));
        assert_eq!(row.emp_upper, None);
        assert_eq!(row.emp_raw, None);

        let row = function.row(Some(" acme "), Some("pat"));
        assert_eq!(row.emp.as_deref(), Some(" ACME "));
        assert_eq!(row.name.as_deref(), Some("pat"));
        assert_eq!(row.emp_upper.as_deref(), Some("acme"));
    }

    #[test]
    fn test_function_parse_errors() {
        // emp_raw missing from the projection
        assert!(RuleFunction::parse(
            "CASE ELSE 'Others' END FROM (SELECT ContributorsEmployer AS emp, \
             ContributorName AS name, ContributorsEmployer AS emp_upper)"
        )
        .is_err());
        assert!(RuleFunction::parse(
            "CASE ELSE 'Others' END FROM (SELECT LOWER(ContributorsEmployer) AS emp)"
        )
        .is_err());
        assert!(RuleFunction::parse(
            "CASE ELSE 'Others' END FROM (SELECT Salary AS emp)"
        )
        .is_err());
        assert!(RuleFunction::parse(
            "CASE ELSE 'Others' END FROM (SELECT REGEXP_REPLACE(ContributorName, r'a', r'\\1') AS emp)"
        )
        .is_err());
    }

    #[test]
    fn test_rendered_projection_matches_normalize() {
        let sql = render_function(&RuleEngine::builtin(), &SqlTarget::default());
        let function = RuleFunction::parse(&sql).unwrap();

        let mut inputs: Vec<String> = [
            "winthrop & weinstine",
            "a   b",
            "x,y;z",
            "  ",
            "",
            "Ünïcode Café",
            "tab\there",
            "smith-jones l.l.c.",
            "O'Brien & Sons, Inc.",
            "straße",
            "\u{3000}full width\u{3000}",
            "ﬁne ﬂow",
            "--..&&",
            "日本 Co",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let alphabet: Vec<char> = "aZ9 &-.,;'\t\né日ß_%\\/()".chars().collect();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let len = rng.random_range(0..16);
            inputs.push((0..len).filter_map(|_| alphabet.choose(&mut rng).copied()).collect());
        }

        for input in inputs.iter().map(String::as_str) {
            let row = function.row(Some(input), Some(input));
            let view = FieldView::new(Some(input), Some(input));
            assert_eq!(row.emp.as_deref(), Some(normalize(Some(input)).as_str()), "{:?}", input);
            assert_eq!(row.name.as_deref(), Some(view.name.as_str()), "{:?}", input);
            assert_eq!(row.emp_upper.as_deref(), Some(view.employer_upper.as_str()), "{:?}", input);
            assert_eq!(row.emp_raw.as_deref(), Some(input));
        }

        let row = function.row(None, None);
        assert_eq!(row.emp.as_deref(), Some(""));
        assert_eq!(row.name.as_deref(), Some(""));
        assert_eq!(row.emp_raw, None);
    }

    fn sample_inputs(engine: &RuleEngine, seed: u64, count: usize) -> Vec<(Option<String>, Option<String>)> {
        let mut fragments: Vec<String> = engine
            .rules()
            .iter()
            .flat_map(|r| r.patterns.iter().cloned())
            .collect();
        fragments.extend(
            [
                "", " ", "smith", "n/a", "Retired / Retired", "john", "café", "50%", "O'Brien",
                "a_b", "\\", "mn", "Law", "llc",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        let mut rng = StdRng::seed_from_u64(seed);
        let mut inputs = Vec::with_capacity(count);

        for _ in 0..count {
            let employer = if rng.random_bool(0.1) {
                None
            } else {
                let parts = rng.random_range(1..=3);
                let mut picked = Vec::with_capacity(parts);
                for _ in 0..parts {
                    let Some(fragment) = fragments.choose(&mut rng).cloned() else {
                        continue;
                    };
                    if rng.random_bool(0.5) {
                        picked.push(fragment.to_lowercase());
                    } else {
                        picked.push(fragment);
                    }
                }
                Some(picked.join(" "))
            };
            let name = if rng.random_bool(0.1) {
                None
            } else {
                fragments.choose(&mut rng).cloned()
            };
            inputs.push((employer, name));
        }

        inputs
    }

    #[test]
    fn test_generated_text_equivalent_to_engine() {
        let engine = RuleEngine::builtin();
        let sql = render_function(&engine, &SqlTarget::default());
        let function = RuleFunction::parse(&sql).unwrap();

        assert_eq!(function.case.arms.len(), engine.rule_count());

        for (employer, name) in sample_inputs(&engine, 42, 3000) {
            assert_eq!(
                function.evaluate(employer.as_deref(), name.as_deref()),
                engine.classify(employer.as_deref(), name.as_deref()),
                "employer={:?} name={:?}",
                employer,
                name
            );
        }
    }

    #[test]
    fn test_equivalence_with_metacharacter_patterns() {
        let set = RuleSet::builtin()
            .with_rule(PatternRule::new(
                "percent",
                RuleTier::EmployerOverride,
                RuleScope::Employer,
                MatchKind::Substring,
                &["50%"],
                CategoryLabel::Developer,
                500,
            ))
            .with_rule(PatternRule::new(
                "quote_raw",
                RuleTier::EmployerOverride,
                RuleScope::RawEmployer,
                MatchKind::Exact,
                &["O'Brien \\ Sons", "a_b"],
                CategoryLabel::Lawyer,
                400,
            ));
        let engine = RuleEngine::from_rule_set(set);
        let case = CaseExpression::parse(&render_case(&engine)).unwrap();

        for (employer, name) in [
            (Some("50% Off Shop"), Some("x")),
            (Some("500 Shop"), Some("x")),
            (Some("O'Brien \\ Sons"), None),
            (Some("a_b"), None),
            (Some("aXb"), None),
        ] {
            assert_eq!(case.evaluate(employer, name), engine.classify(employer, name));
        }
        assert_eq!(case.evaluate(Some("50% Off Shop"), None), CategoryLabel::Developer);
        assert_eq!(case.evaluate(Some("O'Brien \\ Sons"), None), CategoryLabel::Lawyer);
    }
}
