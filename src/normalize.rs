// 🧹 Text Normalizer - canonical form for employer and name fields
//
// `normalize` is the hot-path form the rule engine matches against.
// `clean_text` additionally expands abbreviations and is only used by
// reporting (grouping employers), never by the rule engine.

/// Whole-word abbreviation expansions applied by `expand_abbreviations`.
pub const ABBREVIATIONS: [(&str, &str); 8] = [
    ("CORP", "CORPORATION"),
    ("INC", "INCORPORATED"),
    ("LLC", "LIMITED LIABILITY COMPANY"),
    ("LLP", "LIMITED LIABILITY PARTNERSHIP"),
    ("CO", "COMPANY"),
    ("ASSOC", "ASSOCIATION"),
    ("DEPT", "DEPARTMENT"),
    ("UNIV", "UNIVERSITY"),
];

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '&' | '-' | '.')
}

/// Canonicalize free text.
///
/// Upper-cases, replaces every character outside `[A-Z0-9 &-.]` with a space,
/// collapses whitespace runs and trims. `None` and blank input give `""`.
/// Idempotent: the output alphabet is closed under this function.
pub fn normalize(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };

    let replaced: String = text
        .to_uppercase()
        .chars()
        .map(|c| if is_kept(c) { c } else { ' ' })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Expand known abbreviations as whole words.
///
/// A word is a maximal run of ASCII alphanumerics, so "CO." expands to
/// "COMPANY." while "COMPANY" and "CORPS" are left alone.
pub fn expand_abbreviations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        match ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == word.as_str()) {
            Some((_, full)) => out.push_str(full),
            None => out.push_str(word),
        }
        word.clear();
    };

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);

    out
}

/// Normalize then expand abbreviations (text-quality tooling).
pub fn clean_text(text: Option<&str>) -> String {
    expand_abbreviations(&normalize(text))
}

// ============================================================================
// TESTS
// ============================================================================
