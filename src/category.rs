// 🏷️ Contributor Categories - closed enumeration
//
// Every classification call resolves to exactly one of these labels.
// `Others` is the fallback and the default for anything unrecognized.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// CATEGORY LABEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CategoryLabel {
    Lawyer,
    Developer,
    BusinessOwner,
    Individual,
    Association,
    Others,
}

impl CategoryLabel {
    /// All labels, in the fixed order used for model class indices.
    pub const ALL: [CategoryLabel; 6] = [
        CategoryLabel::Lawyer,
        CategoryLabel::Developer,
        CategoryLabel::BusinessOwner,
        CategoryLabel::Individual,
        CategoryLabel::Association,
        CategoryLabel::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryLabel::Lawyer => "Lawyer",
            CategoryLabel::Developer => "Developer",
            CategoryLabel::BusinessOwner => "BusinessOwner",
            CategoryLabel::Individual => "Individual",
            CategoryLabel::Association => "Association",
            CategoryLabel::Others => "Others",
        }
    }

    /// Position in `ALL`.
    pub fn index(&self) -> usize {
        match self {
            CategoryLabel::Lawyer => 0,
            CategoryLabel::Developer => 1,
            CategoryLabel::BusinessOwner => 2,
            CategoryLabel::Individual => 3,
            CategoryLabel::Association => 4,
            CategoryLabel::Others => 5,
        }
    }

    pub fn from_index(index: usize) -> Option<CategoryLabel> {
        CategoryLabel::ALL.get(index).copied()
    }

    /// Parse a label, including merged and retired aliases.
    ///
    /// Matching is case-insensitive and ignores spaces, dashes and
    /// underscores, so "Business Owner" and "business_owner" both resolve.
    /// The retired "Pohlad family" category was merged into BusinessOwner.
    pub fn from_label(label: &str) -> Option<CategoryLabel> {
        let key: String = label
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(|c| c.to_lowercase())
            .collect();

        match key.as_str() {
            "lawyer" | "attorney" => Some(CategoryLabel::Lawyer),
            "developer" => Some(CategoryLabel::Developer),
            "businessowner" | "pohladfamily" | "pohlad" => Some(CategoryLabel::BusinessOwner),
            "individual" => Some(CategoryLabel::Individual),
            "association" => Some(CategoryLabel::Association),
            "others" | "other" => Some(CategoryLabel::Others),
            _ => None,
        }
    }

    /// Parse a label, degrading to `Others` for unknown or blank input.
    pub fn parse_or_default(label: Option<&str>) -> CategoryLabel {
        label
            .and_then(CategoryLabel::from_label)
            .unwrap_or_default()
    }
}

impl Default for CategoryLabel {
    fn default() -> Self {
        CategoryLabel::Others
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
