// TF-IDF vectorizer over word n-grams
//
// Tokens are lowercase runs of word characters (alphanumeric or `_`) of at
// least two characters. N-grams are built after stop-word removal. IDF is
// smoothed (`ln((1 + n) / (1 + df)) + 1`) and rows are L2-normalized.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Common English function words dropped before n-gram construction.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for",
    "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to", "too",
    "under", "until", "up", "very", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "why", "will", "with", "would", "you", "your", "yours", "yourself",
    "yourselves",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    pub max_features: usize,
    pub min_df: usize,
    pub ngram_range: (usize, usize),
    pub stop_words: bool,
}

impl Default for VectorizerParams {
    fn default() -> Self {
        VectorizerParams {
            max_features: 1000,
            min_df: 2,
            ngram_range: (1, 2),
            stop_words: true,
        }
    }
}

/// Fitted vocabulary and IDF weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    params: VectorizerParams,
    /// term → column, columns assigned in alphabetical term order
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

fn tokenize(text: &str, stop_words: bool) -> Vec<String> {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() >= 2)
        .filter(|t| !stop_words || !ENGLISH_STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

fn ngrams(tokens: &[String], (min_n, max_n): (usize, usize)) -> Vec<String> {
    let mut out = Vec::new();
    for n in min_n.max(1)..=max_n {
        if n > tokens.len() {
            break;
        }
        for window in tokens.windows(n) {
            out.push(window.join(" "));
        }
    }
    out
}

impl TfidfVectorizer {
    /// Terms of one document, in order, duplicates kept.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        ngrams(&tokenize(text, self.params.stop_words), self.params.ngram_range)
    }

    /// Learn vocabulary and IDF from a corpus.
    ///
    /// Terms appearing in fewer than `min_df` documents are dropped. If more
    /// than `max_features` remain, the most frequent across the corpus are
    /// kept (ties broken alphabetically).
    pub fn fit(documents: &[String], params: VectorizerParams) -> Self {
        let mut unfitted = TfidfVectorizer {
            params,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        };

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = unfitted.analyze(doc);
            let mut seen = HashSet::new();
            for term in terms {
                *term_freq.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        let min_df = unfitted.params.min_df.max(1);
        let mut candidates: Vec<(&String, usize)> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= min_df)
            .map(|(term, _)| (term, term_freq.get(term).copied().unwrap_or(0)))
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        candidates.truncate(unfitted.params.max_features);

        let kept: BTreeMap<String, usize> = candidates
            .iter()
            .map(|(term, _)| ((*term).clone(), 0))
            .collect();
        unfitted.vocabulary = kept
            .into_keys()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect();

        let n = documents.len() as f64;
        let mut idf = vec![0.0; unfitted.vocabulary.len()];
        for (term, &col) in &unfitted.vocabulary {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf[col] = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
        }
        unfitted.idf = idf;

        unfitted
    }

    /// Dense L2-normalized TF-IDF row for one document. Unknown terms are
    /// ignored; a document with no known terms is the zero vector.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.vocabulary.len()];
        for term in self.analyze(text) {
            if let Some(&col) = self.vocabulary.get(&term) {
                row[col] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in row.iter_mut() {
                *value /= norm;
            }
        }
        row
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn column_of(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }
}
