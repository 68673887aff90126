use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// English stop words, sorted for binary search.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are", "aren't", "as", "at",
    "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "can't", "cannot", "could", "couldn't",
    "did", "didn't", "do", "does", "doesn't", "doing", "don't", "down", "during",
    "each", "few", "for", "from", "further",
    "had", "hadn't", "has", "hasn't", "have", "haven't", "having", "he", "he'd", "he'll", "he's", "her", "here",
    "here's", "hers", "herself", "him", "himself", "his", "how", "how's",
    "i", "i'd", "i'll", "i'm", "i've", "if", "in", "into", "is", "isn't", "it", "it's", "its", "itself",
    "let's", "me", "more", "most", "mustn't", "my", "myself",
    "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other", "ought", "our", "ours", "ourselves", "out",
    "over", "own",
    "same", "she", "she'd", "she'll", "she's", "should", "shouldn't", "so", "some", "such",
    "than", "that", "that's", "the", "their", "theirs", "them", "themselves", "then", "there", "there's", "these",
    "they", "they'd", "they'll", "they're", "they've", "this", "those", "through", "to", "too",
    "under", "until", "up", "very",
    "was", "wasn't", "we", "we'd", "we'll", "we're", "we've", "were", "weren't", "what", "what's", "when", "when's",
    "where", "where's", "which", "while", "who", "who's", "whom", "why", "why's", "with", "won't", "would", "wouldn't",
    "you", "you'd", "you'll", "you're", "you've", "your", "yours", "yourself", "yourselves",
];

/// A weighted keyword extracted from a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub word: String,
    pub weight: f64,
}

impl Keyword {
    pub fn new(word: impl Into<String>, weight: f64) -> Self {
        Self { word: word.into(), weight }
    }
}

#[derive(Debug, Error)]
#[error("tokenizer failed: {0}")]
pub struct TokenizeError(pub String);

/// Maps text to an ordered list of weighted keywords.
///
/// Empty or unparseable input is not an error: implementations return an
/// empty list. `Err` is reserved for the extractor itself breaking down.
pub trait Tokenizer: Send + Sync {
    fn keywords(&self, text: &str) -> Result<Vec<Keyword>, TokenizeError>;
}

/// Splits on whitespace, one keyword of weight 1.0 per distinct token.
/// No case folding or normalization is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn keywords(&self, text: &str) -> Result<Vec<Keyword>, TokenizeError> {
        let mut seen = HashSet::new();
        Ok(text
            .split_whitespace()
            .filter(|t| seen.insert(*t))
            .map(|t| Keyword::new(t, 1.0))
            .collect())
    }
}

/// Keyword extraction with NFKC normalization, lowercasing, stopword removal
/// and English stemming. Each distinct stem is weighted `1 + ln(tf)`.
#[derive(Debug, Default, Clone)]
pub struct KeywordExtractor {
    /// Keep only the `top_k` heaviest keywords; `None` keeps all of them.
    pub top_k: Option<usize>,
}

impl KeywordExtractor {
    pub fn new() -> Self { Self::default() }

    pub fn with_top_k(top_k: usize) -> Self { Self { top_k: Some(top_k) } }
}

impl Tokenizer for KeywordExtractor {
    fn keywords(&self, text: &str) -> Result<Vec<Keyword>, TokenizeError> {
        // stem -> (tf, first position)
        let mut counts: HashMap<String, (u32, usize)> = HashMap::new();
        for (term, pos) in tokenize(text) {
            counts.entry(term).or_insert((0, pos)).0 += 1;
        }
        let mut ranked: Vec<(String, f64, usize)> = counts
            .into_iter()
            .map(|(term, (tf, first))| (term, 1.0 + (tf as f64).ln(), first))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.2.cmp(&b.2))
        });
        if let Some(k) = self.top_k {
            ranked.truncate(k);
        }
        Ok(ranked.into_iter().map(|(word, weight, _)| Keyword { word, weight }).collect())
    }
}

fn is_stopword(word: &str) -> bool { STOPWORDS.binary_search(&word).is_ok() }

/// Stemmed terms of `text` with the index of the word they came from.
/// Stop words are dropped but still count toward positions.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let folded = text.nfkc().collect::<String>().to_lowercase();
    WORD.find_iter(&folded)
        .enumerate()
        .filter(|(_, m)| !is_stopword(m.as_str()))
        .map(|(pos, m)| (STEMMER.stem(m.as_str()).into_owned(), pos))
        .collect()
}
