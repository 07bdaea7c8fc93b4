//! Accent-insensitive weighted search over in-memory records.
//!
//! Each configured field contributes up to its weight: the whole query found as a substring
//! scores the full weight, otherwise the fraction of query tokens found, otherwise (with fuzzy
//! matching on) half the weight scaled by edit-distance similarity when that similarity exceeds
//! [`FUZZY_CUTOFF`]. The sum is divided by the total weight so scores stay in `[0, 1]`.
//!
//! Cost is `records × fields × |query| × |field|` in the worst case, which is fine for the few
//! hundred customers or products a shop keeps loaded and nothing more.

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const FUZZY_CUTOFF: f64 = 0.6;

/// Lowercases, strips diacritics, maps `đ` to `d` and collapses whitespace.
pub fn normalize_text(input: &str) -> String {
    let folded: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c { 'đ' | 'Đ' => 'd', other => other })
        .flat_map(char::to_lowercase)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() { return b.len(); }
    if b.is_empty() { return a.len(); }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`; two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 { return 1.0; }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

type Accessor<T> = Box<dyn Fn(&T) -> Option<String> + Send + Sync>;
type Transform = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct SearchField<T> {
    name: &'static str,
    weight: f64,
    accessor: Accessor<T>,
    transform: Option<Transform>,
}

impl<T> SearchField<T> {
    pub fn new(name: &'static str, weight: f64, accessor: impl Fn(&T) -> Option<String> + Send + Sync + 'static) -> Self {
        Self { name, weight: weight.max(0.0), accessor: Box::new(accessor), transform: None }
    }

    /// Rewrites the raw field value before normalization, e.g. stripping phone punctuation.
    pub fn with_transform(mut self, transform: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn weight(&self) -> f64 { self.weight }

    fn normalized_value(&self, item: &T) -> Option<String> {
        let raw = (self.accessor)(item)?;
        let value = match &self.transform { Some(t) => t(&raw), None => raw };
        let normalized = normalize_text(&value);
        (!normalized.is_empty()).then_some(normalized)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    pub threshold: f64,
    pub fuzzy: bool,
}

impl Default for SearchOptions {
    fn default() -> Self { Self { threshold: DEFAULT_THRESHOLD, fuzzy: true } }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Tokens,
    Fuzzy,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldMatch {
    pub field: &'static str,
    pub kind: MatchKind,
    pub score: f64,
}

#[derive(Debug)]
pub struct SearchHit<'a, T> {
    pub item: &'a T,
    pub score: f64,
    pub matches: Vec<FieldMatch>,
}

pub struct SearchScorer<T> {
    fields: Vec<SearchField<T>>,
    options: SearchOptions,
}

impl<T> SearchScorer<T> {
    pub fn new(fields: Vec<SearchField<T>>, options: SearchOptions) -> Self { Self { fields, options } }

    pub fn options(&self) -> SearchOptions { self.options }

    /// Ranks `items` against `query`, best first. Ties keep input order.
    pub fn search<'a>(&self, items: &'a [T], query: &str) -> Vec<SearchHit<'a, T>> {
        let query = normalize_text(query);
        if query.is_empty() {
            return items.iter().map(|item| SearchHit { item, score: 1.0, matches: vec![] }).collect();
        }

        let tokens: Vec<&str> = query.split(' ').collect();
        let mut hits: Vec<SearchHit<'a, T>> = items
            .iter()
            .filter_map(|item| {
                let (score, matches) = self.score_item(item, &query, &tokens);
                (score >= self.options.threshold).then_some(SearchHit { item, score, matches })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits
    }

    fn score_item(&self, item: &T, query: &str, tokens: &[&str]) -> (f64, Vec<FieldMatch>) {
        let total_weight: f64 = self.fields.iter().map(|f| f.weight).sum();
        if total_weight <= 0.0 { return (0.0, vec![]); }

        let mut sum = 0.0;
        let mut matches = Vec::new();
        for field in &self.fields {
            let Some(value) = field.normalized_value(item) else { continue };
            if let Some((kind, score)) = self.score_field(field.weight, &value, query, tokens) {
                sum += score;
                matches.push(FieldMatch { field: field.name, kind, score });
            }
        }
        ((sum / total_weight).clamp(0.0, 1.0), matches)
    }

    fn score_field(&self, weight: f64, value: &str, query: &str, tokens: &[&str]) -> Option<(MatchKind, f64)> {
        if value.contains(query) {
            return Some((MatchKind::Exact, weight));
        }
        let found = tokens.iter().filter(|t| value.contains(**t)).count();
        if found > 0 {
            return Some((MatchKind::Tokens, weight * found as f64 / tokens.len() as f64));
        }
        if self.options.fuzzy {
            let sim = similarity(query, value);
            if sim > FUZZY_CUTOFF {
                return Some((MatchKind::Fuzzy, weight * 0.5 * sim));
            }
        }
        None
    }
}
