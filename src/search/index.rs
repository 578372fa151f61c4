//! Inverted index over the code, name and category of each food profile.
//!
//! Ranking is plain term overlap: a record scores the number of distinct query
//! terms found anywhere in its indexed fields, and every record tied for the
//! best score is returned.

use std::collections::HashMap;
use tracing::debug;

use crate::aggregate::FoodProfile;
use crate::search::tokenizer::{query_terms, tokenize};

/// Total occurrences of a name's leading segment after boosting.
pub const LEADING_SEGMENT_OCCURRENCES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: u32,
    pub term_frequency: u32,
}

/// Repeats the text up to and including the first comma so it occurs
/// [`LEADING_SEGMENT_OCCURRENCES`] times, e.g. `Kale, raw` becomes
/// `Kale, Kale, Kale, Kale, Kale, raw`.
pub fn boost_leading_segment(name: &str) -> String {
    match name.find(',') {
        Some(pos) if !name[..pos].trim().is_empty() => {
            let head = &name[..=pos];
            let mut boosted = String::with_capacity(name.len() + (head.len() + 1) * 4);
            for _ in 1..LEADING_SEGMENT_OCCURRENCES {
                boosted.push_str(head);
                boosted.push(' ');
            }
            boosted.push_str(name);
            boosted
        }
        _ => name.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct SearchIndex {
    records: Vec<FoodProfile>,
    by_code: HashMap<String, usize>,
    postings: HashMap<String, Vec<Posting>>,
}

/// Builds an index over `profiles`. Later duplicates of a code are dropped.
pub fn build_index(profiles: impl IntoIterator<Item = FoodProfile>) -> SearchIndex {
    let mut index = SearchIndex::default();
    for profile in profiles {
        index.add(profile);
    }
    debug!(records = index.len(), terms = index.postings.len(), "search index built");
    index
}

impl SearchIndex {
    fn add(&mut self, profile: FoodProfile) {
        if self.by_code.contains_key(&profile.code) {
            debug!(code = %profile.code, "duplicate food code, keeping first record");
            return;
        }
        let doc_id = self.records.len() as u32;

        let mut tf: HashMap<String, u32> = HashMap::new();
        // Codes are matched as one exact token.
        let code = profile.code.trim().to_lowercase();
        if !code.is_empty() {
            *tf.entry(code).or_insert(0) += 1;
        }
        for token in tokenize(&boost_leading_segment(&profile.name))
            .into_iter()
            .chain(tokenize(&profile.category))
        {
            *tf.entry(token).or_insert(0) += 1;
        }
        for (term, term_frequency) in tf {
            self.postings.entry(term).or_default().push(Posting {
                doc_id,
                term_frequency,
            });
        }

        self.by_code.insert(profile.code.clone(), self.records.len());
        self.records.push(profile);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FoodProfile] {
        &self.records
    }

    pub fn get(&self, code: &str) -> Option<&FoodProfile> {
        self.by_code.get(code).map(|&i| &self.records[i])
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct query terms each candidate matched.
    pub fn match_counts(&self, query: &str) -> HashMap<u32, usize> {
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for term in query_terms(query) {
            for posting in self.postings(&term) {
                *counts.entry(posting.doc_id).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Every record tied for the highest distinct-term match count, in index
    /// order. Empty when no query term occurs in the corpus.
    ///
    /// Tie membership depends on distinct-term counts only; posting term
    /// frequencies (and so the leading-segment boost) do not affect it.
    pub fn search(&self, query: &str) -> Vec<&FoodProfile> {
        let counts = self.match_counts(query);
        let Some(&best) = counts.values().max() else {
            return Vec::new();
        };
        let mut hits: Vec<u32> = counts
            .into_iter()
            .filter(|&(_, count)| count == best)
            .map(|(doc_id, _)| doc_id)
            .collect();
        hits.sort_unstable();
        debug!(query, best, hits = hits.len(), "search");
        hits.into_iter()
            .map(|doc_id| &self.records[doc_id as usize])
            .collect()
    }
}
