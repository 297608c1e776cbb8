use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{TextSpan, VectorizerError, ngrams, tokenize};

/// Term -> column mapping fitted from a corpus, with document frequencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct CorpusVocabulary {
    pub(super) ngram_max: usize,
    /// Terms in column order (lexicographic).
    pub(super) terms: Vec<String>,
    /// Document frequency per column.
    pub(super) document_frequency: Vec<usize>,
    pub(super) n_documents: usize,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

impl CorpusVocabulary {
    /// Keep terms seen in at least `min_df` documents; cap at `max_features`
    /// by total occurrence count, ties broken lexicographically.
    pub(super) fn fit(
        corpus: &[TextSpan],
        ngram_max: usize,
        min_df: usize,
        max_features: usize,
    ) -> Result<Self, VectorizerError> {
        if corpus.is_empty() {
            return Err(VectorizerError::EmptyCorpus);
        }
        let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
        let mut documents: BTreeMap<String, usize> = BTreeMap::new();
        for span in corpus {
            let terms = ngrams(&tokenize(&span.text), ngram_max);
            let unique: BTreeSet<&String> = terms.iter().collect();
            for term in unique {
                *documents.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *occurrences.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = occurrences
            .into_iter()
            .filter(|(term, _)| documents.get(term).copied().unwrap_or(0) >= min_df.max(1))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_features);
        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let document_frequency = terms
            .iter()
            .map(|term| documents.get(term).copied().unwrap_or(0))
            .collect();
        let mut vocabulary = Self {
            ngram_max,
            terms,
            document_frequency,
            n_documents: corpus.len(),
            index: BTreeMap::new(),
        };
        vocabulary.rebuild_index();
        Ok(vocabulary)
    }

    /// Restore the lookup table after deserialization.
    pub(super) fn rebuild_index(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(column, term)| (term.clone(), column))
            .collect();
    }

    pub(super) fn len(&self) -> usize {
        self.terms.len()
    }

    /// Per-column counts of in-vocabulary terms for one text.
    pub(super) fn term_counts(&self, text: &str) -> BTreeMap<usize, f32> {
        let mut counts = BTreeMap::new();
        for term in ngrams(&tokenize(text), self.ngram_max) {
            if let Some(&column) = self.index.get(&term) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }
        counts
    }

    /// Smoothed inverse document frequency of a column.
    pub(super) fn idf(&self, column: usize) -> f32 {
        let df = self.document_frequency.get(column).copied().unwrap_or(0) as f32;
        let n = self.n_documents as f32;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<TextSpan> {
        vec![
            TextSpan::new("shall indemnify the buyer"),
            TextSpan::new("shall pay the seller"),
            TextSpan::new("the seller shall indemnify"),
        ]
    }

    #[test]
    fn columns_are_sorted_terms() {
        let vocab = CorpusVocabulary::fit(&corpus(), 1, 1, 100).unwrap();
        assert_eq!(
            vocab.terms,
            vec!["buyer", "indemnify", "pay", "seller", "shall", "the"]
        );
        assert_eq!(vocab.document_frequency, vec![1, 2, 1, 2, 3, 3]);
    }

    #[test]
    fn min_df_and_max_features_limit_vocabulary() {
        let vocab = CorpusVocabulary::fit(&corpus(), 1, 2, 3).unwrap();
        assert_eq!(vocab.terms, vec!["indemnify", "shall", "the"]);
    }

    #[test]
    fn empty_corpus_is_rejected() {
        assert!(matches!(
            CorpusVocabulary::fit(&[], 1, 1, 10),
            Err(VectorizerError::EmptyCorpus)
        ));
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let vocab = CorpusVocabulary::fit(&corpus(), 1, 1, 100).unwrap();
        let buyer = vocab.idf(0);
        let shall = vocab.idf(4);
        assert!(buyer > shall);
        assert!((shall - 1.0).abs() < 1e-6);
    }
}
