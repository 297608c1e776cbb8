use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::matrix::l2_normalize_from;
use super::vocabulary::CorpusVocabulary;
use super::{
    FeatureMatrix, FeatureVectorizer, FlagVocabulary, TextSpan, VectorizerError, VectorizerKind,
};

/// Offline vectorizer: TF-IDF weights over a vocabulary fitted from the
/// full training corpus of a pretrained learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    ngram_max: usize,
    min_df: usize,
    max_features: usize,
    flags: Option<FlagVocabulary>,
    vocabulary: Option<CorpusVocabulary>,
}

impl TfidfVectorizer {
    pub fn new(ngram_max: usize, min_df: usize, max_features: usize) -> Self {
        Self {
            ngram_max: ngram_max.max(1),
            min_df: min_df.max(1),
            max_features: max_features.max(1),
            flags: None,
            vocabulary: None,
        }
    }

    /// Number of text terms in the fitted vocabulary.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.as_ref().map_or(0, CorpusVocabulary::len)
    }
}

impl FeatureVectorizer for TfidfVectorizer {
    fn kind(&self) -> VectorizerKind {
        VectorizerKind::Tfidf
    }

    fn fit_flags(&mut self, vocabulary: &FlagVocabulary) {
        self.flags = Some(vocabulary.clone());
    }

    fn fit_corpus(&mut self, corpus: &[TextSpan]) -> Result<(), VectorizerError> {
        let vocabulary =
            CorpusVocabulary::fit(corpus, self.ngram_max, self.min_df, self.max_features)?;
        tracing::debug!(
            "Fitted TF-IDF vocabulary with {} terms from {} documents",
            vocabulary.len(),
            corpus.len()
        );
        self.vocabulary = Some(vocabulary);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.flags.is_some() && self.vocabulary.is_some()
    }

    fn n_features(&self) -> usize {
        self.flags.as_ref().map_or(0, FlagVocabulary::len) + self.vocabulary_len()
    }

    fn transform(&self, tag: &str, spans: &[TextSpan]) -> Result<FeatureMatrix, VectorizerError> {
        let (Some(flags), Some(vocabulary)) = (self.flags.as_ref(), self.vocabulary.as_ref())
        else {
            return Err(VectorizerError::NotFitted {
                kind: self.kind(),
                tag: tag.to_string(),
            });
        };
        let offset = flags.len();
        let rows: Vec<BTreeMap<usize, f32>> = spans
            .iter()
            .map(|span| {
                let mut row: BTreeMap<usize, f32> = flags
                    .slots_for(&span.flags)
                    .into_iter()
                    .map(|slot| (slot, 1.0))
                    .collect();
                for (column, count) in vocabulary.term_counts(&span.text) {
                    row.insert(offset + column, count * vocabulary.idf(column));
                }
                l2_normalize_from(&mut row, offset);
                row
            })
            .collect();
        Ok(FeatureMatrix::from_rows(self.n_features(), &rows))
    }

    fn to_bytes(&self) -> Result<Vec<u8>, VectorizerError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), VectorizerError> {
        let mut restored: Self = serde_json::from_slice(bytes)?;
        if let Some(vocabulary) = restored.vocabulary.as_mut() {
            vocabulary.rebuild_index();
        }
        *self = restored;
        Ok(())
    }
}
