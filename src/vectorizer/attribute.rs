use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::matrix::l2_normalize_from;
use super::vocabulary::CorpusVocabulary;
use super::{
    FeatureMatrix, FeatureVectorizer, FlagVocabulary, TextSpan, VectorizerError, VectorizerKind,
};

/// Attribute vectorizer: binary unigram presence over a corpus-fitted vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeVectorizer {
    min_df: usize,
    flags: Option<FlagVocabulary>,
    vocabulary: Option<CorpusVocabulary>,
}

impl AttributeVectorizer {
    pub fn new(min_df: usize) -> Self {
        Self {
            min_df: min_df.max(1),
            flags: None,
            vocabulary: None,
        }
    }
}

impl FeatureVectorizer for AttributeVectorizer {
    fn kind(&self) -> VectorizerKind {
        VectorizerKind::Attribute
    }

    fn fit_flags(&mut self, vocabulary: &FlagVocabulary) {
        self.flags = Some(vocabulary.clone());
    }

    fn fit_corpus(&mut self, corpus: &[TextSpan]) -> Result<(), VectorizerError> {
        self.vocabulary = Some(CorpusVocabulary::fit(corpus, 1, self.min_df, usize::MAX)?);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.flags.is_some() && self.vocabulary.is_some()
    }

    fn n_features(&self) -> usize {
        self.flags.as_ref().map_or(0, FlagVocabulary::len)
            + self.vocabulary.as_ref().map_or(0, CorpusVocabulary::len)
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
                row.extend(
                    vocabulary
                        .term_counts(&span.text)
                        .into_keys()
                        .map(|column| (offset + column, 1.0)),
                );
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
