use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::matrix::l2_normalize_from;
use super::{
    FeatureMatrix, FeatureVectorizer, FlagVocabulary, TextSpan, VectorizerError, VectorizerKind,
    ngrams, tokenize,
};

/// Online vectorizer: word n-grams hashed into a fixed number of buckets.
///
/// The text block never depends on a corpus, so unseen vocabulary at predict
/// time maps into the same space the model was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashingVectorizer {
    hash_bits: u32,
    ngram_max: usize,
    flags: Option<FlagVocabulary>,
}

impl HashingVectorizer {
    pub fn new(hash_bits: u32, ngram_max: usize) -> Self {
        Self {
            hash_bits,
            ngram_max: ngram_max.max(1),
            flags: None,
        }
    }

    fn buckets(&self) -> usize {
        1usize << self.hash_bits
    }

    fn n_flags(&self) -> usize {
        self.flags.as_ref().map_or(0, FlagVocabulary::len)
    }

    /// Bucket index and sign for a term.
    fn bucket(&self, term: &str) -> (usize, f32) {
        let digest = blake3::hash(term.as_bytes());
        let bytes = digest.as_bytes();
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        let index = (u64::from_le_bytes(head) as usize) & (self.buckets() - 1);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl FeatureVectorizer for HashingVectorizer {
    fn kind(&self) -> VectorizerKind {
        VectorizerKind::Hashing
    }

    fn fit_flags(&mut self, vocabulary: &FlagVocabulary) {
        self.flags = Some(vocabulary.clone());
    }

    fn is_fitted(&self) -> bool {
        self.flags.is_some()
    }

    fn n_features(&self) -> usize {
        self.n_flags() + self.buckets()
    }

    fn transform(&self, tag: &str, spans: &[TextSpan]) -> Result<FeatureMatrix, VectorizerError> {
        let Some(flags) = self.flags.as_ref() else {
            return Err(VectorizerError::NotFitted {
                kind: self.kind(),
                tag: tag.to_string(),
            });
        };
        let offset = flags.len();
        let rows: Vec<BTreeMap<usize, f32>> = spans
            .iter()
            .map(|span| {
                let mut row = BTreeMap::new();
                for slot in flags.slots_for(&span.flags) {
                    row.insert(slot, 1.0);
                }
                for term in ngrams(&tokenize(&span.text), self.ngram_max) {
                    let (index, sign) = self.bucket(&term);
                    *row.entry(offset + index).or_insert(0.0) += sign;
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
        *self = serde_json::from_slice(bytes)?;
        Ok(())
    }
}
