//! Text span vectorization.
//!
//! Every vectorizer maps `(text, flags)` spans to rows of a sparse
//! [`FeatureMatrix`]. The first `n_flags` columns hold one slot per known
//! flag; the remaining columns hold text features whose layout depends on
//! the variant:
//!
//! - [`HashingVectorizer`] (online): hashed word n-grams, no corpus needed.
//! - [`TfidfVectorizer`] (offline): TF-IDF over a corpus-fitted vocabulary.
//! - [`AttributeVectorizer`] (attribute): binary unigram presence over a
//!   corpus-fitted vocabulary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod attribute;
mod flags;
mod hashing;
mod matrix;
mod tfidf;
mod tokens;
mod vocabulary;

pub use attribute::AttributeVectorizer;
pub use flags::FlagVocabulary;
pub use hashing::HashingVectorizer;
pub use matrix::{FeatureMatrix, sparse_dot, squared_norm};
pub use tfidf::TfidfVectorizer;
pub use tokens::{ngrams, tokenize};

/// A short text span with its per-sample flags, as supplied upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl TextSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            flags: Vec::new(),
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

/// Which vocabulary strategy a vectorizer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorizerKind {
    Hashing,
    Tfidf,
    Attribute,
}

/// Errors raised while fitting or applying a vectorizer.
#[derive(Debug, Error)]
pub enum VectorizerError {
    #[error("{kind:?} vectorizer for tag {tag} used before it was fitted")]
    NotFitted { kind: VectorizerKind, tag: String },
    #[error("Invalid flag vocabulary: {0}")]
    InvalidFlag(String),
    #[error("{kind:?} vectorizer does not support {operation}")]
    Unsupported {
        kind: VectorizerKind,
        operation: &'static str,
    },
    #[error("Cannot fit a vocabulary from an empty corpus")]
    EmptyCorpus,
    #[error("Vectorizer state codec failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Capability set shared by all vectorizer variants.
pub trait FeatureVectorizer: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> VectorizerKind;

    /// Assign a fixed column to each known flag.
    fn fit_flags(&mut self, vocabulary: &FlagVocabulary);

    /// Rebuild the text vocabulary from a corpus.
    ///
    /// Only corpus-backed variants support this; it must run before every
    /// batch retrain.
    fn fit_corpus(&mut self, corpus: &[TextSpan]) -> Result<(), VectorizerError> {
        let _ = corpus;
        Err(VectorizerError::Unsupported {
            kind: self.kind(),
            operation: "corpus fitting",
        })
    }

    /// Whether [`FeatureVectorizer::transform`] can run.
    fn is_fitted(&self) -> bool;

    /// Total column count of produced matrices.
    fn n_features(&self) -> usize;

    /// One row per span; identical input always yields identical rows.
    fn transform(&self, tag: &str, spans: &[TextSpan]) -> Result<FeatureMatrix, VectorizerError>;

    /// Serialize fitted state for the model store.
    fn to_bytes(&self) -> Result<Vec<u8>, VectorizerError>;

    /// Restore fitted state produced by [`FeatureVectorizer::to_bytes`].
    fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), VectorizerError>;
}
