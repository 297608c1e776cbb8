//! Learner records, their persistence, and the per-tag ensemble.

use thiserror::Error;

mod attribute;
pub mod db;
pub mod entity;
mod fusion;
mod slot;
mod tag_learner;

pub use attribute::AttributeModel;
pub use db::{LearnerDb, LearnerDbError, OnlineQuery};
pub use entity::{
    LearnerAttribute, LearnerId, LearnerState, OnlineLearner, PretrainedLearner, Sample,
};
pub use fusion::{FusionPolicy, OFFLINE_WEIGHT, ONLINE_WEIGHT, StaticWeights};
pub use slot::ModelSlot;
pub use tag_learner::TagLearner;

use crate::ml::ClassifierError;
use crate::store::StoreError;
use crate::vectorizer::VectorizerError;

/// Errors raised while training, scoring or persisting learner models.
#[derive(Debug, Error)]
pub enum LearnerError {
    /// The online model was expected in the store but is absent.
    #[error("No stored model at {0}")]
    ModelNotFound(String),
    #[error("Stored model at {key} is unusable: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Vectorizer(#[from] VectorizerError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
