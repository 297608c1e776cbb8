//! Linear classifiers behind a single capability trait.
//!
//! Two implementations ship: [`PassiveAggressive`] supports incremental
//! updates and backs online learners; [`LogisticRegression`] is batch-only
//! and backs pretrained learners and attributes. Only numeric parameters
//! ([`LinearParams`]) are ever persisted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vectorizer::FeatureMatrix;

mod linear;
pub mod logreg;
mod passive_aggressive;

pub use linear::{LinearModel, LinearParams};
pub use logreg::LogisticRegression;
pub use passive_aggressive::PassiveAggressive;

/// Class names used by boolean tag learners; index 1 is the positive class.
pub const BINARY_CLASSES: [&str; 2] = ["false", "true"];

/// Convenience constructor for [`BINARY_CLASSES`].
pub fn binary_classes() -> Vec<String> {
    BINARY_CLASSES.iter().map(|class| (*class).to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierKind {
    PassiveAggressive,
    LogisticRegression,
}

/// Errors raised by linear classifiers.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("{0:?} does not support incremental training")]
    IncrementalUnsupported(ClassifierKind),
    #[error("Classifier has not been trained")]
    NotFitted,
    #[error("Feature width {actual} does not match model width {expected}")]
    Shape { expected: usize, actual: usize },
    #[error("Training set is empty")]
    EmptyTrainingSet,
    #[error("Got {labels} labels for {rows} rows")]
    LabelCount { rows: usize, labels: usize },
    #[error("Label index {0} is outside the class list")]
    UnknownClass(usize),
    #[error("At least two classes are required, got {0}")]
    TooFewClasses(usize),
    #[error("Stored classes {stored:?} do not match expected {expected:?}")]
    ClassMismatch {
        stored: Vec<String>,
        expected: Vec<String>,
    },
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

/// Capability set shared by every classifier kind.
///
/// Labels are indices into [`LinearClassifier::classes`].
pub trait LinearClassifier: std::fmt::Debug + Send + Sync {
    fn kind(&self) -> ClassifierKind;

    fn classes(&self) -> &[String];

    /// Train from scratch, replacing any previous parameters.
    fn fit(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError>;

    /// Update the current parameters with one pass over `x`.
    fn partial_fit(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError> {
        let _ = (x, y);
        Err(ClassifierError::IncrementalUnsupported(self.kind()))
    }

    /// Forget learned parameters.
    fn clear(&mut self);

    fn model(&self) -> Option<&LinearModel>;

    fn is_fitted(&self) -> bool {
        self.model().is_some()
    }

    /// Signed distance to the boundary; positive favours class 1. Binary only.
    fn decision_function(&self, x: &FeatureMatrix) -> Result<Vec<f32>, ClassifierError> {
        self.model()
            .ok_or(ClassifierError::NotFitted)?
            .decision_function(x)
    }

    /// Predicted class index per row.
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<usize>, ClassifierError> {
        self.model().ok_or(ClassifierError::NotFitted)?.predict(x)
    }

    fn params(&self) -> Option<LinearParams> {
        self.model().map(LinearModel::to_params)
    }

    /// Replace parameters with previously saved ones.
    fn load_params(&mut self, params: LinearParams) -> Result<(), ClassifierError>;
}

pub(crate) fn check_labels(
    x: &FeatureMatrix,
    y: &[usize],
    n_classes: usize,
) -> Result<(), ClassifierError> {
    if x.n_rows() != y.len() {
        return Err(ClassifierError::LabelCount {
            rows: x.n_rows(),
            labels: y.len(),
        });
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
        return Err(ClassifierError::UnknownClass(bad));
    }
    Ok(())
}
