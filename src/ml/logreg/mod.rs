//! Batch logistic regression over sparse span features.

use super::{
    ClassifierError, ClassifierKind, LinearClassifier, LinearModel, LinearParams, check_labels,
};
use crate::vectorizer::FeatureMatrix;

mod train;
pub use train::{TrainOptions, train_logreg};

/// Logistic regression trained in one shot with mini-batch gradient descent.
///
/// Sigmoid loss for two classes, softmax otherwise. Incremental updates are
/// not supported; every [`LinearClassifier::fit`] replaces the model.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    classes: Vec<String>,
    options: TrainOptions,
    model: Option<LinearModel>,
}

impl LogisticRegression {
    pub fn new(classes: Vec<String>, options: TrainOptions) -> Self {
        Self {
            classes,
            options,
            model: None,
        }
    }
}

impl LinearClassifier for LogisticRegression {
    fn kind(&self) -> ClassifierKind {
        ClassifierKind::LogisticRegression
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn fit(&mut self, x: &FeatureMatrix, y: &[usize]) -> Result<(), ClassifierError> {
        check_labels(x, y, self.classes.len())?;
        self.model = Some(train_logreg(&self.classes, x, y, &self.options)?);
        Ok(())
    }

    fn clear(&mut self) {
        self.model = None;
    }

    fn model(&self) -> Option<&LinearModel> {
        self.model.as_ref()
    }

    fn load_params(&mut self, params: LinearParams) -> Result<(), ClassifierError> {
        if params.classes != self.classes {
            return Err(ClassifierError::ClassMismatch {
                stored: params.classes,
                expected: self.classes.clone(),
            });
        }
        self.model = Some(LinearModel::from_params(params)?);
        Ok(())
    }
}
