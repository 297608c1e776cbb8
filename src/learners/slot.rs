use super::LearnerError;
use crate::ml::{LinearClassifier, LinearParams};
use crate::store::{ModelKey, ModelStore, get_json, put_json};
use crate::vectorizer::{FeatureMatrix, FeatureVectorizer, TextSpan};

/// A vectorizer/classifier pair plus the store keys that back it.
///
/// Corpus-backed vectorizers persist their state under `vectorizer_key`;
/// hashing vectorizers are rebuilt from configuration and have none.
#[derive(Debug)]
pub struct ModelSlot {
    key: ModelKey,
    vectorizer_key: Option<ModelKey>,
    vectorizer: Box<dyn FeatureVectorizer>,
    classifier: Box<dyn LinearClassifier>,
}

impl ModelSlot {
    pub fn new(
        key: ModelKey,
        vectorizer: Box<dyn FeatureVectorizer>,
        classifier: Box<dyn LinearClassifier>,
    ) -> Self {
        Self {
            key,
            vectorizer_key: None,
            vectorizer,
            classifier,
        }
    }

    pub fn with_vectorizer_key(mut self, key: ModelKey) -> Self {
        self.vectorizer_key = Some(key);
        self
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn vectorizer_key(&self) -> Option<&ModelKey> {
        self.vectorizer_key.as_ref()
    }

    pub fn classifier(&self) -> &dyn LinearClassifier {
        self.classifier.as_ref()
    }

    pub fn vectorizer(&self) -> &dyn FeatureVectorizer {
        self.vectorizer.as_ref()
    }

    /// Whether both halves can score spans.
    pub fn is_fitted(&self) -> bool {
        self.vectorizer.is_fitted() && self.classifier.is_fitted()
    }

    fn transform(&self, tag: &str, spans: &[TextSpan]) -> Result<FeatureMatrix, LearnerError> {
        Ok(self.vectorizer.transform(tag, spans)?)
    }

    pub fn decision_function(
        &self,
        tag: &str,
        spans: &[TextSpan],
    ) -> Result<Vec<f32>, LearnerError> {
        let x = self.transform(tag, spans)?;
        Ok(self.classifier.decision_function(&x)?)
    }

    /// Predicted class index per span.
    pub fn predict_classes(
        &self,
        tag: &str,
        spans: &[TextSpan],
    ) -> Result<Vec<usize>, LearnerError> {
        let x = self.transform(tag, spans)?;
        Ok(self.classifier.predict(&x)?)
    }

    /// Refit the vocabulary on `spans`, then train the classifier from scratch.
    pub fn fit_batch(
        &mut self,
        tag: &str,
        spans: &[TextSpan],
        labels: &[usize],
    ) -> Result<(), LearnerError> {
        if spans.is_empty() {
            return Err(LearnerError::Validation(format!(
                "cannot prefit {tag} without samples"
            )));
        }
        self.vectorizer.fit_corpus(spans)?;
        let x = self.transform(tag, spans)?;
        self.classifier.fit(&x, labels)?;
        Ok(())
    }

    /// One incremental pass; empty input is a no-op.
    pub fn partial_fit(
        &mut self,
        tag: &str,
        spans: &[TextSpan],
        labels: &[usize],
    ) -> Result<(), LearnerError> {
        if spans.is_empty() {
            return Ok(());
        }
        let x = self.transform(tag, spans)?;
        self.classifier.partial_fit(&x, labels)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.classifier.clear();
    }

    pub fn params(&self) -> Option<LinearParams> {
        self.classifier.params()
    }

    /// Put back a snapshot taken with [`ModelSlot::params`].
    pub fn restore(&mut self, params: Option<LinearParams>) -> Result<(), LearnerError> {
        match params {
            Some(params) => self.classifier.load_params(params)?,
            None => self.classifier.clear(),
        }
        Ok(())
    }

    /// Load stored state. Returns `Ok(false)` when any stored piece is missing.
    pub fn load(&mut self, store: &dyn ModelStore) -> Result<bool, LearnerError> {
        if let Some(key) = &self.vectorizer_key {
            match store.get(key.as_str()) {
                Ok(bytes) => self.vectorizer.load_bytes(&bytes)?,
                Err(err) if err.is_not_found() => return Ok(false),
                Err(err) => return Err(err.into()),
            }
        }
        let params: LinearParams = match get_json(store, &self.key) {
            Ok(params) => params,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if params.n_features != self.vectorizer.n_features() {
            return Err(LearnerError::Corrupt {
                key: self.key.to_string(),
                reason: format!(
                    "stored width {} does not match vectorizer width {}",
                    params.n_features,
                    self.vectorizer.n_features()
                ),
            });
        }
        self.classifier.load_params(params)?;
        Ok(true)
    }

    /// Persist classifier parameters and, when keyed, vectorizer state.
    pub fn save(&self, store: &dyn ModelStore) -> Result<(), LearnerError> {
        let params = self.classifier.params().ok_or_else(|| {
            LearnerError::Validation(format!("no trained model to save at {}", self.key))
        })?;
        if let Some(key) = &self.vectorizer_key {
            store.put(key.as_str(), &self.vectorizer.to_bytes()?)?;
        }
        put_json(store, &self.key, &params)?;
        Ok(())
    }
}
