use super::fusion::{FusionPolicy, StaticWeights};
use super::{LearnerError, ModelSlot, Sample};
use crate::ml::LinearParams;
use crate::store::{ModelStore, StoreError};
use crate::vectorizer::TextSpan;

/// Ensemble of an optional online (per-user) and an optional offline
/// (pretrained) model for one tag.
///
/// Only fitted components take part in scoring. With both present the
/// scores are fused; with one present it decides alone; with neither every
/// span scores `0.0` and predicts `false`.
#[derive(Debug)]
pub struct TagLearner {
    tag: String,
    online: Option<ModelSlot>,
    offline: Option<ModelSlot>,
    fusion: Box<dyn FusionPolicy>,
}

fn class_index(label: bool) -> usize {
    usize::from(label)
}

impl TagLearner {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            online: None,
            offline: None,
            fusion: Box::new(StaticWeights::default()),
        }
    }

    pub fn with_online(mut self, slot: ModelSlot) -> Self {
        self.online = Some(slot);
        self
    }

    pub fn with_offline(mut self, slot: ModelSlot) -> Self {
        self.offline = Some(slot);
        self
    }

    /// Swap the online component, returning the previous one.
    pub fn replace_online(&mut self, slot: ModelSlot) -> Option<ModelSlot> {
        self.online.replace(slot)
    }

    pub fn with_fusion(mut self, fusion: Box<dyn FusionPolicy>) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn online(&self) -> Option<&ModelSlot> {
        self.online.as_ref()
    }

    pub fn offline(&self) -> Option<&ModelSlot> {
        self.offline.as_ref()
    }

    pub fn has_online_model(&self) -> bool {
        self.online.as_ref().is_some_and(ModelSlot::is_fitted)
    }

    pub fn has_offline_model(&self) -> bool {
        self.offline.as_ref().is_some_and(ModelSlot::is_fitted)
    }

    fn online_mut(&mut self) -> Result<&mut ModelSlot, LearnerError> {
        let tag = &self.tag;
        self.online.as_mut().ok_or_else(|| {
            LearnerError::Validation(format!("learner for {tag} has no online model"))
        })
    }

    /// Discard the online model and retrain it on the labeled `samples`.
    pub fn reset(&mut self, samples: &[Sample]) -> Result<(), LearnerError> {
        let tag = self.tag.clone();
        let online = self.online_mut()?;
        online.clear();
        let (spans, labels): (Vec<TextSpan>, Vec<usize>) = samples
            .iter()
            .filter_map(|sample| sample.label.map(|label| (sample.span(), class_index(label))))
            .unzip();
        online.partial_fit(&tag, &spans, &labels)?;
        tracing::debug!("Reset online model for {tag} with {} samples", spans.len());
        Ok(())
    }

    /// Incrementally update the online model.
    pub fn fit(&mut self, spans: &[TextSpan], labels: &[bool]) -> Result<(), LearnerError> {
        if spans.len() != labels.len() {
            return Err(LearnerError::Validation(format!(
                "got {} labels for {} spans",
                labels.len(),
                spans.len()
            )));
        }
        let tag = self.tag.clone();
        let labels: Vec<usize> = labels.iter().copied().map(class_index).collect();
        self.online_mut()?.partial_fit(&tag, spans, &labels)
    }

    /// Batch-train the offline model from scratch, refitting its vocabulary.
    pub fn prefit(&mut self, spans: &[TextSpan], labels: &[bool]) -> Result<(), LearnerError> {
        if spans.len() != labels.len() {
            return Err(LearnerError::Validation(format!(
                "got {} labels for {} spans",
                labels.len(),
                spans.len()
            )));
        }
        let tag = self.tag.clone();
        let offline = self.offline.as_mut().ok_or_else(|| {
            LearnerError::Validation(format!("learner for {tag} has no offline model"))
        })?;
        let labels: Vec<usize> = labels.iter().copied().map(class_index).collect();
        offline.fit_batch(&tag, spans, &labels)?;
        tracing::info!("Prefit offline model for {tag} on {} spans", spans.len());
        Ok(())
    }

    /// Fused decision score per span; positive means the tag applies.
    pub fn decision_function(&self, spans: &[TextSpan]) -> Result<Vec<f32>, LearnerError> {
        let online = self
            .online
            .as_ref()
            .filter(|slot| slot.is_fitted())
            .map(|slot| slot.decision_function(&self.tag, spans))
            .transpose()?;
        let offline = self
            .offline
            .as_ref()
            .filter(|slot| slot.is_fitted())
            .map(|slot| slot.decision_function(&self.tag, spans))
            .transpose()?;
        Ok(match (offline, online) {
            (Some(offline), Some(online)) => offline
                .iter()
                .zip(&online)
                .map(|(&off, &on)| self.fusion.fuse(off, on))
                .collect(),
            (Some(scores), None) | (None, Some(scores)) => scores,
            (None, None) => vec![0.0; spans.len()],
        })
    }

    pub fn predict(&self, spans: &[TextSpan]) -> Result<Vec<bool>, LearnerError> {
        Ok(self
            .decision_function(spans)?
            .into_iter()
            .map(|score| score > 0.0)
            .collect())
    }

    /// Load both components from the store.
    ///
    /// A missing or unusable offline model leaves the learner online-only;
    /// store I/O failures still surface. A missing online model is reported
    /// as [`LearnerError::ModelNotFound`] after the offline side has been
    /// loaded.
    pub fn load_models(&mut self, store: &dyn ModelStore) -> Result<(), LearnerError> {
        if let Some(offline) = self.offline.as_mut() {
            match offline.load(store) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("No stored offline model for {} at {}", self.tag, offline.key());
                }
                Err(err) if is_unusable(&err) => {
                    tracing::warn!(
                        "Ignoring offline model for {} at {}: {err}",
                        self.tag,
                        offline.key()
                    );
                    offline.clear();
                }
                Err(err) => return Err(err),
            }
        }
        if let Some(online) = self.online.as_mut()
            && !online.load(store)?
        {
            return Err(LearnerError::ModelNotFound(online.key().to_string()));
        }
        Ok(())
    }

    pub fn save_online(&self, store: &dyn ModelStore) -> Result<(), LearnerError> {
        match &self.online {
            Some(online) => online.save(store),
            None => Ok(()),
        }
    }

    pub fn save_offline(&self, store: &dyn ModelStore) -> Result<(), LearnerError> {
        match &self.offline {
            Some(offline) => offline.save(store),
            None => Ok(()),
        }
    }

    /// Copy of the online parameters for rollback.
    pub fn online_params(&self) -> Option<LinearParams> {
        self.online.as_ref().and_then(ModelSlot::params)
    }

    pub fn restore_online(&mut self, params: Option<LinearParams>) -> Result<(), LearnerError> {
        match self.online.as_mut() {
            Some(online) => online.restore(params),
            None => Ok(()),
        }
    }
}

/// Stored state that cannot be paired with its vectorizer or classifier.
fn is_unusable(err: &LearnerError) -> bool {
    match err {
        LearnerError::Corrupt { .. }
        | LearnerError::Vectorizer(_)
        | LearnerError::Classifier(_) => true,
        LearnerError::Store(store) => matches!(store, StoreError::Codec { .. }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{
        LinearClassifier, LogisticRegression, PassiveAggressive, binary_classes,
        logreg::TrainOptions,
    };
    use crate::store::{MemoryModelStore, ModelKey, ModelKind, put_json};
    use crate::vectorizer::{FeatureVectorizer, FlagVocabulary, HashingVectorizer, TfidfVectorizer};

    fn flags() -> FlagVocabulary {
        FlagVocabulary::fit(&["heading"]).unwrap()
    }

    fn online_slot(id: &str) -> ModelSlot {
        let mut vectorizer = HashingVectorizer::new(10, 2);
        vectorizer.fit_flags(&flags());
        ModelSlot::new(
            ModelKey::new("test", ModelKind::Online, id),
            Box::new(vectorizer),
            Box::new(PassiveAggressive::new(binary_classes(), 1.0)),
        )
    }

    fn offline_slot(id: &str) -> ModelSlot {
        let mut vectorizer = TfidfVectorizer::new(2, 1, 1000);
        vectorizer.fit_flags(&flags());
        ModelSlot::new(
            ModelKey::new("test", ModelKind::Offline, id),
            Box::new(vectorizer),
            Box::new(LogisticRegression::new(
                binary_classes(),
                TrainOptions::default(),
            )),
        )
        .with_vectorizer_key(ModelKey::new("test", ModelKind::OfflineVectorizer, id))
    }

    fn constant_params(width: usize, score: f32) -> LinearParams {
        LinearParams {
            classes: binary_classes(),
            n_features: width,
            coef: vec![vec![0.0; width]],
            intercept: vec![score],
        }
    }

    fn spans(texts: &[&str]) -> Vec<TextSpan> {
        texts.iter().map(|text| TextSpan::new(*text)).collect()
    }

    fn corpus() -> (Vec<TextSpan>, Vec<bool>) {
        (
            spans(&[
                "company shall indemnify the customer",
                "indemnify and hold harmless",
                "this agreement is governed by law",
                "notices must be in writing",
            ]),
            vec![true, true, false, false],
        )
    }

    #[test]
    fn empty_learner_predicts_false_with_zero_scores() {
        let learner = TagLearner::new("LIABILITY").with_online(online_slot("a"));
        let input = spans(&["anything at all"]);
        assert_eq!(learner.decision_function(&input).unwrap(), vec![0.0]);
        assert_eq!(learner.predict(&input).unwrap(), vec![false]);
    }

    #[test]
    fn ensemble_weights_offline_over_online() {
        let mut learner = TagLearner::new("LIABILITY")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        let (texts, labels) = corpus();
        learner.prefit(&texts, &labels).unwrap();

        let offline_width = learner.offline().unwrap().vectorizer().n_features();
        let online_width = learner.online().unwrap().vectorizer().n_features();
        learner
            .offline
            .as_mut()
            .unwrap()
            .restore(Some(constant_params(offline_width, 1.0)))
            .unwrap();
        learner
            .restore_online(Some(constant_params(online_width, -1.0)))
            .unwrap();

        let input = spans(&["some clause"]);
        let score = learner.decision_function(&input).unwrap()[0];
        assert!((score - 0.2).abs() < 1e-5);
        assert_eq!(learner.predict(&input).unwrap(), vec![true]);
    }

    #[test]
    fn single_component_decides_alone() {
        let mut learner = TagLearner::new("X").with_online(online_slot("a"));
        let width = learner.online().unwrap().vectorizer().n_features();
        learner
            .restore_online(Some(constant_params(width, -0.5)))
            .unwrap();
        assert_eq!(
            learner.decision_function(&spans(&["x"])).unwrap(),
            vec![-0.5]
        );
    }

    #[test]
    fn online_fit_learns_positive_examples() {
        let mut learner = TagLearner::new("LIABILITY").with_online(online_slot("a"));
        let (texts, labels) = corpus();
        for _ in 0..3 {
            learner.fit(&texts, &labels).unwrap();
        }
        let predicted = learner.predict(&texts).unwrap();
        assert_eq!(predicted, labels);
    }

    #[test]
    fn fit_without_online_component_is_rejected() {
        let mut learner = TagLearner::new("X").with_offline(offline_slot("b"));
        let err = learner.fit(&spans(&["x"]), &[true]).unwrap_err();
        assert!(matches!(err, LearnerError::Validation(_)));
    }

    #[test]
    fn reset_retrains_from_labeled_samples_only() {
        let mut learner = TagLearner::new("X").with_online(online_slot("a"));
        learner.reset(&[]).unwrap();
        assert!(!learner.has_online_model());

        let span = TextSpan::new("indemnify the customer");
        learner
            .reset(&[Sample::labeled(&span, true), Sample::skipped(&span)])
            .unwrap();
        assert!(learner.has_online_model());
        assert_eq!(learner.predict(&[span]).unwrap(), vec![true]);
    }

    #[test]
    fn missing_online_model_is_reported_after_offline_load() {
        let store = MemoryModelStore::new();
        let mut trained = TagLearner::new("X").with_offline(offline_slot("b"));
        let (texts, labels) = corpus();
        trained.prefit(&texts, &labels).unwrap();
        trained.save_offline(&store).unwrap();

        let mut learner = TagLearner::new("X")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        let err = learner.load_models(&store).unwrap_err();
        assert!(matches!(err, LearnerError::ModelNotFound(_)));
        assert!(learner.has_offline_model());
        assert!(!learner.has_online_model());
    }

    #[test]
    fn saved_models_reload_with_identical_scores() {
        let store = MemoryModelStore::new();
        let (texts, labels) = corpus();
        let mut learner = TagLearner::new("X")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        learner.prefit(&texts, &labels).unwrap();
        learner.fit(&texts, &labels).unwrap();
        learner.save_offline(&store).unwrap();
        learner.save_online(&store).unwrap();

        let mut reloaded = TagLearner::new("X")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        reloaded.load_models(&store).unwrap();
        let expected = learner.decision_function(&texts).unwrap();
        let actual = reloaded.decision_function(&texts).unwrap();
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn width_mismatch_is_corrupt() {
        let store = MemoryModelStore::new();
        let key = ModelKey::new("test", ModelKind::Online, "a");
        put_json(&store, &key, &constant_params(3, 1.0)).unwrap();
        let mut learner = TagLearner::new("X").with_online(online_slot("a"));
        assert!(matches!(
            learner.load_models(&store),
            Err(LearnerError::Corrupt { .. })
        ));
    }

    #[test]
    fn unusable_offline_model_leaves_online_side_working() {
        let store = MemoryModelStore::new();
        let (texts, labels) = corpus();
        let mut learner = TagLearner::new("X")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        learner.prefit(&texts, &labels).unwrap();
        learner.fit(&texts, &labels).unwrap();
        learner.save_offline(&store).unwrap();
        learner.save_online(&store).unwrap();
        let offline_key = ModelKey::new("test", ModelKind::Offline, "b");
        put_json(&store, &offline_key, &constant_params(3, 1.0)).unwrap();

        let mut reloaded = TagLearner::new("X")
            .with_online(online_slot("a"))
            .with_offline(offline_slot("b"));
        reloaded.load_models(&store).unwrap();
        assert!(!reloaded.has_offline_model());
        assert!(reloaded.has_online_model());
        assert_eq!(reloaded.predict(&texts).unwrap().len(), texts.len());
    }

    #[test]
    fn restore_clears_when_snapshot_is_empty() {
        let mut learner = TagLearner::new("X").with_online(online_slot("a"));
        learner.fit(&spans(&["clause"]), &[true]).unwrap();
        assert!(learner.has_online_model());
        learner.restore_online(None).unwrap();
        assert!(!learner.has_online_model());
        assert!(learner.online().unwrap().classifier().params().is_none());
    }
}
