use super::{LearnerFacade, LearnerRecord};
use crate::engine::{Engine, EngineError};
use crate::learners::{LearnerError, OnlineLearner, Sample, TagLearner};
use crate::ml::LinearParams;
use crate::vectorizer::TextSpan;

impl LearnerFacade<'_> {
    /// Load stored models once. A missing online model is rebuilt from the
    /// stored samples, or left empty when there are none.
    pub(super) fn ensure_loaded(&mut self) -> Result<(), EngineError> {
        if self.loaded {
            return Ok(());
        }
        match self.learner.load_models(self.engine.store()) {
            Ok(()) => {
                // Params written by a train whose row update never committed.
                if let LearnerRecord::Online(record) = &self.record
                    && self.learner.has_online_model()
                    && !record.samples().iter().any(|sample| sample.label.is_some())
                {
                    tracing::warn!(
                        "Ignoring online model for {}/{} without labelled samples",
                        record.tag,
                        record.owner
                    );
                    self.learner.restore_online(None)?;
                }
            }
            Err(LearnerError::ModelNotFound(key)) => {
                if let LearnerRecord::Online(record) = &self.record
                    && record.samples().iter().any(|sample| sample.label.is_some())
                {
                    tracing::warn!(
                        "Online model {key} for {}/{} is missing; rebuilding from {} samples",
                        record.tag,
                        record.owner,
                        record.samples().len()
                    );
                    self.learner.reset(record.samples())?;
                } else {
                    tracing::debug!("No online model stored at {key} yet");
                }
            }
            Err(err) => return Err(err.into()),
        }
        self.loaded = true;
        Ok(())
    }

    /// Train the online learner on user feedback.
    ///
    /// Stored samples whose text reappears with a different label are
    /// discarded and the model is retrained from the remaining set before the
    /// new samples are applied. Pairs already stored with the same label are
    /// skipped. Inferred negatives that repeat a stored text are dropped.
    /// On failure the stored and in-memory state are left as they were.
    pub fn train(
        &mut self,
        spans: &[TextSpan],
        labels: &[bool],
        inferred_negatives: &[TextSpan],
    ) -> Result<(), EngineError> {
        if spans.len() != labels.len() {
            return Err(EngineError::Validation(format!(
                "got {} labels for {} spans",
                labels.len(),
                spans.len()
            )));
        }
        self.online_parts()?;
        self.ensure_loaded()?;
        let engine = self.engine;
        let (record, learner) = self.online_parts()?;
        let previous = record.clone();
        let previous_params = learner.online_params();
        let result = apply_feedback(record, learner, spans, labels, inferred_negatives)
            .and_then(|()| persist(engine, record, learner));
        if let Err(err) = result {
            rollback(engine, record, learner, previous, previous_params);
            return Err(err);
        }
        Ok(())
    }

    /// Flip the most recent positive sample with this text to negative and
    /// retrain. Returns `false`, changing nothing, when no positive sample
    /// matches.
    pub fn remove_sample(&mut self, span: &TextSpan) -> Result<bool, EngineError> {
        self.online_parts()?;
        self.ensure_loaded()?;
        let engine = self.engine;
        let (record, learner) = self.online_parts()?;
        let previous = record.clone();
        let previous_params = learner.online_params();
        if !record.relabel_latest_positive(&span.text) {
            tracing::debug!("No positive sample to remove for {}/{}", record.tag, record.owner);
            return Ok(false);
        }
        let result = learner
            .reset(record.samples())
            .map_err(EngineError::from)
            .and_then(|()| persist(engine, record, learner));
        if let Err(err) = result {
            rollback(engine, record, learner, previous, previous_params);
            return Err(err);
        }
        Ok(true)
    }
}

fn apply_feedback(
    record: &mut OnlineLearner,
    learner: &mut TagLearner,
    spans: &[TextSpan],
    labels: &[bool],
    inferred_negatives: &[TextSpan],
) -> Result<(), EngineError> {
    // later feedback on the same text wins
    let mut batch: Vec<(&TextSpan, bool)> = Vec::with_capacity(spans.len());
    for (span, &label) in spans.iter().zip(labels) {
        batch.retain(|(seen, _)| seen.text != span.text);
        batch.push((span, label));
    }

    let mut conflicts = false;
    for (span, label) in &batch {
        conflicts |= record.discard_conflicts(&span.text, *label);
    }
    if conflicts {
        tracing::debug!(
            "Conflicting labels for {}/{}; retraining from {} samples",
            record.tag,
            record.owner,
            record.samples().len()
        );
        learner.reset(record.samples())?;
    }

    let mut new_spans = Vec::new();
    let mut new_labels = Vec::new();
    for (span, label) in batch {
        if record.contains_text(&span.text) {
            if record.confirm_inferred(&span.text, label) {
                tracing::debug!("Confirmed inferred sample for {}/{}", record.tag, record.owner);
            }
            continue;
        }
        record.add_sample(Sample::labeled(span, label));
        new_spans.push(span.clone());
        new_labels.push(label);
    }
    learner.fit(&new_spans, &new_labels)?;

    let mut negatives = Vec::new();
    for span in inferred_negatives {
        if record.contains_text(&span.text) {
            continue;
        }
        record.add_sample(Sample::inferred_negative(span));
        negatives.push(span.clone());
    }
    let dropped = inferred_negatives.len() - negatives.len();
    if dropped > 0 {
        tracing::debug!("Dropped {dropped} inferred negatives that repeat stored samples");
    }
    learner.fit(&negatives, &vec![false; negatives.len()])?;
    Ok(())
}

/// Write the online model, then the record. The model store write runs
/// without holding the database guard.
fn persist(
    engine: &Engine,
    record: &OnlineLearner,
    learner: &TagLearner,
) -> Result<(), EngineError> {
    if learner.has_online_model() {
        learner.save_online(engine.store())?;
    }
    engine.db().update_online(record)?;
    Ok(())
}

/// Restore the in-memory record and online model, and put the previous
/// parameters back in the store in case the new ones were already written.
fn rollback(
    engine: &Engine,
    record: &mut OnlineLearner,
    learner: &mut TagLearner,
    previous: OnlineLearner,
    previous_params: Option<LinearParams>,
) {
    *record = previous;
    let restored = previous_params.is_some();
    if let Err(err) = learner.restore_online(previous_params) {
        tracing::warn!("Could not restore online model for {}: {err}", record.tag);
        return;
    }
    if restored && let Err(err) = learner.save_online(engine.store()) {
        tracing::warn!(
            "Could not write back online model for {}/{}: {err}",
            record.tag,
            record.owner
        );
    }
}
