use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vectorizer::TextSpan;

/// Stable opaque identifier of a learner record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LearnerId(String);

impl LearnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Rehydrate an identifier from a stored string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LearnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One piece of user feedback. `label: None` means the span was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub text: String,
    #[serde(default)]
    pub flags: Vec<String>,
    pub label: Option<bool>,
    #[serde(default)]
    pub inferred: bool,
}

impl Sample {
    pub fn labeled(span: &TextSpan, label: bool) -> Self {
        Self {
            text: span.text.clone(),
            flags: span.flags.clone(),
            label: Some(label),
            inferred: false,
        }
    }

    /// A negative sample derived from context rather than explicit feedback.
    pub fn inferred_negative(span: &TextSpan) -> Self {
        Self {
            inferred: true,
            ..Self::labeled(span, false)
        }
    }

    pub fn skipped(span: &TextSpan) -> Self {
        Self {
            label: None,
            ..Self::labeled(span, false)
        }
    }

    pub fn span(&self) -> TextSpan {
        TextSpan {
            text: self.text.clone(),
            flags: self.flags.clone(),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.label == Some(true)
    }
}

/// Soft-delete lifecycle of an online learner row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnerState {
    Active,
    Deleted,
}

/// Per-(tag, user) learner record.
///
/// `positive_sample_count` is maintained by every mutation and always equals
/// the number of samples labeled `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineLearner {
    pub id: LearnerId,
    pub tag: String,
    pub owner: String,
    samples: Vec<Sample>,
    positive_sample_count: usize,
    /// Whether a shared pretrained learner existed when this row was created.
    pub pretrained: bool,
    pub active: bool,
    state: LearnerState,
    pub model_pointer: String,
}

impl OnlineLearner {
    pub fn new(tag: &str, owner: &str, model_pointer: String) -> Self {
        Self {
            id: LearnerId::new(),
            tag: tag.to_string(),
            owner: owner.to_string(),
            samples: Vec::new(),
            positive_sample_count: 0,
            pretrained: false,
            active: true,
            state: LearnerState::Active,
            model_pointer,
        }
    }

    /// Rebuild a record loaded from storage; the positive count is derived.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: LearnerId,
        tag: String,
        owner: String,
        samples: Vec<Sample>,
        pretrained: bool,
        active: bool,
        state: LearnerState,
        model_pointer: String,
    ) -> Self {
        let positive_sample_count = samples.iter().filter(|s| s.is_positive()).count();
        Self {
            id,
            tag,
            owner,
            samples,
            positive_sample_count,
            pretrained,
            active,
            state,
            model_pointer,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn positive_sample_count(&self) -> usize {
        self.positive_sample_count
    }

    pub fn state(&self) -> LearnerState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == LearnerState::Deleted
    }

    pub fn is_mature(&self, threshold: usize) -> bool {
        self.pretrained || self.positive_sample_count >= threshold
    }

    pub fn add_sample(&mut self, sample: Sample) {
        if sample.is_positive() {
            self.positive_sample_count += 1;
        }
        self.samples.push(sample);
    }

    pub fn discard_sample(&mut self, index: usize) -> Option<Sample> {
        if index >= self.samples.len() {
            return None;
        }
        let sample = self.samples.remove(index);
        if sample.is_positive() {
            self.positive_sample_count -= 1;
        }
        Some(sample)
    }

    pub fn contains_text(&self, text: &str) -> bool {
        self.samples.iter().any(|sample| sample.text == text)
    }

    /// Mark inferred samples with `text` and `label` as explicit feedback.
    /// Returns true when any sample changed.
    pub fn confirm_inferred(&mut self, text: &str, label: bool) -> bool {
        let mut confirmed = false;
        for sample in &mut self.samples {
            if sample.inferred && sample.text == text && sample.label == Some(label) {
                sample.inferred = false;
                confirmed = true;
            }
        }
        confirmed
    }

    /// Drop every stored sample with `text` whose label differs from `label`.
    ///
    /// Returns true when a dropped sample carried a label, meaning the model
    /// learned from data that is no longer in the set.
    pub fn discard_conflicts(&mut self, text: &str, label: bool) -> bool {
        let mut retrain = false;
        let mut index = 0;
        while index < self.samples.len() {
            let sample = &self.samples[index];
            if sample.text == text && sample.label != Some(label) {
                retrain |= sample.label.is_some();
                self.discard_sample(index);
            } else {
                index += 1;
            }
        }
        retrain
    }

    /// Flip the most recent positive sample with `text` to negative.
    pub fn relabel_latest_positive(&mut self, text: &str) -> bool {
        let Some(sample) = self
            .samples
            .iter_mut()
            .rev()
            .find(|sample| sample.text == text && sample.is_positive())
        else {
            return false;
        };
        sample.label = Some(false);
        self.positive_sample_count -= 1;
        true
    }

    /// Wipe samples and point at a fresh model key.
    pub fn clear(&mut self, model_pointer: String) {
        self.samples.clear();
        self.positive_sample_count = 0;
        self.model_pointer = model_pointer;
    }

    /// Active -> Deleted. Samples are kept until the row is recycled.
    pub fn soft_delete(&mut self) {
        self.state = LearnerState::Deleted;
    }

    /// Deleted -> Active in place, discarding samples and model state.
    pub fn recycle(&mut self, model_pointer: String) {
        self.clear(model_pointer);
        self.state = LearnerState::Active;
        self.active = true;
    }
}

/// Shared, batch-trained learner for a tag. Never soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PretrainedLearner {
    pub id: LearnerId,
    pub tag: String,
    /// When set, only this user's online learners inherit the model.
    pub exclusivity: Option<String>,
    pub model_pointer: String,
    pub vectorizer_pointer: String,
}

impl PretrainedLearner {
    /// Whether `user`'s online learner may use this model.
    pub fn available_to(&self, user: &str) -> bool {
        self.exclusivity.as_deref().is_none_or(|owner| owner == user)
    }
}

/// Secondary classifier attached to a pretrained learner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerAttribute {
    pub id: LearnerId,
    pub name: String,
    pub parent: LearnerId,
    /// Possible outputs, in class-index order.
    pub output_range: Vec<String>,
    pub model_pointer: String,
    pub vectorizer_pointer: String,
}
