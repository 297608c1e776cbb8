use super::{LearnerAttribute, LearnerError, ModelSlot};
use crate::store::ModelStore;
use crate::vectorizer::TextSpan;

/// A trained secondary classifier mapping spans onto an attribute's
/// output range.
#[derive(Debug)]
pub struct AttributeModel {
    attribute: LearnerAttribute,
    slot: ModelSlot,
}

impl AttributeModel {
    pub fn new(attribute: LearnerAttribute, slot: ModelSlot) -> Self {
        Self { attribute, slot }
    }

    pub fn attribute(&self) -> &LearnerAttribute {
        &self.attribute
    }

    pub fn name(&self) -> &str {
        &self.attribute.name
    }

    pub fn is_fitted(&self) -> bool {
        self.slot.is_fitted()
    }

    /// Batch-train on spans labeled with values from the output range.
    pub fn prefit(&mut self, spans: &[TextSpan], labels: &[String]) -> Result<(), LearnerError> {
        if spans.len() != labels.len() {
            return Err(LearnerError::Validation(format!(
                "got {} labels for {} spans",
                labels.len(),
                spans.len()
            )));
        }
        let indices = labels
            .iter()
            .map(|label| {
                self.attribute
                    .output_range
                    .iter()
                    .position(|value| value == label)
                    .ok_or_else(|| {
                        LearnerError::Validation(format!(
                            "{label} is not in the output range of {}",
                            self.attribute.name
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.slot.fit_batch(&self.attribute.name, spans, &indices)
    }

    /// Output value per span.
    pub fn predict(&self, spans: &[TextSpan]) -> Result<Vec<String>, LearnerError> {
        let classes = self.slot.predict_classes(&self.attribute.name, spans)?;
        classes
            .into_iter()
            .map(|class| {
                self.attribute
                    .output_range
                    .get(class)
                    .cloned()
                    .ok_or_else(|| LearnerError::Corrupt {
                        key: self.slot.key().to_string(),
                        reason: format!("class index {class} is outside the output range"),
                    })
            })
            .collect()
    }

    pub fn load(&mut self, store: &dyn ModelStore) -> Result<bool, LearnerError> {
        self.slot.load(store)
    }

    pub fn save(&self, store: &dyn ModelStore) -> Result<(), LearnerError> {
        self.slot.save(store)
    }
}
