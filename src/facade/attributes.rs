use super::{LearnerFacade, LearnerRecord};
use crate::engine::EngineError;
use crate::learners::{AttributeModel, LearnerAttribute, LearnerId};
use crate::vectorizer::TextSpan;

impl LearnerFacade<'_> {
    /// Attach a secondary classifier to this pretrained learner.
    pub fn add_attribute(
        &mut self,
        name: &str,
        output_range: Vec<String>,
    ) -> Result<LearnerAttribute, EngineError> {
        let parent = self.pretrained_record_or_err()?;
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "attribute name must not be empty".to_string(),
            ));
        }
        let mut distinct = output_range.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < 2 || distinct.len() != output_range.len() {
            return Err(EngineError::Validation(format!(
                "attribute {name} needs at least two distinct outputs"
            )));
        }
        let (model, vectorizer) = self.engine.attribute_keys(&parent.tag, name);
        let attribute = LearnerAttribute {
            id: LearnerId::new(),
            name: name.to_string(),
            parent: parent.id.clone(),
            output_range,
            model_pointer: model.to_string(),
            vectorizer_pointer: vectorizer.to_string(),
        };
        self.engine.db().insert_attribute(&attribute)?;
        tracing::info!("Added attribute {name} to {}", parent.tag);
        self.attributes = None;
        Ok(attribute)
    }

    /// Batch-train an attribute on spans labeled with its output values.
    pub fn train_attribute(
        &mut self,
        name: &str,
        spans: &[TextSpan],
        labels: &[String],
    ) -> Result<(), EngineError> {
        let parent = self.pretrained_record_or_err()?;
        let attribute = self
            .engine
            .db()
            .find_attribute(&parent.id, name)?
            .ok_or_else(|| EngineError::NotFound(format!("{}/{name}", parent.tag)))?;
        let slot = self.engine.attribute_slot(&attribute);
        let mut model = AttributeModel::new(attribute, slot);
        model.prefit(spans, labels)?;
        model.save(self.engine.store())?;
        self.attributes = None;
        Ok(())
    }

    /// Attributes of the tag's pretrained learner, ordered by name.
    pub fn attributes(&self) -> Result<Vec<LearnerAttribute>, EngineError> {
        let parent = match &self.record {
            LearnerRecord::Pretrained(record) => Some(record),
            LearnerRecord::Online(_) => self.shared.as_ref(),
        };
        match parent {
            Some(parent) => Ok(self.engine.db().list_attributes(&parent.id)?),
            None => Ok(Vec::new()),
        }
    }
}
