use serde::{Deserialize, Serialize};

use super::{LearnerFacade, LearnerRecord};
use crate::engine::EngineError;
use crate::learners::AttributeModel;
use crate::vectorizer::TextSpan;

/// Output of one attribute classifier for one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePrediction {
    pub name: String,
    pub label: String,
}

/// Prediction for one span: a bare label, or the label plus the output of
/// every trained attribute when attributes were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Label(bool),
    WithAttributes {
        label: bool,
        attrs: Vec<AttributePrediction>,
    },
}

impl Prediction {
    pub fn label(&self) -> bool {
        match self {
            Prediction::Label(label) | Prediction::WithAttributes { label, .. } => *label,
        }
    }

    pub fn attrs(&self) -> &[AttributePrediction] {
        match self {
            Prediction::Label(_) => &[],
            Prediction::WithAttributes { attrs, .. } => attrs,
        }
    }
}

impl LearnerFacade<'_> {
    /// Fused decision score per span. Does not require the learner lock.
    pub fn decision_function(&mut self, spans: &[TextSpan]) -> Result<Vec<f32>, EngineError> {
        self.ensure_loaded()?;
        Ok(self.learner.decision_function(spans)?)
    }

    /// Predict the tag for each span, optionally with attribute outputs.
    ///
    /// Attributes come from the tag's pretrained learner; attributes that
    /// were never trained are left out.
    pub fn predict(
        &mut self,
        spans: &[TextSpan],
        include_attributes: bool,
    ) -> Result<Vec<Prediction>, EngineError> {
        self.ensure_loaded()?;
        let labels = self.learner.predict(spans)?;
        if !include_attributes {
            return Ok(labels.into_iter().map(Prediction::Label).collect());
        }
        self.ensure_attributes()?;
        let mut outputs = Vec::new();
        for model in self.attributes.as_deref().unwrap_or_default() {
            outputs.push((model.name().to_string(), model.predict(spans)?));
        }
        Ok(labels
            .into_iter()
            .enumerate()
            .map(|(row, label)| Prediction::WithAttributes {
                label,
                attrs: outputs
                    .iter()
                    .filter_map(|(name, values)| {
                        values.get(row).map(|value| AttributePrediction {
                            name: name.clone(),
                            label: value.clone(),
                        })
                    })
                    .collect(),
            })
            .collect())
    }

    fn ensure_attributes(&mut self) -> Result<(), EngineError> {
        if self.attributes.is_some() {
            return Ok(());
        }
        let parent = match &self.record {
            LearnerRecord::Pretrained(record) => Some(record),
            LearnerRecord::Online(_) => self.shared.as_ref(),
        };
        let mut models = Vec::new();
        if let Some(parent) = parent {
            let attributes = self.engine.db().list_attributes(&parent.id)?;
            for attribute in attributes {
                let slot = self.engine.attribute_slot(&attribute);
                let mut model = AttributeModel::new(attribute, slot);
                if model.load(self.engine.store())? {
                    models.push(model);
                } else {
                    tracing::debug!("Attribute {} of {} is not trained yet", model.name(), parent.tag);
                }
            }
        }
        self.attributes = Some(models);
        Ok(())
    }
}
