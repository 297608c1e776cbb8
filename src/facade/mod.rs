//! Public entry point for learner lifecycle, training and prediction.
//!
//! A [`LearnerFacade`] wraps either a per-user online learner or a tag's
//! shared pretrained learner. Mutating calls (`train`, `remove_sample`,
//! `reset`, `prefit`, and `get_or_create` with seed samples) must run under
//! the learner lock; wrap them in [`Engine::locked`]. Facades never lock on
//! their own.

use crate::engine::{Engine, EngineError};
use crate::learners::{
    AttributeModel, LearnerId, OnlineLearner, PretrainedLearner, Sample, TagLearner,
};
use crate::lock::lock_name;

mod attributes;
mod lifecycle;
mod predict;
mod train;

#[cfg(test)]
mod tests;

pub use predict::{AttributePrediction, Prediction};

/// Options for [`LearnerFacade::get_or_create`].
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Return a soft-deleted learner as-is instead of recycling it.
    pub include_deleted: bool,
    /// Load stored model parameters up front.
    pub preload: bool,
    /// Samples used for an initial training pass when the learner is
    /// created or recycled.
    pub samples: Vec<Sample>,
    /// Owner a newly created pretrained learner is exclusive to.
    pub exclusivity: Option<String>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            include_deleted: false,
            preload: true,
            samples: Vec::new(),
            exclusivity: None,
        }
    }
}

impl GetOptions {
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Skip loading model parameters; useful for metadata-only access.
    pub fn metadata_only(mut self) -> Self {
        self.preload = false;
        self
    }

    pub fn with_samples(mut self, samples: Vec<Sample>) -> Self {
        self.samples = samples;
        self
    }

    pub fn exclusive_to(mut self, owner: impl Into<String>) -> Self {
        self.exclusivity = Some(owner.into());
        self
    }
}

/// Filters for [`LearnerFacade::get_all`].
#[derive(Debug, Clone)]
pub struct GetAllOptions {
    pub user: Option<String>,
    pub active_only: bool,
    pub mature_only: bool,
    pub include_deleted: bool,
    pub preload: bool,
}

impl Default for GetAllOptions {
    fn default() -> Self {
        Self {
            user: None,
            active_only: false,
            mature_only: false,
            include_deleted: false,
            preload: true,
        }
    }
}

#[derive(Debug, Clone)]
enum LearnerRecord {
    Online(OnlineLearner),
    Pretrained(PretrainedLearner),
}

/// Orchestrates one learner record and its [`TagLearner`].
#[derive(Debug)]
pub struct LearnerFacade<'e> {
    engine: &'e Engine,
    record: LearnerRecord,
    /// Pretrained learner whose offline model this online learner uses.
    shared: Option<PretrainedLearner>,
    learner: TagLearner,
    loaded: bool,
    attributes: Option<Vec<AttributeModel>>,
}

impl<'e> LearnerFacade<'e> {
    pub fn id(&self) -> &LearnerId {
        match &self.record {
            LearnerRecord::Online(record) => &record.id,
            LearnerRecord::Pretrained(record) => &record.id,
        }
    }

    pub fn tag(&self) -> &str {
        match &self.record {
            LearnerRecord::Online(record) => &record.tag,
            LearnerRecord::Pretrained(record) => &record.tag,
        }
    }

    /// Owning user; `None` for pretrained learners.
    pub fn owner(&self) -> Option<&str> {
        match &self.record {
            LearnerRecord::Online(record) => Some(&record.owner),
            LearnerRecord::Pretrained(_) => None,
        }
    }

    pub fn online_record(&self) -> Option<&OnlineLearner> {
        match &self.record {
            LearnerRecord::Online(record) => Some(record),
            LearnerRecord::Pretrained(_) => None,
        }
    }

    pub fn pretrained_record(&self) -> Option<&PretrainedLearner> {
        match &self.record {
            LearnerRecord::Online(_) => None,
            LearnerRecord::Pretrained(record) => Some(record),
        }
    }

    /// Pretrained learners always count as mature.
    pub fn is_mature(&self) -> bool {
        match &self.record {
            LearnerRecord::Online(record) => {
                record.is_mature(self.engine.config().maturity_threshold)
            }
            LearnerRecord::Pretrained(_) => true,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.online_record().map_or(0, |record| record.samples().len())
    }

    pub fn positive_sample_count(&self) -> usize {
        self.online_record()
            .map_or(0, OnlineLearner::positive_sample_count)
    }

    /// Name of the lock that guards mutations of this learner.
    pub fn lock_name(&self) -> String {
        lock_name(self.tag(), self.owner())
    }

    pub fn tag_learner(&self) -> &TagLearner {
        &self.learner
    }

    fn online_parts(&mut self) -> Result<(&mut OnlineLearner, &mut TagLearner), EngineError> {
        match &mut self.record {
            LearnerRecord::Online(record) => Ok((record, &mut self.learner)),
            LearnerRecord::Pretrained(record) => Err(EngineError::Validation(format!(
                "pretrained learner for {} only supports prefit",
                record.tag
            ))),
        }
    }

    fn pretrained_record_or_err(&self) -> Result<&PretrainedLearner, EngineError> {
        match &self.record {
            LearnerRecord::Pretrained(record) => Ok(record),
            LearnerRecord::Online(record) => Err(EngineError::Validation(format!(
                "online learner {}/{} has no pretrained operations",
                record.tag, record.owner
            ))),
        }
    }
}
