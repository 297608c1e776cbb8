use super::{GetAllOptions, GetOptions, LearnerFacade, LearnerRecord};
use crate::engine::{Engine, EngineError};
use crate::learners::{
    LearnerDbError, LearnerId, OnlineLearner, OnlineQuery, PretrainedLearner, TagLearner,
};
use crate::vectorizer::TextSpan;

fn validate_name(what: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn build_learner(
    engine: &Engine,
    record: &OnlineLearner,
    shared: Option<&PretrainedLearner>,
) -> TagLearner {
    let learner = TagLearner::new(record.tag.as_str()).with_online(engine.online_slot(&record.model_pointer));
    match shared {
        Some(shared) => learner.with_offline(engine.offline_slot(shared)),
        None => learner,
    }
}

impl<'e> LearnerFacade<'e> {
    /// Find or create the learner for `tag`.
    ///
    /// With a `user` this addresses the user's online learner: a missing row
    /// is created, and a soft-deleted row is recycled in place unless
    /// `include_deleted` is set. Without a user it addresses the tag's
    /// pretrained learner. Seed samples train and persist a newly created or
    /// recycled online learner immediately.
    pub fn get_or_create(
        engine: &'e Engine,
        tag: &str,
        user: Option<&str>,
        options: GetOptions,
    ) -> Result<Self, EngineError> {
        validate_name("tag", tag)?;
        match user {
            Some(user) => {
                validate_name("user", user)?;
                Self::get_or_create_online(engine, tag, user, options)
            }
            None => Self::get_or_create_pretrained(engine, tag, options),
        }
    }

    /// Online learners matching `options`, ordered by tag.
    ///
    /// Rows are read up front; facades (and their models) are built as the
    /// iterator advances.
    pub fn get_all(
        engine: &'e Engine,
        options: GetAllOptions,
    ) -> Result<impl Iterator<Item = Result<Self, EngineError>> + 'e, EngineError> {
        let query = OnlineQuery {
            owner: options.user.as_deref(),
            active_only: options.active_only,
            mature_threshold: options
                .mature_only
                .then_some(engine.config().maturity_threshold),
            include_deleted: options.include_deleted,
        };
        let records = engine.db().list_online(&query)?;
        let preload = options.preload;
        Ok(records.into_iter().map(move |record| {
            let shared = Self::shared_for(engine, &record.tag, &record.owner)?;
            Self::assemble_online(engine, record, shared, preload)
        }))
    }

    fn shared_for(
        engine: &Engine,
        tag: &str,
        user: &str,
    ) -> Result<Option<PretrainedLearner>, EngineError> {
        Ok(engine
            .db()
            .find_pretrained(tag)?
            .filter(|shared| shared.available_to(user)))
    }

    fn get_or_create_online(
        engine: &'e Engine,
        tag: &str,
        user: &str,
        options: GetOptions,
    ) -> Result<Self, EngineError> {
        let existing = engine.db().find_online(tag, user)?;
        let shared = Self::shared_for(engine, tag, user)?;
        match existing {
            Some(record) if !record.is_deleted() || options.include_deleted => {
                Self::assemble_online(engine, record, shared, options.preload)
            }
            Some(mut record) => {
                record.recycle(engine.new_online_key().to_string());
                record.pretrained = shared.is_some();
                tracing::info!("Recycled learner {} for {tag}/{user}", record.id);
                Self::seed_online(engine, record, shared, options, false)
            }
            None => {
                let mut record = OnlineLearner::new(tag, user, engine.new_online_key().to_string());
                record.pretrained = shared.is_some();
                tracing::info!(
                    "Creating learner {} for {tag}/{user} (pretrained: {})",
                    record.id,
                    record.pretrained
                );
                Self::seed_online(engine, record, shared, options, true)
            }
        }
    }

    /// Apply seed samples to a new or recycled record and persist it.
    fn seed_online(
        engine: &'e Engine,
        mut record: OnlineLearner,
        shared: Option<PretrainedLearner>,
        options: GetOptions,
        insert: bool,
    ) -> Result<Self, EngineError> {
        for sample in options.samples {
            record.add_sample(sample);
        }
        let mut learner = build_learner(engine, &record, shared.as_ref());
        if record.samples().iter().any(|sample| sample.label.is_some()) {
            learner.reset(record.samples())?;
        }
        let save_model = || -> Result<(), EngineError> {
            if learner.has_online_model() {
                learner.save_online(engine.store())?;
            }
            Ok(())
        };
        if insert {
            save_model()?;
            let inserted = engine.db().insert_online(&record);
            match inserted {
                Ok(()) => {}
                Err(LearnerDbError::Duplicate(identity)) => {
                    tracing::debug!("Learner {identity} was created concurrently; reusing it");
                    let existing = engine
                        .db()
                        .find_online(&record.tag, &record.owner)?
                        .ok_or(EngineError::NotFound(identity))?;
                    return Self::assemble_online(engine, existing, shared, options.preload);
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            save_model()?;
            engine.db().update_online(&record)?;
        }
        let mut facade = Self {
            engine,
            record: LearnerRecord::Online(record),
            shared,
            learner,
            loaded: false,
            attributes: None,
        };
        if options.preload {
            facade.ensure_loaded()?;
        }
        Ok(facade)
    }

    pub(super) fn assemble_online(
        engine: &'e Engine,
        record: OnlineLearner,
        shared: Option<PretrainedLearner>,
        preload: bool,
    ) -> Result<Self, EngineError> {
        let learner = build_learner(engine, &record, shared.as_ref());
        let mut facade = Self {
            engine,
            record: LearnerRecord::Online(record),
            shared,
            learner,
            loaded: false,
            attributes: None,
        };
        if preload {
            facade.ensure_loaded()?;
        }
        Ok(facade)
    }

    fn get_or_create_pretrained(
        engine: &'e Engine,
        tag: &str,
        options: GetOptions,
    ) -> Result<Self, EngineError> {
        let record = {
            let db = engine.db();
            match db.find_pretrained(tag)? {
                Some(record) => record,
                None => {
                    let (model, vectorizer) = engine.new_offline_keys();
                    let record = PretrainedLearner {
                        id: LearnerId::new(),
                        tag: tag.to_string(),
                        exclusivity: options.exclusivity.clone(),
                        model_pointer: model.to_string(),
                        vectorizer_pointer: vectorizer.to_string(),
                    };
                    match db.insert_pretrained(&record) {
                        Ok(()) => {
                            tracing::info!("Created pretrained learner {} for {tag}", record.id);
                            record
                        }
                        Err(LearnerDbError::Duplicate(identity)) => db
                            .find_pretrained(tag)?
                            .ok_or(EngineError::NotFound(identity))?,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        };
        Self::assemble_pretrained(engine, record, options.preload)
    }

    fn assemble_pretrained(
        engine: &'e Engine,
        record: PretrainedLearner,
        preload: bool,
    ) -> Result<Self, EngineError> {
        let learner = TagLearner::new(record.tag.as_str()).with_offline(engine.offline_slot(&record));
        let mut facade = Self {
            engine,
            record: LearnerRecord::Pretrained(record),
            shared: None,
            learner,
            loaded: false,
            attributes: None,
        };
        if preload {
            facade.ensure_loaded()?;
        }
        Ok(facade)
    }

    /// Every pretrained learner, ordered by tag.
    pub fn get_all_pretrained(
        engine: &'e Engine,
        preload: bool,
    ) -> Result<impl Iterator<Item = Result<Self, EngineError>> + 'e, EngineError> {
        let records = engine.db().list_pretrained()?;
        Ok(records
            .into_iter()
            .map(move |record| Self::assemble_pretrained(engine, record, preload)))
    }

    /// Online learner by id, deleted or not.
    pub fn get_by_id(engine: &'e Engine, id: &LearnerId, preload: bool) -> Result<Self, EngineError> {
        let record = engine
            .db()
            .get_online(id)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        let shared = Self::shared_for(engine, &record.tag, &record.owner)?;
        Self::assemble_online(engine, record, shared, preload)
    }

    /// Drop every sample and start a fresh online model.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        let engine = self.engine;
        let (record, learner) = self.online_parts()?;
        let previous = record.clone();
        let key = engine.new_online_key();
        record.clear(key.to_string());
        let previous_slot = learner.replace_online(engine.online_slot(key.as_str()));
        if let Err(err) = engine.db().update_online(record) {
            *record = previous;
            if let Some(slot) = previous_slot {
                learner.replace_online(slot);
            }
            return Err(err.into());
        }
        tracing::info!("Reset learner {} for {}/{}", record.id, record.tag, record.owner);
        self.loaded = true;
        Ok(())
    }

    /// Soft-delete this learner. A later `get_or_create` recycles the row.
    pub fn delete(&mut self) -> Result<(), EngineError> {
        let engine = self.engine;
        let (record, _) = self.online_parts()?;
        let previous = record.clone();
        record.soft_delete();
        if let Err(err) = engine.db().update_online(record) {
            *record = previous;
            return Err(err.into());
        }
        tracing::info!("Deleted learner {} for {}/{}", record.id, record.tag, record.owner);
        Ok(())
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), EngineError> {
        let engine = self.engine;
        let (record, _) = self.online_parts()?;
        if record.active == active {
            return Ok(());
        }
        record.active = active;
        if let Err(err) = engine.db().update_online(record) {
            record.active = !active;
            return Err(err.into());
        }
        Ok(())
    }

    /// Restrict a pretrained learner to one owner, or share it with
    /// everyone when `owner` is `None`. The `pretrained` flag of the tag's
    /// online learners follows.
    pub fn set_exclusivity(&mut self, owner: Option<&str>) -> Result<(), EngineError> {
        let mut updated = self.pretrained_record_or_err()?.clone();
        updated.exclusivity = owner.map(str::to_string);
        self.engine.db().set_exclusivity(&updated)?;
        tracing::info!(
            "Pretrained learner for {} is now {}",
            updated.tag,
            owner.map_or_else(|| "shared".to_string(), |owner| format!("exclusive to {owner}"))
        );
        self.record = LearnerRecord::Pretrained(updated);
        Ok(())
    }

    /// Batch-retrain a pretrained learner on the full corpus and persist it.
    ///
    /// The vocabulary is stored before the classifier; a failure between
    /// the two writes leaves them out of step; readers then ignore the
    /// offline model until the next prefit.
    pub fn prefit(&mut self, spans: &[TextSpan], labels: &[bool]) -> Result<(), EngineError> {
        self.pretrained_record_or_err()?;
        self.learner.prefit(spans, labels)?;
        self.learner.save_offline(self.engine.store())?;
        self.loaded = true;
        Ok(())
    }
}
