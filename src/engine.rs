//! Process-wide engine context: configuration, entity database, model
//! store and named locks, constructed once by the caller and shared by
//! every facade.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig};
use crate::learners::{
    LearnerAttribute, LearnerDb, LearnerDbError, LearnerError, ModelSlot, PretrainedLearner,
};
use crate::lock::{LocalLocks, LockError, NamedLock, lock_name};
use crate::ml::{LogisticRegression, PassiveAggressive, binary_classes, logreg::TrainOptions};
use crate::store::{FsModelStore, MemoryModelStore, ModelKey, ModelKind, ModelStore, StoreError};
use crate::vectorizer::{
    AttributeVectorizer, FeatureVectorizer, FlagVocabulary, HashingVectorizer, TfidfVectorizer,
    VectorizerError,
};

/// Errors surfaced by the engine and the learner facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] LearnerDbError),
    #[error(transparent)]
    Learner(#[from] LearnerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Vectorizer(#[from] VectorizerError),
    #[error("Learner not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
}

/// Shared dependencies of every learner facade.
pub struct Engine {
    config: EngineConfig,
    flags: FlagVocabulary,
    db: Mutex<LearnerDb>,
    store: Box<dyn ModelStore>,
    locks: Box<dyn NamedLock>,
}

impl Engine {
    /// Open the on-disk database and model directory named by `config`.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let config = config.normalized();
        let db = LearnerDb::open(config.resolve_database_path()?)?;
        let store = FsModelStore::new(config.resolve_model_root()?);
        tracing::info!("Opened learner engine with models under {}", store.root().display());
        let locks = LocalLocks::new(config.lock_timeout());
        Self::with_parts(config, db, Box::new(store), Box::new(locks))
    }

    /// Engine backed by an in-memory database and model store.
    pub fn in_memory(config: EngineConfig) -> Result<Self, EngineError> {
        let config = config.normalized();
        let locks = LocalLocks::new(config.lock_timeout());
        Self::with_parts(
            config,
            LearnerDb::open_in_memory()?,
            Box::new(MemoryModelStore::new()),
            Box::new(locks),
        )
    }

    /// Assemble an engine from caller-provided parts.
    pub fn with_parts(
        config: EngineConfig,
        db: LearnerDb,
        store: Box<dyn ModelStore>,
        locks: Box<dyn NamedLock>,
    ) -> Result<Self, EngineError> {
        let config = config.normalized();
        let flags = FlagVocabulary::fit(&config.flag_vocabulary)?;
        Ok(Self {
            config,
            flags,
            db: Mutex::new(db),
            store,
            locks,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn flags(&self) -> &FlagVocabulary {
        &self.flags
    }

    pub fn store(&self) -> &dyn ModelStore {
        self.store.as_ref()
    }

    pub fn locks(&self) -> &dyn NamedLock {
        self.locks.as_ref()
    }

    pub(crate) fn db(&self) -> MutexGuard<'_, LearnerDb> {
        self.db.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Run `f` while holding the `(tag, user)` learner lock.
    ///
    /// `user: None` addresses the tag's pretrained learner. The lock is
    /// released on every exit path, including panics.
    pub fn locked<T, E>(
        &self,
        tag: &str,
        user: Option<&str>,
        f: impl FnOnce(&Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LockError>,
    {
        let _guard = self.locks.acquire(&lock_name(tag, user))?;
        f(self)
    }

    /// Flush the database and release the engine.
    pub fn shutdown(self) -> Result<(), EngineError> {
        let db = self.db.into_inner().unwrap_or_else(|err| err.into_inner());
        db.checkpoint()?;
        tracing::info!("Learner engine shut down");
        Ok(())
    }

    pub(crate) fn new_online_key(&self) -> ModelKey {
        ModelKey::new(
            &self.config.bucket_namespace,
            ModelKind::Online,
            &Uuid::new_v4().to_string(),
        )
    }

    /// Model and vectorizer keys for a new pretrained learner.
    pub(crate) fn new_offline_keys(&self) -> (ModelKey, ModelKey) {
        let id = Uuid::new_v4().to_string();
        let namespace = &self.config.bucket_namespace;
        (
            ModelKey::new(namespace, ModelKind::Offline, &id),
            ModelKey::new(namespace, ModelKind::OfflineVectorizer, &id),
        )
    }

    pub(crate) fn attribute_keys(&self, tag: &str, name: &str) -> (ModelKey, ModelKey) {
        let namespace = &self.config.bucket_namespace;
        (
            ModelKey::attribute(namespace, ModelKind::Attribute, tag, name),
            ModelKey::attribute(namespace, ModelKind::AttributeVectorizer, tag, name),
        )
    }

    pub(crate) fn online_slot(&self, model_pointer: &str) -> ModelSlot {
        let settings = &self.config.online;
        let mut vectorizer = HashingVectorizer::new(settings.hash_bits, settings.ngram_max);
        vectorizer.fit_flags(&self.flags);
        ModelSlot::new(
            ModelKey::from_pointer(model_pointer),
            Box::new(vectorizer),
            Box::new(PassiveAggressive::new(
                binary_classes(),
                self.config.classifier.pa_c,
            )),
        )
    }

    pub(crate) fn offline_slot(&self, learner: &PretrainedLearner) -> ModelSlot {
        let settings = &self.config.offline;
        let mut vectorizer =
            TfidfVectorizer::new(settings.ngram_max, settings.min_df, settings.max_features);
        vectorizer.fit_flags(&self.flags);
        ModelSlot::new(
            ModelKey::from_pointer(learner.model_pointer.as_str()),
            Box::new(vectorizer),
            Box::new(LogisticRegression::new(
                binary_classes(),
                TrainOptions::from(&self.config.classifier),
            )),
        )
        .with_vectorizer_key(ModelKey::from_pointer(learner.vectorizer_pointer.as_str()))
    }

    pub(crate) fn attribute_slot(&self, attribute: &LearnerAttribute) -> ModelSlot {
        let mut vectorizer = AttributeVectorizer::new(self.config.attribute.min_df);
        vectorizer.fit_flags(&self.flags);
        ModelSlot::new(
            ModelKey::from_pointer(attribute.model_pointer.as_str()),
            Box::new(vectorizer),
            Box::new(LogisticRegression::new(
                attribute.output_range.clone(),
                TrainOptions::from(&self.config.classifier),
            )),
        )
        .with_vectorizer_key(ModelKey::from_pointer(attribute.vectorizer_pointer.as_str()))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("namespace", &self.config.bucket_namespace)
            .field("flags", &self.flags.names())
            .finish_non_exhaustive()
    }
}
