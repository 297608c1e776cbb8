//! Per-user incremental text tagging.
//!
//! Each `(tag, user)` pair owns an online learner that is updated as
//! feedback arrives. A tag may also have a shared pretrained learner trained
//! in batch; when available its scores are fused with the user's online
//! scores. Learner records live in SQLite, model parameters in a
//! [`store::ModelStore`].
//!
//! Start with [`Engine`] and [`LearnerFacade`].

/// Application directory resolution.
pub mod app_dirs;
/// Engine settings stored as TOML.
pub mod config;
/// Shared engine context.
pub mod engine;
/// Learner lifecycle, training and prediction entry points.
pub mod facade;
/// Learner records, persistence and the per-tag ensemble.
pub mod learners;
/// Named locks guarding learner mutations.
pub mod lock;
/// Logging setup.
pub mod logging;
/// Linear classifiers.
pub mod ml;
/// Model parameter storage.
pub mod store;
/// Span vectorizers.
pub mod vectorizer;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError};
pub use facade::{AttributePrediction, GetAllOptions, GetOptions, LearnerFacade, Prediction};
pub use learners::{Sample, TagLearner};
pub use vectorizer::TextSpan;
