//! Engine configuration persisted as TOML.
//!
//! Config keys: `database_path`, `model_root`, `bucket_namespace`,
//! `maturity_threshold`, `flag_vocabulary`, `lock_timeout_ms`, and the
//! `online`, `offline`, `attribute`, `classifier` tables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

mod defaults;
mod io;

pub use defaults::MATURITY_THRESHOLD;
pub use io::{CONFIG_FILE_NAME, config_path, load_from, load_or_default, save_to_path};

use defaults::{
    clamp_hash_bits, clamp_ngram_max, default_bucket_namespace, default_flag_vocabulary,
    default_hash_bits, default_logreg_batch_size, default_logreg_epochs,
    default_logreg_l2, default_logreg_learning_rate, default_max_features,
    default_maturity_threshold, default_min_df, default_ngram_max, default_pa_c, default_seed,
};

/// Errors that may occur while loading or saving engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("No suitable config directory found")]
    NoConfigDir,
}

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite file holding learner records; defaults to `<app root>/learners.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Root directory of the filesystem model store; defaults to `<app root>/models`.
    #[serde(default)]
    pub model_root: Option<PathBuf>,
    /// Leading segment of every model store key.
    #[serde(default = "default_bucket_namespace")]
    pub bucket_namespace: String,
    /// Positive samples needed before a learner without a pretrained half is mature.
    #[serde(default = "default_maturity_threshold")]
    pub maturity_threshold: usize,
    /// Known per-sample flag names, in slot order.
    #[serde(default = "default_flag_vocabulary")]
    pub flag_vocabulary: Vec<String>,
    /// Maximum wait for a learner lock; absent means wait until acquired.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    #[serde(default)]
    pub online: OnlineVectorizerSettings,
    #[serde(default)]
    pub offline: OfflineVectorizerSettings,
    #[serde(default)]
    pub attribute: AttributeVectorizerSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            model_root: None,
            bucket_namespace: default_bucket_namespace(),
            maturity_threshold: default_maturity_threshold(),
            flag_vocabulary: default_flag_vocabulary(),
            lock_timeout_ms: None,
            online: OnlineVectorizerSettings::default(),
            offline: OfflineVectorizerSettings::default(),
            attribute: AttributeVectorizerSettings::default(),
            classifier: ClassifierSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Clamp numeric settings into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.online.hash_bits = clamp_hash_bits(self.online.hash_bits);
        self.online.ngram_max = clamp_ngram_max(self.online.ngram_max);
        self.offline.ngram_max = clamp_ngram_max(self.offline.ngram_max);
        self.offline.min_df = self.offline.min_df.max(1);
        self.offline.max_features = self.offline.max_features.max(1);
        self.attribute.min_df = self.attribute.min_df.max(1);
        self.classifier.logreg_batch_size = self.classifier.logreg_batch_size.max(1);
        if !self.classifier.pa_c.is_finite() || self.classifier.pa_c <= 0.0 {
            self.classifier.pa_c = default_pa_c();
        }
        if self.bucket_namespace.trim().is_empty() {
            self.bucket_namespace = default_bucket_namespace();
        }
        self
    }

    /// Lock acquisition timeout, if one is configured.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve the learner database path, falling back to the app root.
    pub fn resolve_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(app_dirs::app_root_dir()
                .map_err(io::map_app_dir_error)?
                .join("learners.db")),
        }
    }

    /// Resolve the model store root, falling back to the app root.
    pub fn resolve_model_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.model_root {
            Some(path) => Ok(path.clone()),
            None => app_dirs::models_dir().map_err(io::map_app_dir_error),
        }
    }
}

/// Feature hashing used by online learners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineVectorizerSettings {
    /// Text features are hashed into `2^hash_bits` buckets.
    #[serde(default = "default_hash_bits")]
    pub hash_bits: u32,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
}

impl Default for OnlineVectorizerSettings {
    fn default() -> Self {
        Self {
            hash_bits: default_hash_bits(),
            ngram_max: default_ngram_max(),
        }
    }
}

/// Corpus-fitted TF-IDF vocabulary used by pretrained learners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineVectorizerSettings {
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
}

impl Default for OfflineVectorizerSettings {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            min_df: default_min_df(),
            ngram_max: default_ngram_max(),
        }
    }
}

/// Binary bag-of-words vocabulary used by learner attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeVectorizerSettings {
    #[serde(default = "default_min_df")]
    pub min_df: usize,
}

impl Default for AttributeVectorizerSettings {
    fn default() -> Self {
        Self {
            min_df: default_min_df(),
        }
    }
}

/// Hyperparameters for the two linear classifier kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Aggressiveness cap of the passive-aggressive update.
    #[serde(default = "default_pa_c")]
    pub pa_c: f32,
    #[serde(default = "default_logreg_epochs")]
    pub logreg_epochs: usize,
    #[serde(default = "default_logreg_learning_rate")]
    pub logreg_learning_rate: f32,
    #[serde(default = "default_logreg_l2")]
    pub logreg_l2: f32,
    #[serde(default = "default_logreg_batch_size")]
    pub logreg_batch_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            pa_c: default_pa_c(),
            logreg_epochs: default_logreg_epochs(),
            logreg_learning_rate: default_logreg_learning_rate(),
            logreg_l2: default_logreg_l2(),
            logreg_batch_size: default_logreg_batch_size(),
            seed: default_seed(),
        }
    }
}

#[cfg(test)]
mod tests;
