//! Key/value persistence of model parameters and vectorizer state.
//!
//! Keys are deterministic: `{namespace}/{kind}/{id}.pkl`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod fs;
mod memory;

pub use fs::FsModelStore;
pub use memory::MemoryModelStore;

/// Suffix shared by every model store key.
pub const MODEL_KEY_SUFFIX: &str = ".pkl";

/// Errors returned by a model store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No stored object at {0}")]
    NotFound(String),
    #[error("Invalid store key {0}")]
    InvalidKey(String),
    #[error("Store I/O failed for {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("Stored object at {key} could not be decoded: {source}")]
    Codec {
        key: String,
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Blob store consumed by the engine.
///
/// Implementations never retry; failures surface to the caller.
pub trait ModelStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Fetch stored bytes, or [`StoreError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
}

impl<T: ModelStore + ?Sized> ModelStore for Arc<T> {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get(key)
    }
}

/// Kind segment of a model store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Online,
    Offline,
    OfflineVectorizer,
    Attribute,
    AttributeVectorizer,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Online => "online",
            ModelKind::Offline => "offline",
            ModelKind::OfflineVectorizer => "offline-vectorizer",
            ModelKind::Attribute => "attribute",
            ModelKind::AttributeVectorizer => "attribute-vectorizer",
        }
    }
}

/// Fully-qualified model store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey(String);

impl ModelKey {
    pub fn new(namespace: &str, kind: ModelKind, id: &str) -> Self {
        Self(format!(
            "{}/{}/{}{MODEL_KEY_SUFFIX}",
            sanitize_segment(namespace),
            kind.as_str(),
            sanitize_segment(id)
        ))
    }

    /// Key of an attribute model, addressed by the composite `tag_name`.
    pub fn attribute(namespace: &str, kind: ModelKind, tag: &str, name: &str) -> Self {
        Self::new(namespace, kind, &format!("{tag}_{name}"))
    }

    /// Rehydrate a key previously stored as a model pointer.
    pub fn from_pointer(pointer: impl Into<String>) -> Self {
        Self(pointer.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Serialize `value` as JSON and store it under `key`.
pub fn put_json<T: Serialize>(
    store: &dyn ModelStore,
    key: &ModelKey,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.put(key.as_str(), &bytes)
}

/// Load and decode a JSON value stored under `key`.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn ModelStore,
    key: &ModelKey,
) -> Result<T, StoreError> {
    let bytes = store.get(key.as_str())?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Codec {
        key: key.to_string(),
        source,
    })
}
