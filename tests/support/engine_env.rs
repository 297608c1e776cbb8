use std::{
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use tagwise::{Engine, EngineConfig, TextSpan};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TagwiseEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl TagwiseEnvGuard {
    pub fn set_config_home(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = std::env::var(tagwise::app_dirs::CONFIG_HOME_ENV).ok();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(tagwise::app_dirs::CONFIG_HOME_ENV, path);
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for TagwiseEnvGuard {
    fn drop(&mut self) {
        if let Some(value) = self.previous.take() {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::set_var(tagwise::app_dirs::CONFIG_HOME_ENV, value);
            }
        } else {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::remove_var(tagwise::app_dirs::CONFIG_HOME_ENV);
            }
        }
    }
}

/// Config that keeps the database and model store inside `dir`.
pub fn config_in(dir: &Path) -> EngineConfig {
    EngineConfig {
        database_path: Some(dir.join("learners.db")),
        model_root: Some(dir.join("models")),
        ..EngineConfig::default()
    }
}

pub fn open_engine(dir: &Path) -> Engine {
    Engine::open(config_in(dir)).expect("open engine")
}

pub fn spans(texts: &[&str]) -> Vec<TextSpan> {
    texts.iter().map(|text| TextSpan::new(*text)).collect()
}
