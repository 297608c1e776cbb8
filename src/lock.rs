//! Named mutual exclusion for learner mutations.
//!
//! Training a `(tag, user)` learner must happen under the lock returned by
//! [`lock_name`]. Callers take the lock around facade calls; the facade never
//! locks on its own. Guards release on drop, including during unwinding.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Username used in lock names of global (pretrained) learners.
pub const GLOBAL_LOCK_OWNER: &str = "global";

/// Lock name for a learner: `OL_{tag}_{username}`.
pub fn lock_name(tag: &str, user: Option<&str>) -> String {
    format!("OL_{tag}_{}", user.unwrap_or(GLOBAL_LOCK_OWNER))
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },
}

/// Scoped lock handle; the lock is released when this is dropped.
pub struct LockGuard<'a> {
    name: String,
    release: Option<Box<dyn FnOnce() + Send + 'a>>,
}

impl<'a> LockGuard<'a> {
    pub fn new(name: impl Into<String>, release: impl FnOnce() + Send + 'a) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::trace!("Released lock {}", self.name);
        }
    }
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

/// Lock primitive consumed by the engine. Distributed deployments plug in
/// their own implementation.
pub trait NamedLock: Send + Sync {
    fn acquire(&self, name: &str) -> Result<LockGuard<'_>, LockError>;
}

/// Process-local named locks with an optional acquisition timeout.
#[derive(Debug, Default)]
pub struct LocalLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
    timeout: Option<Duration>,
}

impl LocalLocks {
    /// `timeout: None` waits until the lock is free.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held().contains(name)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn release(&self, name: &str) {
        self.held().remove(name);
        self.released.notify_all();
    }
}

impl NamedLock for LocalLocks {
    fn acquire(&self, name: &str) -> Result<LockGuard<'_>, LockError> {
        let started = Instant::now();
        let mut held = self.held();
        while held.contains(name) {
            held = match self.timeout {
                None => self
                    .released
                    .wait(held)
                    .unwrap_or_else(|err| err.into_inner()),
                Some(timeout) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LockError::Timeout {
                            name: name.to_string(),
                            waited,
                        });
                    }
                    self.released
                        .wait_timeout(held, timeout - waited)
                        .unwrap_or_else(|err| err.into_inner())
                        .0
                }
            };
        }
        held.insert(name.to_string());
        drop(held);
        tracing::trace!("Acquired lock {name}");
        let owned = name.to_string();
        Ok(LockGuard::new(name, move || self.release(&owned)))
    }
}
