//! Backend registry: maps (platform, format) pairs to backend
//! implementations.
//!
//! The registry is populated once at process start from the discovered
//! backend set and treated as read-only afterwards, so lookups never race
//! with registration.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::Backend;
use crate::core::platform::TargetPair;

/// Registration and lookup failures. Both indicate plugin-setup bugs and
/// are fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no backend registered for target `{target}`")]
    UnknownTarget {
        target: TargetPair,
        registered: Vec<TargetPair>,
    },

    #[error("backend `{incoming}` conflicts with `{existing}` already registered for `{target}`")]
    ConflictingRegistration {
        target: TargetPair,
        existing: String,
        incoming: String,
    },
}

/// Registry of backends keyed by (platform, format).
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<TargetPair, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for a target pair.
    ///
    /// Re-registering the identical backend (same identity name) is a
    /// no-op; claiming an occupied pair with a different backend fails with
    /// [`RegistryError::ConflictingRegistration`] so one plugin can never
    /// silently shadow another.
    pub fn register(
        &mut self,
        target: TargetPair,
        backend: Arc<dyn Backend>,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.backends.get(&target) {
            if existing.name() == backend.name() {
                return Ok(());
            }
            return Err(RegistryError::ConflictingRegistration {
                target,
                existing: existing.name().to_string(),
                incoming: backend.name().to_string(),
            });
        }

        tracing::debug!("registered backend `{}` for {}", backend.name(), target);
        self.backends.insert(target, backend);
        Ok(())
    }

    /// Look up the backend for a target pair.
    pub fn lookup(&self, target: &TargetPair) -> Result<Arc<dyn Backend>, RegistryError> {
        self.backends
            .get(target)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTarget {
                target: target.clone(),
                registered: self.targets().cloned().collect(),
            })
    }

    /// All registered target pairs, in order.
    pub fn targets(&self) -> impl Iterator<Item = &TargetPair> {
        self.backends.keys()
    }

    /// All registered (target, backend) entries.
    pub fn entries(&self) -> impl Iterator<Item = (&TargetPair, &Arc<dyn Backend>)> {
        self.backends.iter()
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether any backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
