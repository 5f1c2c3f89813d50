//! Activation registry for label caches
//!
//! Multiple camera pipelines can run concurrently, each with its own
//! [`LabelCache`](super::LabelCache) over a shared label config. The
//! rendering side accumulates unresolved instance ids during a frame and
//! triggers one matching pass; the registry fans that pass out to every
//! cache registered under the same config. The registry is always passed by
//! handle, never held in a process-wide static.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::trace;
use parking_lot::Mutex;

use super::cache::{CacheInner, InstanceId};
use super::{LabelConfig, LabelingDescriptor};

/// Caches are grouped by label-config identity, not content.
fn config_key(config: &Arc<LabelConfig>) -> usize {
    Arc::as_ptr(config) as usize
}

#[derive(Default)]
pub struct CacheRegistry {
    active: Mutex<HashMap<usize, Vec<Weak<CacheInner>>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, inner: &Arc<CacheInner>) {
        let mut active = self.active.lock();
        active
            .entry(config_key(inner.config()))
            .or_default()
            .push(Arc::downgrade(inner));
    }

    pub(crate) fn deregister(&self, inner: &Arc<CacheInner>) {
        let mut active = self.active.lock();
        let key = config_key(inner.config());
        if let Some(caches) = active.get_mut(&key) {
            caches.retain(|weak| !std::ptr::eq(weak.as_ptr(), Arc::as_ptr(inner)));
            if caches.is_empty() {
                active.remove(&key);
            }
        }
    }

    /// Number of live caches registered under `config`.
    pub fn active_count(&self, config: &Arc<LabelConfig>) -> usize {
        let active = self.active.lock();
        active
            .get(&config_key(config))
            .map(|caches| caches.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// The shared once-per-frame matching pass.
    ///
    /// Batch-populates every active cache registered under `config` with the
    /// frame's accumulated miss list. Dead registrations are pruned as a side
    /// effect. Returns the number of caches visited.
    pub fn populate_active(
        &self,
        config: &Arc<LabelConfig>,
        requests: &[(InstanceId, LabelingDescriptor)],
    ) -> usize {
        if requests.is_empty() {
            return 0;
        }
        let caches: Vec<Arc<CacheInner>> = {
            let mut active = self.active.lock();
            match active.get_mut(&config_key(config)) {
                Some(registered) => {
                    registered.retain(|weak| weak.strong_count() > 0);
                    registered.iter().filter_map(Weak::upgrade).collect()
                }
                None => Vec::new(),
            }
        };
        trace!(
            "label matching pass: {} requests across {} caches",
            requests.len(),
            caches.len()
        );
        for cache in &caches {
            for (id, descriptor) in requests {
                cache.populate(*id, descriptor);
            }
        }
        caches.len()
    }
}
