//! Instance-id to label-entry-index cache
//!
//! Converts repeated per-frame label matching into O(1) array indexing keyed
//! by the renderer-assigned instance id. Storage grows monotonically with the
//! highest id ever seen and is never reclaimed while the cache is live; that
//! growth is an accepted tradeoff, with [`LabelCache::reset`] as the manual
//! escape hatch for long-running sessions.

use std::sync::Arc;

use parking_lot::Mutex;

use super::registry::CacheRegistry;
use super::{LabelConfig, LabelEntry, LabelingDescriptor};

/// Renderer-assigned per-object identifier. Possibly sparse, unbounded.
pub type InstanceId = u32;

/// Slot value meaning "never populated". Set slots store `index + 1` so that
/// zero-filled growth leaves new slots unset.
const UNSET: u16 = 0;

pub(crate) struct CacheInner {
    config: Arc<LabelConfig>,
    slots: Mutex<Vec<u16>>,
}

impl CacheInner {
    pub(crate) fn try_resolve(&self, id: InstanceId) -> Option<(u16, &LabelEntry)> {
        let raw = {
            let slots = self.slots.lock();
            *slots.get(id as usize)?
        };
        if raw == UNSET {
            return None;
        }
        let index = raw - 1;
        let entry = self.config.entries().get(index as usize)?;
        Some((index, entry))
    }

    pub(crate) fn populate(&self, id: InstanceId, descriptor: &LabelingDescriptor) -> bool {
        // No negative cache: an unmatched object retries matching every frame
        // it is rendered. Match failure is rare enough in practice.
        let Some((index, _)) = self.config.match_descriptor(descriptor) else {
            return false;
        };
        let mut slots = self.slots.lock();
        let needed = id as usize + 1;
        if slots.len() < needed {
            let grown = needed.max(slots.len() * 2);
            slots.resize(grown, UNSET);
        }
        slots[id as usize] = index + 1;
        true
    }

    pub(crate) fn config(&self) -> &Arc<LabelConfig> {
        &self.config
    }
}

/// Per-labeler cache of `InstanceId -> LabelEntryIndex`.
///
/// Registers itself with the shared [`CacheRegistry`] on construction so the
/// once-per-frame matching pass can batch-populate every active cache, and
/// deregisters on drop. Slot writes happen on the thread driving per-frame
/// labeling; the registry pass runs on that same thread.
pub struct LabelCache {
    inner: Arc<CacheInner>,
    registry: Arc<CacheRegistry>,
}

impl LabelCache {
    pub fn new(config: Arc<LabelConfig>, registry: Arc<CacheRegistry>) -> Self {
        let inner = Arc::new(CacheInner {
            config,
            slots: Mutex::new(Vec::new()),
        });
        registry.register(&inner);
        Self { inner, registry }
    }

    /// Looks up the cached label entry for an instance id.
    ///
    /// Returns `None` when the id is beyond current capacity or its slot was
    /// never populated. No side effects.
    pub fn try_resolve(&self, id: InstanceId) -> Option<(u16, &LabelEntry)> {
        self.inner.try_resolve(id)
    }

    /// Matches the descriptor against the label config and, on success,
    /// records the resulting entry index for `id`. Returns whether a match
    /// was recorded.
    pub fn populate(&self, id: InstanceId, descriptor: &LabelingDescriptor) -> bool {
        self.inner.populate(id, descriptor)
    }

    /// Releases the backing slot table. All cached identities are forgotten;
    /// subsequent lookups miss and repopulate.
    pub fn reset(&self) {
        let mut slots = self.inner.slots.lock();
        *slots = Vec::new();
    }

    /// Current slot capacity (highest grown extent, not population count).
    pub fn capacity(&self) -> usize {
        self.inner.slots.lock().len()
    }

    pub fn config(&self) -> &Arc<LabelConfig> {
        &self.inner.config
    }
}

impl Drop for LabelCache {
    fn drop(&mut self) {
        self.registry.deregister(&self.inner);
    }
}
