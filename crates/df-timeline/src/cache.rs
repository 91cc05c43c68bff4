//! Decoded PCM cache
//!
//! Playback and export share one cache so each blob is decoded once while it
//! is in use. The cache is bounded by decoded bytes and evicts the entry
//! touched longest ago; it never shrinks below [`MIN_CACHE_ENTRIES`].

use std::collections::HashMap;
use std::sync::Arc;

use df_core::AudioRef;
use df_file::AudioData;
use parking_lot::Mutex;

/// 256 MiB of decoded samples
pub const DEFAULT_CACHE_MAX_BYTES: usize = 256 * 1024 * 1024;

/// Entries kept even when they exceed the byte budget
pub const MIN_CACHE_ENTRIES: usize = 4;

struct Slot {
    pcm: Arc<AudioData>,
    bytes: usize,
    /// Value of `CacheState::tick` at the last hit or insert
    touched: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<AudioRef, Slot>,
    bytes: usize,
    tick: u64,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &AudioRef) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.bytes -= slot.bytes;
        Some(slot)
    }

    /// Drop stale entries until `incoming` more bytes fit
    fn make_room(&mut self, incoming: usize, budget: usize) {
        while self.bytes + incoming > budget && self.slots.len() > MIN_CACHE_ENTRIES {
            let Some(stale) = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.touched)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(slot) = self.remove(&stale) {
                log::debug!("Dropped decoded '{}' from cache ({} bytes)", stale, slot.bytes);
            }
        }
    }
}

pub struct AudioCache {
    state: Mutex<CacheState>,
    max_bytes: usize,
}

impl AudioCache {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_CACHE_MAX_BYTES)
    }

    pub fn with_max_size(max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_bytes,
        }
    }

    /// Cached PCM for `key`, or the result of `load` (cached only on success)
    pub fn get_or_load<E, F>(&self, key: &AudioRef, load: F) -> Result<Arc<AudioData>, E>
    where
        F: FnOnce() -> Result<AudioData, E>,
    {
        if let Some(pcm) = self.get(key) {
            return Ok(pcm);
        }
        let pcm = Arc::new(load()?);
        self.insert(key.clone(), Arc::clone(&pcm));
        Ok(pcm)
    }

    /// Cached PCM without loading; counts as a use
    pub fn get(&self, key: &AudioRef) -> Option<Arc<AudioData>> {
        let mut state = self.state.lock();
        let tick = state.touch();
        let slot = state.slots.get_mut(key)?;
        slot.touched = tick;
        Some(Arc::clone(&slot.pcm))
    }

    pub fn is_cached(&self, key: &AudioRef) -> bool {
        self.state.lock().slots.contains_key(key)
    }

    pub fn insert(&self, key: AudioRef, pcm: Arc<AudioData>) {
        let bytes = pcm.size_bytes();
        let mut state = self.state.lock();

        state.remove(&key);
        state.make_room(bytes, self.max_bytes);

        let touched = state.touch();
        state.bytes += bytes;
        log::debug!("Cached decoded '{}' ({} bytes, {} total)", key, bytes, state.bytes);
        state.slots.insert(key, Slot { pcm, bytes, touched });
    }

    /// Forget `key`, e.g. after its blob was rewritten
    pub fn invalidate(&self, key: &AudioRef) {
        self.state.lock().remove(key);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.slots.clear();
        state.bytes = 0;
    }

    /// Number of cached entries
    pub fn size(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Decoded bytes held
    pub fn memory_usage(&self) -> usize {
        self.state.lock().bytes
    }

    pub fn max_size(&self) -> usize {
        self.max_bytes
    }
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new()
    }
}
