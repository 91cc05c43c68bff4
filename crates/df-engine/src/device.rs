//! Output ownership
//!
//! An audio output can be driven by one scheduler at a time. Each output
//! carries an [`OutputSlot`]; a scheduler holds an [`OutputLease`] on it for
//! as long as it is playing. Real devices share the process-wide slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::{PlaybackError, PlaybackResult};

pub struct OutputSlot {
    name: String,
    leased: AtomicBool,
}

static DEFAULT_SLOT: OnceLock<Arc<OutputSlot>> = OnceLock::new();

impl OutputSlot {
    /// A private slot (offline mixers, tests)
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            leased: AtomicBool::new(false),
        })
    }

    /// The process-wide slot of the default audio output
    pub fn process_default() -> Arc<Self> {
        Arc::clone(DEFAULT_SLOT.get_or_init(|| Self::new("default")))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_leased(&self) -> bool {
        self.leased.load(Ordering::Acquire)
    }

    /// Take exclusive use of the output
    pub fn try_lease(self: &Arc<Self>) -> PlaybackResult<OutputLease> {
        self.leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PlaybackError::OutputBusy(self.name.clone()))?;
        log::debug!("Output '{}' leased", self.name);
        Ok(OutputLease {
            slot: Arc::clone(self),
        })
    }
}

/// Exclusive use of an output; released on drop
pub struct OutputLease {
    slot: Arc<OutputSlot>,
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        self.slot.leased.store(false, Ordering::Release);
        log::debug!("Output '{}' released", self.slot.name);
    }
}
