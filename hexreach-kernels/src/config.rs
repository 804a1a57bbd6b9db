//! Run-level configuration threaded through kernel constructors.
//!
//! There is deliberately no module-level mutable state anywhere in the
//! engine; everything a kernel needs to know arrives in a [`RunConfig`].

use crate::{KernelError, MAX_CUTOFF_SECONDS};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation handle shared between a watchdog (or signal
/// handler) and running kernels. Kernels poll it between bucket scans;
/// a cancelled kernel abandons its output.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Knobs for one engine run.
#[derive(Clone)]
pub struct RunConfig {
    /// Distinct nearest anchors kept per node.
    pub k: usize,
    /// Informational cutoff; nodes whose K-th label lands beyond it are
    /// flagged as low-confidence.
    pub primary_cutoff_s: u32,
    /// Hard cutoff; labels beyond it are never propagated.
    pub overflow_cutoff_s: u32,
    /// Bucket width is `2^bucket_width_log2` seconds.
    pub bucket_width_log2: u8,
    /// Inter-label worker count for D_anchor batches.
    pub workers: usize,
    pub cancel: CancelFlag,
}

impl RunConfig {
    /// Checks the parameter ranges shared by both kernels.
    ///
    /// # Errors
    ///
    /// [`KernelError::InvalidK`] or [`KernelError::InvalidCutoff`] when a
    /// knob is out of range.
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.k < 1 || self.k > usize::from(u8::MAX) {
            return Err(KernelError::InvalidK);
        }
        if self.primary_cutoff_s > self.overflow_cutoff_s
            || self.overflow_cutoff_s > MAX_CUTOFF_SECONDS
        {
            return Err(KernelError::InvalidCutoff {
                primary: self.primary_cutoff_s,
                overflow: self.overflow_cutoff_s,
            });
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> RunConfig {
        RunConfig {
            k: 20,
            primary_cutoff_s: 30 * 60,
            overflow_cutoff_s: 60 * 60,
            bucket_width_log2: 2,
            workers: 1,
            cancel: CancelFlag::new(),
        }
    }
}
