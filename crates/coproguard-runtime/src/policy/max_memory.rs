//! Sampled memory ceiling.
//!
//! The footprint is sampled, not accounted: a call can still allocate past the
//! bound between two samples. This is an early refusal, never a hard cap.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use coproguard_core::{Outcome, PolicyError};

use super::Policy;
use crate::context::InvocationContext;

const NEVER: u64 = u64::MAX;

/// Source of the current process memory footprint.
pub trait MemoryProbe: Send + Sync {
    /// Resident bytes, or `None` when the platform offers no measurement.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads resident pages from `/proc/self/statm` (Linux, 4 KiB pages assumed).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcStatmProbe;

impl MemoryProbe for ProcStatmProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let statm = fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages * 4096)
    }
}

pub struct MaxMemoryPolicy {
    byte_bound: u64,
    sample_window: Duration,
    probe: Arc<dyn MemoryProbe>,
    epoch: Instant,
    last_sample: AtomicU64,
    sampled_at_micros: AtomicU64,
    peak: AtomicU64,
}

impl MaxMemoryPolicy {
    pub fn new(byte_bound: u64, sample_window: Duration) -> Self {
        Self::with_probe(byte_bound, sample_window, Arc::new(ProcStatmProbe))
    }

    pub fn with_probe(byte_bound: u64, sample_window: Duration, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            byte_bound,
            sample_window,
            probe,
            epoch: Instant::now(),
            last_sample: AtomicU64::new(NEVER),
            sampled_at_micros: AtomicU64::new(NEVER),
            peak: AtomicU64::new(0),
        }
    }

    /// Most recent footprint sample.
    pub fn last_sample(&self) -> Option<u64> {
        match self.last_sample.load(Ordering::Acquire) {
            NEVER => None,
            v => Some(v),
        }
    }

    /// Highest footprint sampled so far.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    fn now_micros(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(NEVER - 1)
    }

    fn sample(&self) -> Option<u64> {
        let bytes = self.probe.resident_bytes()?;
        self.last_sample.store(bytes, Ordering::Release);
        self.sampled_at_micros
            .store(self.now_micros(), Ordering::Release);
        self.peak.fetch_max(bytes, Ordering::AcqRel);
        Some(bytes)
    }

    /// Cached sample while younger than the window, fresh one otherwise.
    fn current(&self) -> Option<u64> {
        let sampled_at = self.sampled_at_micros.load(Ordering::Acquire);
        let window = u64::try_from(self.sample_window.as_micros()).unwrap_or(NEVER);
        if sampled_at != NEVER && self.now_micros().saturating_sub(sampled_at) < window {
            return self.last_sample();
        }
        self.sample()
    }
}

impl Policy for MaxMemoryPolicy {
    fn name(&self) -> &str {
        "max_memory"
    }

    fn before_invoke(&self, operation: &str, _ctx: &InvocationContext) -> Result<(), PolicyError> {
        let Some(bytes) = self.current() else {
            tracing::debug!(operation, "memory probe unavailable, not enforcing bound");
            return Ok(());
        };
        if bytes > self.byte_bound {
            return Err(PolicyError::reject(format!(
                "sampled footprint {bytes} bytes exceeds bound of {} bytes",
                self.byte_bound
            )));
        }
        Ok(())
    }

    fn after_invoke(
        &self,
        operation: &str,
        _ctx: &InvocationContext,
        _outcome: &Outcome,
    ) -> Result<(), PolicyError> {
        if let Some(bytes) = self.sample() {
            tracing::trace!(operation, bytes, peak = self.peak(), "post-call memory sample");
        }
        Ok(())
    }
}
