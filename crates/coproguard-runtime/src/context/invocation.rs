use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use coproguard_core::InvocationState;

const NO_DEADLINE: u64 = u64::MAX;
const NOT_STARTED: u64 = u64::MAX;

/// Handle the guarded call operates on (a coprocessor environment, a region, ...).
pub trait Environment: Send + Sync + 'static {
    /// One-line description used in log lines.
    fn summary(&self) -> String;
}

/// Per-call state shared by every policy and the guarded action.
///
/// Cloning yields another handle to the same invocation; a fresh context
/// must be created for every call.
#[derive(Clone)]
pub struct InvocationContext {
    inner: Arc<Inner>,
}

struct Inner {
    env: Arc<dyn Environment>,
    bypass: AtomicBool,
    complete: AtomicBool,
    deadline_nanos: AtomicU64,
    state: AtomicU8,
    cancel: CancellationToken,
    created_at: Instant,
    // Offset from `created_at` at which the guarded call began.
    started_nanos: AtomicU64,
}

impl InvocationContext {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            inner: Arc::new(Inner {
                env,
                bypass: AtomicBool::new(false),
                complete: AtomicBool::new(false),
                deadline_nanos: AtomicU64::new(NO_DEADLINE),
                state: AtomicU8::new(InvocationState::Pending as u8),
                cancel: CancellationToken::new(),
                created_at: Instant::now(),
                started_nanos: AtomicU64::new(NOT_STARTED),
            }),
        }
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.inner.env
    }

    pub fn summary(&self) -> String {
        self.inner.env.summary()
    }

    /// Ask the host to skip its default processing after this call.
    pub fn set_bypass(&self) {
        self.inner.bypass.store(true, Ordering::Release);
    }

    /// Ask the host to stop running further plugins after this call.
    pub fn set_complete(&self) {
        self.inner.complete.store(true, Ordering::Release);
    }

    pub fn bypass(&self) -> bool {
        self.inner.bypass.load(Ordering::Acquire)
    }

    pub fn complete(&self) -> bool {
        self.inner.complete.load(Ordering::Acquire)
    }

    /// Bound the call duration. With several bounds the tightest one wins.
    pub fn set_deadline(&self, bound: Duration) {
        let nanos = u64::try_from(bound.as_nanos()).unwrap_or(NO_DEADLINE - 1);
        self.inner.deadline_nanos.fetch_min(nanos, Ordering::AcqRel);
    }

    pub fn deadline(&self) -> Option<Duration> {
        match self.inner.deadline_nanos.load(Ordering::Acquire) {
            NO_DEADLINE => None,
            n => Some(Duration::from_nanos(n)),
        }
    }

    /// Cooperative cancellation signal, fired when the deadline expires.
    /// Plugin code may observe it; nothing forces it to.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Start of the guarded call, or of the context while no call has begun.
    pub fn started_at(&self) -> Instant {
        match self.inner.started_nanos.load(Ordering::Acquire) {
            NOT_STARTED => self.inner.created_at,
            n => self.inner.created_at + Duration::from_nanos(n),
        }
    }

    /// Time spent since the guarded call began.
    pub fn elapsed(&self) -> Duration {
        self.started_at().elapsed()
    }

    pub(crate) fn mark_started(&self) {
        let nanos = u64::try_from(self.inner.created_at.elapsed().as_nanos())
            .unwrap_or(NOT_STARTED - 1);
        self.inner.started_nanos.store(nanos, Ordering::Release);
    }

    pub fn state(&self) -> InvocationState {
        InvocationState::from_u8(self.inner.state.load(Ordering::Acquire))
            .unwrap_or(InvocationState::Pending)
    }

    pub(crate) fn transition(&self, next: InvocationState) {
        self.inner.state.store(next as u8, Ordering::Release);
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("env", &self.summary())
            .field("bypass", &self.bypass())
            .field("complete", &self.complete())
            .field("deadline", &self.deadline())
            .field("state", &self.state())
            .finish()
    }
}

/// Environment for calls that carry no host handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnvironment;

impl Environment for NoEnvironment {
    fn summary(&self) -> String {
        "-".to_string()
    }
}
