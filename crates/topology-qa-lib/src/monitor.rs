//! Progress and cancellation monitor
//!
//! Long-running phases report coarse progress (a phase label) and fine progress
//! (current/total counts) to a [`TaskMonitor`], and poll it for cooperative
//! cancellation after each unit of work. Monitors are shared by the parallel
//! query workers, so every method takes `&self`.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Cooperative progress/cancellation contract
pub trait TaskMonitor: Send + Sync {
    /// Signal that the running computation will honour cancellation from now on
    fn allow_cancellation_requests(&self);

    /// Report the start of a phase
    fn report(&self, message: &str);

    /// Report fine-grained progress within the current phase
    fn report_progress(&self, current: usize, total: usize, unit: &str);

    /// Check whether the caller asked the computation to stop
    fn is_cancel_requested(&self) -> bool;
}

/// Monitor for headless use: ignores reports, never cancels
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMonitor;

impl TaskMonitor for NullMonitor {
    fn allow_cancellation_requests(&self) {}

    fn report(&self, _message: &str) {}

    fn report_progress(&self, _current: usize, _total: usize, _unit: &str) {}

    fn is_cancel_requested(&self) -> bool {
        false
    }
}

/// Monitor which forwards reports to `tracing`
///
/// Phases are logged at `info`, progress at `trace`. [`TracingMonitor::cancel`]
/// may be called from any thread; the request only takes effect once the
/// computation has allowed cancellation.
#[derive(Debug, Default)]
pub struct TracingMonitor {
    cancellation_allowed: AtomicBool,
    cancel_requested: AtomicBool,
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running computation to stop
    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel_requested.store(true, Ordering::Relaxed);
    }
}

impl TaskMonitor for TracingMonitor {
    fn allow_cancellation_requests(&self) {
        self.cancellation_allowed.store(true, Ordering::Relaxed);
    }

    fn report(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn report_progress(&self, current: usize, total: usize, unit: &str) {
        tracing::trace!(current, total, unit, "Progress");
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancellation_allowed.load(Ordering::Relaxed)
            && self.cancel_requested.load(Ordering::Relaxed)
    }
}

/// Single-shot computation latch shared by the finders
///
/// The first run either completes (results are cached) or is cancelled; both
/// are final.
#[derive(Debug)]
pub(crate) enum Computation<R> {
    Pending,
    Done(R),
    Cancelled,
}

impl<R> Default for Computation<R> {
    fn default() -> Self {
        Computation::Pending
    }
}

impl<R> Computation<R> {
    /// Run `compute` unless a previous run already settled the outcome
    pub(crate) fn get_or_run(&mut self, compute: impl FnOnce() -> Option<R>) -> Option<&R> {
        if matches!(self, Computation::Pending) {
            *self = match compute() {
                Some(results) => Computation::Done(results),
                None => Computation::Cancelled,
            };
        }
        self.get()
    }

    pub(crate) fn get(&self) -> Option<&R> {
        match self {
            Computation::Done(results) => Some(results),
            Computation::Pending | Computation::Cancelled => None,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self, Computation::Pending)
    }
}

/// Map `items` in parallel, polling for cancellation before each unit
///
/// Output order equals input order. Returns None as soon as the monitor asks
/// to stop; partial output is discarded.
pub(crate) fn par_map_monitored<T, R, F>(
    items: &[T],
    monitor: &dyn TaskMonitor,
    unit: &str,
    f: F,
) -> Option<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    let total = items.len();
    let done = AtomicUsize::new(0);
    items
        .par_iter()
        .map(|item| {
            if monitor.is_cancel_requested() {
                return None;
            }
            let result = f(item);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            monitor.report_progress(current, total, unit);
            Some(result)
        })
        .collect()
}
