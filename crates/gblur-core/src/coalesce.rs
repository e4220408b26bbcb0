//! Single-flight, latest-wins request coalescing.
//!
//! [`RequestCoalescer`] drives an async work function from a stream of
//! parameter updates (for example a radius slider) without queueing stale
//! work and without ever running two executions at once.
//!
//! # Model
//!
//! ```text
//! request(p) ──> pending = Some(p)
//!                 │
//!                 ├── a drain is active ─────────> return Ok(())
//!                 │
//!                 └── become the drainer:
//!                       loop { take pending ──> work(p).await ──> observers }
//!                       until pending is empty
//! ```
//!
//! Values written while an execution is in flight overwrite each other; only
//! the latest runs once the in-flight execution completes. The caller that
//! started a drain waits for it to empty the slot. Everyone else returns
//! immediately.
//!
//! The coalescer spawns nothing. It runs on whatever executor polls the
//! drainer's future, and never holds its lock across an `.await`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use gblur_core::RequestCoalescer;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let coalescer = RequestCoalescer::new(|radius: u32| async move { Ok::<_, String>(radius * 2) })
//!     .on_result(move |r| sink.lock().unwrap().push(r));
//!
//! pollster::block_on(coalescer.request(4)).unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![8]);
//! assert_eq!(coalescer.executions(), 1);
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, trace, warn};

use crate::error::CoalescedTaskError;

type ResultObserver<R> = Box<dyn Fn(R) + Send + Sync>;
type ErrorObserver<E> = Box<dyn Fn(&E) + Send + Sync>;

#[derive(Debug)]
struct State<P> {
    pending: Option<P>,
    draining: bool,
}

/// Runs an async work function with at most one execution in flight,
/// always on the most recently requested parameters.
pub struct RequestCoalescer<P, R, E, F> {
    work: F,
    state: Mutex<State<P>>,
    executions: AtomicU64,
    on_result: Option<ResultObserver<R>>,
    on_error: Option<ErrorObserver<E>>,
}

impl<P, R, E, F, Fut> RequestCoalescer<P, R, E, F>
where
    F: Fn(P) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    /// Wraps `work`. Nothing runs until the first [`request`](Self::request).
    pub fn new(work: F) -> Self {
        Self {
            work,
            state: Mutex::new(State {
                pending: None,
                draining: false,
            }),
            executions: AtomicU64::new(0),
            on_result: None,
            on_error: None,
        }
    }

    /// Observer called with every successful result.
    pub fn on_result(mut self, observer: impl Fn(R) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Box::new(observer));
        self
    }

    /// Observer called with every failure. Draining continues afterwards.
    pub fn on_error(mut self, observer: impl Fn(&E) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(observer));
        self
    }

    /// Submits `params`, replacing any value that has not started yet.
    ///
    /// Returns `Ok(())` immediately when another caller is draining; that
    /// caller will pick `params` up. Otherwise this call drains until no
    /// value is pending.
    ///
    /// # Errors
    ///
    /// Only the draining caller can fail: if any execution during its drain
    /// failed, it gets a [`CoalescedTaskError`] carrying the most recent
    /// failure once the slot is empty.
    pub async fn request(&self, params: P) -> Result<(), CoalescedTaskError<E>> {
        {
            let mut state = self.lock();
            let replaced = state.pending.replace(params).is_some();
            if state.draining {
                trace!(replaced, "request coalesced into active drain");
                return Ok(());
            }
            state.draining = true;
        }

        let mut guard = DrainGuard {
            state: &self.state,
            finished: false,
        };
        let mut failure: Option<CoalescedTaskError<E>> = None;
        let mut runs = 0u64;

        loop {
            let next = {
                let mut state = self.lock();
                match state.pending.take() {
                    Some(p) => p,
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            let outcome = (self.work)(next).await;
            self.executions.fetch_add(1, Ordering::Relaxed);
            runs += 1;

            match outcome {
                Ok(result) => {
                    if let Some(observer) = &self.on_result {
                        observer(result);
                    }
                }
                Err(err) => {
                    if let Some(observer) = &self.on_error {
                        observer(&err);
                    }
                    failure = Some(match failure.take() {
                        Some(prev) => prev.supersede(err),
                        None => CoalescedTaskError::new(err),
                    });
                    warn!(
                        failures = failure.as_ref().map_or(0, |f| f.failures()),
                        "coalesced task failed, continuing drain"
                    );
                }
            }
        }

        guard.finished = true;
        debug!(runs, "drain finished");

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<P, R, E, F> RequestCoalescer<P, R, E, F> {
    fn lock(&self) -> MutexGuard<'_, State<P>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a drain loop is currently running.
    pub fn is_active(&self) -> bool {
        self.lock().draining
    }

    /// Whether a value is waiting to be picked up.
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Number of completed work invocations, successful or not.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }
}

impl<P, R, E, F> std::fmt::Debug for RequestCoalescer<P, R, E, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestCoalescer")
            .field("draining", &state.draining)
            .field("has_pending", &state.pending.is_some())
            .field("executions", &self.executions())
            .finish()
    }
}

/// Clears the draining flag if the drainer unwinds or its future is dropped.
struct DrainGuard<'a, P> {
    state: &'a Mutex<State<P>>,
    finished: bool,
}

impl<P> Drop for DrainGuard<'_, P> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Condvar};
    use std::thread;

    /// One-shot latch.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }

        fn wait(&self) {
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cv.wait(open).unwrap();
            }
        }
    }

    /// Shared bookkeeping for a work function that blocks its first call.
    #[derive(Default)]
    struct Tracker {
        started: Gate,
        release: Gate,
        running: AtomicBool,
        overlapped: AtomicBool,
        order: Mutex<Vec<u32>>,
        first: AtomicBool,
    }

    impl Tracker {
        fn enter(&self, p: u32) {
            if self.running.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.order.lock().unwrap().push(p);
            if !self.first.swap(true, Ordering::SeqCst) {
                self.started.open();
                self.release.wait();
            }
        }

        fn leave(&self) {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_single_request_runs_once() {
        let c = RequestCoalescer::new(|p: u32| async move { Ok::<_, String>(p) });
        assert!(!c.is_active());
        pollster::block_on(c.request(3)).unwrap();
        assert_eq!(c.executions(), 1);
        assert!(!c.is_active());
        assert!(!c.has_pending());
    }

    #[test]
    fn test_latest_wins_no_overlap() {
        let tracker = Arc::new(Tracker::default());
        let results = Arc::new(Mutex::new(Vec::new()));

        let work_tracker = tracker.clone();
        let sink = results.clone();
        let coalescer = Arc::new(
            RequestCoalescer::new(move |p: u32| {
                let tracker = work_tracker.clone();
                async move {
                    tracker.enter(p);
                    tracker.leave();
                    Ok::<_, String>(p)
                }
            })
            .on_result(move |r| sink.lock().unwrap().push(r)),
        );

        let drainer = {
            let c = coalescer.clone();
            thread::spawn(move || pollster::block_on(c.request(0)))
        };
        tracker.started.wait();
        assert!(coalescer.is_active());

        // Rapid updates while the first execution is blocked.
        for p in 1..=10 {
            assert!(pollster::block_on(coalescer.request(p)).is_ok());
        }
        assert!(coalescer.has_pending());

        tracker.release.open();
        drainer.join().unwrap().unwrap();

        assert_eq!(*tracker.order.lock().unwrap(), vec![0, 10]);
        assert_eq!(*results.lock().unwrap(), vec![0, 10]);
        assert!(!tracker.overlapped.load(Ordering::SeqCst));
        assert_eq!(coalescer.executions(), 2);
        assert!(coalescer.executions() < 11);
        assert!(!coalescer.is_active());
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn test_failure_does_not_stop_later_requests() {
        let tracker = Arc::new(Tracker::default());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::new(Mutex::new(Vec::new()));

        let work_tracker = tracker.clone();
        let err_sink = errors.clone();
        let ok_sink = results.clone();
        let coalescer = Arc::new(
            RequestCoalescer::new(move |p: u32| {
                let tracker = work_tracker.clone();
                async move {
                    tracker.enter(p);
                    tracker.leave();
                    if p == 0 {
                        Err(format!("radius {p} rejected"))
                    } else {
                        Ok(p)
                    }
                }
            })
            .on_error(move |e: &String| err_sink.lock().unwrap().push(e.clone()))
            .on_result(move |r| ok_sink.lock().unwrap().push(r)),
        );

        let drainer = {
            let c = coalescer.clone();
            thread::spawn(move || pollster::block_on(c.request(0)))
        };
        tracker.started.wait();
        pollster::block_on(coalescer.request(5)).unwrap();
        tracker.release.open();

        let err = drainer.join().unwrap().unwrap_err();
        assert_eq!(err.failures(), 1);
        assert_eq!(err.error(), "radius 0 rejected");
        assert_eq!(*errors.lock().unwrap(), vec!["radius 0 rejected".to_string()]);
        assert_eq!(*results.lock().unwrap(), vec![5]);
        assert_eq!(coalescer.executions(), 2);

        // Still usable after a failed drain.
        pollster::block_on(coalescer.request(7)).unwrap();
        assert_eq!(*results.lock().unwrap(), vec![5, 7]);
    }

    #[test]
    fn test_failure_reported_to_drainer_only() {
        let c = RequestCoalescer::new(|p: i32| async move {
            if p < 0 { Err(p) } else { Ok(p) }
        });
        let err = pollster::block_on(c.request(-4)).unwrap_err();
        assert_eq!(err.into_inner(), -4);
        assert!(pollster::block_on(c.request(4)).is_ok());
        assert_eq!(c.executions(), 2);
    }

    #[test]
    fn test_panicking_work_does_not_wedge() {
        let c = Arc::new(RequestCoalescer::new(|p: u32| async move {
            if p == 0 {
                panic!("boom");
            }
            Ok::<_, String>(p)
        }));

        let panicker = {
            let c = c.clone();
            thread::spawn(move || pollster::block_on(c.request(0)))
        };
        assert!(panicker.join().is_err());
        assert!(!c.is_active());

        pollster::block_on(c.request(1)).unwrap();
        assert_eq!(c.executions(), 1);
    }

    #[test]
    fn test_debug_reports_state() {
        let c = RequestCoalescer::new(|p: u8| async move { Ok::<_, ()>(p) });
        let s = format!("{c:?}");
        assert!(s.contains("draining: false"));
        assert!(s.contains("executions: 0"));
    }
}
