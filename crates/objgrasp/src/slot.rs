use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::JoinHandle;

use crate::analysis::{analyze_with_cancel, ObjectAnalysis};
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

/// Shared flag asking an analysis run to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of the token to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called on any clone of the token.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fail with [`AnalysisError::Cancelled`] once the token is cancelled.
    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() {
            Err(AnalysisError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// What a poll of the slot would currently see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// No run has been started, or the last one was cancelled.
    Empty,
    /// A run is in flight.
    InProgress,
    /// The latest run completed with an analysis.
    Ready,
    /// The latest run failed.
    Failed,
}

enum SlotState {
    Empty,
    InProgress(CancelToken),
    Ready(Arc<ObjectAnalysis>),
    Failed(Arc<AnalysisError>),
}

struct Inner {
    generation: u64,
    state: SlotState,
}

/// Single result cell for analyses running on a worker thread.
///
/// Starting a run cancels the one in flight. A run publishes its result only
/// if it was neither cancelled nor superseded, so readers see either nothing
/// or a complete analysis.
///
/// The slot is cheap to clone; clones share the same cell.
#[derive(Clone)]
pub struct AnalysisSlot {
    inner: Arc<Mutex<Inner>>,
}

impl Default for AnalysisSlot {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // the state is replaced wholesale, so a poisoned lock still holds a valid state
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AnalysisSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                state: SlotState::Empty,
            })),
        }
    }

    /// Analyze an object on a new worker thread.
    pub fn start(
        &self,
        points: Vec<[f64; 3]>,
        normals: Vec<[f64; 3]>,
        scene: Vec<[f64; 3]>,
        config: AnalysisConfig,
    ) -> JoinHandle<()> {
        self.start_with(move |cancel| analyze_with_cancel(&points, &normals, &scene, &config, cancel))
    }

    /// Run `job` on a new worker thread and publish its result.
    ///
    /// Any run in flight is cancelled first. The job receives the token of
    /// its own run and should stop early once it is cancelled.
    pub fn start_with<F>(&self, job: F) -> JoinHandle<()>
    where
        F: FnOnce(&CancelToken) -> Result<ObjectAnalysis, AnalysisError> + Send + 'static,
    {
        let token = CancelToken::new();
        let generation = {
            let mut inner = lock(&self.inner);
            if let SlotState::InProgress(previous) = &inner.state {
                previous.cancel();
            }
            inner.generation += 1;
            inner.state = SlotState::InProgress(token.clone());
            inner.generation
        };

        let shared = Arc::clone(&self.inner);
        std::thread::spawn(move || {
            let result = job(&token);

            let mut inner = lock(&shared);
            if inner.generation != generation || token.is_cancelled() {
                log::debug!("discarding the result of superseded analysis run {generation}");
                return;
            }
            inner.state = match result {
                Ok(analysis) => SlotState::Ready(Arc::new(analysis)),
                Err(err) => {
                    log::warn!("analysis run {generation} failed: {err}");
                    SlotState::Failed(Arc::new(err))
                }
            };
        })
    }

    /// Cancel the run in flight, if any, and empty the slot.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if let SlotState::InProgress(token) = &inner.state {
            token.cancel();
        }
        inner.generation += 1;
        inner.state = SlotState::Empty;
    }

    /// The completed analysis of the latest run.
    pub fn poll(&self) -> Option<Arc<ObjectAnalysis>> {
        match &lock(&self.inner).state {
            SlotState::Ready(analysis) => Some(Arc::clone(analysis)),
            _ => None,
        }
    }

    /// The error of the latest run, if it failed.
    pub fn error(&self) -> Option<Arc<AnalysisError>> {
        match &lock(&self.inner).state {
            SlotState::Failed(err) => Some(Arc::clone(err)),
            _ => None,
        }
    }

    /// Current state of the slot.
    pub fn status(&self) -> SlotStatus {
        match lock(&self.inner).state {
            SlotState::Empty => SlotStatus::Empty,
            SlotState::InProgress(_) => SlotStatus::InProgress,
            SlotState::Ready(_) => SlotStatus::Ready,
            SlotState::Failed(_) => SlotStatus::Failed,
        }
    }
}
