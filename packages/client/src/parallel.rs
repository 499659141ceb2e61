//! Fan-out of several operations with one aggregated result.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use hopline_wire::{Error, Response, Result};

/// Overall status of a finished group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    /// Every member succeeded.
    Ok,
    /// At least the required number of members succeeded, but not all.
    Partial,
    /// Fewer members than required succeeded.
    Error,
}

/// Status of a group of `total` members of which `successes` succeeded,
/// given that `min_success` are required.
pub fn aggregate_status(total: usize, successes: usize, min_success: usize) -> AggregateStatus {
    if successes == total {
        AggregateStatus::Ok
    } else if successes < min_success {
        AggregateStatus::Error
    } else {
        AggregateStatus::Partial
    }
}

/// Every member's response, in submission order, plus the aggregate.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub status: AggregateStatus,
    pub responses: Vec<Response<T>>,
}

impl<T> BatchResult<T> {
    pub fn succeeded(&self) -> usize {
        self.responses.iter().filter(|r| r.is_success()).count()
    }

    /// Index and error of every failed member.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.responses
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.status.error().map(|e| (i, e)))
    }

    /// Summary error for anything short of full success.
    pub fn error(&self) -> Option<Error> {
        match self.status {
            AggregateStatus::Ok => None,
            _ => Some(Error::PartialBatch {
                failed: self.responses.len() - self.succeeded(),
                total: self.responses.len(),
            }),
        }
    }
}

struct GroupState<T> {
    slots: Vec<Option<Response<T>>>,
    completed: usize,
    succeeded: usize,
    min_success: usize,
    cancelled: bool,
    result: Option<BatchResult<T>>,
    taken: bool,
}

struct Shared<T> {
    state: Mutex<GroupState<T>>,
    done: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, GroupState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, index: usize, response: Response<T>) {
        let mut state = self.lock();
        let Some(slot) = state.slots.get_mut(index) else {
            return;
        };
        if slot.is_some() {
            debug!(index, "group member completed twice");
            return;
        }
        let success = response.is_success();
        *slot = Some(response);
        state.completed += 1;
        if success {
            state.succeeded += 1;
        }

        if state.completed == state.slots.len() {
            let total = state.slots.len();
            let status = aggregate_status(total, state.succeeded, state.min_success);
            let responses = state.slots.iter_mut().filter_map(Option::take).collect();
            debug!(total, succeeded = state.succeeded, ?status, "group finished");
            state.result = Some(BatchResult { status, responses });
            self.done.notify_all();
        }
    }
}

/// Collects member responses as they arrive.
///
/// The group resolves once, after the last member completed, no matter in
/// which order the members finish.
pub struct ParallelGroup<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ParallelGroup<T> {
    pub fn new(total: usize, min_success: usize) -> Result<Self> {
        if min_success > total {
            return Err(Error::invalid(format!(
                "group of {} cannot require {} successes",
                total, min_success
            )));
        }

        let result = (total == 0).then(|| BatchResult {
            status: AggregateStatus::Ok,
            responses: Vec::new(),
        });
        let state = GroupState {
            slots: (0..total).map(|_| None).collect(),
            completed: 0,
            succeeded: 0,
            min_success,
            cancelled: false,
            result,
            taken: false,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                done: Condvar::new(),
            }),
        })
    }

    /// Completion callback for the member at `index`.
    pub fn member(&self, index: usize) -> impl FnOnce(Response<T>) + Send + 'static {
        let shared = Arc::clone(&self.shared);
        move |response| shared.record(index, response)
    }

    pub fn handle(&self) -> GroupHandle<T> {
        GroupHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Waits for a [`ParallelGroup`]. Clones observe the same group.
pub struct GroupHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for GroupHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> GroupHandle<T> {
    /// Block until every member completed.
    ///
    /// Fails with [`Error::Cancelled`] once the group was cancelled, and
    /// with [`Error::AlreadyResolved`] when another handle took the result.
    pub fn wait(&self) -> Result<BatchResult<T>> {
        let guard = self.shared.lock();
        let mut state = self
            .shared
            .done
            .wait_while(guard, |s| !s.cancelled && !s.taken && s.result.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        Self::take(&mut state)
    }

    /// Like [`wait`](GroupHandle::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<BatchResult<T>>> {
        let guard = self.shared.lock();
        let (mut state, waited) = self
            .shared
            .done
            .wait_timeout_while(guard, timeout, |s| {
                !s.cancelled && !s.taken && s.result.is_none()
            })
            .unwrap_or_else(PoisonError::into_inner);
        if waited.timed_out() {
            return Ok(None);
        }
        Self::take(&mut state).map(Some)
    }

    fn take(state: &mut GroupState<T>) -> Result<BatchResult<T>> {
        if state.cancelled {
            return Err(Error::Cancelled);
        }
        match state.result.take() {
            Some(result) => {
                state.taken = true;
                Ok(result)
            }
            None => Err(Error::AlreadyResolved),
        }
    }

    /// Members completed so far and the group size.
    pub fn progress(&self) -> (usize, usize) {
        let state = self.shared.lock();
        (state.completed, state.slots.len())
    }

    /// Stop waiting for the group.
    ///
    /// Members already sent keep running; their responses are discarded.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        state.cancelled = true;
        self.shared.done.notify_all();
    }
}
