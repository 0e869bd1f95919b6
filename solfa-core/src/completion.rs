//! One-shot completions for asynchronous substrate operations
//!
//! Loading a voice engine or resuming a suspended clock finishes some time
//! after it is requested. The requester gets a [`Completion`] it can poll or
//! wait on; the substrate keeps the matching [`Completer`] and resolves it.
//! [`SingleFlight`] makes sure concurrent requests for the same operation
//! share one outstanding completion instead of starting duplicates.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Why an asynchronous operation did not finish successfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CompletionError(pub String);

impl CompletionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Outcome = Result<(), CompletionError>;

struct Shared {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<Outcome>> {
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Observer side of a one-shot operation. Cheap to clone; every clone sees
/// the same outcome.
#[derive(Clone)]
pub struct Completion {
    shared: Arc<Shared>,
}

/// Resolver side of a one-shot operation. Dropping it unresolved fails the
/// completion so waiters never hang.
pub struct Completer {
    shared: Arc<Shared>,
}

impl Completion {
    /// Create a pending completion and its resolver
    pub fn pending() -> (Completion, Completer) {
        let shared = Arc::new(Shared {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        });
        (
            Completion {
                shared: shared.clone(),
            },
            Completer { shared },
        )
    }

    /// An already successful completion
    pub fn ready() -> Completion {
        let (completion, completer) = Self::pending();
        completer.complete(Ok(()));
        completion
    }

    /// An already failed completion
    pub fn failed(message: impl Into<String>) -> Completion {
        let (completion, completer) = Self::pending();
        completer.complete(Err(CompletionError::new(message)));
        completion
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// Outcome if finished, without blocking
    pub fn outcome(&self) -> Option<Outcome> {
        self.shared.lock().clone()
    }

    /// Block until the operation finishes
    pub fn wait(&self) -> Outcome {
        let mut guard = self.shared.lock();
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self
                .shared
                .done
                .wait(guard)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block for at most `timeout`; `None` if still pending afterwards
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .done
            .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
            .unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Two completions are equal when they observe the same operation
impl PartialEq for Completion {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Completer {
    /// Resolve the completion and wake every waiter
    pub fn complete(self, outcome: Outcome) {
        self.resolve(outcome);
    }

    fn resolve(&self, outcome: Outcome) {
        let mut guard = self.shared.lock();
        if guard.is_none() {
            *guard = Some(outcome);
            self.shared.done.notify_all();
        }
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        self.resolve(Err(CompletionError::new("operation abandoned")));
    }
}

/// At most one in-flight instance of an operation
pub struct SingleFlight {
    current: Mutex<Option<Completion>>,
    /// Keep handing out a successful completion instead of starting again
    retain_success: bool,
}

impl SingleFlight {
    /// For operations that only need to succeed once (engine load)
    pub fn once() -> Self {
        Self {
            current: Mutex::new(None),
            retain_success: true,
        }
    }

    /// For operations that may be repeated once the previous one finished
    /// (resume, suspend)
    pub fn repeatable() -> Self {
        Self {
            current: Mutex::new(None),
            retain_success: false,
        }
    }

    /// Join the outstanding operation, or begin a new one with `start`
    pub fn run<F>(&self, start: F) -> Completion
    where
        F: FnOnce(Completer),
    {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = current.as_ref() {
            match existing.outcome() {
                None => return existing.clone(),
                Some(Ok(())) if self.retain_success => return existing.clone(),
                Some(_) => {}
            }
        }

        let (completion, completer) = Completion::pending();
        *current = Some(completion.clone());
        start(completer);
        completion
    }

    /// Whether an operation has been started and is still pending
    pub fn in_flight(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |c| !c.is_finished())
    }

    /// Whether a retained operation already succeeded
    pub fn succeeded(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |c| matches!(c.outcome(), Some(Ok(()))))
    }
}
