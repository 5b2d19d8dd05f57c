use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};

/// The deadline-bounded execution context of one request.
///
/// Stored in the request extensions by [`DeadlineService`](crate::DeadlineService)
/// when the caller supplied a valid deadline; absent when no deadline was
/// requested. Handles are cheap to clone and all clones share one cancellation
/// token.
///
/// Cancellation is advisory: the token fires when the deadline elapses (or the
/// request scope ends), and it is the handler's job to observe it, typically by
/// holding [`cancelled`](RequestDeadline::cancelled) in a `tokio::select!`.
#[derive(Clone, Debug)]
pub struct RequestDeadline {
    deadline: DateTime<Utc>,
    token: CancellationToken,
}

impl RequestDeadline {
    /// The effective deadline of this request.
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Resolves when the deadline elapses or the request scope is released.
    /// Use in `tokio::select!` to break out of in-flight work.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Non-blocking probe of the cancellation signal.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token, for deriving further children.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Owns the cancellation resources derived for a single invocation: the token
/// guard and a timer task that fires the token at the deadline.
///
/// Dropping the scope cancels the token, which wakes any handler still waiting
/// on it and reaps the timer task, so holding the scope across the wrapped
/// call guarantees release on every exit path.
pub(crate) struct DeadlineScope {
    handle: RequestDeadline,
    _guard: DropGuard,
}

impl DeadlineScope {
    /// Derives a child context bounded by `requested`. If the request already
    /// carries a deadline from an outer adapter, the child keeps the tighter
    /// of the two and its token is cancelled when the parent's is.
    pub(crate) fn derive(parent: Option<&RequestDeadline>, requested: DateTime<Utc>) -> Self {
        let (token, deadline) = match parent {
            Some(parent) => (parent.token.child_token(), requested.min(parent.deadline)),
            None => (CancellationToken::new(), requested),
        };

        let timer = token.clone();
        tokio::spawn(async move {
            let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = tokio::time::sleep(wait) => timer.cancel(),
                () = timer.cancelled() => {}
            }
        });

        let handle = RequestDeadline {
            deadline,
            token: token.clone(),
        };
        DeadlineScope {
            handle,
            _guard: token.drop_guard(),
        }
    }

    pub(crate) fn handle(&self) -> RequestDeadline {
        self.handle.clone()
    }
}
