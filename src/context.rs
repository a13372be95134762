//! Cooperative cancellation for queries.
//!
//! A [`QueryContext`] is checked between I/O steps, never inside a syscall. Once it reports
//! cancellation every further check fails with [`Error::Cancelled`].

use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::error::{Error, Result};

/// Cancellation signal and optional deadline passed to every query.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancelled: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`QueryContext`] created alongside it (and their clones).
#[derive(Debug)]
pub struct Canceller(watch::Sender<bool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl QueryContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context together with the handle that cancels it.
    ///
    /// ```
    /// # use cgstat::context::QueryContext;
    /// let (ctx, canceller) = QueryContext::cancellable();
    /// assert!(ctx.check().is_ok());
    /// canceller.cancel();
    /// assert!(ctx.check().is_err());
    /// ```
    pub fn cancellable() -> (Self, Canceller) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                cancelled: Some(rx),
                deadline: None,
            },
            Canceller(tx),
        )
    }

    /// Returns a copy of this context that additionally expires at `deadline`.
    ///
    /// An earlier deadline already present is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns a copy of this context that expires `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once the context was cancelled or its deadline passed.
    ///
    /// Dropping the [`Canceller`] without calling [`Canceller::cancel`] does not cancel.
    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.as_ref().is_some_and(|rx| *rx.borrow()) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if [`QueryContext::is_cancelled`] is `true`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            log::debug!("query cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
