//! Caller-supplied cancellation and deadline context
//!
//! Every outbound CA call runs under an [`IssueContext`]. Cancellation and
//! deadline expiry both surface as [`IssuerError::Timeout`].

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::utils::error::IssuerError;

/// Cancellation token plus optional deadline for one issuance
#[derive(Debug, Clone, Default)]
pub struct IssueContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl IssueContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled through `token`
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Attach a cancellation token to this context
    pub fn cancelled_by(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Derive a child context whose deadline is at most `max` from now.
    ///
    /// Cancelling the parent cancels the child.
    pub fn bounded(&self, max: Duration) -> Self {
        let cap = Instant::now() + max;
        let deadline = match self.deadline {
            Some(deadline) if deadline < cap => deadline,
            _ => cap,
        };

        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Fail fast if the context is already cancelled or expired
    pub fn check(&self) -> Result<(), IssuerError> {
        if self.cancel.is_cancelled() {
            return Err(IssuerError::Timeout("context cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(IssuerError::Timeout("context deadline exceeded".to_string()));
            }
        }
        Ok(())
    }

    /// Run `fut`, abandoning it as soon as the context is cancelled or expires.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T, IssuerError>
    where
        F: Future<Output = Result<T, IssuerError>>,
    {
        self.check()?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(operation, "Operation cancelled by caller");
                Err(IssuerError::Timeout(format!("{} cancelled", operation)))
            }
            _ = expired => {
                debug!(operation, "Operation deadline exceeded");
                Err(IssuerError::Timeout(format!("{} deadline exceeded", operation)))
            }
            result = fut => result,
        }
    }
}
