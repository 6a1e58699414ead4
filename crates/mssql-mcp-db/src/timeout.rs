//! Tiered timeout control.
//!
//! Three independently configured limits meet here: the runtime-tunable
//! default command timeout `D`, an optional per-call override `O`, and an
//! optional process-wide total-tool-call budget `T`. At the start of every
//! command the three are folded into one effective driver timeout `E`:
//!
//! - no budget: `E = O | D`
//! - budget set: `E = min(T - elapsed, O | D)`, failing immediately once the
//!   budget is spent.
//!
//! `E` is always clamped to `[1, 3600]` seconds. Background sessions carry no
//! budget; they fold against an unbounded deadline.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DbError;

pub const MIN_COMMAND_TIMEOUT_SECS: u32 = 1;
pub const MAX_COMMAND_TIMEOUT_SECS: u32 = 3600;

/// The runtime-tunable default command timeout `D`.
///
/// Updates are visible to commands that start after the change; in-flight
/// commands keep the effective timeout they were given.
#[derive(Debug)]
pub struct DefaultCommandTimeout {
    secs: AtomicU32,
}

impl DefaultCommandTimeout {
    pub fn new(initial_secs: u32) -> Self {
        Self {
            secs: AtomicU32::new(initial_secs),
        }
    }

    pub fn get(&self) -> u32 {
        self.secs.load(Ordering::Acquire)
    }

    pub fn set(&self, secs: u64) -> Result<(), DbError> {
        if secs < MIN_COMMAND_TIMEOUT_SECS as u64 || secs > MAX_COMMAND_TIMEOUT_SECS as u64 {
            return Err(DbError::TimeoutOutOfRange {
                value: secs,
                min: MIN_COMMAND_TIMEOUT_SECS,
                max: MAX_COMMAND_TIMEOUT_SECS,
            });
        }
        self.secs.store(secs as u32, Ordering::Release);
        Ok(())
    }
}

/// Per-invocation deadline: start instant, optional budget `T`, and a cancel
/// source forwarded to driver calls.
#[derive(Debug, Clone)]
pub struct ToolDeadline {
    started: Instant,
    budget: Option<Duration>,
    budget_secs: u32,
    token: CancellationToken,
}

impl ToolDeadline {
    /// Deadline with a total budget of `budget_secs`, or unbounded when
    /// `None`.
    pub fn new(budget_secs: Option<u32>) -> Self {
        Self {
            started: Instant::now(),
            budget: budget_secs.map(|s| Duration::from_secs(s as u64)),
            budget_secs: budget_secs.unwrap_or(0),
            token: CancellationToken::new(),
        }
    }

    /// Deadline for background work: no budget, cancel-only.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Seconds of budget this deadline was created with (0 when unbounded).
    pub fn budget_secs(&self) -> u32 {
        self.budget_secs
    }

    /// Remaining budget, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(r) if r.is_zero())
    }

    /// The budget-exceeded error for this deadline.
    pub fn budget_error(&self) -> DbError {
        DbError::ToolCallTimeout {
            budget_secs: self.budget_secs,
        }
    }

    /// Resolves when the budget runs out; pends forever when unbounded.
    pub async fn budget_elapsed(&self) {
        match self.budget {
            Some(budget) => tokio::time::sleep_until(self.started + budget).await,
            None => std::future::pending().await,
        }
    }

    /// Fold this deadline with the per-call override and the current default
    /// into the effective command timeout `E`, in seconds.
    pub fn effective_timeout(
        &self,
        override_secs: Option<u32>,
        default_secs: u32,
    ) -> Result<u32, DbError> {
        let base = override_secs.unwrap_or(default_secs);
        let effective = match self.remaining() {
            None => base,
            Some(remaining) => {
                if remaining.is_zero() {
                    return Err(self.budget_error());
                }
                // Sub-second remainders round up so E stays >= 1.
                let remaining_secs = remaining.as_secs_f64().ceil() as u32;
                base.min(remaining_secs)
            }
        };
        Ok(effective.clamp(MIN_COMMAND_TIMEOUT_SECS, MAX_COMMAND_TIMEOUT_SECS))
    }

    /// Post-hoc rewrite: once the budget has fired, every error observed
    /// during cleanup for this call reports as the budget violation.
    pub fn classify(&self, err: DbError) -> DbError {
        if self.budget.is_some() && self.is_expired() {
            self.budget_error()
        } else {
            err
        }
    }
}
