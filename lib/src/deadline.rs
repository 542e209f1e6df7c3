// Copyright 2024 The Refab Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded-time execution of symbolic-search routines.
//!
//! Mapping enumeration and clique search have exponential worst cases, so
//! every such routine runs under a deadline. Deadlines are cooperative: a
//! routine calls [`check_deadline`] at its loop heads and bails out with
//! [`TimedOut`] once the installed instant has passed. [`with_deadline`]
//! installs the deadline for the current thread only; worker threads carry
//! their own slot, so fanned-out work is bounded per item rather than in
//! aggregate.

use std::cell::Cell;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

thread_local! {
    static ACTIVE: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// A bounded-time routine ran past its deadline.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("Operation timed out")]
pub struct TimedOut;

/// Error from installing a deadline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeadlineError {
    /// A deadline was already active on this thread. Deadlines do not nest;
    /// this is a bug in the caller.
    #[error("A deadline is already active on this thread")]
    Nested,
}

/// Runs `body` under a deadline of `duration` from now.
///
/// The deadline is visible to `body` (and everything it calls on this
/// thread) through [`check_deadline`]. `body`'s own result is returned
/// unchanged; a timeout surfaces through whatever error type `body`
/// propagates it as. Fails with [`DeadlineError::Nested`] without running
/// `body` if a deadline is already active.
pub fn with_deadline<R>(
    duration: Duration,
    body: impl FnOnce() -> R,
) -> Result<R, DeadlineError> {
    let _guard = DeadlineGuard::install(Instant::now() + duration)?;
    Ok(body())
}

/// Fails with [`TimedOut`] if the active deadline (if any) has passed.
///
/// Cheap enough to call once per iteration of a search loop. Succeeds when
/// no deadline is active.
pub fn check_deadline() -> Result<(), TimedOut> {
    match ACTIVE.get() {
        Some(deadline) if Instant::now() >= deadline => Err(TimedOut),
        _ => Ok(()),
    }
}

/// Clears the thread's deadline slot on drop, so a panicking `body` cannot
/// leave a stale deadline behind.
struct DeadlineGuard;

impl DeadlineGuard {
    fn install(deadline: Instant) -> Result<Self, DeadlineError> {
        if ACTIVE.get().is_some() {
            return Err(DeadlineError::Nested);
        }
        ACTIVE.set(Some(deadline));
        Ok(Self)
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        ACTIVE.set(None);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_no_deadline_never_times_out() {
        assert_eq!(check_deadline(), Ok(()));
    }

    #[test]
    fn test_expired_deadline() {
        let result = with_deadline(Duration::ZERO, || check_deadline());
        assert_eq!(result, Ok(Err(TimedOut)));
    }

    #[test]
    fn test_unexpired_deadline() {
        let result = with_deadline(Duration::from_secs(3600), || check_deadline());
        assert_eq!(result, Ok(Ok(())));
    }

    #[test]
    fn test_nested_deadline_fails() {
        let result = with_deadline(Duration::from_secs(3600), || {
            with_deadline(Duration::from_secs(1), || ())
        });
        assert_matches!(result, Ok(Err(DeadlineError::Nested)));
    }

    #[test]
    fn test_deadline_cleared_after_scope() {
        with_deadline(Duration::ZERO, || ()).unwrap();
        assert_eq!(check_deadline(), Ok(()));
    }

    #[test]
    fn test_sequential_deadlines_allowed() {
        with_deadline(Duration::from_secs(1), || ()).unwrap();
        with_deadline(Duration::from_secs(1), || ()).unwrap();
    }
}
