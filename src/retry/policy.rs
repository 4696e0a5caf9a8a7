// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ready-made retry policies.

use futures_util::StreamExt;
use futures_util::stream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{ErrorStream, PermitStream, ReactiveRetryPolicy};
use crate::core::FeignError;

/// Delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial`, doubled for every further retry, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the given retry (1-based).
    pub fn delay(&self, retry: usize) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exponent = retry.saturating_sub(1).min(31) as u32;
                initial.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

type ErrorFilter = Arc<dyn Fn(&FeignError) -> bool + Send + Sync>;

/// Retries up to `max_retries` times, for errors accepted by a filter.
///
/// A `Retry-After` delay carried by a status error takes the place of the
/// computed backoff. An error the filter rejects, or any error after the
/// last allowed retry, ends the call with that error.
#[derive(Clone)]
pub struct BasicRetryPolicy {
    max_retries: usize,
    backoff: Backoff,
    retry_on: ErrorFilter,
}

impl fmt::Debug for BasicRetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicRetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl BasicRetryPolicy {
    /// Retry transient errors (see [`FeignError::is_retryable`]) without delay.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
            retry_on: Arc::new(FeignError::is_retryable),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the error filter.
    pub fn retry_on<F>(mut self, filter: F) -> Self
    where
        F: Fn(&FeignError) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Arc::new(filter);
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

struct PolicyState {
    errors: ErrorStream,
    retries: usize,
    finished: bool,
}

impl ReactiveRetryPolicy for BasicRetryPolicy {
    fn retry_when(&self, errors: ErrorStream) -> PermitStream {
        let max_retries = self.max_retries;
        let backoff = self.backoff;
        let retry_on = self.retry_on.clone();
        let state = PolicyState {
            errors,
            retries: 0,
            finished: false,
        };

        stream::unfold(state, move |mut state| {
            let retry_on = retry_on.clone();
            async move {
                if state.finished {
                    return None;
                }
                let error = state.errors.next().await?;
                if state.retries >= max_retries || !retry_on(&error) {
                    state.finished = true;
                    return Some((Err(error), state));
                }

                state.retries += 1;
                let delay = error
                    .retry_after()
                    .unwrap_or_else(|| backoff.delay(state.retries));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some((Ok(()), state))
            }
        })
        .boxed()
    }

    fn name(&self) -> &str {
        "basic"
    }
}
