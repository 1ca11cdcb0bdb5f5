// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

use std::{fmt::Debug, time::Duration};

use futures::Future;
use rand::Rng;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: usize = 30;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(20);

pub trait Retryable {
	fn is_retryable(&self) -> bool {
		false
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RetryParams {
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub max_attempts: usize,
}

impl Default for RetryParams {
	fn default() -> Self {
		Self {
			base_delay: DEFAULT_BASE_DELAY,
			max_delay: DEFAULT_MAX_DELAY,
			max_attempts: DEFAULT_MAX_ATTEMPTS,
		}
	}
}

impl RetryParams {
	/// Delay before the next attempt: the base delay doubles per attempt
	/// up to `max_delay`, and the sleep lands somewhere between half the
	/// capped value and all of it so retrying callers spread out.
	///
	/// `num_attempts` counts attempts performed so far, not retries.
	///
	/// # Panics
	///
	/// Panics if `num_attempts` is zero.
	pub fn compute_delay(&self, num_attempts: usize) -> Duration {
		assert!(num_attempts > 0, "num_attempts should be greater than zero");

		let backoff_ms = (self.base_delay.as_millis() as u64)
			.saturating_mul(1u64 << (num_attempts - 1).min(63));
		let capped_ms = backoff_ms.min(self.max_delay.as_millis() as u64);
		let floor_ms = capped_ms / 2;
		let jitter_ms = rand::thread_rng().gen_range(0..=floor_ms);
		Duration::from_millis(floor_ms + jitter_ms)
	}

	#[cfg(any(test, feature = "testsuite"))]
	pub fn for_test() -> Self {
		Self {
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(2),
			..Default::default()
		}
	}

	/// Creates a new [`RetryParams`] instance using settings that are more aggressive than those
	/// of the standard policy, for services that are resilient to retries, usually managed cloud
	/// services.
	pub fn aggressive() -> Self {
		Self {
			base_delay: Duration::from_millis(250),
			max_delay: Duration::from_secs(20),
			max_attempts: 5,
		}
	}
}

/// Runs `f` until it succeeds, the error is not retryable, or the attempt
/// budget is exhausted.
pub async fn retry<U, E, Fut>(retry_params: &RetryParams, f: impl Fn() -> Fut) -> Result<U, E>
where
	Fut: Future<Output = Result<U, E>>,
	E: Retryable + Debug + 'static,
{
	let mut num_attempts = 0;

	loop {
		let response = f().await;

		let error = match response {
			Ok(response) => {
				return Ok(response);
			},
			Err(error) => error,
		};
		if !error.is_retryable() {
			return Err(error);
		}
		num_attempts += 1;
		if num_attempts >= retry_params.max_attempts {
			warn!(
				num_attempts = num_attempts,
				"request failed and maximum number of retry attempts exceeded"
			);
			return Err(error);
		}
		let delay = retry_params.compute_delay(num_attempts);
		debug!(num_attempts = num_attempts, delay_ms = delay.as_millis() as u64, error = ?error, "request failed, retrying");
		tokio::time::sleep(delay).await;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[derive(Debug, Eq, PartialEq)]
	struct TransientError;

	impl Retryable for TransientError {
		fn is_retryable(&self) -> bool {
			true
		}
	}

	#[derive(Debug, Eq, PartialEq)]
	struct FatalError;

	impl Retryable for FatalError {}

	#[tokio::test]
	async fn test_retry_eventually_succeeds() {
		let attempts = AtomicUsize::new(0);
		let result: Result<usize, TransientError> =
			retry(&RetryParams::for_test(), || async {
				if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(TransientError)
				} else {
					Ok(42)
				}
			})
			.await;
		assert_eq!(result.unwrap(), 42);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_retry_gives_up_on_fatal_error() {
		let attempts = AtomicUsize::new(0);
		let result: Result<usize, FatalError> = retry(&RetryParams::for_test(), || async {
			attempts.fetch_add(1, Ordering::SeqCst);
			Err(FatalError)
		})
		.await;
		assert_eq!(result.unwrap_err(), FatalError);
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_retry_exhausts_attempt_budget() {
		let params = RetryParams { max_attempts: 3, ..RetryParams::for_test() };
		let attempts = AtomicUsize::new(0);
		let result: Result<usize, TransientError> = retry(&params, || async {
			attempts.fetch_add(1, Ordering::SeqCst);
			Err(TransientError)
		})
		.await;
		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn test_delay_growth_is_bounded() {
		let params = RetryParams::default();
		let mut previous_ceiling = 0;
		for attempt in 1..8 {
			let delay = params.compute_delay(attempt).as_millis() as u64;
			let ceiling = (params.base_delay.as_millis() as u64 * 2u64.pow(attempt as u32 - 1))
				.min(params.max_delay.as_millis() as u64);
			assert!(delay <= ceiling);
			assert!(ceiling >= previous_ceiling);
			previous_ceiling = ceiling;
		}
	}
}
