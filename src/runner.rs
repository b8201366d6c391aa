// Copyright 2018-2019 Parity Technologies (UK) Ltd.
// This file is part of jobrelay.

// jobrelay is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// jobrelay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with jobrelay.  If not, see <http://www.gnu.org/licenses/>.

//! Executes a function's `run` routine in-process, with retry accounting
//! and timing. Used both by `FunctionSpec::run_locally` and by the worker
//! loop after it pulls a task off the queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::error::PerformError;

/// Run `run` up to `retries + 1` times, logging each failed attempt and the
/// total elapsed wall-clock time. Returns the first success, or the last
/// failure if every attempt is exhausted.
///
/// `job_id` is carried purely for log correlation (it is what lets a
/// worker-side log line be matched back to the client that is awaiting the
/// result over AMQP).
pub fn run_with_retries<F>(
    function_name: &str,
    job_id: &str,
    retries: u32,
    run: F,
) -> Result<serde_json::Value, PerformError>
where
    F: Fn() -> Result<serde_json::Value, PerformError>,
{
    let attempts = retries + 1;
    let started = Instant::now();

    let mut last_err: Option<PerformError> = None;
    for attempt in 1..=attempts {
        let outcome = catch_unwind(AssertUnwindSafe(&run)).unwrap_or_else(|panic| Err(describe_panic(&*panic)));

        match outcome {
            Ok(result) => {
                tracing::info!(
                    function = function_name,
                    job_id,
                    attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job succeeded"
                );
                return Ok(result);
            }
            Err(err) => {
                tracing::warn!(
                    function = function_name,
                    job_id,
                    attempt,
                    attempts_allowed = attempts,
                    error = %err,
                    "job attempt failed"
                );
                last_err = Some(err);
            }
        }
    }

    tracing::error!(
        function = function_name,
        job_id,
        attempts,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "job failed after exhausting retries"
    );
    Err(last_err.expect("attempts is always >= 1, so last_err is always set on the error path"))
}

fn describe_panic(panic: &(dyn std::any::Any + Send)) -> PerformError {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        format!("job panicked: {}", s).into()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("job panicked: {}", s).into()
    } else {
        "job panicked".into()
    }
}
