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

//! The numbered scenarios from the system's testable-properties section
//! that need a broker round-trip (needs a live RabbitMQ, `#[ignore]`d by
//! default; this whole binary is gated on `test_components` since it calls
//! `RabbitMqBroker::run_one_job`, which only exists under that feature).

mod support;

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use assert_matches::assert_matches;
use jobrelay::{Error, FunctionSpec};
use serde_json::json;
use support::TestGuard;

fn addition() -> FunctionSpec {
    FunctionSpec::new("Addition", |args| {
        let a = args["a"].as_i64().ok_or("missing a")?;
        let b = args["b"].as_i64().ok_or("missing b")?;
        Ok(json!(a + b))
    })
}

fn fails_always() -> FunctionSpec {
    FunctionSpec::new("FailsAlways", |_| Err("this function always fails".into()))
}

fn reverse_string() -> FunctionSpec {
    FunctionSpec::new("ReverseString", |args| {
        let s = args["value"].as_str().ok_or("missing value")?;
        Ok(json!(s.chars().rev().collect::<String>()))
    })
}

/// Scenario 2: via `run_remotely`, the worker publishes a SUCCESS envelope
/// and the client returns the user function's result.
#[test]
#[ignore = "requires a live RabbitMQ instance at JOBRELAY_TEST_AMQP_HOST (default localhost)"]
fn scenario_2_addition_run_remotely() -> Result<()> {
    let _guard = TestGuard::lock();
    let broker = support::test_broker();
    let worker_broker = support::test_broker();

    let function = addition();
    let worker_function = function.clone();
    let worker = thread::spawn(move || worker_broker.run_one_job(&worker_function));

    let result = function.run_remotely(json!({"a": 3, "b": 5}), &broker)?;
    assert_eq!(result, json!(8));
    worker.join().unwrap()?;
    Ok(())
}

/// Scenario 3: a FAILURE envelope surfaces as a raised `Error::Job` carrying
/// the `"Job died: …"` traceback on the client.
#[test]
#[ignore = "requires a live RabbitMQ instance at JOBRELAY_TEST_AMQP_HOST (default localhost)"]
fn scenario_3_fails_always_run_remotely_raises_with_traceback() -> Result<()> {
    let _guard = TestGuard::lock();
    let broker = support::test_broker();
    let worker_broker = support::test_broker();

    let function = fails_always();
    let worker_function = function.clone();
    let worker = thread::spawn(move || worker_broker.run_one_job(&worker_function));

    let err = function.run_remotely(json!({}), &broker).unwrap_err();
    assert_matches!(err, Error::Job(ref traceback) if traceback.contains("Job died:"));
    worker.join().unwrap()?;
    Ok(())
}

/// Scenario 6: two concurrent `run_remotely` calls for the same function
/// from the same client each get back their own result regardless of
/// which worker delivery completes first — this is the out-of-order
/// result-cache behavior the reply queue design exists for.
#[test]
#[ignore = "requires a live RabbitMQ instance at JOBRELAY_TEST_AMQP_HOST (default localhost)"]
fn scenario_6_concurrent_calls_each_get_their_own_result() -> Result<()> {
    let _guard = TestGuard::lock();
    let broker = Arc::new(support::test_broker());
    let worker_broker = support::test_broker();

    let function = reverse_string();
    let worker_function = function.clone();
    let worker = thread::spawn(move || -> Result<()> {
        worker_broker.run_one_job(&worker_function)?;
        worker_broker.run_one_job(&worker_function)?;
        Ok(())
    });

    let f1 = function.clone();
    let b1 = broker.clone();
    let h1 = thread::spawn(move || f1.run_remotely(json!({"value": "abc"}), b1.as_ref()));

    let f2 = function.clone();
    let b2 = broker.clone();
    let h2 = thread::spawn(move || f2.run_remotely(json!({"value": "xyz"}), b2.as_ref()));

    assert_eq!(h1.join().unwrap()?, json!("cba"));
    assert_eq!(h2.join().unwrap()?, json!("zyx"));
    worker.join().unwrap()?;
    Ok(())
}

