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
//! that exercise only the pure local-runner path — no broker needed, so
//! these always run (no `test_components` feature required).

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jobrelay::FunctionSpec;
use serde_json::json;

fn addition() -> FunctionSpec {
    FunctionSpec::new("Addition", |args| {
        let a = args["a"].as_i64().ok_or("missing a")?;
        let b = args["b"].as_i64().ok_or("missing b")?;
        Ok(json!(a + b))
    })
}

fn fails_once(retries: u32) -> FunctionSpec {
    let called = Arc::new(AtomicUsize::new(0));
    FunctionSpec::new("FailsOnce", move |_| {
        if called.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("first attempt fails".into())
        } else {
            Ok(json!(42))
        }
    })
    .retries(retries)
}

/// Scenario 1: `name="Addition", args={a:3,b:5}`. `run_locally` returns 8.
#[test]
fn scenario_1_addition_run_locally() {
    let result = addition().run_locally(json!({"a": 3, "b": 5})).unwrap();
    assert_eq!(result, json!(8));
}

/// Scenario 4: `name="FailsOnce", retries=0` via `run_locally`: first call
/// raises; a fresh call (retries exhausted at 0) never gets a second
/// attempt to redeem itself.
#[test]
fn scenario_4_fails_once_without_retries_raises() {
    let f = fails_once(0);
    assert!(f.run_locally(json!({})).is_err());
}

/// Scenario 5: `name="FailsOnceWillRetry", retries=3` via `run_locally`:
/// first call returns 42 (the retry absorbs the single failure).
#[test]
fn scenario_5_fails_once_will_retry_succeeds() {
    let f = fails_once(3);
    let result = f.run_locally(json!({})).unwrap();
    assert_eq!(result, json!(42));
}

#[test]
fn fails_always_exhausts_all_attempts_and_raises() {
    let calls = Cell::new(0);
    let f = FunctionSpec::new("FailsAlways", move |_| {
        calls.set(calls.get() + 1);
        Err("nope".into())
    })
    .retries(2);
    assert!(f.run_locally(json!({})).is_err());
}
