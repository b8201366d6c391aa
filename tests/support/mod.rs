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

//! Shared fixtures for the broker integration tests. Grounded on
//! `test-common::TestGuard` from the teacher's own integration test
//! crate, minus the Postgres truncation (this system has no durable
//! storage leg to clean up between runs).

use std::sync::{Mutex, MutexGuard};

use jobrelay::broker::rabbitmq::RabbitMqBroker;
use jobrelay::ConnectionSettings;
use once_cell::sync::Lazy;

static TEST_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serializes the tests in this binary; they all talk to the same
/// RabbitMQ instance and would otherwise cross-wire each other's queues.
pub struct TestGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

impl<'a> TestGuard<'a> {
    pub fn lock() -> Self {
        TestGuard(TEST_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}

/// The broker under test, pointed at `JOBRELAY_TEST_AMQP_HOST` (default
/// `localhost`). These tests require a live RabbitMQ instance and are
/// `#[ignore]`d by default; run with `cargo test -- --ignored`.
///
/// Loads a `.env` file if present, the same way a deployed process picks up
/// `JOBRELAY_*` overrides for `ConnectionSettings::from_env`.
pub fn test_broker() -> RabbitMqBroker {
    dotenv::dotenv().ok();
    let mut settings = ConnectionSettings::default();
    if let Ok(host) = std::env::var("JOBRELAY_TEST_AMQP_HOST") {
        settings.host = host;
    }
    RabbitMqBroker::new(settings)
}
