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

//! Per-function metadata and the three ways a client can have it run.

use std::sync::Arc;

use crate::broker::Broker;
use crate::envelope::Priority;
use crate::error::{Error, PerformError};

/// Signature of a function's `run` routine: args in, a JSON result or an
/// error out. Held behind an `Arc` so a `FunctionSpec` is cheap to clone
/// and share between the client path and a worker's dispatch loop.
pub type RunFn = dyn Fn(&serde_json::Value) -> Result<serde_json::Value, PerformError> + Send + Sync;

/// A named, executable unit registered with the system.
///
/// `name` must be globally unique in a deployment; it is the routing key,
/// exchange name and task queue name used on the wire.
#[derive(Clone)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub priority: Priority,
    pub retries: u32,
    pub lazy_queue: bool,
    pub publish_results: bool,
    handler: Arc<RunFn>,
}

impl FunctionSpec {
    /// Total attempts made by `run_locally` before raising is `retries + 1`.
    pub fn new<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Result<serde_json::Value, PerformError> + Send + Sync + 'static,
    {
        Self {
            name,
            priority: Priority::Normal,
            retries: 0,
            lazy_queue: false,
            publish_results: true,
            handler: Arc::new(handler),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn lazy_queue(mut self, lazy_queue: bool) -> Self {
        self.lazy_queue = lazy_queue;
        self
    }

    pub fn publish_results(mut self, publish_results: bool) -> Self {
        self.publish_results = publish_results;
        self
    }

    /// Invoke the user-supplied handler exactly once, with no retry
    /// accounting. Used by the worker loop, which does its own single-shot
    /// call per delivered task (client-side retries are a `run_locally`
    /// concern, not a broker-level one).
    pub fn run(&self, args: &serde_json::Value) -> Result<serde_json::Value, PerformError> {
        (self.handler)(args)
    }

    fn args_as_object(args: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match args {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("_".to_string(), other.clone());
                map
            }
        }
    }

    /// Execute `run(args)` in-process under the retry loop described by
    /// `retries`: up to `retries + 1` attempts, logging each failure, with
    /// total elapsed time logged on completion.
    pub fn run_locally(&self, args: serde_json::Value) -> Result<serde_json::Value, PerformError> {
        let args_map = Self::args_as_object(&args);
        let job_id = crate::identity::path_safe_job_id(self.name, &args_map);
        let handler = &self.handler;
        crate::runner::run_with_retries(self.name, &job_id, self.retries, || handler(&args))
    }

    /// Submit the job and block until its result is delivered, raising on
    /// remote failure.
    pub fn run_remotely(&self, args: serde_json::Value, broker: &dyn Broker) -> Result<serde_json::Value, Error> {
        broker.run_job_sync(self, args)
    }

    /// Submit the job and return as soon as the broker accepts it.
    pub fn add_to_queue(&self, args: serde_json::Value, broker: &dyn Broker) -> Result<String, Error> {
        broker.run_job_async(self, args)
    }
}
