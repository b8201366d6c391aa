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

//! The capability contract every broker implementation satisfies.

pub mod rabbitmq;

use crate::error::Error;
use crate::function::FunctionSpec;

/// Status of a single job, as reported by an admin-capable broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub function_name: String,
    pub state: JobState,
}

#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub broker_version: String,
    pub queued_jobs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub id: String,
    pub function_name: String,
}

/// Every broker implementation lets clients submit work and lets workers
/// execute it. The six admin methods are given default "not implemented"
/// bodies: a broker only needs to override the ones it actually supports,
/// the same way a function only implements the execution mode it uses.
pub trait Broker {
    /// Consume `function`'s task queue forever, executing each job locally
    /// and publishing its result. Does not return under normal operation.
    fn start_worker(&self, function: &FunctionSpec) -> Result<(), Error>;

    /// Publish a task and block until its result is delivered.
    fn run_job_sync(&self, function: &FunctionSpec, args: serde_json::Value) -> Result<serde_json::Value, Error>;

    /// Publish a task and return as soon as the broker accepts the message.
    fn run_job_async(&self, function: &FunctionSpec, args: serde_json::Value) -> Result<String, Error>;

    /// Normalize a broker-specific handle to a stable job id.
    fn job_id_from_handle(&self, handle: &str) -> Result<String, Error> {
        crate::identity::job_id_from_handle(handle)
    }

    fn set_job_progress(&self, _job_id: &str, _num: u64, _denom: u64) -> Result<(), Error> {
        Err(Error::NotImplemented("set_job_progress"))
    }

    fn job_status(&self, _job_id: &str) -> Result<JobState, Error> {
        Err(Error::NotImplemented("job_status"))
    }

    fn show_jobs(&self) -> Result<Vec<JobSummary>, Error> {
        Err(Error::NotImplemented("show_jobs"))
    }

    fn cancel_job(&self, _job_id: &str) -> Result<(), Error> {
        Err(Error::NotImplemented("cancel_job"))
    }

    fn server_status(&self) -> Result<ServerStatus, Error> {
        Err(Error::NotImplemented("server_status"))
    }

    fn workers(&self) -> Result<Vec<WorkerInfo>, Error> {
        Err(Error::NotImplemented("workers"))
    }
}
