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

//! The Celery-compatible task and result envelopes exchanged over AMQP.

use serde::{Deserialize, Serialize};

/// `low|normal|high`, mapped to the AMQP priorities `0|1|2` used on both
/// the task queue (`x-max-priority = 3`) and the published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_amqp_priority(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// The task envelope published to a function's task queue.
///
/// Field layout and defaults follow Celery's own task message shape so
/// that a standard Celery worker could, in principle, consume the same
/// queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: String,
    pub task: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    pub kwargs: serde_json::Value,
    pub retries: u32,
    pub expires: Option<String>,
    pub utc: bool,
    pub chord: Option<serde_json::Value>,
    pub callbacks: Option<serde_json::Value>,
    pub errbacks: Option<serde_json::Value>,
    pub taskset: Option<serde_json::Value>,
    pub timelimit: (Option<u64>, Option<u64>),
    pub eta: Option<String>,
}

impl TaskEnvelope {
    pub fn new(job_id: String, function_name: String, kwargs: serde_json::Value, retries: u32) -> Self {
        Self {
            id: job_id,
            task: function_name,
            args: Vec::new(),
            kwargs,
            retries,
            expires: None,
            utc: true,
            chord: None,
            callbacks: None,
            errbacks: None,
            taskset: None,
            timelimit: (None, None),
            eta: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Success,
    Failure,
}

/// The result envelope a worker publishes back to the client's reply queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: JobStatus,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default)]
    pub children: Vec<serde_json::Value>,
}

impl ResultEnvelope {
    pub fn success(task_id: String, result: serde_json::Value) -> Self {
        Self { status: JobStatus::Success, task_id, result: Some(result), traceback: None, children: Vec::new() }
    }

    /// The failure envelope shape the worker loop publishes on a job error:
    /// `traceback = "Job died: <msg>"`, `result = {exc_message, exc_type}`.
    pub fn failure(task_id: String, error_message: &str) -> Self {
        Self {
            status: JobStatus::Failure,
            task_id,
            result: Some(serde_json::json!({
                "exc_message": "Task has failed",
                "exc_type": "Exception",
            })),
            traceback: Some(format!("Job died: {}", error_message)),
            children: Vec::new(),
        }
    }
}
