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

use thiserror::Error;

/// Catch-all error for a function's `run` routine.
pub type PerformError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// Connect/declare/publish/consume/ack failed against the broker transport.
    /// Fatal to the current call; a worker that hits this dies rather than retry silently.
    #[error(transparent)]
    Transport(#[from] lapin::Error),

    /// A required AMQP property was empty, or a message otherwise violated the wire
    /// contract (unknown `status`, `task` name mismatch, `task_id` != expected job id).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The message body was not valid JSON, or not the object shape expected.
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// The user's function raised. Carried back to `run_remotely`/`run_locally` callers.
    #[error("{0}")]
    Job(String),

    /// Admin surface the RabbitMQ broker does not implement.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("{0}")]
    Msg(String),
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Msg(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Error {
        Error::Msg(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_and_not_implemented_messages_are_non_empty_and_stable() {
        assert_eq!(Error::Protocol("task_id mismatch".into()).to_string(), "protocol violation: task_id mismatch");
        assert_eq!(Error::NotImplemented("job_status").to_string(), "not implemented: job_status");
        assert_eq!(Error::Job("boom".into()).to_string(), "boom");
    }

    #[test]
    fn string_and_str_convert_into_msg_variant() {
        let from_string: Error = "failed".to_string().into();
        let from_str: Error = "failed".into();
        assert_eq!(from_string.to_string(), "failed");
        assert_eq!(from_str.to_string(), "failed");
    }
}
